//! Identity, credentials and per-request sessions.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod clock;
mod codec;
mod secrets;
mod tokens;
mod provider;
mod request_context;
mod gate;

pub use principal::{Identity, UserResponse};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{ClaimSet, CredentialCodec, SIGNING_ALGORITHM};
pub use secrets::{SecretScheme, TokenSecrets};
pub use tokens::{Flavor, TokenPair, TokenService, TokenTtls, DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS};
pub use provider::{authenticate, IdentityStore, LoginRequest, MemoryIdentityStore};
pub use request_context::{Attach, Me, SessionContext};
pub use gate::{authorize, extract_credential, require_access, require_refresh};
