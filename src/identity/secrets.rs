//! Signing secrets for the two token flavors.
//!
//! Access and refresh tokens are told apart only by the secret that signed
//! them, so the two secrets must differ. `SecretScheme` decides how they are
//! obtained from configuration:
//! - `Hmac`: HMAC-SHA256 of a per-flavor label keyed by the root secret. A
//!   leaked access secret reveals nothing about the refresh secret.
//! - `Suffixed`: root + `_access` / root + `_refresh`, byte-compatible with
//!   tokens minted by the legacy deployment. Weaker: whoever learns one
//!   derived secret learns the root.
//! - `Independent`: two separately configured secrets.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::ConfigError;

const ACCESS_LABEL: &[u8] = b"kanbanflow.token.access.v1";
const REFRESH_LABEL: &[u8] = b"kanbanflow.token.refresh.v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretScheme {
    Hmac { root: String },
    Suffixed { root: String },
    Independent { access: String, refresh: String },
}

/// Derived per-flavor secrets. Debug output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSecrets {
    pub access: Vec<u8>,
    pub refresh: Vec<u8>,
}

impl std::fmt::Debug for TokenSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSecrets").field("access", &"<redacted>").field("refresh", &"<redacted>").finish()
    }
}

impl SecretScheme {
    pub fn label(&self) -> &'static str {
        match self {
            SecretScheme::Hmac { .. } => "hmac",
            SecretScheme::Suffixed { .. } => "suffix",
            SecretScheme::Independent { .. } => "independent",
        }
    }

    pub fn derive(&self) -> Result<TokenSecrets, ConfigError> {
        let secrets = match self {
            SecretScheme::Hmac { root } => {
                require_non_empty("root secret", root)?;
                TokenSecrets { access: hmac_label(root, ACCESS_LABEL)?, refresh: hmac_label(root, REFRESH_LABEL)? }
            }
            SecretScheme::Suffixed { root } => {
                require_non_empty("root secret", root)?;
                TokenSecrets {
                    access: format!("{root}_access").into_bytes(),
                    refresh: format!("{root}_refresh").into_bytes(),
                }
            }
            SecretScheme::Independent { access, refresh } => {
                require_non_empty("access secret", access)?;
                require_non_empty("refresh secret", refresh)?;
                TokenSecrets { access: access.clone().into_bytes(), refresh: refresh.clone().into_bytes() }
            }
        };
        if secrets.access == secrets.refresh {
            return Err(ConfigError::Invalid("access and refresh secrets must differ".into()));
        }
        Ok(secrets)
    }
}

fn require_non_empty(what: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Missing(what.to_string()));
    }
    Ok(())
}

fn hmac_label(root: &str, label: &[u8]) -> Result<Vec<u8>, ConfigError> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(root.as_bytes())
        .map_err(|e| ConfigError::Invalid(format!("root secret: {e}")))?;
    mac.update(label);
    Ok(mac.finalize().into_bytes().to_vec())
}
