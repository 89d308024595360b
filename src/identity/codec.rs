//! Credential codec: three-segment HMAC-signed tokens carrying a `ClaimSet`.
//! Pure function of secret + claims; no clock, no I/O. Expiry is judged by
//! the token service against its own clock.

use std::collections::HashSet;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Algorithm used when signing.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Header algorithms accepted on verification: the HMAC family only.
const HMAC_FAMILY: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Claims embedded in every token, as a flat key/value payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    /// Subject identity id.
    pub id: String,
    /// Subject email at issuance.
    pub email: String,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Issued-at, unix seconds.
    pub iat: i64,
    pub jti: String,
}

#[derive(Deserialize)]
struct DeclaredHeader {
    alg: String,
}

#[derive(Clone)]
pub struct CredentialCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl CredentialCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.algorithms = HMAC_FAMILY.to_vec();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn sign(&self, claims: &ClaimSet) -> Result<String, AuthError> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, &self.encoding)
            .map_err(|e| AuthError::SigningFailed(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<ClaimSet, AuthError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header, payload, _signature] = segments.as_slice() else {
            return Err(AuthError::MalformedToken(format!("expected 3 segments, got {}", segments.len())));
        };
        let alg = declared_algorithm(header)?;
        if !HMAC_FAMILY.iter().any(|a| format!("{a:?}") == alg) {
            return Err(AuthError::AlgorithmMismatch(alg));
        }
        URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| AuthError::MalformedToken(format!("payload: {e}")))?;

        decode::<ClaimSet>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => AuthError::SignatureMismatch,
                // header and payload already decoded, so this is the signature segment
                ErrorKind::Base64(_) => AuthError::SignatureMismatch,
                ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName | ErrorKind::MissingAlgorithm => {
                    AuthError::AlgorithmMismatch(alg.clone())
                }
                _ => AuthError::MalformedToken(e.to_string()),
            })
    }
}

fn declared_algorithm(segment: &str) -> Result<String, AuthError> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::MalformedToken(format!("header: {e}")))?;
    let header: DeclaredHeader =
        serde_json::from_slice(&raw).map_err(|e| AuthError::MalformedToken(format!("header: {e}")))?;
    Ok(header.alg)
}
