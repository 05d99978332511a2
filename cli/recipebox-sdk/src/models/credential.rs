//! Locally issued bearer credentials.
//!
//! A credential has the shape `header.payload.signature`. Header and payload
//! are base64 encoded JSON, the signature is a fixed placeholder. Nothing here
//! is a security boundary: the catalog does not verify these credentials and
//! anyone holding the data directory can mint new ones.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use jsonwebtoken::Header;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Lifetime of every issued credential, in seconds.
pub const CREDENTIAL_LIFETIME_SECS: i64 = 3600;

const PLACEHOLDER_SIGNATURE: &[u8] = b"signature";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential does not have three segments")]
    Malformed,
    #[error("credential segment is not valid base64")]
    Base64(#[source] base64::DecodeError),
    #[error("credential segment is not valid JSON")]
    Json(#[source] serde_json::Error),
}

/// The decoded payload of a credential.
///
/// Apart from `exp` the payload is free-form. Session credentials carry the
/// profile fields plus `sub`, refresh credentials carry `username` and
/// `type: "refresh"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry in seconds since the epoch.
    pub exp: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Claims {
    fn string_field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn sub(&self) -> Option<&str> {
        self.string_field("sub")
    }

    pub fn username(&self) -> Option<&str> {
        self.string_field("username")
    }

    /// The user this credential was issued for.
    ///
    /// Prefers the `username` claim and falls back to `sub`.
    pub fn subject(&self) -> Option<&str> {
        self.username().or_else(|| self.sub())
    }

    /// Whether the credential is still valid at `now`.
    ///
    /// Compared at millisecond precision.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.exp.saturating_mul(1000) > now.timestamp_millis()
    }
}

/// Issue a credential for `fields`, expiring one hour after `now`.
pub fn issue(fields: Map<String, Value>, now: DateTime<Utc>) -> String {
    let claims = Claims {
        exp: now.timestamp() + CREDENTIAL_LIFETIME_SECS,
        fields,
    };
    encode(&Header::default(), &claims)
}

fn encode(header: &Header, claims: &Claims) -> String {
    // Serializing maps of JSON values and a derived header cannot fail.
    let header = serde_json::to_vec(header).unwrap_or_default();
    let payload = serde_json::to_vec(claims).unwrap_or_default();
    format!(
        "{}.{}.{}",
        STANDARD.encode(header),
        STANDARD.encode(payload),
        STANDARD.encode(PLACEHOLDER_SIGNATURE)
    )
}

/// Decode the payload of a credential.
///
/// The header has to decode as well, the signature is not checked.
pub fn decode(credential: &str) -> Result<Claims, CredentialError> {
    let mut segments = credential.split('.');
    let (Some(header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(CredentialError::Malformed);
    };

    let header = STANDARD.decode(header).map_err(CredentialError::Base64)?;
    let _: Header = serde_json::from_slice(&header).map_err(CredentialError::Json)?;

    let payload = STANDARD.decode(payload).map_err(CredentialError::Base64)?;
    serde_json::from_slice(&payload).map_err(CredentialError::Json)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn issued_credential_decodes() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let credential = issue(fields(json!({ "username": "ada", "sub": "ada" })), now);

        assert_eq!(credential.split('.').count(), 3);
        assert!(credential.ends_with(&STANDARD.encode("signature")));

        let claims = decode(&credential).unwrap();
        assert_eq!(claims.exp, 1_700_000_000 + CREDENTIAL_LIFETIME_SECS);
        assert_eq!(claims.subject(), Some("ada"));
    }

    #[test]
    fn header_is_hs256_jwt() {
        let credential = issue(Map::new(), Utc::now());
        let header = credential.split('.').next().unwrap();
        let header: Value = serde_json::from_slice(&STANDARD.decode(header).unwrap()).unwrap();

        assert_eq!(header["alg"], json!("HS256"));
        assert_eq!(header["typ"], json!("JWT"));
    }

    #[test]
    fn validity_is_checked_in_milliseconds() {
        let claims = Claims {
            exp: 1_000,
            fields: Map::new(),
        };
        let just_before = Utc.timestamp_millis_opt(999_999).unwrap();
        let at_expiry = Utc.timestamp_millis_opt(1_000_000).unwrap();

        assert!(claims.is_valid_at(just_before));
        assert!(!claims.is_valid_at(at_expiry));
    }

    #[test]
    fn subject_falls_back_to_sub() {
        let claims = Claims {
            exp: 0,
            fields: fields(json!({ "sub": "grace" })),
        };
        assert_eq!(claims.subject(), Some("grace"));

        let claims = Claims {
            exp: 0,
            fields: fields(json!({ "username": "", "sub": "grace" })),
        };
        assert_eq!(claims.subject(), Some("grace"));
    }

    #[test]
    fn malformed_credentials_are_rejected() {
        assert!(matches!(decode(""), Err(CredentialError::Malformed)));
        assert!(matches!(decode("a.b"), Err(CredentialError::Malformed)));
        assert!(matches!(decode("a.b.c.d"), Err(CredentialError::Malformed)));
        assert!(matches!(
            decode("!!!.e30=.c2lnbmF0dXJl"),
            Err(CredentialError::Base64(_))
        ));

        // valid header, payload without `exp`
        let header = STANDARD.encode(serde_json::to_vec(&Header::default()).unwrap());
        let payload = STANDARD.encode(br#"{"sub":"ada"}"#);
        assert!(matches!(
            decode(&format!("{header}.{payload}.c2lnbmF0dXJl")),
            Err(CredentialError::Json(_))
        ));
    }
}
