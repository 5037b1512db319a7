//! Session token claims.
//!
//! Tokens are JWT-shaped: three dot-separated segments with a base64
//! JSON payload in the middle. Only the `exp` and `rol` claims are
//! consulted, and only locally; nothing here calls the identity service.
//! Claims are decoded fresh at every check and never cached.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClaimsError {
    #[error("invalid token format: expected three dot-separated segments")]
    InvalidFormat,

    #[error("token has no expiry claim")]
    MissingExpiry,

    #[error("token role '{0}' is not permitted; generate a new app token with DOMAIN_ADMIN or WORKSPACE_OWNER role")]
    InvalidRole(String),
}

/// Decoded token payload. Transient only; never persisted.
#[derive(Debug, Clone)]
pub struct TokenClaims {
    /// Expiry as unix seconds
    pub expiry: i64,
    /// Role claim, absent on some token kinds
    pub role: Option<String>,
}

/// Roles an app token may carry
const PERMITTED_ROLES: [&str; 2] = ["DOMAIN_ADMIN", "WORKSPACE_OWNER"];

#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    exp: Option<serde_json::Value>,
    #[serde(default)]
    rol: Option<String>,
}

impl TokenClaims {
    /// Decode a token's payload segment without verifying its signature
    pub fn decode(token: &str) -> Result<Self, ClaimsError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(ClaimsError::InvalidFormat);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|_| ClaimsError::InvalidFormat)?;
        let raw: RawClaims =
            serde_json::from_slice(&payload).map_err(|_| ClaimsError::InvalidFormat)?;

        // exp arrives as an integer or a float depending on the issuer
        let expiry = raw
            .exp
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .ok_or(ClaimsError::MissingExpiry)?;

        Ok(Self {
            expiry,
            role: raw.rol,
        })
    }

    /// True iff the current time is strictly after the expiry
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.expiry
    }

    /// App-tier flows require a DOMAIN_ADMIN or WORKSPACE_OWNER role.
    /// Failure is non-fatal; the message tells the user to regenerate.
    pub fn check_role(&self) -> Result<(), ClaimsError> {
        match self.role.as_deref() {
            Some(role) if PERMITTED_ROLES.contains(&role) => Ok(()),
            Some(role) => Err(ClaimsError::InvalidRole(role.to_string())),
            None => Err(ClaimsError::InvalidRole("<none>".to_string())),
        }
    }
}

/// A malformed token is treated as expired, forcing a re-prompt
pub fn token_expired(token: &str) -> bool {
    match TokenClaims::decode(token) {
        Ok(claims) => claims.is_expired(),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn make_token(exp: i64, rol: Option<&str>) -> String {
        let payload = match rol {
            Some(rol) => serde_json::json!({ "exp": exp, "rol": rol }),
            None => serde_json::json!({ "exp": exp }),
        };
        let encoded = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("header.{}.signature", encoded)
    }

    #[test]
    fn test_decode_requires_three_segments() {
        assert!(matches!(
            TokenClaims::decode("only.two"),
            Err(ClaimsError::InvalidFormat)
        ));
        assert!(matches!(
            TokenClaims::decode("not-a-token"),
            Err(ClaimsError::InvalidFormat)
        ));
        assert!(matches!(
            TokenClaims::decode("a.b.c.d"),
            Err(ClaimsError::InvalidFormat)
        ));
    }

    #[test]
    fn test_expiry_boundaries() {
        let now = Utc::now().timestamp();

        let expired = TokenClaims::decode(&make_token(now - 1, None)).unwrap();
        assert!(expired.is_expired());

        let valid = TokenClaims::decode(&make_token(now + 3600, None)).unwrap();
        assert!(!valid.is_expired());
    }

    #[test]
    fn test_missing_expiry_claim() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"rol":"DOMAIN_ADMIN"}"#);
        let token = format!("h.{}.s", payload);
        assert!(matches!(
            TokenClaims::decode(&token),
            Err(ClaimsError::MissingExpiry)
        ));
    }

    #[test]
    fn test_float_expiry_is_accepted() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"exp":4102444800.0}"#);
        let token = format!("h.{}.s", payload);
        let claims = TokenClaims::decode(&token).unwrap();
        assert_eq!(claims.expiry, 4102444800);
    }

    #[test]
    fn test_role_check() {
        let now = Utc::now().timestamp();

        let admin = TokenClaims::decode(&make_token(now + 60, Some("DOMAIN_ADMIN"))).unwrap();
        assert!(admin.check_role().is_ok());

        let owner = TokenClaims::decode(&make_token(now + 60, Some("WORKSPACE_OWNER"))).unwrap();
        assert!(owner.check_role().is_ok());

        let member = TokenClaims::decode(&make_token(now + 60, Some("WORKSPACE_MEMBER"))).unwrap();
        assert!(matches!(
            member.check_role(),
            Err(ClaimsError::InvalidRole(_))
        ));

        let unroled = TokenClaims::decode(&make_token(now + 60, None)).unwrap();
        assert!(unroled.check_role().is_err());
    }

    #[test]
    fn test_malformed_token_counts_as_expired() {
        assert!(token_expired("garbage"));
        assert!(token_expired("a.!!!.c"));

        let now = Utc::now().timestamp();
        assert!(!token_expired(&make_token(now + 3600, None)));
        assert!(token_expired(&make_token(now - 1, None)));
    }
}
