use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::{Claims, Identity};
use crate::{config::JwtConfig, state::AppState};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to sign token")]
    Sign(#[source] jsonwebtoken::errors::Error),
    /// Bad signature, malformed, wrong issuer/audience and expired all land here.
    #[error("invalid token")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs(cfg.ttl_seconds.max(0) as u64),
        }
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, TokenError> {
        self.issue_at(identity, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(
        &self,
        identity: &Identity,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            user: identity.clone(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding).map_err(TokenError::Sign)?;
        debug!(user_id = identity.id, role = %identity.role, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(TokenError::Invalid)?;
        debug!(user_id = data.claims.user.id, "jwt verified");
        Ok(data.claims.user)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::Role;

    fn make_keys(secret: &str, issuer: &str, audience: &str, ttl_seconds: i64) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_seconds,
        })
    }

    fn alice() -> Identity {
        Identity {
            id: 1,
            username: "alice".into(),
            role: Role::User,
        }
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud", 300);
        let token = keys.issue(&alice()).expect("issue");
        let identity = keys.verify(&token).expect("verify");
        assert_eq!(identity, alice());
    }

    #[test]
    fn expired_token_is_invalid() {
        let keys = make_keys("dev-secret", "iss", "aud", 60);
        let issued = OffsetDateTime::now_utc() - TimeDuration::seconds(61);
        let token = keys.issue_at(&alice(), issued).expect("issue");
        assert!(matches!(keys.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn token_just_inside_lifetime_is_valid() {
        let keys = make_keys("dev-secret", "iss", "aud", 60);
        let issued = OffsetDateTime::now_utc() - TimeDuration::seconds(30);
        let token = keys.issue_at(&alice(), issued).expect("issue");
        assert!(keys.verify(&token).is_ok());
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let good = make_keys("secret-one", "iss", "aud", 300);
        let bad = make_keys("secret-two", "iss", "aud", 300);
        let token = good.issue(&alice()).expect("issue");
        assert!(matches!(bad.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn wrong_issuer_or_audience_is_invalid() {
        let good = make_keys("same-secret", "good-iss", "good-aud", 300);
        let bad = make_keys("same-secret", "bad-iss", "bad-aud", 300);
        let token = good.issue(&alice()).expect("issue");
        assert!(bad.verify(&token).is_err());
    }

    #[test]
    fn garbage_is_invalid() {
        let keys = make_keys("dev-secret", "iss", "aud", 300);
        assert!(matches!(keys.verify("not.a.jwt"), Err(TokenError::Invalid(_))));
        assert!(matches!(keys.verify(""), Err(TokenError::Invalid(_))));
    }
}
