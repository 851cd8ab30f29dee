use std::time::Duration;

use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{extract::FromRef, http::HeaderMap};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, info};
use uuid::Uuid;

pub use crate::auth::claims::Claims;
use crate::{auth::repo::UserStore, config::JwtConfig, state::AppState};

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// A stored hash that does not parse compares as a mismatch.
pub fn compare_password(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "argon2 parse hash error");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// Signing and verification keys with issuer/audience settings.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
        }
    }

    pub fn issue_token(&self, user_id: Uuid, username: &str) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    /// Checks signature, expiry, issuer and audience.
    pub fn verify_token(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => {
                debug!(user_id = %data.claims.sub, "jwt verified");
                Some(data.claims)
            }
            Err(e) => {
                debug!(error = %e, "jwt rejected");
                None
            }
        }
    }

    /// Resolves the caller from an `Authorization: Bearer <token>` header.
    /// A missing header, another scheme and a bad token all yield `None`.
    pub fn authenticate(&self, headers: &HeaderMap) -> Option<Claims> {
        let token = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))?;
        self.verify_token(token.trim())
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

/// Creates the first account when no users exist yet.
pub async fn ensure_admin(
    users: &dyn UserStore,
    username: &str,
    password: &str,
) -> anyhow::Result<bool> {
    if users.count().await? > 0 {
        return Ok(false);
    }
    anyhow::ensure!(
        password.chars().count() >= MIN_PASSWORD_LEN,
        "admin password must be at least {} characters",
        MIN_PASSWORD_LEN
    );
    let hash = hash_password(password)?;
    let created = users.create(username.trim(), &hash).await?;
    if let Some(user) = &created {
        info!(user_id = %user.id, username = %user.username, "seeded admin account");
    }
    Ok(created.is_some())
}


#[cfg(test)]
mod jwt_tests {
    use super::*;
    use axum::http::{header::AUTHORIZATION, HeaderValue};

    fn keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 60 * 24 * 7,
        })
    }

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn issue_and_verify_token() {
        let keys = keys("dev-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let token = keys.issue_token(user_id, "operator").expect("issue");
        let claims = keys.verify_token(&token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.username, "operator");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_secret() {
        let good = keys("same-secret", "good-iss", "good-aud");
        let other_iss = keys("same-secret", "bad-iss", "good-aud");
        let other_secret = keys("other-secret", "good-iss", "good-aud");
        let token = good.issue_token(Uuid::new_v4(), "a").unwrap();
        assert!(other_iss.verify_token(&token).is_none());
        assert!(other_secret.verify_token(&token).is_none());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let keys = keys("dev-secret", "iss", "aud");
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let claims = Claims {
            sub: Uuid::new_v4(),
            username: "late".into(),
            iat: now - 7200,
            exp: now - 3600,
            iss: "iss".into(),
            aud: "aud".into(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"dev-secret"),
        )
        .unwrap();
        assert!(keys.verify_token(&token).is_none());
    }

    #[test]
    fn authenticate_treats_missing_and_malformed_headers_alike() {
        let keys = keys("dev-secret", "iss", "aud");
        let token = keys.issue_token(Uuid::new_v4(), "cam").unwrap();

        assert!(keys.authenticate(&HeaderMap::new()).is_none());
        assert!(keys.authenticate(&bearer(&format!("Token {}", token))).is_none());
        assert!(keys.authenticate(&bearer("Bearer garbage.token.value")).is_none());

        let claims = keys.authenticate(&bearer(&format!("Bearer {}", token)));
        assert_eq!(claims.map(|c| c.username), Some("cam".to_string()));
    }
}
