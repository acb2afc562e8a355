use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{
    accounts::{
        claims::{Claims, TokenKind},
        repo_types::User,
    },
    config::JwtConfig,
    state::AppState,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token is invalid")]
    Malformed,
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Signs and verifies every token the service hands out.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    action_ttl: Duration,
}

impl FromRef<AppState> for TokenCodec {
    fn from_ref(state: &AppState) -> Self {
        TokenCodec::new(&state.config.jwt)
    }
}

impl TokenCodec {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
            action_ttl: Duration::from_secs((cfg.action_ttl_minutes.max(0) as u64) * 60),
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::VerifyEmail | TokenKind::PasswordReset => self.action_ttl,
        }
    }

    pub(crate) fn issue_at(
        &self,
        user: &User,
        kind: TokenKind,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let exp = now + TimeDuration::seconds(self.ttl(kind).as_secs() as i64);
        let claims = Claims {
            sub: user.id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            sv: user.session_version,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(user_id = %user.id, kind = ?kind, "token issued");
        Ok(token)
    }

    pub fn issue(&self, user: &User, kind: TokenKind) -> Result<String, TokenError> {
        self.issue_at(user, kind, OffsetDateTime::now_utc())
    }

    /// Verifies signature, expiry, issuer, audience and purpose.
    pub fn decode(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            }
        })?;

        if data.claims.kind != kind {
            debug!(expected = ?kind, got = ?data.claims.kind, "token kind mismatch");
            return Err(TokenError::Malformed);
        }
        Ok(data.claims)
    }

    pub fn user_id(&self, token: &str, kind: TokenKind) -> Result<Uuid, TokenError> {
        self.decode(token, kind).map(|c| c.sub)
    }
}
