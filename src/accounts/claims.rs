use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a signed token may be used for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    VerifyEmail,
    PasswordReset,
}

/// JWT payload shared by access and action tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,       // user ID
    pub iat: usize,      // issued at (unix timestamp)
    pub exp: usize,      // expires at (unix timestamp)
    pub iss: String,     // issuer
    pub aud: String,     // audience
    pub kind: TokenKind, // token purpose
    pub sv: i32,         // user session version at issue time
}
