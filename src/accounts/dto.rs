use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounts::repo_types::User;

/// Request body for signup.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub confirmation: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub email: String,
    pub detail: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Used by resend-verification and password-reset requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password: String,
    pub confirmation: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirmation: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Detail {
    pub detail: String,
}

impl Detail {
    pub fn new(msg: &str) -> Self {
        Self {
            detail: msg.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub is_verified: bool,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            is_verified: u.is_verified,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image: String,
    pub description: Option<String>,
}
