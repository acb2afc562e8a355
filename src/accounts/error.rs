use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::accounts::{repo::StoreError, tokens::TokenError};

/// Every way an account action can fail, as seen by API clients.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Invalid or corrupted token.")]
    Malformed,
    #[error("{0}")]
    InvalidBody(String),
    #[error("Token has expired.")]
    Expired,
    #[error("No user matches the given credentials.")]
    UserNotFound,
    #[error("Your account is already verified.")]
    AlreadyVerified,
    #[error("Passwords didn't match.")]
    PasswordMismatch,
    #[error("{}", .0.join(" "))]
    WeakPassword(Vec<String>),
    #[error("Invalid email address.")]
    InvalidEmail,
    #[error("Email already registered.")]
    EmailTaken,
    #[error("Old password is incorrect.")]
    IncorrectPassword,
    #[error("Unable to log in with provided credentials.")]
    InvalidCredentials,
    #[error("{0}")]
    Unauthenticated(&'static str),
    #[error("Please verify your account to access this page.")]
    NotVerified,
    #[error("Already logged in.")]
    AlreadyAuthenticated,
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub detail: String,
}

impl AccountError {
    pub fn kind(&self) -> &'static str {
        match self {
            AccountError::Malformed => "malformed",
            AccountError::InvalidBody(_) => "invalid_body",
            AccountError::Expired => "expired",
            AccountError::UserNotFound => "user_not_found",
            AccountError::AlreadyVerified => "already_verified",
            AccountError::PasswordMismatch => "password_mismatch",
            AccountError::WeakPassword(_) => "weak_password",
            AccountError::InvalidEmail => "invalid_email",
            AccountError::EmailTaken => "email_taken",
            AccountError::IncorrectPassword => "incorrect_password",
            AccountError::InvalidCredentials => "invalid_credentials",
            AccountError::Unauthenticated(_) => "unauthenticated",
            AccountError::NotVerified => "not_verified",
            AccountError::AlreadyAuthenticated => "already_authenticated",
            AccountError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AccountError::Malformed
            | AccountError::InvalidBody(_)
            | AccountError::Expired
            | AccountError::UserNotFound
            | AccountError::AlreadyVerified
            | AccountError::PasswordMismatch
            | AccountError::WeakPassword(_)
            | AccountError::InvalidEmail
            | AccountError::IncorrectPassword => StatusCode::BAD_REQUEST,
            AccountError::EmailTaken => StatusCode::CONFLICT,
            AccountError::InvalidCredentials | AccountError::Unauthenticated(_) => {
                StatusCode::UNAUTHORIZED
            }
            AccountError::NotVerified | AccountError::AlreadyAuthenticated => {
                StatusCode::FORBIDDEN
            }
            AccountError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TokenError> for AccountError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AccountError::Expired,
            TokenError::Malformed => AccountError::Malformed,
            TokenError::Signing(msg) => AccountError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate => AccountError::EmailTaken,
            StoreError::Backend(e) => AccountError::Internal(e),
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        if let AccountError::Internal(e) = &self {
            error!(error = %e, "account action failed");
        }
        let body = ErrorBody {
            kind: self.kind(),
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
