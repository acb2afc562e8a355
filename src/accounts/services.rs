use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    accounts::{
        claims::TokenKind,
        dto::{ChangePasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest},
        error::AccountError,
        password::{hash_password, password_problems, verify_password},
        repo_types::{Profile, User},
        tokens::TokenCodec,
    },
    notify::{MailContext, Template},
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn ensure_confirmed(password: &str, confirmation: &str) -> Result<(), AccountError> {
    if password != confirmation {
        return Err(AccountError::PasswordMismatch);
    }
    Ok(())
}

fn ensure_strong(password: &str, email: &str) -> Result<(), AccountError> {
    let problems = password_problems(password, email);
    if !problems.is_empty() {
        warn!(reasons = ?problems, "weak password rejected");
        return Err(AccountError::WeakPassword(problems));
    }
    Ok(())
}

fn dispatch(state: &AppState, template: Template, user: &User, token: String) {
    state.notifier.send(
        template,
        MailContext {
            email: user.email.clone(),
            token,
        },
        &user.email,
    );
}

/// Creates the user and profile, then mails a verification link.
#[instrument(skip(state, req), fields(email = %req.email))]
pub async fn signup(state: &AppState, req: SignupRequest) -> Result<(User, Profile), AccountError> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AccountError::InvalidEmail);
    }
    ensure_confirmed(&req.password, &req.confirmation)?;
    ensure_strong(&req.password, &email)?;

    if state.store.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AccountError::EmailTaken);
    }

    let hash = hash_password(&req.password).map_err(AccountError::Internal)?;
    let (user, profile) = state.store.create_account(&email, &hash).await?;

    let token = TokenCodec::from_ref(state).issue(&user, TokenKind::VerifyEmail)?;
    dispatch(state, Template::EmailVerification, &user, token);

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((user, profile))
}

#[instrument(skip_all)]
pub async fn verify_email(state: &AppState, token: &str) -> Result<User, AccountError> {
    let user_id = TokenCodec::from_ref(state).user_id(token, TokenKind::VerifyEmail)?;

    let mut user = state
        .store
        .find_by_id(user_id)
        .await?
        .ok_or(AccountError::UserNotFound)?;
    if user.is_verified {
        warn!(%user_id, "already verified");
        return Err(AccountError::AlreadyVerified);
    }

    // conditional write; a concurrent verification may have won
    if !state.store.mark_verified(user_id).await? {
        warn!(%user_id, "verification lost a race");
        return Err(AccountError::AlreadyVerified);
    }
    user.is_verified = true;

    info!(%user_id, "email verified");
    Ok(user)
}

#[instrument(skip(state))]
pub async fn resend_verification(state: &AppState, email: &str) -> Result<(), AccountError> {
    let email = normalize_email(email);
    let user = state
        .store
        .find_by_email(&email)
        .await?
        .ok_or(AccountError::UserNotFound)?;
    if user.is_verified {
        return Err(AccountError::AlreadyVerified);
    }

    let token = TokenCodec::from_ref(state).issue(&user, TokenKind::VerifyEmail)?;
    dispatch(state, Template::EmailVerification, &user, token);
    info!(user_id = %user.id, "verification email re-sent");
    Ok(())
}

#[instrument(skip(state))]
pub async fn request_password_reset(state: &AppState, email: &str) -> Result<(), AccountError> {
    let email = normalize_email(email);
    let Some(user) = state.store.find_by_email(&email).await? else {
        warn!(%email, "password reset for unknown email");
        if state.config.reveal_unknown_email {
            return Err(AccountError::UserNotFound);
        }
        return Ok(());
    };

    let token = TokenCodec::from_ref(state).issue(&user, TokenKind::PasswordReset)?;
    dispatch(state, Template::PasswordReset, &user, token);
    info!(user_id = %user.id, "password reset email sent");
    Ok(())
}

/// Sets a new password from a reset token. Nothing is written unless every
/// check passes.
#[instrument(skip_all)]
pub async fn complete_password_reset(
    state: &AppState,
    token: &str,
    req: ResetPasswordRequest,
) -> Result<User, AccountError> {
    ensure_confirmed(&req.new_password, &req.confirmation)?;

    let user_id = TokenCodec::from_ref(state).user_id(token, TokenKind::PasswordReset)?;
    let user = state
        .store
        .find_by_id(user_id)
        .await?
        .ok_or(AccountError::UserNotFound)?;
    ensure_strong(&req.new_password, &user.email)?;

    let hash = hash_password(&req.new_password).map_err(AccountError::Internal)?;
    let user = state
        .store
        .set_password(user.id, &hash)
        .await?
        .ok_or(AccountError::UserNotFound)?;

    info!(%user_id, session_version = user.session_version, "password reset");
    Ok(user)
}

#[instrument(skip(state, req), fields(email = %req.email))]
pub async fn login(state: &AppState, req: LoginRequest) -> Result<(User, String), AccountError> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(AccountError::InvalidEmail);
    }

    let Some(user) = state.store.find_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(AccountError::InvalidCredentials);
    };
    let ok = verify_password(&req.password, &user.password_hash).map_err(AccountError::Internal)?;
    if !ok || !user.is_active {
        warn!(user_id = %user.id, "login rejected");
        return Err(AccountError::InvalidCredentials);
    }

    let token = TokenCodec::from_ref(state).issue(&user, TokenKind::Access)?;
    info!(user_id = %user.id, "user logged in");
    Ok((user, token))
}

/// Ends every session of the user, including the one making the call.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn logout(state: &AppState, user: &User) -> Result<(), AccountError> {
    let updated = state
        .store
        .bump_session(user.id)
        .await?
        .ok_or(AccountError::UserNotFound)?;
    info!(session_version = updated.session_version, "user logged out");
    Ok(())
}

/// Changes the password of a signed-in user and returns a fresh access token
/// for the caller; every other session is invalidated.
#[instrument(skip(state, user, req), fields(user_id = %user.id))]
pub async fn change_password(
    state: &AppState,
    user: &User,
    req: ChangePasswordRequest,
) -> Result<String, AccountError> {
    ensure_confirmed(&req.new_password, &req.confirmation)?;
    if !verify_password(&req.old_password, &user.password_hash).map_err(AccountError::Internal)? {
        return Err(AccountError::IncorrectPassword);
    }
    ensure_strong(&req.new_password, &user.email)?;

    let hash = hash_password(&req.new_password).map_err(AccountError::Internal)?;
    let updated = state
        .store
        .set_password(user.id, &hash)
        .await?
        .ok_or(AccountError::UserNotFound)?;

    let token = TokenCodec::from_ref(state).issue(&updated, TokenKind::Access)?;
    info!(user_id = %user.id, "password changed");
    Ok(token)
}
