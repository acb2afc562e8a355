use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Extension, Json, Router,
};
use tracing::{error, instrument};

use crate::{
    accounts::{
        dto::{
            AuthResponse, ChangePasswordRequest, Detail, EmailRequest, LoginRequest,
            ProfileResponse, PublicUser, ResetPasswordRequest, SignupRequest, SignupResponse,
            TokenResponse,
        },
        error::AccountError,
        extractors::{require_anonymous, require_verified, CurrentUser, JsonBody, VerifiedUser},
        repo_types::{Profile, ProfileChanges, User},
        services,
    },
    state::AppState,
};

/// Signup, login and password reset; closed to signed-in users.
pub fn anonymous_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/password-reset", post(request_password_reset))
        .route("/password-reset/:token", put(complete_password_reset))
        .route("/password-reset-done/:token", put(complete_password_reset))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_anonymous))
}

pub fn verification_routes() -> Router<AppState> {
    Router::new()
        .route("/verify-email/resend", post(resend_verification))
        .route("/verify-email/:token", get(verify_email))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/auth/logout", post(logout))
}

/// Profile and password change; verified users only.
pub fn verified_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).patch(update_profile))
        .route("/change-password", put(change_password))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_verified))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), AccountError> {
    let (user, _profile) = services::signup(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            email: user.email,
            detail: "Your account created successfully. Verification email is sent to your email."
                .into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, AccountError> {
    let (user, access_token) = services::login(&state, payload).await?;
    Ok(Json(AuthResponse {
        access_token,
        user: PublicUser::from(&user),
    }))
}

#[instrument(skip_all)]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Detail>, AccountError> {
    services::verify_email(&state, &token).await?;
    Ok(Json(Detail::new("Your account has been verified.")))
}

#[instrument(skip(state, payload))]
pub async fn resend_verification(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<EmailRequest>,
) -> Result<Json<Detail>, AccountError> {
    services::resend_verification(&state, &payload.email).await?;
    Ok(Json(Detail::new("Verification email is sent to your email.")))
}

#[instrument(skip(state, payload))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<EmailRequest>,
) -> Result<Json<Detail>, AccountError> {
    services::request_password_reset(&state, &payload.email).await?;
    Ok(Json(Detail::new(
        "If the address is registered, a password reset link is on its way.",
    )))
}

#[instrument(skip_all)]
pub async fn complete_password_reset(
    State(state): State<AppState>,
    Path(token): Path<String>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> Result<StatusCode, AccountError> {
    services::complete_password_reset(&state, &token, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode, AccountError> {
    services::logout(&state, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn profile_response(user: &User, profile: Profile) -> ProfileResponse {
    ProfileResponse {
        id: profile.id,
        email: user.email.clone(),
        first_name: profile.first_name,
        last_name: profile.last_name,
        image: profile.image,
        description: profile.description,
    }
}

fn missing_profile(user: &User) -> AccountError {
    error!(user_id = %user.id, "user has no profile");
    AccountError::Internal(anyhow::anyhow!("profile missing for user {}", user.id))
}

#[instrument(skip_all)]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(VerifiedUser(user)): Extension<VerifiedUser>,
) -> Result<Json<ProfileResponse>, AccountError> {
    let profile = state
        .store
        .profile(user.id)
        .await?
        .ok_or_else(|| missing_profile(&user))?;
    Ok(Json(profile_response(&user, profile)))
}

#[instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(VerifiedUser(user)): Extension<VerifiedUser>,
    JsonBody(changes): JsonBody<ProfileChanges>,
) -> Result<Json<ProfileResponse>, AccountError> {
    let profile = state
        .store
        .update_profile(user.id, &changes)
        .await?
        .ok_or_else(|| missing_profile(&user))?;
    Ok(Json(profile_response(&user, profile)))
}

#[instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(VerifiedUser(user)): Extension<VerifiedUser>,
    JsonBody(payload): JsonBody<ChangePasswordRequest>,
) -> Result<Json<TokenResponse>, AccountError> {
    let access_token = services::change_password(&state, &user, payload).await?;
    Ok(Json(TokenResponse { access_token }))
}
