use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRef, FromRequest, FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::{claims::TokenKind, error::AccountError, repo_types::User, tokens::TokenCodec};
use crate::state::AppState;

/// `axum::Json` whose rejections answer with the account error body.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AccountError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => {
                warn!(error = %rejection, "rejected request body");
                Err(AccountError::InvalidBody(rejection.body_text()))
            }
        }
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
}

/// Resolves an access token to a live user, rejecting tokens issued before
/// the user's last password change.
async fn authenticate(state: &AppState, token: &str) -> Result<User, AccountError> {
    let claims = TokenCodec::from_ref(state)
        .decode(token, TokenKind::Access)
        .map_err(|_| {
            warn!("invalid or expired access token");
            AccountError::Unauthenticated("Invalid or expired token")
        })?;

    let user = state
        .store
        .find_by_id(claims.sub)
        .await?
        .ok_or(AccountError::Unauthenticated("User not found"))?;

    if !user.is_active {
        return Err(AccountError::Unauthenticated("User is inactive"));
    }
    if claims.sv != user.session_version {
        warn!(user_id = %user.id, "stale session");
        return Err(AccountError::Unauthenticated("Session has been invalidated"));
    }
    Ok(user)
}

/// The signed-in user behind the request's bearer token.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AccountError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer(&parts.headers)
            .ok_or(AccountError::Unauthenticated("Missing Authorization header"))?;
        authenticate(state, token).await.map(CurrentUser)
    }
}

/// Set by `require_verified` for the handlers behind it.
#[derive(Clone)]
pub struct VerifiedUser(pub User);

/// Lets the request through only for signed-in users with a verified email.
pub async fn require_verified(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AccountError> {
    let token = bearer(req.headers())
        .map(str::to_owned)
        .ok_or(AccountError::Unauthenticated("Missing Authorization header"))?;
    let user = authenticate(&state, &token).await?;
    if !user.is_verified {
        warn!(user_id = %user.id, "unverified user rejected");
        return Err(AccountError::NotVerified);
    }
    req.extensions_mut().insert(VerifiedUser(user));
    Ok(next.run(req).await)
}

/// Rejects requests that carry a valid access token.
pub async fn require_anonymous(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AccountError> {
    let token = bearer(req.headers()).map(str::to_owned);
    if let Some(token) = token {
        if let Ok(user) = authenticate(&state, &token).await {
            warn!(user_id = %user.id, "signed-in user hit an anonymous-only route");
            return Err(AccountError::AlreadyAuthenticated);
        }
    }
    Ok(next.run(req).await)
}
