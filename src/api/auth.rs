//! Account lifecycle endpoints and the authorization gate.
//!
//! The session credential travels either as a `Bearer` header or as the
//! HTTP-only `token` cookie set at login. The [`AuthUser`] extractor is the
//! gate for identity-scoped routes; [`MaybeAuthUser`] is its optional variant
//! for public routes that behave differently for signed-in callers.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::api::error::{ApiError, ApiResult};
use crate::api::validation;
use crate::auth::{self, TokenError};
use crate::db::{users, User};
use crate::AppState;

/// Cookie under which the session token is stored.
pub const TOKEN_COOKIE: &str = "token";

/// An authenticated caller, resolved against the current user record.
pub struct AuthUser {
    pub user: User,
}

/// Optional authentication: `None` when no credential is present or it does
/// not verify. Public routes use this to apply caller-specific filters.
pub struct MaybeAuthUser(pub Option<AuthUser>);

/// Pull the session token out of the Authorization header or the cookie.
pub fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(auth_header) = parts
        .headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    parts
        .headers
        .get(axum::http::header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|raw| {
            raw.split(';')
                .filter_map(|pair| Cookie::parse(pair.trim()).ok())
                .find(|c| c.name() == TOKEN_COOKIE)
                .map(|c| c.value().to_string())
        })
}

/// Verify a token and resolve the user it references.
pub async fn resolve_token(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = auth::verify_session_token(&state.config.auth.jwt_secret, token).map_err(|e| {
        match e {
            TokenError::Expired => ApiError::unauthorized("Token expired"),
            TokenError::Invalid => ApiError::unauthorized("Invalid token"),
        }
    })?;

    users::find_by_id(&state.db, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Unauthorized"))
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts).ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;
        let user = resolve_token(state, &token).await?;
        Ok(AuthUser { user })
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeAuthUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth = match extract_token(parts) {
            Some(token) => resolve_token(state, &token)
                .await
                .ok()
                .map(|user| AuthUser { user }),
            None => None,
        };
        Ok(MaybeAuthUser(auth))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "desc")]
    pub description: Option<String>,
}

/// Presence checks run in a fixed order so the first missing field names the
/// error.
fn validate_signup(request: &SignupRequest) -> Result<(), ApiError> {
    let required = [
        (request.email.as_deref(), "Email is missing"),
        (request.password.as_deref(), "Password is missing"),
        (request.first_name.as_deref(), "First name is missing"),
        (request.last_name.as_deref(), "Last name is missing"),
        (request.phone.as_deref(), "Phone is missing"),
        (request.city.as_deref(), "City is missing"),
        (request.state.as_deref(), "State is missing"),
    ];
    for (value, message) in required {
        if !validation::non_empty(value) {
            return Err(ApiError::bad_request(message));
        }
    }
    Ok(())
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_signup(&request)?;

    let email = request.email.as_deref().unwrap_or_default().trim().to_string();
    let password = request.password.as_deref().unwrap_or_default();

    if !validation::is_valid_email(&email) {
        return Err(ApiError::bad_request("Invalid email format"));
    }
    validation::validate_password(password, state.config.auth.min_password_len)
        .map_err(ApiError::bad_request)?;

    if users::find_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::conflict("User already exists"));
    }

    let password_hash = auth::hash_password(password)
        .map_err(|e| ApiError::internal(format!("Password hashing failed: {e}")))?;

    let user = users::create(
        &state.db,
        users::NewUser {
            email: email.clone(),
            password_hash,
            first_name: request.first_name.unwrap_or_default(),
            last_name: request.last_name.unwrap_or_default(),
            phone: request.phone.unwrap_or_default(),
            city: request.city.unwrap_or_default(),
            state: request.state.unwrap_or_default(),
            description: request.description,
        },
    )
    .await?;

    // The token here only builds the verification link; it is not returned.
    let token = auth::issue_session_token(
        &state.config.auth.jwt_secret,
        &user.id,
        false,
        state.config.auth.token_ttl_hours,
    )
    .map_err(|e| ApiError::internal(format!("Token issuance failed: {e}")))?;
    let verify_url = format!(
        "{}/auth/verify/{token}",
        state.config.server.public_url.trim_end_matches('/')
    );

    if let Err(e) = state
        .mailer
        .send_verification_email(&user.email, &user.first_name, &verify_url)
        .await
    {
        error!("Failed to send verification email to {}: {:#}", user.email, e);
    }

    info!("New user registered: {}", user.email);
    Ok((
        StatusCode::CREATED,
        "User registered. Please check your email to verify your account.",
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    // Same message for unknown email and bad password.
    let user = users::find_by_email(&state.db, &request.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !auth::verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }
    if !user.is_verified {
        return Err(ApiError::forbidden("Please verify your email to login"));
    }

    let token = auth::issue_session_token(
        &state.config.auth.jwt_secret,
        &user.id,
        true,
        state.config.auth.token_ttl_hours,
    )
    .map_err(|e| ApiError::internal(format!("Token issuance failed: {e}")))?;

    let cookie = Cookie::build((TOKEN_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .build();

    info!("User logged in: {}", user.email);
    Ok((jar.add(cookie), Json(LoginResponse { token })))
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build((TOKEN_COOKIE, "")).path("/").build());
    (
        jar,
        Json(json!({"success": true, "data": "User logged out successfully"})),
    )
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let claims = auth::verify_session_token(&state.config.auth.jwt_secret, &token)
        .map_err(|_| ApiError::bad_request("Invalid or expired verification link"))?;

    let user = users::find_by_id(&state.db, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.is_verified {
        return Err(ApiError::bad_request("Email already verified"));
    }

    users::set_verified(&state.db, &user.id).await?;
    info!("Email verified: {}", user.email);
    Ok("Email verified successfully")
}

#[derive(Deserialize)]
pub struct ForgetPasswordRequest {
    pub email: String,
}

pub async fn forget_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ForgetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = users::find_by_email(&state.db, &request.email)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let secret = auth::issue_reset_secret();
    users::set_reset_secret(
        &state.db,
        &user.id,
        &secret.digest,
        &secret.expiry.to_rfc3339(),
    )
    .await?;

    let reset_url = format!(
        "{}/auth/password-reset/{}",
        state.config.server.public_url.trim_end_matches('/'),
        secret.plaintext
    );

    if let Err(e) = state
        .mailer
        .send_password_reset_email(&user.email, &user.first_name, &reset_url)
        .await
    {
        // A secret the user never received must not stay usable.
        error!("Failed to send reset email to {}: {:#}", user.email, e);
        users::clear_reset_secret(&state.db, &user.id).await?;
        return Err(ApiError::internal("Failed to send reset email"));
    }

    Ok(Json(json!({"message": "Reset token sent to email"})))
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(reset_token): Path<String>,
    Json(request): Json<ResetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let digest = auth::digest_reset_secret(&reset_token);
    let user = users::find_by_reset_digest(&state.db, &digest)
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid or expired reset token"))?;

    validation::validate_password(&request.password, state.config.auth.min_password_len)
        .map_err(ApiError::bad_request)?;

    let password_hash = auth::hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Password hashing failed: {e}")))?;
    users::set_password(&state.db, &user.id, &password_hash).await?;

    info!("Password reset for {}", user.email);
    Ok(Json(json!({"message": "Password successfully updated"})))
}
