//! User profile endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::api::auth::AuthUser;
use crate::api::error::{ApiError, ApiResult};
use crate::db::{users, UserResponse};
use crate::AppState;

const UPDATABLE_FIELDS: [&str; 4] = ["city", "state", "phone", "desc"];

pub async fn me(auth: AuthUser) -> Json<serde_json::Value> {
    Json(json!({"success": true, "data": UserResponse::from(auth.user)}))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let user = users::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(json!({"success": true, "data": UserResponse::from(user)})))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> ApiResult<Json<serde_json::Value>> {
    if auth.user.id != id {
        return Err(ApiError::forbidden(
            "You are not authorized to update this user",
        ));
    }

    let only_updatable = body.keys().all(|k| UPDATABLE_FIELDS.contains(&k.as_str()));
    if body.is_empty() || !only_updatable {
        return Err(ApiError::bad_request(
            "Only city, state, phone and desc fields are allowed to be updated",
        ));
    }

    let field = |name: &str| {
        body.get(name)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };
    let update = users::ProfileUpdate {
        city: field("city"),
        state: field("state"),
        phone: field("phone"),
        description: field("desc"),
    };

    let user = users::update_profile(&state.db, &id, &update).await?;
    Ok(Json(json!({"success": true, "data": UserResponse::from(user)})))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if auth.user.id != id {
        return Err(ApiError::forbidden(
            "You are not authorized to delete this user",
        ));
    }

    users::delete(&state.db, &id).await?;
    info!("User deleted: {}", auth.user.email);
    Ok(Json(json!({"success": true, "data": "User deleted successfully"})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updatable_field_set_matches_contract() {
        for field in ["city", "state", "phone", "desc"] {
            assert!(UPDATABLE_FIELDS.contains(&field));
        }
        assert!(!UPDATABLE_FIELDS.contains(&"email"));
        assert!(!UPDATABLE_FIELDS.contains(&"userType"));
    }
}
