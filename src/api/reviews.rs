//! Review endpoints. The aggregate bookkeeping lives in the stores; handlers
//! only enforce input and authorship rules.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::error::{ApiError, ApiResult};
use crate::api::validation;
use crate::db::{products, reviews};
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub product_id: Option<String>,
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<CreateReviewRequest>,
) -> ApiResult<impl IntoResponse> {
    let product_id = request
        .product_id
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Product id is missing"))?;
    let rating = request
        .rating
        .ok_or_else(|| ApiError::bad_request("Rating is missing"))?;
    let comment = request
        .comment
        .filter(|v| validation::non_empty(Some(v)))
        .ok_or_else(|| ApiError::bad_request("Comment is missing"))?;

    if !(0..=5).contains(&rating) {
        return Err(ApiError::bad_request("Rating must be between 0 and 5"));
    }

    products::find_by_id(&state.db, &product_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    if reviews::find_by_author_and_product(&state.db, &auth.user.id, &product_id)
        .await?
        .is_some()
    {
        return Err(ApiError::conflict("You have already reviewed this product"));
    }

    let review = reviews::create(&state.db, &auth.user.id, &product_id, rating, &comment).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"success": true, "data": review})),
    ))
}

#[derive(Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

pub async fn update_review(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateReviewRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let review = reviews::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    if review.user_id != auth.user.id {
        return Err(ApiError::forbidden("Not authorized to update review"));
    }

    if let Some(rating) = request.rating {
        if !(0..=5).contains(&rating) {
            return Err(ApiError::bad_request("Rating must be between 0 and 5"));
        }
    }

    let updated = reviews::update(
        &state.db,
        &review,
        request.rating,
        request.comment.as_deref(),
    )
    .await?;
    Ok(Json(json!({"success": true, "data": updated})))
}
