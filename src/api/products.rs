//! Product lifecycle, listing and wishlist endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::api::auth::{AuthUser, MaybeAuthUser};
use crate::api::error::{ApiError, ApiResult};
use crate::api::validation;
use crate::db::{products, reviews, users};
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub negotiable: Option<bool>,
}

pub async fn create_product(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<CreateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    if !auth.user.is_verified {
        return Err(ApiError::forbidden(
            "Please verify your email to display your product/services",
        ));
    }

    // Presence checks in fixed order, first failure names the field.
    if !validation::non_empty(request.name.as_deref()) {
        return Err(ApiError::bad_request("Product name is missing"));
    }
    if !validation::non_empty(request.category.as_deref()) {
        return Err(ApiError::bad_request("Category is missing"));
    }
    if !validation::non_empty(request.description.as_deref()) {
        return Err(ApiError::bad_request("Description is missing"));
    }
    let price = request.price.ok_or_else(|| ApiError::bad_request("Price is missing"))?;

    let name = request.name.unwrap_or_default();
    if products::find_by_owner_and_name(&state.db, &auth.user.id, &name)
        .await?
        .is_some()
    {
        return Err(ApiError::conflict("Product already exists"));
    }

    // Listing a first product promotes a buyer to seller (handled inside
    // the store's create transaction).
    let product = products::create(
        &state.db,
        products::NewProduct {
            user_id: auth.user.id.clone(),
            name,
            category: request.category.unwrap_or_default(),
            description: request.description.unwrap_or_default(),
            price,
            negotiable: request.negotiable.unwrap_or(true),
        },
    )
    .await?;

    info!("Product created: {} by {}", product.name, auth.user.email);
    Ok((
        StatusCode::CREATED,
        Json(json!({"success": true, "data": product})),
    ))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListProductsQuery {
    pub name: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub page: Option<i64>,
    /// Restrict results to sellers in the caller's city and state.
    pub user_location: Option<bool>,
}

pub async fn list_products(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(auth): MaybeAuthUser,
    Query(query): Query<ListProductsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let seller_location = match (query.user_location.unwrap_or(false), auth) {
        (true, Some(auth)) => Some((auth.user.city.clone(), auth.user.state.clone())),
        _ => None,
    };

    let filter = products::ProductFilter {
        name: query.name,
        category: query.category,
        min_price: query.min_price,
        max_price: query.max_price,
        seller_location,
        page: query.page.unwrap_or(1),
    };

    let (count, data) = products::search(&state.db, &filter).await?;
    Ok(Json(json!({"success": true, "count": count, "data": data})))
}

pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let product = products::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    let mut with_seller = products::attach_sellers(&state.db, vec![product]).await?;
    let product = with_seller
        .pop()
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    Ok(Json(json!({"success": true, "data": product})))
}

pub async fn get_products_by_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let listed = products::list_by_user(&state.db, &user_id).await?;
    Ok(Json(json!({"success": true, "count": listed.len(), "data": listed})))
}

pub async fn get_product_reviews(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let listed = reviews::list_for_product(&state.db, &id).await?;
    Ok(Json(json!({"success": true, "count": listed.len(), "data": listed})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub negotiable: Option<bool>,
}

pub async fn update_product(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateProductRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let product = products::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    if product.user_id != auth.user.id {
        return Err(ApiError::forbidden(
            "You are not authorized to update this product",
        ));
    }

    let update = products::ProductUpdate {
        name: request.name,
        category: request.category,
        description: request.description,
        price: request.price,
        negotiable: request.negotiable,
    };
    let product = products::update(&state.db, &id, &update).await?;
    Ok(Json(json!({"success": true, "data": product})))
}

pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let product = products::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    if product.user_id != auth.user.id {
        return Err(ApiError::forbidden(
            "You are not authorized to delete this product",
        ));
    }

    products::delete(&state.db, &id).await?;
    info!("Product deleted: {} by {}", product.name, auth.user.email);
    Ok(Json(json!({"success": true, "data": "Product successfully deleted"})))
}

// ---------------------------------------------------------------------------
// Wishlist
// ---------------------------------------------------------------------------

pub async fn add_to_wishlist(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    products::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    if users::wishlist_contains(&state.db, &auth.user.id, &id).await? {
        return Err(ApiError::bad_request("Product already in wishlist"));
    }
    users::wishlist_add(&state.db, &auth.user.id, &id).await?;
    Ok(Json(
        json!({"success": true, "data": "Product successfully added to wishlist"}),
    ))
}

pub async fn remove_from_wishlist(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    products::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    if !users::wishlist_remove(&state.db, &auth.user.id, &id).await? {
        return Err(ApiError::bad_request("Product not in wishlist"));
    }
    Ok(Json(
        json!({"success": true, "data": "Product successfully removed from wishlist"}),
    ))
}

pub async fn get_wishlist(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let listed = users::wishlist_products(&state.db, &auth.user.id).await?;
    Ok(Json(json!({"success": true, "count": listed.len(), "data": listed})))
}
