//! Product records.
//!
//! The rating fields (`ratings`, `average_rating`, `review_count`) are derived
//! state and mutate only through the rating attach/detach operations in
//! `db::products`, never directly from a handler.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use super::SellerSummary;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub price: f64,
    pub negotiable: bool,
    pub images: Json<Vec<String>>,
    pub ratings: Json<Vec<i64>>,
    pub average_rating: f64,
    pub review_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A product with its owner's summary attached, as returned by the listing
/// and wishlist endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductWithSeller {
    #[serde(flatten)]
    pub product: Product,
    pub seller: SellerSummary,
}

/// Mean and count over a rating sequence; (0, 0) when empty.
pub fn rating_stats(ratings: &[i64]) -> (f64, i64) {
    if ratings.is_empty() {
        return (0.0, 0);
    }
    let sum: i64 = ratings.iter().sum();
    (sum as f64 / ratings.len() as f64, ratings.len() as i64)
}
