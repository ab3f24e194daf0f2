//! Review records with an append-only edit history.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    pub rating: i64,
    pub comment: String,
    pub edit_history: Json<Vec<ReviewEdit>>,
    pub created_at: String,
    pub updated_at: String,
}

/// Snapshot of a review's state before an update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEdit {
    pub rating: i64,
    pub comment: String,
    pub edited_at: String,
}

/// A review with the author's display name attached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewWithAuthor {
    #[serde(flatten)]
    pub review: Review,
    pub author: ReviewAuthor,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAuthor {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}
