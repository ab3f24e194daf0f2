//! User records and their public views.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const USER_TYPE_BUYER: &str = "Buyer";
pub const USER_TYPE_SELLER: &str = "Seller";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub city: String,
    pub state: String,
    pub description: Option<String>,
    pub profile_pic: Option<String>,
    pub user_type: String,
    pub is_verified: bool,
    pub reset_token: Option<String>,
    pub reset_token_expiry: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub password_updated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Public view of a user. Never exposes the password hash or reset token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub city: String,
    pub state: String,
    #[serde(rename = "desc")]
    pub description: Option<String>,
    pub profile_pic: Option<String>,
    pub user_type: String,
    pub is_verified: bool,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            city: user.city,
            state: user.state,
            description: user.description,
            profile_pic: user.profile_pic,
            user_type: user.user_type,
            is_verified: user.is_verified,
            longitude: user.longitude,
            latitude: user.latitude,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Reduced owner subset embedded into product responses, so clients do not
/// need a second round-trip for seller details.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SellerSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "desc")]
    pub description: Option<String>,
    #[serde(rename = "img")]
    pub profile_pic: Option<String>,
    pub user_type: String,
    pub city: String,
    pub state: String,
    pub phone: String,
}

impl From<&User> for SellerSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            description: user.description.clone(),
            profile_pic: user.profile_pic.clone(),
            user_type: user.user_type.clone(),
            city: user.city.clone(),
            state: user.state.clone(),
            phone: user.phone.clone(),
        }
    }
}
