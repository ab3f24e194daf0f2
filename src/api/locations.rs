//! Geolocation endpoints: find sellers offering a product near a point, and
//! update the caller's own coordinates.

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::error::{ApiError, ApiResult};
use crate::db::{products, users, UserResponse};
use crate::AppState;

/// Default search radius in meters.
const DEFAULT_MAX_DISTANCE_M: f64 = 5000.0;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates, in meters.
fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindSellersRequest {
    pub product: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub max_distance: Option<f64>,
}

pub async fn find_sellers(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Json(request): Json<FindSellersRequest>,
) -> ApiResult<Json<Vec<UserResponse>>> {
    let (product, latitude, longitude) =
        match (request.product, request.latitude, request.longitude) {
            (Some(product), Some(latitude), Some(longitude)) if !product.trim().is_empty() => {
                (product, latitude, longitude)
            }
            _ => {
                return Err(ApiError::bad_request(
                    "Please provide product, latitude and longitude",
                ))
            }
        };
    let max_distance = request.max_distance.unwrap_or(DEFAULT_MAX_DISTANCE_M);

    let candidates = products::located_sellers_offering(&state.db, &product).await?;
    let mut in_range: Vec<(f64, UserResponse)> = candidates
        .into_iter()
        .filter_map(|user| {
            let (lat, lon) = (user.latitude?, user.longitude?);
            let distance = haversine_m(latitude, longitude, lat, lon);
            (distance <= max_distance).then(|| (distance, UserResponse::from(user)))
        })
        .collect();
    in_range.sort_by(|a, b| a.0.total_cmp(&b.0));

    Ok(Json(in_range.into_iter().map(|(_, user)| user).collect()))
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub async fn update_location(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<UpdateLocationRequest>,
) -> ApiResult<Json<UserResponse>> {
    let (latitude, longitude) = match (request.latitude, request.longitude) {
        (Some(latitude), Some(longitude)) => (latitude, longitude),
        _ => {
            return Err(ApiError::bad_request(
                "Please provide latitude and longitude",
            ))
        }
    };

    let user = users::set_location(&state.db, &auth.user.id, longitude, latitude).await?;
    Ok(Json(UserResponse::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distances() {
        // Same point.
        assert!(haversine_m(6.5244, 3.3792, 6.5244, 3.3792) < 1.0);

        // One degree of latitude is roughly 111 km.
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 500.0, "got {d}");

        // Lagos to Abuja is roughly 520 km.
        let d = haversine_m(6.5244, 3.3792, 9.0765, 7.3986);
        assert!((500_000.0..550_000.0).contains(&d), "got {d}");
    }

    #[test]
    fn haversine_is_symmetric() {
        let a = haversine_m(6.5, 3.4, 9.1, 7.4);
        let b = haversine_m(9.1, 7.4, 6.5, 3.4);
        assert!((a - b).abs() < 1e-6);
    }
}
