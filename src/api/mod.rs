pub mod auth;
mod chats;
pub mod error;
mod files;
mod locations;
mod products;
mod reviews;
mod users;
mod validation;
pub mod ws;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Account lifecycle (public).
    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/verify/:token", get(auth::verify_email))
        .route("/forget-password", post(auth::forget_password))
        .route("/password-reset/:resetToken", put(auth::reset_password));

    let user_routes = Router::new()
        .route("/me", get(users::me))
        .route("/:id", get(users::get_user))
        .route("/:id", put(users::update_user))
        .route("/:id", delete(users::delete_user));

    // Product reads are public; mutations gate on the extractor.
    let product_routes = Router::new()
        .route("/", post(products::create_product))
        .route("/", get(products::list_products))
        .route("/wishlist", get(products::get_wishlist))
        .route("/user/:id", get(products::get_products_by_user))
        .route("/:id", get(products::get_product))
        .route("/:id", put(products::update_product))
        .route("/:id", delete(products::delete_product))
        .route("/:id/reviews", get(products::get_product_reviews))
        .route("/:id/wishlist", post(products::add_to_wishlist))
        .route("/:id/wishlist", delete(products::remove_from_wishlist));

    let review_routes = Router::new()
        .route("/", post(reviews::create_review))
        .route("/:id", put(reviews::update_review));

    let chat_routes = Router::new()
        .route("/chats", post(chats::create_chat))
        .route("/chats", get(chats::list_my_chats))
        .route("/messages", post(chats::send_message))
        .route("/messages/:chatId", get(chats::get_messages));

    let file_routes = Router::new()
        .route("/profile-pic", put(files::upload_profile_pic))
        .route("/product-pic", post(files::upload_product_pics))
        .route("/chat-file", post(files::upload_chat_file));

    let location_routes = Router::new()
        .route("/find-sellers", post(locations::find_sellers))
        .route("/update-location", put(locations::update_location));

    Router::new()
        .route("/health", get(health_check))
        .route("/ws/chat", get(ws::chat_ws))
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/products", product_routes)
        .nest("/reviews", review_routes)
        .merge(chat_routes)
        .nest("/files", file_routes)
        .nest("/locations", location_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}


#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::test_support::{bearer, test_state};
    use super::*;
    use crate::db::products::test_support::insert_product;
    use crate::db::users::test_support::insert_user;
    use crate::db::{products, users, USER_TYPE_BUYER, USER_TYPE_SELLER};

    fn json_request(method: &str, uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    fn signup_body(email: &str) -> Value {
        json!({
            "email": email,
            "password": "Sup3rSecret",
            "firstName": "Ada",
            "lastName": "Obi",
            "phone": "123",
            "city": "Lagos",
            "state": "Lagos",
        })
    }

    #[tokio::test]
    async fn signup_rejects_duplicate_email() {
        let state = test_state().await;
        let router = create_router(state.clone());

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/signup",
                None,
                signup_body("ada@example.com"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            body_text(response).await,
            "User registered. Please check your email to verify your account."
        );

        let user = users::find_by_email(&state.db, "ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(!user.is_verified);

        let response = router
            .oneshot(json_request(
                "POST",
                "/auth/signup",
                None,
                signup_body("ada@example.com"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["message"], "User already exists");
    }

    #[tokio::test]
    async fn login_requires_a_verified_email() {
        let state = test_state().await;
        let router = create_router(state.clone());

        router
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/signup",
                None,
                signup_body("eve@example.com"),
            ))
            .await
            .unwrap();

        let credentials = json!({"email": "eve@example.com", "password": "Sup3rSecret"});
        let response = router
            .clone()
            .oneshot(json_request("POST", "/auth/login", None, credentials.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await["message"],
            "Please verify your email to login"
        );

        let user = users::find_by_email(&state.db, "eve@example.com")
            .await
            .unwrap()
            .unwrap();
        users::set_verified(&state.db, &user.id).await.unwrap();

        let response = router
            .oneshot(json_request("POST", "/auth/login", None, credentials))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("token="));
        let body = body_json(response).await;
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[tokio::test]
    async fn first_listing_promotes_buyer_to_seller() {
        let state = test_state().await;
        let router = create_router(state.clone());

        let owner = insert_user(&state.db, "owner@example.com").await;
        users::set_verified(&state.db, &owner.id).await.unwrap();
        let owner = users::find_by_id(&state.db, &owner.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owner.user_type, USER_TYPE_BUYER);

        let response = router
            .oneshot(json_request(
                "POST",
                "/products",
                Some(&bearer(&owner)),
                json!({"name": "Lamp", "category": "Home", "description": "Desk lamp", "price": 10.0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["data"]["negotiable"], true);

        let owner = users::find_by_id(&state.db, &owner.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owner.user_type, USER_TYPE_SELLER);
    }

    #[tokio::test]
    async fn unverified_caller_cannot_list_a_product() {
        let state = test_state().await;
        let router = create_router(state.clone());

        let caller = insert_user(&state.db, "new@example.com").await;
        let response = router
            .oneshot(json_request(
                "POST",
                "/products",
                Some(&bearer(&caller)),
                json!({"name": "Lamp", "category": "Home", "description": "d", "price": 1.0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await["message"],
            "Please verify your email to display your product/services"
        );
    }

    #[tokio::test]
    async fn product_update_is_owner_only() {
        let state = test_state().await;
        let router = create_router(state.clone());

        let owner = insert_user(&state.db, "owner@example.com").await;
        let intruder = insert_user(&state.db, "other@example.com").await;
        let product = insert_product(&state.db, &owner.id, "Lamp").await;

        let response = router
            .oneshot(json_request(
                "PUT",
                &format!("/products/{}", product.id),
                Some(&bearer(&intruder)),
                json!({"name": "Stolen"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await["message"],
            "You are not authorized to update this product"
        );

        let unchanged = products::find_by_id(&state.db, &product.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.name, "Lamp");
    }
}
