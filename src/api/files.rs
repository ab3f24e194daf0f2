//! Image upload endpoints: profile pictures, product pictures and chat file
//! attachments. Blobs go through the configured [`Storage`] backend; the
//! resulting URL lands on the owning record.

use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::api::auth::AuthUser;
use crate::api::error::{ApiError, ApiResult};
use crate::api::ws::WsEvent;
use crate::db::{chats, products, users, MESSAGE_TYPE_FILE};
use crate::AppState;

pub const MAX_PRODUCT_IMAGES: usize = 5;

/// Accepted image types, keyed by MIME with their storage extension.
const ALLOWED_TYPES: [(&str, &str); 3] = [
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
];

struct Upload {
    content_type: String,
    extension: &'static str,
    bytes: Bytes,
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}

async fn read_upload(
    field: axum::extract::multipart::Field<'_>,
    max_bytes: usize,
) -> Result<Upload, ApiError> {
    let content_type = field
        .content_type()
        .map(|c| c.to_string())
        .unwrap_or_default();
    let extension = extension_for(&content_type)
        .ok_or_else(|| ApiError::bad_request("Only JPEG and PNG images are allowed"))?;

    let bytes = field
        .bytes()
        .await
        .map_err(|_| ApiError::bad_request("Malformed upload"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("No file uploaded"));
    }
    if bytes.len() > max_bytes {
        return Err(ApiError::bad_request("File exceeds the maximum upload size"));
    }

    Ok(Upload {
        content_type,
        extension,
        bytes,
    })
}

/// PUT /files/profile-pic, single image under the `file` field.
pub async fn upload_profile_pic(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    let max_bytes = state.config.storage.max_upload_bytes;
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("Malformed upload"))?
    {
        if field.name() == Some("file") {
            upload = Some(read_upload(field, max_bytes).await?);
            break;
        }
    }
    let upload = upload.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;

    let url = state
        .storage
        .store(
            "profile-pic",
            upload.extension,
            &upload.content_type,
            upload.bytes,
        )
        .await?;
    users::set_profile_pic(&state.db, &auth.user.id, &url).await?;

    info!("Profile picture updated for {}", auth.user.email);
    Ok(Json(json!({"url": url})))
}

/// POST /files/product-pic, up to five images under the `files` field plus a
/// `productId` field naming the owner-checked product.
pub async fn upload_product_pics(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    let max_bytes = state.config.storage.max_upload_bytes;
    let mut uploads = Vec::new();
    let mut product_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("Malformed upload"))?
    {
        match field.name() {
            Some("productId") => {
                product_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| ApiError::bad_request("Malformed upload"))?,
                );
            }
            Some("files") => {
                if uploads.len() >= MAX_PRODUCT_IMAGES {
                    return Err(ApiError::bad_request("Too many files uploaded"));
                }
                uploads.push(read_upload(field, max_bytes).await?);
            }
            _ => {}
        }
    }

    let product_id =
        product_id.ok_or_else(|| ApiError::bad_request("Product id is missing"))?;
    if uploads.is_empty() {
        return Err(ApiError::bad_request("No files uploaded"));
    }

    let product = products::find_by_id(&state.db, &product_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    if product.user_id != auth.user.id {
        return Err(ApiError::forbidden(
            "You are not authorized to update this product",
        ));
    }

    let mut urls = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let url = state
            .storage
            .store(
                "product-pic",
                upload.extension,
                &upload.content_type,
                upload.bytes,
            )
            .await?;
        urls.push(url);
    }
    products::set_images(&state.db, &product.id, &urls).await?;

    info!("{} image(s) stored for product {}", urls.len(), product.name);
    Ok(Json(json!({"urls": urls})))
}

/// POST /files/chat-file, single image under the `file` field plus a `chatId`
/// field; the stored URL is appended as a file-type message.
pub async fn upload_chat_file(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    let max_bytes = state.config.storage.max_upload_bytes;
    let mut upload = None;
    let mut chat_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("Malformed upload"))?
    {
        match field.name() {
            Some("chatId") => {
                chat_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| ApiError::bad_request("Malformed upload"))?,
                );
            }
            Some("file") => {
                upload = Some(read_upload(field, max_bytes).await?);
            }
            _ => {}
        }
    }

    let chat_id = chat_id.ok_or_else(|| ApiError::bad_request("Chat id is missing"))?;
    let upload = upload.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;

    let chat = chats::find_by_id(&state.db, &chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;
    if !chat.is_participant(&auth.user.id) {
        return Err(ApiError::forbidden("Not a participant of this chat"));
    }

    let url = state
        .storage
        .store(
            "chat-file",
            upload.extension,
            &upload.content_type,
            upload.bytes,
        )
        .await?;
    let message =
        chats::append_message(&state.db, &chat.id, &auth.user.id, &url, MESSAGE_TYPE_FILE)
            .await?;
    state.hub.broadcast(&chat.id, WsEvent::message(&message), None);

    Ok(Json(json!({"url": url})))
}
