//! Chat and message REST endpoints. The real-time path lives in `ws`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::error::{ApiError, ApiResult};
use crate::api::ws::WsEvent;
use crate::db::{chats, users, ChatWithParticipants, MessageWithSender, MESSAGE_TYPE_TEXT};
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub buyer_id: String,
    pub seller_id: String,
}

pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Json(request): Json<CreateChatRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.buyer_id == request.seller_id {
        return Err(ApiError::unauthorized("Unauthorized action"));
    }

    let buyer = users::find_by_id(&state.db, &request.buyer_id).await?;
    let seller = users::find_by_id(&state.db, &request.seller_id).await?;
    if buyer.is_none() || seller.is_none() {
        return Err(ApiError::unauthorized("Unauthorized action"));
    }

    let chat = chats::create(&state.db, &request.buyer_id, &request.seller_id).await?;
    let chat = chats::with_participants(&state.db, chat).await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

pub async fn list_my_chats(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<ChatWithParticipants>>> {
    let listed = chats::list_for_user(&state.db, &auth.user.id).await?;
    Ok(Json(listed))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: String,
    pub content: String,
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let chat = chats::find_by_id(&state.db, &request.chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;
    if !chat.is_participant(&auth.user.id) {
        return Err(ApiError::forbidden("Not a participant of this chat"));
    }

    let message = chats::append_message(
        &state.db,
        &chat.id,
        &auth.user.id,
        &request.content,
        MESSAGE_TYPE_TEXT,
    )
    .await?;

    // Connected subscribers see REST-sent messages too.
    state.hub.broadcast(&chat.id, WsEvent::message(&message), None);

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<Vec<MessageWithSender>>> {
    chats::find_by_id(&state.db, &chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;
    let messages = chats::list_messages(&state.db, &chat_id).await?;
    Ok(Json(messages))
}
