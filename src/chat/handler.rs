use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::auth::model::UserInfo;
use crate::event::model::EventResponse;
use crate::event::service::{EventService, Stats};

use super::model::{
    Conversation, ConversationPage, CreateConversation, Message, SendMessage,
};
use super::service::ChatService;
use super::Id;

#[derive(Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

pub async fn create(
    Extension(user_info): Extension<UserInfo>,
    State(chat_service): State<ChatService>,
    State(event_service): State<EventService>,
    Json(request): Json<CreateConversation>,
) -> super::Result<(StatusCode, Json<Conversation>)> {
    let conversation = chat_service.create_or_get(&user_info.id, &request).await?;

    // the live channel learns about it through the same registry
    event_service.send_to_user(
        &conversation.seller_id,
        &EventResponse::NewConversation {
            conversation: conversation.clone(),
        },
    );

    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn find_all(
    Extension(user_info): Extension<UserInfo>,
    State(chat_service): State<ChatService>,
    Query(params): Query<PageParams>,
) -> super::Result<Json<ConversationPage>> {
    let page = chat_service
        .find_for_user(&user_info.id, params.page, params.limit)
        .await?;
    Ok(Json(page))
}

pub async fn find_one(
    Extension(user_info): Extension<UserInfo>,
    State(chat_service): State<ChatService>,
    Path(id): Path<Id>,
) -> super::Result<Json<Conversation>> {
    let conversation = chat_service.find_by_id(&id, &user_info.id).await?;
    Ok(Json(conversation))
}

#[derive(Serialize)]
pub struct SentMessage {
    pub message: Message,
    pub conversation: Conversation,
}

pub async fn send_message(
    Extension(user_info): Extension<UserInfo>,
    State(chat_service): State<ChatService>,
    State(event_service): State<EventService>,
    Path(id): Path<Id>,
    Json(request): Json<SendMessage>,
) -> super::Result<(StatusCode, Json<SentMessage>)> {
    let (conversation, message) = chat_service
        .send_message(&id, &user_info.id, &request.content)
        .await?;

    if let Some(other) = conversation.other_participant(&user_info.id) {
        event_service.send_to_user(
            other,
            &EventResponse::NewMessage {
                conversation_id: id,
                message: message.clone(),
                conversation: conversation.clone(),
            },
        );
    }

    Ok((
        StatusCode::CREATED,
        Json(SentMessage {
            message,
            conversation,
        }),
    ))
}

pub async fn mark_read(
    Extension(user_info): Extension<UserInfo>,
    State(chat_service): State<ChatService>,
    State(event_service): State<EventService>,
    Path(id): Path<Id>,
) -> super::Result<StatusCode> {
    let conversation = chat_service.mark_read(&id, &user_info.id).await?;

    if let Some(other) = conversation.other_participant(&user_info.id) {
        event_service.send_to_user(
            other,
            &EventResponse::MessagesRead {
                user_id: user_info.id.clone(),
                conversation_id: id,
            },
        );
    }

    Ok(StatusCode::OK)
}

pub async fn delete(
    Extension(user_info): Extension<UserInfo>,
    State(chat_service): State<ChatService>,
    Path(id): Path<Id>,
) -> super::Result<StatusCode> {
    chat_service.delete(&id, &user_info.id).await?;
    Ok(StatusCode::OK)
}

#[derive(Serialize)]
pub struct UnreadTotal {
    pub count: u32,
}

pub async fn unread_count(
    Extension(user_info): Extension<UserInfo>,
    State(chat_service): State<ChatService>,
) -> super::Result<Json<UnreadTotal>> {
    let count = chat_service.total_unread(&user_info.id).await?;
    Ok(Json(UnreadTotal { count }))
}

pub async fn ws_stats(State(event_service): State<EventService>) -> Json<Stats> {
    Json(event_service.stats())
}
