use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::service::JwtAuthService;
use crate::chat::repository::{MongoConversationRepository, MongoProductReader};
use crate::chat::service::ChatService;
use crate::event::registry::ConnectionRegistry;
use crate::event::rooms::RoomTracker;
use crate::event::service::EventService;
use crate::user::repository::MongoUserRepository;
use crate::{auth, integration};

#[derive(Clone, FromRef)]
pub(crate) struct AppState {
    pub auth_service: auth::Service,
    pub chat_service: ChatService,
    pub event_service: EventService,
}

impl AppState {
    pub async fn init(config: &integration::Config) -> integration::Result<Self> {
        let database = integration::db::init(&config.mongo).await?;

        let auth_service: auth::Service = Arc::new(JwtAuthService::new(&config.jwt_secret));

        let chat_service = ChatService::new(
            Arc::new(MongoConversationRepository::new(&database)),
            Arc::new(MongoProductReader::new(&database)),
            Arc::new(MongoUserRepository::new(&database)),
        );

        let event_service = EventService::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(RoomTracker::new()),
            chat_service.clone(),
        );

        Ok(Self {
            auth_service,
            chat_service,
            event_service,
        })
    }
}
