use std::fmt::Display;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::Router;
use log::error;
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::{auth, user};

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn repository::ConversationRepository + Send + Sync>;
pub type Products = Arc<dyn repository::ProductReader + Send + Sync>;

/// Opaque conversation identifier, stable across the REST and live channels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Id(pub String);

impl Id {
    pub fn random() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let entropy = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("conv_{millis}_{}", &entropy[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn api<S>(s: AppState) -> Router<S> {
    Router::new()
        .route(
            "/conversations",
            post(handler::create).get(handler::find_all),
        )
        .route(
            "/conversations/{id}",
            get(handler::find_one).delete(handler::delete),
        )
        .route("/conversations/{id}/messages", post(handler::send_message))
        .route("/conversations/{id}/read", patch(handler::mark_read))
        .route("/unread-count", get(handler::unread_count))
        .route("/ws-stats", get(handler::ws_stats))
        .layer(middleware::from_fn_with_state(
            s.clone(),
            auth::middleware::authenticate,
        ))
        .with_state(s)
}

#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    #[error("conversation not found: {0:?}")]
    NotFound(Option<Id>),
    #[error("you are not part of this conversation")]
    NotParticipant,
    #[error("only buyers can initiate conversations")]
    NotABuyer,
    #[error("can only message sellers")]
    NotASeller,
    #[error("cannot message yourself")]
    SelfConversation,
    #[error("product not found: {0}")]
    ProductNotFound(String),
    #[error("product does not belong to this seller")]
    ProductSellerMismatch,
    #[error("message content cannot be empty")]
    EmptyContent,
    #[error("message content exceeds {} characters", model::MAX_CONTENT_LENGTH)]
    ContentTooLong,

    _User(#[from] user::Error),
    _MongoDB(#[from] mongodb::error::Error),
    _Bson(#[from] mongodb::bson::ser::Error),
}

impl Error {
    /// Store/backend failures are reported to clients without detail.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::_MongoDB(_) | Self::_Bson(_) | Self::_User(user::Error::_MongoDB(_))
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("{self}");

        let (status, message) = match self {
            Self::NotFound(_) | Self::ProductNotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            Self::_User(user::Error::NotFound(_)) => (StatusCode::NOT_FOUND, self.to_string()),

            Self::NotParticipant
            | Self::NotABuyer
            | Self::NotASeller
            | Self::SelfConversation
            | Self::ProductSellerMismatch => (StatusCode::FORBIDDEN, self.to_string()),

            Self::EmptyContent | Self::ContentTooLong => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            Self::_User(_) | Self::_MongoDB(_) | Self::_Bson(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_owned(),
            ),
        };

        (status, message).into_response()
    }
}
