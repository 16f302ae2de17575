use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use log::error;

use crate::state::AppState;
use crate::{auth, chat};

pub mod context;
pub mod handler;
pub mod model;
pub mod registry;
pub mod rooms;
pub mod service;

pub type Result<T> = std::result::Result<T, Error>;

pub fn endpoints<S>(s: AppState) -> Router<S> {
    Router::new().route("/ws", get(handler::ws)).with_state(s)
}

#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    #[error("WS connection rejected")]
    ConnectionRejected,

    _Auth(#[from] auth::Error),
    _Chat(#[from] chat::Error),
    _ParseJson(#[from] serde_json::Error),
}

impl Error {
    /// What the offending client gets to see in an `error` envelope.
    pub fn client_message(&self) -> String {
        match self {
            Self::_Chat(e) if !e.is_internal() => e.to_string(),
            Self::_ParseJson(_) => "Malformed message".to_owned(),
            _ => "Failed to process message".to_owned(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("{self}");

        match self {
            Self::ConnectionRejected | Self::_Auth(_) => {
                (StatusCode::FORBIDDEN, "WS connection rejected").into_response()
            }
            Self::_Chat(_) | Self::_ParseJson(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            )
                .into_response(),
        }
    }
}
