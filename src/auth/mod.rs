use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;

pub mod middleware;
pub mod model;
pub mod service;

pub type Result<T> = std::result::Result<T, Error>;
pub type Service = Arc<dyn service::AuthService + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("missing access token")]
    MissingToken,
    #[error("invalid access token")]
    InvalidToken,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("{self}");
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}
