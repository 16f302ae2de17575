use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::auth;

pub async fn authenticate(
    State(auth_service): State<auth::Service>,
    mut req: Request,
    next: Next,
) -> auth::Result<Response> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(auth::Error::MissingToken)?;

    let user_info = auth_service.validate(token).await?;
    req.extensions_mut().insert(user_info);

    Ok(next.run(req).await)
}
