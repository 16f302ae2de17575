use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::auth::model::UserInfo;

use super::registry::Connection;

/// Authenticated connection context, constructed once at handshake
/// completion and passed explicitly to every handler. Identity is never
/// re-derived from the transport.
#[derive(Clone)]
pub struct Ws {
    pub user: UserInfo,
    pub connection: Connection,
    pub close: Arc<Notify>,
    closed: Arc<AtomicBool>,
}

impl Ws {
    pub fn new(user: UserInfo, connection: Connection) -> Self {
        Self {
            user,
            connection,
            close: Arc::new(Notify::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// First caller wins; cleanup runs exactly once per connection no
    /// matter which event (pong miss, close frame, transport error)
    /// triggered it.
    pub fn begin_close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}
