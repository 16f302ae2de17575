use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::ws::Message;
use log::{debug, warn};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::user;

use super::model::EventResponse;

/// Live handle to one authenticated socket. Sending never suspends: frames
/// are queued for the connection's writer task.
#[derive(Clone)]
pub struct Connection {
    id: Uuid,
    sender: UnboundedSender<Message>,
    alive: Arc<AtomicBool>,
}

impl Connection {
    pub fn new(sender: UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn send(&self, event: &EventResponse) {
        match serde_json::to_string(event) {
            Ok(payload) => self.send_raw(Message::Text(payload.into())),
            Err(e) => warn!("Failed to serialize event: {e}"),
        }
    }

    pub fn send_raw(&self, frame: Message) {
        if self.sender.send(frame).is_err() {
            debug!("Dropping frame for closed connection {}", self.id);
        }
    }

    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }

    /// Clears the liveness flag and returns its previous value; a connection
    /// found already cleared missed a whole heartbeat interval.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }
}

/// In-memory map from user identity to every live connection it owns.
/// Never a source of truth for anything durable.
#[derive(Default)]
pub struct ConnectionRegistry {
    clients: Mutex<HashMap<user::Id, Vec<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<user::Id, Vec<Connection>>> {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, user_id: &user::Id, connection: Connection) {
        self.clients()
            .entry(user_id.clone())
            .or_default()
            .push(connection);
    }

    /// No-op if the connection is not registered; the user entry is removed
    /// entirely once its last connection is gone.
    pub fn unregister(&self, user_id: &user::Id, connection_id: Uuid) {
        let mut clients = self.clients();
        if let Some(connections) = clients.get_mut(user_id) {
            connections.retain(|c| c.id != connection_id);
            if connections.is_empty() {
                clients.remove(user_id);
            }
        }
    }

    /// Delivers to every open connection of the user; an offline user is a
    /// fan-out of zero, not an error.
    pub fn send_to_user(&self, user_id: &user::Id, event: &EventResponse) {
        let connections = self.clients().get(user_id).cloned();
        let Some(connections) = connections else {
            return;
        };

        match serde_json::to_string(event) {
            Ok(payload) => {
                for connection in connections {
                    connection.send_raw(Message::Text(payload.clone().into()));
                }
            }
            Err(e) => warn!("Failed to serialize event: {e}"),
        }
    }

    pub fn is_online(&self, user_id: &user::Id) -> bool {
        self.clients().contains_key(user_id)
    }

    pub fn connections_of(&self, user_id: &user::Id) -> usize {
        self.clients().get(user_id).map_or(0, Vec::len)
    }

    pub fn user_count(&self) -> usize {
        self.clients().len()
    }

    pub fn connection_count(&self) -> usize {
        self.clients().values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use super::*;

    fn connection() -> (Connection, UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(tx), rx)
    }

    fn received(rx: &mut UnboundedReceiver<Message>) -> usize {
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[test]
    fn register_tracks_multiple_connections_per_user() {
        let registry = ConnectionRegistry::new();
        let alice = user::Id::from("alice");
        let (first, _rx1) = connection();
        let (second, _rx2) = connection();

        registry.register(&alice, first);
        registry.register(&alice, second);

        assert!(registry.is_online(&alice));
        assert_eq!(registry.connections_of(&alice), 2);
        assert_eq!(registry.user_count(), 1);
        assert_eq!(registry.connection_count(), 2);
    }

    #[test]
    fn unregister_removes_the_user_entry_with_the_last_connection() {
        let registry = ConnectionRegistry::new();
        let alice = user::Id::from("alice");
        let (first, _rx1) = connection();
        let (second, _rx2) = connection();
        let (first_id, second_id) = (first.id(), second.id());

        registry.register(&alice, first);
        registry.register(&alice, second);

        registry.unregister(&alice, first_id);
        assert!(registry.is_online(&alice));

        registry.unregister(&alice, second_id);
        assert!(!registry.is_online(&alice));
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn unregister_of_an_unknown_connection_is_a_noop() {
        let registry = ConnectionRegistry::new();
        registry.unregister(&user::Id::from("ghost"), Uuid::new_v4());
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn send_to_user_reaches_every_open_connection() {
        let registry = ConnectionRegistry::new();
        let alice = user::Id::from("alice");
        let bob = user::Id::from("bob");
        let (first, mut rx1) = connection();
        let (second, mut rx2) = connection();
        let (other, mut rx3) = connection();

        registry.register(&alice, first);
        registry.register(&alice, second);
        registry.register(&bob, other);

        registry.send_to_user(
            &alice,
            &EventResponse::Error {
                message: "ping".into(),
            },
        );

        assert_eq!(received(&mut rx1), 1);
        assert_eq!(received(&mut rx2), 1);
        assert_eq!(received(&mut rx3), 0);
    }

    #[test]
    fn send_to_an_offline_user_is_a_noop() {
        let registry = ConnectionRegistry::new();
        registry.send_to_user(
            &user::Id::from("ghost"),
            &EventResponse::Error {
                message: "ping".into(),
            },
        );
    }

    #[test]
    fn liveness_flag_is_take_once() {
        let (conn, _rx) = connection();

        assert!(conn.take_alive());
        assert!(!conn.take_alive());

        conn.mark_alive();
        assert!(conn.take_alive());
    }
}
