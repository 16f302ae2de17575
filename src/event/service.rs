use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;

use crate::chat::service::ChatService;
use crate::{chat, user};

use super::context;
use super::model::{Command, EventResponse, Inbound};
use super::registry::ConnectionRegistry;
use super::rooms::RoomTracker;

/// The gateway: authenticated connections in, validated mutations and
/// scoped fan-out out.
#[derive(Clone)]
pub struct EventService {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomTracker>,
    chat_service: ChatService,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub connected_clients: usize,
    pub active_rooms: usize,
    pub total_connections: usize,
}

impl EventService {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomTracker>,
        chat_service: ChatService,
    ) -> Self {
        Self {
            registry,
            rooms,
            chat_service,
        }
    }
}

impl EventService {
    pub fn connect(&self, ctx: &context::Ws) {
        self.registry.register(&ctx.user.id, ctx.connection.clone());
        ctx.connection.send(&EventResponse::Connected {
            message: "Connected to chat server".to_owned(),
            user_id: ctx.user.id.clone(),
        });
        debug!("User {} ({}) connected", ctx.user.name, ctx.user.id);
    }

    /// Single cleanup path for every way a connection can end: explicit
    /// close, transport error, or heartbeat timeout.
    pub fn disconnect(&self, ctx: &context::Ws) {
        if !ctx.begin_close() {
            return;
        }

        self.registry.unregister(&ctx.user.id, ctx.connection.id());

        for conversation_id in self.rooms.remove_from_all(&ctx.user.id) {
            self.broadcast(
                &conversation_id,
                &EventResponse::UserLeft {
                    user_id: ctx.user.id.clone(),
                    user_name: ctx.user.name.clone(),
                },
                Some(&ctx.user.id),
            );
        }

        debug!("User {} ({}) disconnected", ctx.user.name, ctx.user.id);
    }

    /// Failures stay local to the envelope that caused them; nothing here
    /// ever closes the connection.
    pub async fn handle(&self, ctx: &context::Ws, frame: &str) {
        let command = match Inbound::parse(frame) {
            Ok(Inbound::Command(command)) => command,
            Ok(Inbound::Unknown(kind)) => {
                debug!("Ignoring unknown message type '{kind}' from {}", ctx.user.id);
                return;
            }
            Err(e) => {
                warn!("Malformed frame from {}: {e}", ctx.user.id);
                ctx.connection.send(&EventResponse::Error {
                    message: super::Error::from(e).client_message(),
                });
                return;
            }
        };

        if let Err(e) = self.dispatch(ctx, command).await {
            warn!("Failed to handle message from {}: {e}", ctx.user.id);
            ctx.connection.send(&EventResponse::Error {
                message: e.client_message(),
            });
        }
    }

    async fn dispatch(&self, ctx: &context::Ws, command: Command) -> super::Result<()> {
        match command {
            Command::JoinConversation(conversation_id) => self.join(ctx, conversation_id).await,
            Command::LeaveConversation(conversation_id) => {
                self.leave(ctx, conversation_id);
                Ok(())
            }
            Command::Message {
                conversation_id,
                content,
            } => self.message(ctx, conversation_id, &content).await,
            Command::Typing(conversation_id) => {
                self.typing(ctx, conversation_id, true);
                Ok(())
            }
            Command::StopTyping(conversation_id) => {
                self.typing(ctx, conversation_id, false);
                Ok(())
            }
            Command::MarkRead(conversation_id) => self.mark_read(ctx, conversation_id).await,
        }
    }

    async fn join(&self, ctx: &context::Ws, conversation_id: chat::Id) -> super::Result<()> {
        // participancy is re-validated against the store on every join
        let conversation = self
            .chat_service
            .find_by_id(&conversation_id, &ctx.user.id)
            .await?;

        self.rooms.join(&conversation_id, &ctx.user.id);

        ctx.connection.send(&EventResponse::JoinedConversation {
            conversation_id: conversation_id.clone(),
            conversation,
        });
        self.broadcast(
            &conversation_id,
            &EventResponse::UserJoined {
                user_id: ctx.user.id.clone(),
                user_name: ctx.user.name.clone(),
            },
            Some(&ctx.user.id),
        );
        Ok(())
    }

    fn leave(&self, ctx: &context::Ws, conversation_id: chat::Id) {
        self.rooms.leave(&conversation_id, &ctx.user.id);

        ctx.connection.send(&EventResponse::LeftConversation {
            conversation_id: conversation_id.clone(),
        });
        self.broadcast(
            &conversation_id,
            &EventResponse::UserLeft {
                user_id: ctx.user.id.clone(),
                user_name: ctx.user.name.clone(),
            },
            Some(&ctx.user.id),
        );
    }

    async fn message(
        &self,
        ctx: &context::Ws,
        conversation_id: chat::Id,
        content: &str,
    ) -> super::Result<()> {
        // persist first; fan-out happens only after the write succeeded
        let (conversation, message) = self
            .chat_service
            .send_message(&conversation_id, &ctx.user.id, content)
            .await?;

        // room members get the push, and so does the other participant even
        // when they are online but not watching the room; each recipient is
        // resolved once, so nobody is delivered to twice
        let mut recipients: HashSet<user::Id> =
            self.rooms.members_of(&conversation_id).into_iter().collect();
        recipients.remove(&ctx.user.id);
        if let Some(other) = conversation.other_participant(&ctx.user.id) {
            recipients.insert(other.clone());
        }

        let event = EventResponse::NewMessage {
            conversation_id,
            message,
            conversation,
        };
        for recipient in recipients {
            self.registry.send_to_user(&recipient, &event);
        }
        Ok(())
    }

    fn typing(&self, ctx: &context::Ws, conversation_id: chat::Id, is_typing: bool) {
        let event = if is_typing {
            EventResponse::UserTyping {
                user_id: ctx.user.id.clone(),
                user_name: ctx.user.name.clone(),
                conversation_id: conversation_id.clone(),
            }
        } else {
            EventResponse::UserStoppedTyping {
                user_id: ctx.user.id.clone(),
                user_name: ctx.user.name.clone(),
                conversation_id: conversation_id.clone(),
            }
        };
        self.broadcast(&conversation_id, &event, Some(&ctx.user.id));
    }

    async fn mark_read(&self, ctx: &context::Ws, conversation_id: chat::Id) -> super::Result<()> {
        self.chat_service
            .mark_read(&conversation_id, &ctx.user.id)
            .await?;

        self.broadcast(
            &conversation_id,
            &EventResponse::MessagesRead {
                user_id: ctx.user.id.clone(),
                conversation_id: conversation_id.clone(),
            },
            Some(&ctx.user.id),
        );
        Ok(())
    }

    /// Standalone fan-out primitive, also invoked from REST handlers.
    pub fn send_to_user(&self, user_id: &user::Id, event: &EventResponse) {
        self.registry.send_to_user(user_id, event);
    }

    pub fn stats(&self) -> Stats {
        Stats {
            connected_clients: self.registry.user_count(),
            active_rooms: self.rooms.room_count(),
            total_connections: self.registry.connection_count(),
        }
    }

    fn broadcast(
        &self,
        conversation_id: &chat::Id,
        event: &EventResponse,
        exclude: Option<&user::Id>,
    ) {
        for member in self.rooms.members_of(conversation_id) {
            if exclude.is_some_and(|excluded| *excluded == member) {
                continue;
            }
            self.registry.send_to_user(&member, event);
        }
    }
}
