use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::model::{Conversation, Message};
use crate::{chat, user};

/// Inbound envelope, first parse stage: shape only, payload untyped.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationRef {
    conversation_id: chat::Id,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingMessage {
    conversation_id: chat::Id,
    content: String,
}

#[derive(Debug)]
pub enum Command {
    JoinConversation(chat::Id),
    LeaveConversation(chat::Id),
    Message {
        conversation_id: chat::Id,
        content: String,
    },
    Typing(chat::Id),
    StopTyping(chat::Id),
    MarkRead(chat::Id),
}

#[derive(Debug)]
pub enum Inbound {
    Command(Command),
    /// Unrecognized `type` values are logged and ignored, never fatal.
    Unknown(String),
}

impl Inbound {
    /// Second parse stage: the payload of a known kind must match its shape,
    /// otherwise the frame is a validation failure.
    pub fn parse(text: &str) -> Result<Inbound, serde_json::Error> {
        let envelope: Envelope = serde_json::from_str(text)?;

        let command = match envelope.kind.as_str() {
            "join_conversation" => {
                let payload: ConversationRef = serde_json::from_value(envelope.data)?;
                Command::JoinConversation(payload.conversation_id)
            }
            "leave_conversation" => {
                let payload: ConversationRef = serde_json::from_value(envelope.data)?;
                Command::LeaveConversation(payload.conversation_id)
            }
            "message" => {
                let payload: OutgoingMessage = serde_json::from_value(envelope.data)?;
                Command::Message {
                    conversation_id: payload.conversation_id,
                    content: payload.content,
                }
            }
            "typing" => {
                let payload: ConversationRef = serde_json::from_value(envelope.data)?;
                Command::Typing(payload.conversation_id)
            }
            "stop_typing" => {
                let payload: ConversationRef = serde_json::from_value(envelope.data)?;
                Command::StopTyping(payload.conversation_id)
            }
            "mark_read" => {
                let payload: ConversationRef = serde_json::from_value(envelope.data)?;
                Command::MarkRead(payload.conversation_id)
            }
            _ => return Ok(Inbound::Unknown(envelope.kind)),
        };

        Ok(Inbound::Command(command))
    }
}

/// Outbound envelope, serialized as `{ "type": ..., "data": ... }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventResponse {
    #[serde(rename_all = "camelCase")]
    Connected { message: String, user_id: user::Id },
    #[serde(rename_all = "camelCase")]
    JoinedConversation {
        conversation_id: chat::Id,
        conversation: Conversation,
    },
    #[serde(rename_all = "camelCase")]
    LeftConversation { conversation_id: chat::Id },
    #[serde(rename_all = "camelCase")]
    UserJoined { user_id: user::Id, user_name: String },
    #[serde(rename_all = "camelCase")]
    UserLeft { user_id: user::Id, user_name: String },
    #[serde(rename_all = "camelCase")]
    NewMessage {
        conversation_id: chat::Id,
        message: Message,
        conversation: Conversation,
    },
    #[serde(rename_all = "camelCase")]
    NewConversation { conversation: Conversation },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: user::Id,
        user_name: String,
        conversation_id: chat::Id,
    },
    #[serde(rename_all = "camelCase")]
    UserStoppedTyping {
        user_id: user::Id,
        user_name: String,
        conversation_id: chat::Id,
    },
    #[serde(rename_all = "camelCase")]
    MessagesRead {
        user_id: user::Id,
        conversation_id: chat::Id,
    },
    Error { message: String },
}
