use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user;
use crate::user::model::User;

use super::Id;

pub const MAX_CONTENT_LENGTH: usize = 1000;

/// Immutable once appended; the sender snapshot is captured at send time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender_id: user::Id,
    pub sender_name: String,
    pub sender_role: user::Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

impl Message {
    pub fn new(sender: &User, content: &str) -> Self {
        Self {
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            sender_role: sender.role,
            content: content.to_owned(),
            timestamp: Utc::now(),
            read: false,
        }
    }
}

/// Denormalized snapshot for conversation list views.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: user::Id,
}

impl From<&Message> for LastMessage {
    fn from(message: &Message) -> Self {
        Self {
            content: message.content.clone(),
            timestamp: message.timestamp,
            sender_id: message.sender_id.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCount {
    pub buyer: u32,
    pub seller: u32,
}

impl UnreadCount {
    pub fn of(self, role: user::Role) -> u32 {
        match role {
            user::Role::Buyer => self.buyer,
            user::Role::Seller => self.seller,
        }
    }

    /// Recipient side goes up by one, sender side resets to zero.
    pub fn after_message_from(self, sender: user::Role) -> Self {
        match sender {
            user::Role::Buyer => Self {
                buyer: 0,
                seller: self.seller + 1,
            },
            user::Role::Seller => Self {
                buyer: self.buyer + 1,
                seller: 0,
            },
        }
    }

    pub fn cleared_for(self, reader: user::Role) -> Self {
        match reader {
            user::Role::Buyer => Self { buyer: 0, ..self },
            user::Role::Seller => Self { seller: 0, ..self },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Archived,
    Blocked,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRef {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub seller_id: user::Id,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub conversation_id: Id,
    pub buyer_id: user::Id,
    pub buyer_name: String,
    pub seller_id: user::Id,
    pub seller_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_title: Option<String>,
    pub messages: Vec<Message>,
    pub last_message: LastMessage,
    pub unread_count: UnreadCount,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(buyer: &User, seller: &User, product: Option<&ProductRef>, initial: Message) -> Self {
        Self {
            conversation_id: Id::random(),
            buyer_id: buyer.id.clone(),
            buyer_name: buyer.name.clone(),
            seller_id: seller.id.clone(),
            seller_name: seller.name.clone(),
            product_id: product.map(|p| p.id.clone()),
            product_title: product.map(|p| p.title.clone()),
            last_message: LastMessage::from(&initial),
            unread_count: UnreadCount::default().after_message_from(initial.sender_role),
            messages: vec![initial],
            status: Status::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_participant(&self, user_id: &user::Id) -> bool {
        self.buyer_id == *user_id || self.seller_id == *user_id
    }

    pub fn role_of(&self, user_id: &user::Id) -> Option<user::Role> {
        if self.buyer_id == *user_id {
            Some(user::Role::Buyer)
        } else if self.seller_id == *user_id {
            Some(user::Role::Seller)
        } else {
            None
        }
    }

    pub fn other_participant(&self, user_id: &user::Id) -> Option<&user::Id> {
        match self.role_of(user_id)? {
            user::Role::Buyer => Some(&self.seller_id),
            user::Role::Seller => Some(&self.buyer_id),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversation {
    pub seller_id: user::Id,
    pub product_id: Option<String>,
    pub initial_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessage {
    pub content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPage {
    pub conversations: Vec<Conversation>,
    pub pagination: Pagination,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_conversations: u64,
    pub has_next: bool,
    pub has_prev: bool,
    pub limit: u32,
}
