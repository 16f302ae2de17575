use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, to_bson, Bson};
use mongodb::options::ReturnDocument;

use crate::user;

use super::model::{Conversation, LastMessage, Message, ProductRef};
use super::Id;

const CONVERSATIONS_COLLECTION: &str = "conversations";
const PRODUCTS_COLLECTION: &str = "products";

/// Durable store contract for conversations. The store is the ordering
/// authority: `append_message` must not reorder concurrent appends to the
/// same conversation.
#[async_trait]
pub trait ConversationRepository {
    async fn insert(&self, conversation: &Conversation) -> super::Result<()>;

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<Conversation>>;

    /// Exact match on the (buyer, seller, product) triple; a conversation
    /// without a product only matches a lookup without one.
    async fn find_by_participants(
        &self,
        buyer: &user::Id,
        seller: &user::Id,
        product: Option<&str>,
    ) -> super::Result<Option<Conversation>>;

    async fn find_for_role(
        &self,
        user_id: &user::Id,
        role: user::Role,
        skip: u64,
        limit: i64,
    ) -> super::Result<Vec<Conversation>>;

    async fn count_for_role(&self, user_id: &user::Id, role: user::Role) -> super::Result<u64>;

    /// Appends the message and updates the last-message snapshot and both
    /// unread counters as one atomic store operation.
    async fn append_message(&self, id: &Id, message: &Message) -> super::Result<Conversation>;

    /// Flips the read flag on every message not sent by `reader` and zeroes
    /// the reader's counter, both in one atomic store operation.
    async fn mark_read(&self, id: &Id, reader: &user::Id, role: user::Role) -> super::Result<()>;

    async fn delete(&self, id: &Id) -> super::Result<bool>;

    async fn sum_unread(&self, user_id: &user::Id, role: user::Role) -> super::Result<u32>;
}

/// Read-only product lookup, just enough to validate conversation creation.
#[async_trait]
pub trait ProductReader {
    async fn find_by_id(&self, id: &str) -> super::Result<Option<ProductRef>>;
}

pub struct MongoConversationRepository {
    collection: mongodb::Collection<Conversation>,
}

impl MongoConversationRepository {
    pub fn new(database: &mongodb::Database) -> Self {
        Self {
            collection: database.collection(CONVERSATIONS_COLLECTION),
        }
    }
}

fn role_field(role: user::Role) -> &'static str {
    match role {
        user::Role::Buyer => "buyerId",
        user::Role::Seller => "sellerId",
    }
}

#[async_trait]
impl ConversationRepository for MongoConversationRepository {
    async fn insert(&self, conversation: &Conversation) -> super::Result<()> {
        self.collection.insert_one(conversation).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<Conversation>> {
        let conversation = self
            .collection
            .find_one(doc! { "conversationId": id.as_str() })
            .await?;
        Ok(conversation)
    }

    async fn find_by_participants(
        &self,
        buyer: &user::Id,
        seller: &user::Id,
        product: Option<&str>,
    ) -> super::Result<Option<Conversation>> {
        let product = product.map_or(Bson::Null, |p| Bson::String(p.to_owned()));
        let conversation = self
            .collection
            .find_one(doc! {
                "buyerId": buyer.as_str(),
                "sellerId": seller.as_str(),
                "productId": product,
            })
            .await?;
        Ok(conversation)
    }

    async fn find_for_role(
        &self,
        user_id: &user::Id,
        role: user::Role,
        skip: u64,
        limit: i64,
    ) -> super::Result<Vec<Conversation>> {
        let cursor = self
            .collection
            .find(doc! { role_field(role): user_id.as_str() })
            .sort(doc! { "lastMessage.timestamp": -1 })
            .skip(skip)
            .limit(limit)
            .await?;

        let conversations = cursor.try_collect::<Vec<Conversation>>().await?;
        Ok(conversations)
    }

    async fn count_for_role(&self, user_id: &user::Id, role: user::Role) -> super::Result<u64> {
        let count = self
            .collection
            .count_documents(doc! { role_field(role): user_id.as_str() })
            .await?;
        Ok(count)
    }

    async fn append_message(&self, id: &Id, message: &Message) -> super::Result<Conversation> {
        let recipient = message.sender_role.other();

        let mut set = doc! { "lastMessage": to_bson(&LastMessage::from(message))? };
        set.insert(format!("unreadCount.{}", message.sender_role.as_str()), 0);

        let mut inc = mongodb::bson::Document::new();
        inc.insert(format!("unreadCount.{}", recipient.as_str()), 1);

        self.collection
            .find_one_and_update(
                doc! { "conversationId": id.as_str() },
                doc! {
                    "$push": { "messages": to_bson(message)? },
                    "$set": set,
                    "$inc": inc,
                },
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(super::Error::NotFound(Some(id.clone())))
    }

    async fn mark_read(&self, id: &Id, reader: &user::Id, role: user::Role) -> super::Result<()> {
        let mut set = doc! { "messages.$[unread].read": true };
        set.insert(format!("unreadCount.{}", role.as_str()), 0);

        self.collection
            .update_one(
                doc! { "conversationId": id.as_str() },
                doc! { "$set": set },
            )
            .array_filters(vec![doc! {
                "unread.senderId": { "$ne": reader.as_str() },
                "unread.read": false,
            }])
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &Id) -> super::Result<bool> {
        let result = self
            .collection
            .delete_one(doc! { "conversationId": id.as_str() })
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn sum_unread(&self, user_id: &user::Id, role: user::Role) -> super::Result<u32> {
        let conversations = self.find_for_role(user_id, role, 0, 0).await?;
        Ok(conversations
            .iter()
            .map(|c| c.unread_count.of(role))
            .sum())
    }
}

pub struct MongoProductReader {
    collection: mongodb::Collection<ProductRef>,
}

impl MongoProductReader {
    pub fn new(database: &mongodb::Database) -> Self {
        Self {
            collection: database.collection(PRODUCTS_COLLECTION),
        }
    }
}

#[async_trait]
impl ProductReader for MongoProductReader {
    async fn find_by_id(&self, id: &str) -> super::Result<Option<ProductRef>> {
        let product = self.collection.find_one(doc! { "_id": id }).await?;
        Ok(product)
    }
}

#[cfg(test)]
pub mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory double; the mutex serializes appends the way the real
    /// store does.
    #[derive(Default)]
    pub struct InMemoryConversations {
        store: Mutex<HashMap<Id, Conversation>>,
    }

    impl InMemoryConversations {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn message_count(&self, id: &Id) -> usize {
            self.store
                .lock()
                .expect("store lock")
                .get(id)
                .map_or(0, |c| c.messages.len())
        }
    }

    #[async_trait]
    impl ConversationRepository for InMemoryConversations {
        async fn insert(&self, conversation: &Conversation) -> crate::chat::Result<()> {
            self.store
                .lock()
                .expect("store lock")
                .insert(conversation.conversation_id.clone(), conversation.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &Id) -> crate::chat::Result<Option<Conversation>> {
            Ok(self.store.lock().expect("store lock").get(id).cloned())
        }

        async fn find_by_participants(
            &self,
            buyer: &user::Id,
            seller: &user::Id,
            product: Option<&str>,
        ) -> crate::chat::Result<Option<Conversation>> {
            Ok(self
                .store
                .lock()
                .expect("store lock")
                .values()
                .find(|c| {
                    c.buyer_id == *buyer
                        && c.seller_id == *seller
                        && c.product_id.as_deref() == product
                })
                .cloned())
        }

        async fn find_for_role(
            &self,
            user_id: &user::Id,
            role: user::Role,
            skip: u64,
            limit: i64,
        ) -> crate::chat::Result<Vec<Conversation>> {
            let mut conversations = self
                .store
                .lock()
                .expect("store lock")
                .values()
                .filter(|c| c.role_of(user_id) == Some(role))
                .cloned()
                .collect::<Vec<Conversation>>();
            conversations.sort_by(|a, b| b.last_message.timestamp.cmp(&a.last_message.timestamp));

            let conversations = conversations.into_iter().skip(skip as usize);
            Ok(if limit > 0 {
                conversations.take(limit as usize).collect()
            } else {
                conversations.collect()
            })
        }

        async fn count_for_role(
            &self,
            user_id: &user::Id,
            role: user::Role,
        ) -> crate::chat::Result<u64> {
            Ok(self
                .store
                .lock()
                .expect("store lock")
                .values()
                .filter(|c| c.role_of(user_id) == Some(role))
                .count() as u64)
        }

        async fn append_message(
            &self,
            id: &Id,
            message: &Message,
        ) -> crate::chat::Result<Conversation> {
            let mut store = self.store.lock().expect("store lock");
            let conversation = store
                .get_mut(id)
                .ok_or(crate::chat::Error::NotFound(Some(id.clone())))?;

            conversation.messages.push(message.clone());
            conversation.last_message = LastMessage::from(message);
            conversation.unread_count = conversation
                .unread_count
                .after_message_from(message.sender_role);

            Ok(conversation.clone())
        }

        async fn mark_read(
            &self,
            id: &Id,
            reader: &user::Id,
            role: user::Role,
        ) -> crate::chat::Result<()> {
            let mut store = self.store.lock().expect("store lock");
            let conversation = store
                .get_mut(id)
                .ok_or(crate::chat::Error::NotFound(Some(id.clone())))?;

            for message in &mut conversation.messages {
                if message.sender_id != *reader {
                    message.read = true;
                }
            }
            conversation.unread_count = conversation.unread_count.cleared_for(role);

            Ok(())
        }

        async fn delete(&self, id: &Id) -> crate::chat::Result<bool> {
            Ok(self.store.lock().expect("store lock").remove(id).is_some())
        }

        async fn sum_unread(
            &self,
            user_id: &user::Id,
            role: user::Role,
        ) -> crate::chat::Result<u32> {
            Ok(self
                .store
                .lock()
                .expect("store lock")
                .values()
                .filter(|c| c.role_of(user_id) == Some(role))
                .map(|c| c.unread_count.of(role))
                .sum())
        }
    }

    #[derive(Default)]
    pub struct InMemoryProducts {
        products: Mutex<HashMap<String, ProductRef>>,
    }

    impl InMemoryProducts {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, product: ProductRef) {
            self.products
                .lock()
                .expect("products lock")
                .insert(product.id.clone(), product);
        }
    }

    #[async_trait]
    impl ProductReader for InMemoryProducts {
        async fn find_by_id(&self, id: &str) -> crate::chat::Result<Option<ProductRef>> {
            Ok(self
                .products
                .lock()
                .expect("products lock")
                .get(id)
                .cloned())
        }
    }
}
