use log::debug;

use crate::user;
use crate::user::model::User;

use super::model::{
    Conversation, ConversationPage, CreateConversation, Message, Pagination, ProductRef,
    MAX_CONTENT_LENGTH,
};
use super::{Error, Id};

const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct ChatService {
    conversations: super::Repository,
    products: super::Products,
    users: user::Repository,
}

impl ChatService {
    pub fn new(
        conversations: super::Repository,
        products: super::Products,
        users: user::Repository,
    ) -> Self {
        Self {
            conversations,
            products,
            users,
        }
    }
}

impl ChatService {
    /// Creating again with the same (buyer, seller, product) triple returns
    /// the existing conversation.
    pub async fn create_or_get(
        &self,
        buyer_id: &user::Id,
        request: &CreateConversation,
    ) -> super::Result<Conversation> {
        let buyer = self.find_user(buyer_id).await?;
        let seller = self.find_user(&request.seller_id).await?;

        if buyer.role != user::Role::Buyer {
            return Err(Error::NotABuyer);
        }
        if seller.role != user::Role::Seller {
            return Err(Error::NotASeller);
        }
        if buyer.id == seller.id {
            return Err(Error::SelfConversation);
        }

        if let Some(existing) = self
            .conversations
            .find_by_participants(&buyer.id, &seller.id, request.product_id.as_deref())
            .await?
        {
            return Ok(existing);
        }

        let product = match &request.product_id {
            Some(product_id) => {
                let product = self
                    .products
                    .find_by_id(product_id)
                    .await?
                    .ok_or_else(|| Error::ProductNotFound(product_id.clone()))?;
                if product.seller_id != seller.id {
                    return Err(Error::ProductSellerMismatch);
                }
                Some(product)
            }
            None => None,
        };

        let content = match &request.initial_message {
            Some(text) => validate_content(text)?,
            None => default_greeting(product.as_ref()),
        };

        let conversation = Conversation::new(
            &buyer,
            &seller,
            product.as_ref(),
            Message::new(&buyer, &content),
        );
        self.conversations.insert(&conversation).await?;

        debug!(
            "Created conversation {} between {} and {}",
            conversation.conversation_id, buyer.id, seller.id
        );
        Ok(conversation)
    }

    pub async fn send_message(
        &self,
        id: &Id,
        sender_id: &user::Id,
        content: &str,
    ) -> super::Result<(Conversation, Message)> {
        let content = validate_content(content)?;

        self.load_for(id, sender_id).await?;
        let sender = self.find_user(sender_id).await?;

        let message = Message::new(&sender, &content);
        let updated = self.conversations.append_message(id, &message).await?;

        Ok((updated, message))
    }

    /// Returns the conversation as it was before the read sweep, so callers
    /// can still resolve the other participant.
    pub async fn mark_read(&self, id: &Id, reader: &user::Id) -> super::Result<Conversation> {
        let conversation = self.load_for(id, reader).await?;
        let role = conversation.role_of(reader).ok_or(Error::NotParticipant)?;

        self.conversations.mark_read(id, reader, role).await?;
        Ok(conversation)
    }

    pub async fn find_by_id(&self, id: &Id, user_id: &user::Id) -> super::Result<Conversation> {
        self.load_for(id, user_id).await
    }

    pub async fn find_for_user(
        &self,
        user_id: &user::Id,
        page: u32,
        limit: u32,
    ) -> super::Result<ConversationPage> {
        let user = self.find_user(user_id).await?;

        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let skip = u64::from(page - 1) * u64::from(limit);

        let conversations = self
            .conversations
            .find_for_role(&user.id, user.role, skip, i64::from(limit))
            .await?;
        let total = self.conversations.count_for_role(&user.id, user.role).await?;
        let total_pages = total.div_ceil(u64::from(limit)) as u32;

        Ok(ConversationPage {
            conversations,
            pagination: Pagination {
                current_page: page,
                total_pages,
                total_conversations: total,
                has_next: page < total_pages,
                has_prev: page > 1,
                limit,
            },
        })
    }

    pub async fn delete(&self, id: &Id, user_id: &user::Id) -> super::Result<()> {
        self.load_for(id, user_id).await?;

        if self.conversations.delete(id).await? {
            Ok(())
        } else {
            Err(Error::NotFound(Some(id.clone())))
        }
    }

    pub async fn total_unread(&self, user_id: &user::Id) -> super::Result<u32> {
        let user = self.find_user(user_id).await?;
        self.conversations.sum_unread(&user.id, user.role).await
    }
}

impl ChatService {
    async fn load_for(&self, id: &Id, user_id: &user::Id) -> super::Result<Conversation> {
        let conversation = self
            .conversations
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(Some(id.clone())))?;

        if !conversation.is_participant(user_id) {
            return Err(Error::NotParticipant);
        }
        Ok(conversation)
    }

    async fn find_user(&self, id: &user::Id) -> super::Result<User> {
        self.users
            .find_by_id(id)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| user::Error::NotFound(id.clone()).into())
    }
}

fn validate_content(content: &str) -> super::Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyContent);
    }
    if trimmed.chars().count() > MAX_CONTENT_LENGTH {
        return Err(Error::ContentTooLong);
    }
    Ok(trimmed.to_owned())
}

fn default_greeting(product: Option<&ProductRef>) -> String {
    match product {
        Some(product) => format!("Hi! I'm interested in {}.", product.title),
        None => "Hi! I'm interested in your products.".to_owned(),
    }
}
