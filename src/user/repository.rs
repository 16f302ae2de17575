use async_trait::async_trait;
use mongodb::bson::doc;

use super::model::User;
use super::Id;

const USERS_COLLECTION: &str = "users";

#[async_trait]
pub trait UserRepository {
    async fn find_by_id(&self, id: &Id) -> super::Result<Option<User>>;
}

pub struct MongoUserRepository {
    collection: mongodb::Collection<User>,
}

impl MongoUserRepository {
    pub fn new(database: &mongodb::Database) -> Self {
        Self {
            collection: database.collection(USERS_COLLECTION),
        }
    }
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    async fn find_by_id(&self, id: &Id) -> super::Result<Option<User>> {
        let user = self.collection.find_one(doc! { "_id": id.as_str() }).await?;
        Ok(user)
    }
}

#[cfg(test)]
pub mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryUsers {
        users: Mutex<HashMap<Id, User>>,
    }

    impl InMemoryUsers {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, user: User) {
            self.users
                .lock()
                .expect("users lock")
                .insert(user.id.clone(), user);
        }
    }

    #[async_trait]
    impl UserRepository for InMemoryUsers {
        async fn find_by_id(&self, id: &Id) -> crate::user::Result<Option<User>> {
            Ok(self.users.lock().expect("users lock").get(id).cloned())
        }
    }
}
