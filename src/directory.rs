//! Interface to the external identity store.
//!
//! This subsystem never mutates identities; it needs exactly two lookups, so
//! that is all the trait exposes. The shipped implementation reads the
//! `users` collection of the same MongoDB deployment.

use async_trait::async_trait;
use mongodb::{bson::doc, bson::oid::ObjectId, Collection};

use crate::{errors::AppError, models::user::UserDoc, password};

#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_by_id(&self, id: ObjectId) -> Result<Option<UserDoc>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<UserDoc>, AppError>;
}

pub struct MongoDirectory {
    users: Collection<UserDoc>,
}

impl MongoDirectory {
    pub fn new(users: Collection<UserDoc>) -> Self {
        Self { users }
    }

    /// Password check for the login handler. Returns the user only when the
    /// email exists, the password matches, and the account is active; all
    /// three failures collapse to the same `Unauthorized`.
    pub async fn verify_credentials(
        &self,
        email: &str,
        plain_password: &str,
    ) -> Result<UserDoc, AppError> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !password::verify_password(plain_password, &user.password_hash)? {
            return Err(AppError::Unauthorized);
        }
        if !user.active {
            return Err(AppError::unauthenticated(
                crate::errors::AuthFailure::UserInactive,
            ));
        }

        Ok(user)
    }
}

#[async_trait]
impl Directory for MongoDirectory {
    async fn find_by_id(&self, id: ObjectId) -> Result<Option<UserDoc>, AppError> {
        Ok(self.users.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserDoc>, AppError> {
        Ok(self.users.find_one(doc! { "email": email }).await?)
    }
}
