use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::models::{MembershipTier, NewUser, Role, User, UserStatus};
use crate::store::Store;
use crate::utils::error::{AppError, AppResult};

/// Member profiles. Accounts are never deleted; archiving keeps the row so
/// registrations and payments stay attributable.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates the profile for an identity the auth provider has verified.
    pub async fn register_user(&self, id: Uuid, new_user: NewUser) -> AppResult<User> {
        let email = new_user.email.trim().to_string();
        let full_name = new_user.full_name.trim().to_string();

        if full_name.is_empty() {
            return Err(AppError::ValidationError("Full name is required".to_string()));
        }
        if !looks_like_email(&email) {
            return Err(AppError::ValidationError(format!(
                "'{email}' is not a valid email address"
            )));
        }

        let now = Utc::now();
        let user = User {
            id,
            email,
            full_name,
            role: Role::Member,
            status: UserStatus::Active,
            membership_tier: new_user.membership_tier.unwrap_or(MembershipTier::Standard),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        if tx.find_user(id).await?.is_some() {
            return Err(AppError::AlreadyExists(
                "Profile already exists".to_string(),
            ));
        }
        tx.insert_user(&user).await?;
        tx.commit().await?;

        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    pub async fn get_user(&self, id: Uuid) -> AppResult<User> {
        let mut tx = self.store.begin().await?;
        let user = tx
            .find_user(id)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))?;
        tx.commit().await?;
        Ok(user)
    }

    pub async fn change_role(&self, id: Uuid, role: Role) -> AppResult<User> {
        self.update(id, |user| user.role = role).await
    }

    pub async fn set_status(&self, id: Uuid, status: UserStatus) -> AppResult<User> {
        self.update(id, |user| user.status = status).await
    }

    pub async fn archive(&self, id: Uuid) -> AppResult<User> {
        self.set_status(id, UserStatus::Archived).await
    }

    async fn update(&self, id: Uuid, edit: impl FnOnce(&mut User) + Send) -> AppResult<User> {
        let mut tx = self.store.begin().await?;
        let mut user = tx
            .find_user(id)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))?;

        edit(&mut user);
        user.updated_at = Utc::now();
        tx.update_user(&user).await?;
        tx.commit().await?;

        info!(user_id = %id, role = %user.role, status = ?user.status, "User updated");
        Ok(user)
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}
