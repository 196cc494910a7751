use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Notification, NotificationCategory, NotificationPage, NotificationQuery};
use crate::store::{Store, StoreTx};
use crate::utils::error::{AppError, AppResult};

/// Persists per-user notices and serves the inbox.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn Store>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn notify(
        &self,
        user_id: Uuid,
        category: NotificationCategory,
        title: &str,
        body: &str,
    ) -> AppResult<Notification> {
        let mut tx = self.store.begin().await?;
        if tx.find_user(user_id).await?.is_none() {
            return Err(AppError::not_found("User", user_id));
        }

        let notification =
            Self::notify_in(tx.as_mut(), user_id, category, title, body, Utc::now()).await?;
        tx.commit().await?;
        Ok(notification)
    }

    /// Writes a notification as part of a larger transaction, so the notice
    /// exists exactly when the state change it describes does.
    pub(crate) async fn notify_in(
        tx: &mut dyn StoreTx,
        user_id: Uuid,
        category: NotificationCategory,
        title: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Notification> {
        let notification = Notification::new(user_id, category, title, body, now);
        tx.insert_notification(&notification).await?;
        debug!(user_id = %user_id, category = ?category, "Notification queued");
        Ok(notification)
    }

    pub async fn list(&self, user_id: Uuid, query: &NotificationQuery) -> AppResult<NotificationPage> {
        let mut tx = self.store.begin().await?;
        let items = tx.list_notifications(user_id, query).await?;
        let (total, unread) = tx.notification_counts(user_id).await?;
        tx.commit().await?;

        Ok(NotificationPage {
            items,
            total,
            unread,
        })
    }

    /// Marks one notification read. Repeating the call is harmless.
    pub async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> AppResult<Notification> {
        let mut tx = self.store.begin().await?;
        let notification = tx
            .find_notification(notification_id)
            .await?
            .ok_or_else(|| AppError::not_found("Notification", notification_id))?;

        if notification.user_id != user_id {
            return Err(AppError::Forbidden(
                "Notification belongs to another user".to_string(),
            ));
        }

        tx.mark_notification_read(notification_id, Utc::now()).await?;
        let updated = tx
            .find_notification(notification_id)
            .await?
            .ok_or_else(|| AppError::not_found("Notification", notification_id))?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> AppResult<u64> {
        let mut tx = self.store.begin().await?;
        let updated = tx.mark_all_notifications_read(user_id, Utc::now()).await?;
        tx.commit().await?;

        info!(user_id = %user_id, updated, "Notifications marked read");
        Ok(updated)
    }
}
