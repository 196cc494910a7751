//! Versioned CMS content for the portal's static pages.
//!
//! Every save appends a draft row with the next version number. Publishing
//! copies the newest draft into a published row under the same version, so
//! readers always see an immutable snapshot.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::models::{PageRevision, PageState};
use crate::store::Store;
use crate::utils::error::{AppError, AppResult};

const MAX_SLUG_LEN: usize = 100;

#[derive(Clone)]
pub struct PageService {
    store: Arc<dyn Store>,
}

impl PageService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn save_draft(
        &self,
        slug: &str,
        content: Value,
        author_id: Uuid,
    ) -> AppResult<PageRevision> {
        validate_slug(slug)?;
        if !content.is_object() {
            return Err(AppError::ValidationError(
                "Page content must be a JSON object".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let version = tx.max_page_version(slug).await? + 1;
        let revision = PageRevision {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            version,
            state: PageState::Draft,
            content,
            author_id,
            created_at: Utc::now(),
        };
        tx.insert_page_revision(&revision).await?;
        tx.commit().await?;

        info!(slug, version, "Page draft saved");
        Ok(revision)
    }

    pub async fn publish(&self, slug: &str, publisher_id: Uuid) -> AppResult<PageRevision> {
        let mut tx = self.store.begin().await?;
        let draft = tx
            .latest_page_revision(slug, PageState::Draft)
            .await?
            .ok_or_else(|| AppError::not_found("Page draft", slug))?;

        if let Some(current) = tx.latest_page_revision(slug, PageState::Published).await? {
            if current.version >= draft.version {
                return Err(AppError::AlreadyExists(format!(
                    "Version {} of '{slug}' is already published",
                    draft.version
                )));
            }
        }

        let published = PageRevision {
            id: Uuid::new_v4(),
            state: PageState::Published,
            author_id: publisher_id,
            created_at: Utc::now(),
            ..draft
        };
        tx.insert_page_revision(&published).await?;
        tx.commit().await?;

        info!(slug, version = published.version, "Page published");
        Ok(published)
    }

    pub async fn published(&self, slug: &str) -> AppResult<PageRevision> {
        self.latest(slug, PageState::Published).await
    }

    pub async fn latest_draft(&self, slug: &str) -> AppResult<PageRevision> {
        self.latest(slug, PageState::Draft).await
    }

    async fn latest(&self, slug: &str, state: PageState) -> AppResult<PageRevision> {
        let mut tx = self.store.begin().await?;
        let revision = tx
            .latest_page_revision(slug, state)
            .await?
            .ok_or_else(|| AppError::not_found("Page", slug))?;
        tx.commit().await?;
        Ok(revision)
    }
}

fn validate_slug(slug: &str) -> AppResult<()> {
    let valid = !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!(
            "'{slug}' is not a valid page slug"
        )))
    }
}
