use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "page_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Draft,
    Published,
}

/// One saved version of a CMS page. Drafts and published copies are separate
/// rows; publishing copies a draft's content under the same version number.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PageRevision {
    pub id: Uuid,
    pub slug: String,
    pub version: i32,
    pub state: PageState,
    pub content: Value,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
}
