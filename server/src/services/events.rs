use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::models::{Event, EventStatus, NewEvent};
use crate::store::Store;
use crate::utils::error::{AppError, AppResult};

#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn Store>,
    default_currency: String,
}

impl EventService {
    pub fn new(store: Arc<dyn Store>, default_currency: impl Into<String>) -> Self {
        Self {
            store,
            default_currency: default_currency.into(),
        }
    }

    /// New events start as drafts and are invisible to members until
    /// published.
    pub async fn create_event(&self, organizer_id: Uuid, new_event: NewEvent) -> AppResult<Event> {
        validate(&new_event)?;
        let currency = match new_event.currency {
            Some(code) => normalize_currency(&code)?,
            None => self.default_currency.clone(),
        };

        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            organizer_id,
            title: new_event.title.trim().to_string(),
            description: new_event.description,
            venue: new_event.venue.trim().to_string(),
            start_time: new_event.start_time,
            end_time: new_event.end_time,
            capacity: new_event.capacity,
            price: new_event.price.round_dp(2),
            currency,
            status: EventStatus::Draft,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        if tx.find_user(organizer_id).await?.is_none() {
            return Err(AppError::not_found("User", organizer_id));
        }
        tx.insert_event(&event).await?;
        tx.commit().await?;

        info!(
            event_id = %event.id,
            organizer_id = %organizer_id,
            capacity = event.capacity,
            "Event created"
        );
        Ok(event)
    }

    pub async fn publish_event(&self, event_id: Uuid) -> AppResult<Event> {
        self.transition(event_id, EventStatus::Draft, EventStatus::Published)
            .await
    }

    pub async fn complete_event(&self, event_id: Uuid) -> AppResult<Event> {
        self.transition(event_id, EventStatus::Published, EventStatus::Completed)
            .await
    }

    pub async fn get_event(&self, event_id: Uuid) -> AppResult<Event> {
        let mut tx = self.store.begin().await?;
        let event = tx
            .find_event(event_id)
            .await?
            .ok_or_else(|| AppError::not_found("Event", event_id))?;
        tx.commit().await?;
        Ok(event)
    }

    pub async fn list_events(&self, status: Option<EventStatus>) -> AppResult<Vec<Event>> {
        let mut tx = self.store.begin().await?;
        let events = tx.list_events(status).await?;
        tx.commit().await?;
        Ok(events)
    }

    async fn transition(
        &self,
        event_id: Uuid,
        from: EventStatus,
        to: EventStatus,
    ) -> AppResult<Event> {
        let mut tx = self.store.begin().await?;
        let mut event = tx
            .lock_event(event_id)
            .await?
            .ok_or_else(|| AppError::not_found("Event", event_id))?;

        if event.status != from {
            return Err(AppError::InvalidState(format!(
                "Event is {:?}; expected {:?}",
                event.status, from
            )));
        }

        event.status = to;
        event.updated_at = Utc::now();
        tx.update_event(&event).await?;
        tx.commit().await?;

        info!(event_id = %event_id, status = ?to, "Event status changed");
        Ok(event)
    }
}

fn validate(new_event: &NewEvent) -> AppResult<()> {
    if new_event.title.trim().is_empty() {
        return Err(AppError::ValidationError("Title is required".to_string()));
    }
    if new_event.venue.trim().is_empty() {
        return Err(AppError::ValidationError("Venue is required".to_string()));
    }
    if new_event.capacity < 0 {
        return Err(AppError::ValidationError(
            "Capacity cannot be negative".to_string(),
        ));
    }
    if new_event.price < Decimal::ZERO {
        return Err(AppError::ValidationError("Price cannot be negative".to_string()));
    }
    if let Some(end_time) = new_event.end_time {
        if end_time <= new_event.start_time {
            return Err(AppError::ValidationError(
                "Event must end after it starts".to_string(),
            ));
        }
    }
    Ok(())
}

fn normalize_currency(code: &str) -> AppResult<String> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(AppError::ValidationError(format!(
            "'{code}' is not an ISO currency code"
        )))
    }
}
