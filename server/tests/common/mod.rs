#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use alumni_portal_server::config::Config;
use alumni_portal_server::models::{
    Event, EventStatus, MembershipTier, Role, User, UserStatus,
};
use alumni_portal_server::payments::mock::MockGateway;
use alumni_portal_server::store::{MemoryStore, Store};
use alumni_portal_server::AppState;

pub const WEBHOOK_SECRET: &str = "sk_test_integration";

pub struct TestApp {
    pub store: MemoryStore,
    pub gateway: Arc<MockGateway>,
    pub config: Config,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let gateway = Arc::new(MockGateway::new());
        let config = test_config();
        let state = AppState::new(Arc::new(store.clone()), gateway.clone(), &config);

        Self {
            store,
            gateway,
            config,
            state,
        }
    }

    pub async fn user(&self, role: Role) -> User {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let user = User {
            id,
            email: format!("alumnus-{id}@alumni.test"),
            full_name: "Integration Member".to_string(),
            role,
            status: UserStatus::Active,
            membership_tier: MembershipTier::Standard,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await.unwrap();
        tx.insert_user(&user).await.unwrap();
        tx.commit().await.unwrap();
        user
    }

    /// A published event starting in a week.
    pub async fn event(&self, organizer_id: Uuid, capacity: i32, price: Decimal) -> Event {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            organizer_id,
            title: "Founders' Day Gala".to_string(),
            description: None,
            venue: "Convocation Arena".to_string(),
            start_time: now + Duration::days(7),
            end_time: None,
            capacity,
            price,
            currency: "NGN".to_string(),
            status: EventStatus::Published,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await.unwrap();
        tx.insert_event(&event).await.unwrap();
        tx.commit().await.unwrap();
        event
    }
}

pub fn test_config() -> Config {
    Config::from_lookup(|name| match name {
        "PAYSTACK_SECRET_KEY" => Some(WEBHOOK_SECRET.to_string()),
        "PAYSTACK_CALLBACK_URL" => Some("https://alumni.test/payments/callback".to_string()),
        _ => None,
    })
    .unwrap()
}
