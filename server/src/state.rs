use std::sync::Arc;

use crate::config::Config;
use crate::payments::PaymentGateway;
use crate::services::{
    AnalyticsService, CapacityEngine, CheckoutService, EventService, NotificationDispatcher,
    PageService, TicketIssuer, UserService,
};
use crate::store::Store;

/// Everything a handler can reach. Services share one store and gateway.
#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
    pub events: EventService,
    pub capacity: CapacityEngine,
    pub checkout: CheckoutService,
    pub tickets: TicketIssuer,
    pub notifications: NotificationDispatcher,
    pub pages: PageService,
    pub analytics: AnalyticsService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, config: &Config) -> Self {
        Self {
            users: UserService::new(store.clone()),
            events: EventService::new(store.clone(), config.default_currency.clone()),
            capacity: CapacityEngine::new(
                store.clone(),
                gateway.clone(),
                config.paystack.callback_url.clone(),
            ),
            checkout: CheckoutService::new(
                store.clone(),
                gateway,
                config.paystack.secret_key.clone(),
            ),
            tickets: TicketIssuer::new(store.clone()),
            notifications: NotificationDispatcher::new(store.clone()),
            pages: PageService::new(store.clone()),
            analytics: AnalyticsService::new(store),
        }
    }
}
