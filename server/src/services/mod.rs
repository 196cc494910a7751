pub mod analytics;
pub mod capacity;
pub mod checkout;
pub mod events;
pub mod notifications;
pub mod pages;
pub mod tickets;
pub mod users;

pub use analytics::{AnalyticsService, Metric, PlatformOverview, Trend};
pub use capacity::{
    CancellationOutcome, CapacityEngine, CapacitySnapshot, EventStats, RegistrationOutcome,
};
pub use checkout::{CheckoutService, PaymentConfirmation, ReconcileSummary};
pub use events::EventService;
pub use notifications::NotificationDispatcher;
pub use pages::PageService;
pub use tickets::{CheckIn, TicketIssuer};
pub use users::UserService;
