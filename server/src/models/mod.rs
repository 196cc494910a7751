pub mod analytics;
pub mod event;
pub mod notification;
pub mod page;
pub mod payment;
pub mod registration;
pub mod ticket;
pub mod user;
pub mod waitlist;

pub use analytics::{ActivityCounts, ExportFilter, RegistrationExportRow, RoleCount};
pub use event::{Event, EventStatus, NewEvent};
pub use notification::{Notification, NotificationCategory, NotificationPage, NotificationQuery};
pub use page::{PageRevision, PageState};
pub use payment::{Payment, PaymentStatus};
pub use registration::{Registration, RegistrationCounts, RegistrationStatus, TicketType};
pub use ticket::{ScanPayload, Ticket};
pub use user::{MembershipTier, NewUser, User, UserStatus};
pub use waitlist::WaitlistEntry;

pub use crate::auth::Role;
