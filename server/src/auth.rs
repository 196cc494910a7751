//! Request identity and the role/capability table.
//!
//! Sessions are handled by the hosted auth provider. Its proxy forwards a
//! verified user id and role on every request, which are trusted as-is.

use std::fmt;
use std::str::FromStr;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Organizer,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    RegisterForEvents,
    ReadOwnNotifications,
    ManageEvents,
    ViewEventStats,
    ManageWaitlist,
    CheckInAttendees,
    EditPages,
    VerifyPayments,
    IssueTickets,
    CancelAnyRegistration,
    ManageUsers,
    PublishPages,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Member, Role::Organizer, Role::Admin];

    pub const fn allows(self, capability: Capability) -> bool {
        use Capability::*;

        match capability {
            RegisterForEvents | ReadOwnNotifications => true,
            ManageEvents | ViewEventStats | ManageWaitlist | CheckInAttendees | EditPages => {
                matches!(self, Role::Organizer | Role::Admin)
            }
            VerifyPayments | IssueTickets | CancelAnyRegistration | ManageUsers
            | PublishPages => matches!(self, Role::Admin),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Organizer => "organizer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" | "user" => Ok(Role::Member),
            "organizer" => Ok(Role::Organizer),
            "admin" | "administrator" => Ok(Role::Admin),
            other => Err(AppError::AuthError(format!("Unknown role '{other}'"))),
        }
    }
}

/// The caller of the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn can(&self, capability: Capability) -> bool {
        self.role.allows(capability)
    }

    pub fn require(&self, capability: Capability) -> Result<(), AppError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Role '{}' may not perform {capability:?}",
                self.role
            )))
        }
    }

    /// Owners act on their own records; everyone else needs `capability`.
    pub fn require_owner_or(&self, owner_id: Uuid, capability: Capability) -> Result<(), AppError> {
        if self.user_id == owner_id {
            Ok(())
        } else {
            self.require(capability)
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::AuthError(format!("Missing {name} header")))
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?
            .parse::<Uuid>()
            .map_err(|_| AppError::AuthError("Malformed user id".to_string()))?;
        let role = header(parts, USER_ROLE_HEADER)?.parse::<Role>()?;

        Ok(Identity { user_id, role })
    }
}
