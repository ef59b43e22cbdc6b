//! Explicit session context passed into every engine call.

use common::{Role, Username};
use serde::{Deserialize, Serialize};

/// The authenticated caller's identity and role.
///
/// Supplied by the session/auth collaborator (the CLI login flow); the
/// engine trusts it and performs no credential checks of its own. There is
/// no process-wide current user; every call carries its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The caller's username.
    pub username: Username,
    /// The caller's role.
    pub role: Role,
}

impl Session {
    /// Creates a session for the given identity and role.
    pub fn new(username: impl Into<Username>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }

    /// Creates a patient session.
    pub fn patient(username: impl Into<Username>) -> Self {
        Self::new(username, Role::Patient)
    }

    /// Creates a caregiver session.
    pub fn caregiver(username: impl Into<Username>) -> Self {
        Self::new(username, Role::Caregiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_the_role() {
        assert_eq!(Session::patient("pat").role, Role::Patient);
        assert_eq!(Session::caregiver("alice").role, Role::Caregiver);
        assert_eq!(Session::patient("pat").username.as_str(), "pat");
    }
}
