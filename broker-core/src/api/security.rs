//! Message-level authorization.

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AccessDenied(pub String);

pub trait MessageAuthorizer: Send + Sync {
    /// Checks that the connection may publish a message carrying `user_id`.
    fn check_authorized_message_principal(&self, user_id: Option<&str>) -> Result<(), AccessDenied>;
}

/// Authorizer bound to the authenticated principal of one connection.
#[derive(Clone, Debug)]
pub struct ConnectionPrincipal {
    principal: String,
    validate_user_id: bool,
}

impl ConnectionPrincipal {
    pub fn new(principal: impl Into<String>, validate_user_id: bool) -> Self {
        Self {
            principal: principal.into(),
            validate_user_id,
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }
}

impl MessageAuthorizer for ConnectionPrincipal {
    fn check_authorized_message_principal(
        &self,
        user_id: Option<&str>,
    ) -> Result<(), AccessDenied> {
        match user_id {
            Some(user_id) if self.validate_user_id && user_id != self.principal => {
                Err(AccessDenied(format!(
                    "User '{}' is not permitted to send messages with user id '{user_id}'",
                    self.principal
                )))
            }
            _ => Ok(()),
        }
    }
}
