use serde::{Deserialize, Serialize};

use crate::OrderError;

/// Authenticated caller, as resolved by the authentication layer.
///
/// The core trusts this value and performs no credential checks of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterIdentity {
    pub subject: String,
    pub is_elevated: bool,
}

/// How a requester may reach an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access<'a> {
    /// Elevated role: any order
    Administrative,
    /// Self-service: only orders owned by this subject
    Owner(&'a str),
}

impl<'a> Access<'a> {
    pub fn owner(&self) -> Option<&'a str> {
        match *self {
            Access::Administrative => None,
            Access::Owner(subject) => Some(subject),
        }
    }
}

impl RequesterIdentity {
    pub fn user(subject: impl Into<String>) -> Self {
        Self { subject: subject.into(), is_elevated: false }
    }

    pub fn admin(subject: impl Into<String>) -> Self {
        Self { subject: subject.into(), is_elevated: true }
    }

    /// The subject, if the authentication layer resolved one
    pub fn subject(&self) -> Option<&str> {
        if self.subject.trim().is_empty() {
            None
        } else {
            Some(&self.subject)
        }
    }

    pub fn access(&self) -> Result<Access<'_>, OrderError> {
        if self.is_elevated {
            return Ok(Access::Administrative);
        }
        self.subject().map(Access::Owner).ok_or(OrderError::Unauthorized)
    }
}
