//! Aggregated health.

use crate::crd::HealthStatusCode;
use std::fmt;

/// Health code plus a human readable explanation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: HealthStatusCode,
    pub message: String,
}

impl HealthStatus {
    pub fn new(status: HealthStatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(HealthStatusCode::Healthy, "")
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(HealthStatusCode::Unknown, message)
    }

    /// Health that ends a health-poll loop
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            HealthStatusCode::Degraded | HealthStatusCode::Unknown | HealthStatusCode::Missing
        )
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.status)
        } else {
            write!(f, "{}: {}", self.status, self.message)
        }
    }
}

fn severity(code: HealthStatusCode) -> u8 {
    match code {
        HealthStatusCode::Healthy => 0,
        HealthStatusCode::Suspended => 1,
        HealthStatusCode::Progressing => 2,
        HealthStatusCode::Missing => 3,
        HealthStatusCode::Degraded => 4,
        HealthStatusCode::Unknown => 5,
    }
}

/// True when `current` is worse than `new_status`
///
/// Healthy < Suspended < Progressing < Missing < Degraded < Unknown
pub fn is_worse(current: HealthStatusCode, new_status: HealthStatusCode) -> bool {
    severity(current) > severity(new_status)
}

/// Fold a set of health values into the worst one, `None` if empty
pub fn worst<I>(statuses: I) -> Option<HealthStatus>
where
    I: IntoIterator<Item = HealthStatus>,
{
    statuses.into_iter().reduce(|worst, next| {
        if is_worse(next.status, worst.status) {
            next
        } else {
            worst
        }
    })
}
