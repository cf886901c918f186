//! # AnyApplication Status
//!
//! Status types shared by all zones: lifecycle state, owner, placements and
//! per-zone condition lists.
//!
//! Condition `status` is a plain string on the wire because its value set depends
//! on the condition type. The typed enums below convert to and from those strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of the AnyApplication resource
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
pub struct AnyApplicationStatus {
    /// Overall lifecycle state
    #[serde(default)]
    pub state: GlobalState,
    /// Zone running the global state machine
    #[serde(default)]
    pub owner: String,
    /// Zones selected to host the application
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placements: Vec<Placement>,
    /// Per-zone observations, at most one entry per zone id
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zones: Vec<ZoneStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq)]
pub struct Placement {
    pub zone: String,
    #[serde(default, rename = "node-affinity", skip_serializing_if = "Vec::is_empty")]
    pub node_affinity: Vec<String>,
}

impl Placement {
    pub fn zone(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            node_affinity: Vec::new(),
        }
    }
}

/// Status record owned by a single zone
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStatus {
    pub zone_id: String,
    /// Bumped on every accepted status write for this zone
    #[serde(default, rename = "version")]
    pub zone_version: i64,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Typed, per-zone observation
///
/// Unique per (`type`, `zoneId`) inside a [`ZoneStatus`].
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: ConditionType,
    pub zone_id: String,
    pub status: String,
    /// RFC3339 timestamp
    pub last_transition_time: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub msg: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub retry_attempt: i32,
}

#[allow(clippy::trivially_copy_pass_by_ref, reason = "serde skip_serializing_if passes a reference")]
fn is_zero(value: &i32) -> bool {
    *value == 0
}

impl Condition {
    pub fn new(
        r#type: ConditionType,
        zone_id: impl Into<String>,
        status: impl Into<String>,
        last_transition_time: impl Into<String>,
    ) -> Self {
        Self {
            r#type,
            zone_id: zone_id.into(),
            status: status.into(),
            last_transition_time: last_transition_time.into(),
            reason: String::new(),
            msg: String::new(),
            retry_attempt: 0,
        }
    }

    #[must_use]
    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = msg.into();
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    #[must_use]
    pub fn with_retry_attempt(mut self, attempt: i32) -> Self {
        self.retry_attempt = attempt;
        self
    }

    /// True when status, reason and message match; timestamps are ignored
    pub fn same_observation(&self, other: &Condition) -> bool {
        self.status == other.status && self.reason == other.reason && self.msg == other.msg
    }

    /// Parsed transition time, `None` when missing or malformed
    pub fn transition_time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::parse_from_rfc3339(&self.last_transition_time)
            .ok()
            .map(|time| time.with_timezone(&chrono::Utc))
    }
}

/// Error returned when a wire string does not name a known enum value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a string-backed enum with `as_str`, `Display` and `FromStr`
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $kind:literal { $($variant:ident => $wire:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownValue;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($wire => Ok(Self::$variant),)+
                    _ => Err(UnknownValue { kind: $kind, value: value.to_string() }),
                }
            }
        }
    };
}

string_enum! {
    /// Closed set of condition types
    ConditionType as "condition type" {
        Local => "Local",
        Placement => "Placement",
        Deployment => "Deployment",
        Undeployment => "Undeployment",
        Relocation => "Relocation",
        OwnershipTransfer => "OwnershipTransfer",
    }
}

string_enum! {
    PlacementStatus as "placement status" {
        InProgress => "InProgress",
        Done => "Done",
        Failure => "Failure",
    }
}

string_enum! {
    DeploymentStatus as "deployment status" {
        Pull => "Pull",
        Done => "Done",
        Failure => "Failure",
    }
}

string_enum! {
    UndeploymentStatus as "undeployment status" {
        Undeploy => "Undeploy",
        Done => "Done",
        Failure => "Failure",
    }
}

string_enum! {
    RelocationStatus as "relocation status" {
        Pull => "Pull",
        Undeploy => "Undeploy",
        Done => "Done",
        Failure => "Failure",
    }
}

string_enum! {
    OwnershipTransferStatus as "ownership transfer status" {
        Pulling => "Pulling",
        Success => "Success",
        Failure => "Failure",
    }
}

string_enum! {
    /// Aggregated health of the resources of an application instance
    ///
    /// Used as the status of `Local` conditions.
    HealthStatusCode as "health status" {
        Healthy => "Healthy",
        Progressing => "Progressing",
        Suspended => "Suspended",
        Degraded => "Degraded",
        Missing => "Missing",
        Unknown => "Unknown",
    }
}

/// Overall lifecycle state of an application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
pub enum GlobalState {
    #[default]
    #[serde(alias = "")]
    Unknown,
    New,
    Placement,
    Operational,
    Relocation,
    Failure,
    OwnershipTransfer,
}

impl GlobalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::New => "New",
            Self::Placement => "Placement",
            Self::Operational => "Operational",
            Self::Relocation => "Relocation",
            Self::Failure => "Failure",
            Self::OwnershipTransfer => "OwnershipTransfer",
        }
    }
}

impl fmt::Display for GlobalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
