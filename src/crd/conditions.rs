//! # Condition Store
//!
//! Pure operations over an [`AnyApplicationStatus`]: zone lookup, condition
//! find/add-or-update/remove and the zone version counter.
//!
//! Nothing here performs I/O. Persistence and version bumps happen in the
//! status updater, which calls into these functions from its mutate closure.

use crate::crd::{AnyApplicationStatus, Condition, ConditionType, ZoneStatus};

/// Find the condition with the given type and zone in a condition list
pub fn find<'a>(
    conditions: &'a [Condition],
    condition_type: ConditionType,
    zone_id: &str,
) -> Option<&'a Condition> {
    conditions
        .iter()
        .find(|condition| condition.r#type == condition_type && condition.zone_id == zone_id)
}

impl ZoneStatus {
    pub fn new(zone_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            zone_version: 0,
            conditions: Vec::new(),
        }
    }

    pub fn find_condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|condition| condition.r#type == condition_type)
    }
}

impl AnyApplicationStatus {
    pub fn get_status_for(&self, zone_id: &str) -> Option<&ZoneStatus> {
        self.zones.iter().find(|zone| zone.zone_id == zone_id)
    }

    pub fn get_status_for_mut(&mut self, zone_id: &str) -> Option<&mut ZoneStatus> {
        self.zones.iter_mut().find(|zone| zone.zone_id == zone_id)
    }

    /// Zone status for `zone_id`, appended with version 0 when missing
    pub fn get_or_create_status_for(&mut self, zone_id: &str) -> &mut ZoneStatus {
        let index = match self.zones.iter().position(|zone| zone.zone_id == zone_id) {
            Some(index) => index,
            None => {
                self.zones.push(ZoneStatus::new(zone_id));
                self.zones.len() - 1
            }
        };
        &mut self.zones[index]
    }

    pub fn zone_exists(&self, zone_id: &str) -> bool {
        self.get_status_for(zone_id).is_some()
    }

    pub fn remove_zone(&mut self, zone_id: &str) -> bool {
        let before = self.zones.len();
        self.zones.retain(|zone| zone.zone_id != zone_id);
        self.zones.len() != before
    }

    /// Condition of the given type reported by `zone_id`
    pub fn find_condition(
        &self,
        condition_type: ConditionType,
        zone_id: &str,
    ) -> Option<&Condition> {
        self.get_status_for(zone_id)
            .and_then(|zone| find(&zone.conditions, condition_type, zone_id))
    }

    /// Insert or overwrite the condition with the same (type, zone) in `zone_id`
    ///
    /// Returns `true` if the status changed. An existing condition is only
    /// overwritten when its status, reason or message differ, so repeating the
    /// same observation with a newer timestamp is a no-op.
    pub fn add_or_update(&mut self, condition: Condition, zone_id: &str) -> bool {
        let zone = self.get_or_create_status_for(zone_id);
        match zone
            .conditions
            .iter_mut()
            .find(|existing| existing.r#type == condition.r#type && existing.zone_id == condition.zone_id)
        {
            Some(existing) if existing.same_observation(&condition) => false,
            Some(existing) => {
                *existing = condition;
                true
            }
            None => {
                zone.conditions.push(condition);
                true
            }
        }
    }

    /// Remove the condition with the given type from `zone_id`
    pub fn remove(&mut self, condition_type: ConditionType, zone_id: &str) -> bool {
        let Some(zone) = self.get_status_for_mut(zone_id) else {
            return false;
        };
        let before = zone.conditions.len();
        zone.conditions
            .retain(|existing| !(existing.r#type == condition_type && existing.zone_id == zone_id));
        zone.conditions.len() != before
    }

    pub fn has_placements(&self) -> bool {
        !self.placements.is_empty()
    }

    pub fn placements_contain(&self, zone_id: &str) -> bool {
        self.placements.iter().any(|placement| placement.zone == zone_id)
    }

    /// Bump the version of `zone_id` past both its own value and the resource version
    ///
    /// A resource version that is not a number counts as 0.
    pub fn increment_zone_version(&mut self, zone_id: &str, resource_version: Option<&str>) {
        let Some(zone) = self.get_status_for_mut(zone_id) else {
            return;
        };
        let version = resource_version
            .and_then(|rv| rv.parse::<i64>().ok())
            .unwrap_or(0);
        zone.zone_version = (version + 1).max(zone.zone_version + 1);
    }

    /// One-line summary of zones, versions and conditions, for logging
    pub fn summary(&self) -> String {
        let zones: Vec<String> = self
            .zones
            .iter()
            .map(|zone| {
                let conditions: Vec<String> = zone
                    .conditions
                    .iter()
                    .map(|c| format!("{}={}", c.r#type, c.status))
                    .collect();
                format!("{}@v{} [{}]", zone.zone_id, zone.zone_version, conditions.join(", "))
            })
            .collect();
        format!(
            "state={} owner={} zones: {}",
            self.state,
            self.owner,
            zones.join("; ")
        )
    }
}
