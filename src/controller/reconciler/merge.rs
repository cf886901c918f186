//! # Status Merge
//!
//! Folds a status derived from an earlier read (`base`) into the freshly
//! stored status, so that writes made in between by jobs or other zones
//! survive.
//!
//! - nothing is merged when the derivation ran as owner but another zone
//!   claimed the application in the meantime;
//! - placements and owner are only replaced when the derivation changed them
//!   and nobody else did in the meantime;
//! - state is replaced unless the derived state is `Unknown`;
//! - conditions of this zone that the derivation added or changed are
//!   upserted. A stored condition still equal to the one in `base` is
//!   replaced; otherwise the newer `lastTransitionTime` wins;
//! - conditions of this zone that the derivation removed are removed.

use crate::crd::{AnyApplicationStatus, Condition, GlobalState};

fn is_newer(candidate: &Condition, current: &Condition) -> bool {
    match (candidate.transition_time(), current.transition_time()) {
        (Some(candidate), Some(current)) => candidate > current,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// The derivation acted as owner, but `stored` names another zone that it
/// cannot replace
pub fn is_ownership_lost(
    stored: &AnyApplicationStatus,
    desired: &AnyApplicationStatus,
    base: &AnyApplicationStatus,
    zone_id: &str,
) -> bool {
    desired.owner == zone_id
        && !stored.owner.is_empty()
        && stored.owner != zone_id
        && stored.owner != base.owner
}

/// Merge `desired` into `stored`, true if `stored` changed
pub fn merge_status(
    stored: &mut AnyApplicationStatus,
    desired: &AnyApplicationStatus,
    base: &AnyApplicationStatus,
    zone_id: &str,
) -> bool {
    if is_ownership_lost(stored, desired, base, zone_id) {
        return false;
    }
    let mut changed = false;

    if desired.placements != base.placements
        && desired.placements != stored.placements
        && stored.placements == base.placements
    {
        stored.placements.clone_from(&desired.placements);
        changed = true;
    }

    if desired.state != GlobalState::Unknown && desired.state != stored.state {
        stored.state = desired.state;
        changed = true;
    }

    if !desired.owner.is_empty()
        && desired.owner != stored.owner
        && (stored.owner.is_empty() || stored.owner == base.owner)
    {
        stored.owner.clone_from(&desired.owner);
        changed = true;
    }

    let desired_conditions = desired
        .get_status_for(zone_id)
        .map(|zone| zone.conditions.as_slice())
        .unwrap_or_default();
    let base_conditions = base
        .get_status_for(zone_id)
        .map(|zone| zone.conditions.as_slice())
        .unwrap_or_default();

    for condition in desired_conditions {
        if base_conditions.contains(condition) {
            continue;
        }
        let read = base_conditions.iter().find(|c| c.r#type == condition.r#type);
        let replace = stored
            .find_condition(condition.r#type, zone_id)
            .is_none_or(|current| read == Some(current) || is_newer(condition, current));
        if replace {
            changed |= stored.add_or_update(condition.clone(), zone_id);
        }
    }

    for condition in base_conditions {
        let still_wanted = desired_conditions
            .iter()
            .any(|c| c.r#type == condition.r#type);
        if !still_wanted {
            changed |= stored.remove(condition.r#type, zone_id);
        }
    }

    changed
}
