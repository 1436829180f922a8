//! Status controller: resources, stats, and status effects.
//!
//! A [`StatusController`] is the per-entity home for everything that is not
//! position or appearance: health-like resources that clamp and regenerate,
//! derived stats built from layered modifiers, and unique status effects
//! (persistent, tied to a category such as worn equipment, or ephemeral,
//! tied to a duration and an optional source entity).
//!
//! Damage application (`apply_damage_request`) lives here rather than in
//! [`crate::damage`] because the resource it mutates -- health -- is owned
//! by the status controller; [`crate::damage::DamageManager`] only decides
//! *whether* and *how much* damage should land.

use std::collections::HashMap;

use nomai_ecs::entity::EntityId;
use nomai_ecs::observer::ObserverStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::damage::{resistance_stat_name, DamageNotification, DamageRequest, HitType};

/// Errors raised by the status controller.
#[derive(Debug, Error, PartialEq)]
pub enum StatusError {
    /// A resource name was queried or mutated that has not been configured.
    #[error("unknown resource {0:?}")]
    UnknownResource(String),
    /// A stat name was queried that has not been configured.
    #[error("unknown stat {0:?}")]
    UnknownStat(String),
    /// A unique effect name was referenced that has no registered default duration.
    #[error("unknown effect {0:?}")]
    UnknownEffect(String),
}

/// Re-exported so existing `status::StatModifier` call sites keep working;
/// the type itself lives in [`crate::effects`] so [`crate::damage`] can
/// describe status effects to apply without depending on this module.
pub use crate::effects::StatModifier;

/// A resource is a clampable, optionally-maxed numeric pool (health, energy,
/// breath, ...). Resources can be locked to reject further mutation (e.g.
/// health locked during a scripted cutscene).
///
/// `max` starts as the literal value passed to [`Resource::capped`] but is
/// treated by [`StatusController`] purely as a cache of the last computed
/// effective maximum: if a base stat named `max<ResourceName>` is
/// configured (e.g. `"maxHealth"` for the `"health"` resource), that stat's
/// fully-modified value overrides it on every recompute (see
/// [`StatusController::resource_max`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    value: f32,
    max: Option<f32>,
    locked: bool,
    reset_value: f32,
}

impl Resource {
    /// A resource with no maximum, starting at `value`.
    pub fn unbounded(value: f32) -> Self {
        Self {
            value,
            max: None,
            locked: false,
            reset_value: value,
        }
    }

    /// A resource capped at `max`, starting at `max`.
    pub fn capped(max: f32) -> Self {
        Self {
            value: max,
            max: Some(max),
            locked: false,
            reset_value: max,
        }
    }
}

/// The base-stat name whose value is `resource_name`'s dynamic maximum,
/// following the `max<Name>` convention (`"health"` -> `"maxHealth"`).
fn derived_max_stat_name(resource_name: &str) -> String {
    let mut chars = resource_name.chars();
    match chars.next() {
        Some(first) => format!("max{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "max".to_owned(),
    }
}

/// A unique status effect applied for a fixed category (e.g. worn armor,
/// an environment hazard) rather than a timed duration. Cleared explicitly,
/// not by a ticking clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentEffect {
    /// The effect's identifier.
    pub effect: String,
    /// Stat modifiers this effect contributes while active.
    pub modifiers: Vec<(String, StatModifier)>,
}

/// A unique status effect with a countdown; removed automatically by
/// [`StatusController::tick_master`] once its duration reaches zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EphemeralEffect {
    /// Remaining duration in seconds, or `None` for an effect that lasts
    /// until explicitly removed.
    pub duration: Option<f32>,
    /// The entity that caused this effect, if any.
    pub source_entity: Option<EntityId>,
    /// Stat modifiers this effect contributes while active.
    pub modifiers: Vec<(String, StatModifier)>,
}

/// Per-entity resources, stats, and status effects.
#[derive(Debug)]
pub struct StatusController {
    base_stats: HashMap<String, f32>,
    stat_modifiers: HashMap<String, Vec<StatModifier>>,
    resources: HashMap<String, Resource>,
    status_properties: HashMap<String, serde_json::Value>,
    persistent_effects: HashMap<String, Vec<PersistentEffect>>,
    ephemeral_effects: HashMap<String, EphemeralEffect>,
    pending_self_damage: Vec<DamageNotification>,
    recent_hits_given: ObserverStream<(EntityId, DamageRequest)>,
    recent_damage_given: ObserverStream<DamageNotification>,
    recent_damage_taken: ObserverStream<DamageNotification>,
}

/// Retention window, in steps (one per `apply_damage_request`/`hit_other`
/// call, not per tick), for the three observer streams.
const OBSERVER_RETENTION: u64 = 256;

impl StatusController {
    /// Construct a status controller with the given base stats and initial
    /// resource pools (mirrors loading a `Json` config in the original, but
    /// config parsing itself lives in [`crate::config`]).
    pub fn new(base_stats: HashMap<String, f32>, resources: HashMap<String, Resource>) -> Self {
        Self {
            base_stats,
            stat_modifiers: HashMap::new(),
            resources,
            status_properties: HashMap::new(),
            persistent_effects: HashMap::new(),
            ephemeral_effects: HashMap::new(),
            pending_self_damage: Vec::new(),
            recent_hits_given: ObserverStream::new(OBSERVER_RETENTION),
            recent_damage_given: ObserverStream::new(OBSERVER_RETENTION),
            recent_damage_taken: ObserverStream::new(OBSERVER_RETENTION),
        }
    }

    // -- arbitrary status properties (config-driven key/value bag) ---------

    /// Read an arbitrary status property, or `default` if unset.
    pub fn status_property(&self, name: &str, default: serde_json::Value) -> serde_json::Value {
        self.status_properties.get(name).cloned().unwrap_or(default)
    }

    /// Set an arbitrary status property.
    pub fn set_status_property(&mut self, name: &str, value: serde_json::Value) {
        self.status_properties.insert(name.to_owned(), value);
    }

    // -- stats ---------------------------------------------------------------

    /// Names of all configured stats.
    pub fn stat_names(&self) -> Vec<&str> {
        self.base_stats.keys().map(String::as_str).collect()
    }

    /// The fully-modified value of `stat_name`.
    pub fn stat(&self, stat_name: &str) -> Result<f32, StatusError> {
        let base = *self
            .base_stats
            .get(stat_name)
            .ok_or_else(|| StatusError::UnknownStat(stat_name.to_owned()))?;

        let mut base_mult = 1.0f32;
        let mut value_sum = 0.0f32;
        let mut effective_mult = 1.0f32;
        if let Some(mods) = self.stat_modifiers.get(stat_name) {
            for modifier in mods {
                match modifier {
                    StatModifier::BaseMultiplier(m) => base_mult *= m,
                    StatModifier::ValueModifier(v) => value_sum += v,
                    StatModifier::EffectiveMultiplier(m) => effective_mult *= m,
                }
            }
        }
        // Persistent and ephemeral effect modifiers layer on top of
        // directly-set modifiers.
        for effects in self.persistent_effects.values() {
            for effect in effects {
                for (name, modifier) in &effect.modifiers {
                    if name == stat_name {
                        match modifier {
                            StatModifier::BaseMultiplier(m) => base_mult *= m,
                            StatModifier::ValueModifier(v) => value_sum += v,
                            StatModifier::EffectiveMultiplier(m) => effective_mult *= m,
                        }
                    }
                }
            }
        }
        for effect in self.ephemeral_effects.values() {
            for (name, modifier) in &effect.modifiers {
                if name == stat_name {
                    match modifier {
                        StatModifier::BaseMultiplier(m) => base_mult *= m,
                        StatModifier::ValueModifier(v) => value_sum += v,
                        StatModifier::EffectiveMultiplier(m) => effective_mult *= m,
                    }
                }
            }
        }

        Ok((base * base_mult + value_sum) * effective_mult)
    }

    /// `true` if `stat_name` is strictly greater than zero.
    pub fn stat_positive(&self, stat_name: &str) -> Result<bool, StatusError> {
        Ok(self.stat(stat_name)? > 0.0)
    }

    /// Add a standing stat modifier (outside of any effect). Used for
    /// directly-applied script-driven modifiers that don't map to a
    /// persistent or ephemeral effect.
    pub fn add_stat_modifier(&mut self, stat_name: &str, modifier: StatModifier) {
        self.stat_modifiers
            .entry(stat_name.to_owned())
            .or_default()
            .push(modifier);
        self.recompute_resource_maxes();
    }

    // -- resources -------------------------------------------------------

    /// Names of all configured resources.
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    /// `true` if `resource_name` is configured.
    pub fn is_resource(&self, resource_name: &str) -> bool {
        self.resources.contains_key(resource_name)
    }

    /// Current value of a resource.
    pub fn resource(&self, resource_name: &str) -> Result<f32, StatusError> {
        self.resources
            .get(resource_name)
            .map(|r| r.value)
            .ok_or_else(|| StatusError::UnknownResource(resource_name.to_owned()))
    }

    /// `true` if the resource is strictly greater than zero.
    pub fn resource_positive(&self, resource_name: &str) -> Result<bool, StatusError> {
        Ok(self.resource(resource_name)? > 0.0)
    }

    /// Overwrite a resource's value, clamped to `[0, max]`.
    pub fn set_resource(&mut self, resource_name: &str, value: f32) -> Result<(), StatusError> {
        {
            let resource = self.resource_mut(resource_name)?;
            if resource.locked {
                return Ok(());
            }
            resource.value = value;
        }
        self.clamp_resource(resource_name)
    }

    /// Add (or subtract, if negative) `amount` to a resource, clamped.
    pub fn modify_resource(&mut self, resource_name: &str, amount: f32) -> Result<(), StatusError> {
        {
            let resource = self.resource_mut(resource_name)?;
            if resource.locked {
                return Ok(());
            }
            resource.value += amount;
        }
        self.clamp_resource(resource_name)
    }

    /// Give up to `amount` to a resource, returning how much was actually
    /// added (less than `amount` if it was clamped by `max`).
    pub fn give_resource(&mut self, resource_name: &str, amount: f32) -> Result<f32, StatusError> {
        let before = self.resource(resource_name)?;
        self.modify_resource(resource_name, amount.max(0.0))?;
        let after = self.resource(resource_name)?;
        Ok(after - before)
    }

    /// Consume `amount` from a resource if it has at least that much
    /// available; returns whether the consumption succeeded.
    pub fn consume_resource(&mut self, resource_name: &str, amount: f32) -> Result<bool, StatusError> {
        let current = self.resource(resource_name)?;
        if current < amount {
            return Ok(false);
        }
        self.modify_resource(resource_name, -amount)?;
        Ok(true)
    }

    /// Consume `amount` from a resource regardless of whether enough is
    /// available (allowed to go to zero, never negative); returns whether
    /// the resource had enough before consuming (same semantics as
    /// `consume_resource` for the return value, but always subtracts).
    pub fn over_consume_resource(&mut self, resource_name: &str, amount: f32) -> Result<bool, StatusError> {
        let had_enough = self.resource(resource_name)? >= amount;
        self.modify_resource(resource_name, -amount)?;
        Ok(had_enough)
    }

    /// Whether a resource is currently locked against mutation.
    pub fn resource_locked(&self, resource_name: &str) -> Result<bool, StatusError> {
        self.resources
            .get(resource_name)
            .map(|r| r.locked)
            .ok_or_else(|| StatusError::UnknownResource(resource_name.to_owned()))
    }

    /// Lock or unlock a resource against mutation.
    pub fn set_resource_locked(&mut self, resource_name: &str, locked: bool) -> Result<(), StatusError> {
        self.resource_mut(resource_name)?.locked = locked;
        Ok(())
    }

    /// Reset a resource to its configured starting value and clear its lock.
    pub fn reset_resource(&mut self, resource_name: &str) -> Result<(), StatusError> {
        let resource = self.resource_mut(resource_name)?;
        resource.value = resource.reset_value;
        resource.locked = false;
        Ok(())
    }

    /// Reset every resource to its configured starting value.
    pub fn reset_all_resources(&mut self) {
        let names: Vec<String> = self.resources.keys().cloned().collect();
        for name in names {
            let _ = self.reset_resource(&name);
        }
    }

    /// The resource's current effective maximum, or `None` if unbounded.
    ///
    /// If a base stat named `max<ResourceName>` is configured (see
    /// [`derived_max_stat_name`]), its fully-modified value is the maximum;
    /// otherwise the resource's own static configured max is used.
    pub fn resource_max(&self, resource_name: &str) -> Result<Option<f32>, StatusError> {
        let resource = self
            .resources
            .get(resource_name)
            .ok_or_else(|| StatusError::UnknownResource(resource_name.to_owned()))?;
        match self.stat(&derived_max_stat_name(resource_name)) {
            Ok(derived) => Ok(Some(derived)),
            Err(_) => Ok(resource.max),
        }
    }

    /// Current value as a fraction of max, or `None` if unbounded.
    pub fn resource_percentage(&self, resource_name: &str) -> Result<Option<f32>, StatusError> {
        let value = self.resource(resource_name)?;
        let max = self.resource_max(resource_name)?;
        Ok(max.map(|max| if max > 0.0 { value / max } else { 0.0 }))
    }

    /// Set a resource to `percentage` of its max (no-op if unbounded).
    /// Returns the resulting absolute value.
    pub fn set_resource_percentage(&mut self, resource_name: &str, percentage: f32) -> Result<f32, StatusError> {
        let max = self.resource_max(resource_name)?.unwrap_or(0.0);
        self.set_resource(resource_name, max * percentage)?;
        self.resource(resource_name)
    }

    /// Add `percentage` of max to a resource. Returns the resulting
    /// absolute value.
    pub fn modify_resource_percentage(&mut self, resource_name: &str, percentage: f32) -> Result<f32, StatusError> {
        let max = self.resource_max(resource_name)?.unwrap_or(0.0);
        self.modify_resource(resource_name, max * percentage)?;
        self.resource(resource_name)
    }

    fn resource_mut(&mut self, resource_name: &str) -> Result<&mut Resource, StatusError> {
        self.resources
            .get_mut(resource_name)
            .ok_or_else(|| StatusError::UnknownResource(resource_name.to_owned()))
    }

    /// Reclamp a resource against its current effective max, cached onto
    /// `Resource::max` for next time. If the resource was sitting exactly at
    /// its previous max (i.e. "full") and the max has grown, it is topped up
    /// to the new max rather than left behind -- this is what makes e.g. an
    /// innate `maxHealth` multiplier raise current health along with the cap.
    fn clamp_resource(&mut self, resource_name: &str) -> Result<(), StatusError> {
        let new_max = self.resource_max(resource_name)?;
        let resource = self.resource_mut(resource_name)?;
        let was_full = resource.max.is_some_and(|old_max| resource.value >= old_max);
        match new_max {
            Some(new_max) => {
                if was_full {
                    resource.value = new_max;
                }
                resource.value = resource.value.clamp(0.0, new_max);
            }
            None => resource.value = resource.value.max(0.0),
        }
        resource.max = new_max;
        Ok(())
    }

    /// Reclamp every resource against its current effective max. Called
    /// whenever a stat modifier or persistent/ephemeral effect changes,
    /// since any of those can move a `max<Name>`-derived maximum.
    fn recompute_resource_maxes(&mut self) {
        let names: Vec<String> = self.resources.keys().cloned().collect();
        for name in names {
            let _ = self.clamp_resource(&name);
        }
    }

    // -- persistent effects ------------------------------------------------

    /// All persistent effects registered under `category`.
    pub fn persistent_effects(&self, category: &str) -> &[PersistentEffect] {
        self.persistent_effects
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Add one persistent effect under `category`.
    pub fn add_persistent_effect(&mut self, category: &str, effect: PersistentEffect) {
        self.persistent_effects
            .entry(category.to_owned())
            .or_default()
            .push(effect);
        self.recompute_resource_maxes();
    }

    /// Replace all persistent effects under `category`.
    pub fn set_persistent_effects(&mut self, category: &str, effects: Vec<PersistentEffect>) {
        self.persistent_effects.insert(category.to_owned(), effects);
        self.recompute_resource_maxes();
    }

    /// Remove all persistent effects under `category`.
    pub fn clear_persistent_effects(&mut self, category: &str) {
        self.persistent_effects.remove(category);
        self.recompute_resource_maxes();
    }

    /// Remove every persistent effect in every category.
    pub fn clear_all_persistent_effects(&mut self) {
        self.persistent_effects.clear();
        self.recompute_resource_maxes();
    }

    // -- ephemeral effects ---------------------------------------------------

    /// Apply an ephemeral effect, keyed by its own identity. Overwrites any
    /// existing effect with the same key.
    pub fn add_ephemeral_effect(&mut self, key: &str, effect: EphemeralEffect) {
        self.ephemeral_effects.insert(key.to_owned(), effect);
        self.recompute_resource_maxes();
    }

    /// Remove an ephemeral effect by key. Returns `true` if it was present.
    pub fn remove_ephemeral_effect(&mut self, key: &str) -> bool {
        let removed = self.ephemeral_effects.remove(key).is_some();
        if removed {
            self.recompute_resource_maxes();
        }
        removed
    }

    /// Remove every ephemeral effect.
    pub fn clear_ephemeral_effects(&mut self) {
        self.ephemeral_effects.clear();
        self.recompute_resource_maxes();
    }

    /// `true` if a unique effect (ephemeral, by key) is currently active.
    pub fn unique_status_effect_active(&self, key: &str) -> bool {
        self.ephemeral_effects.contains_key(key)
    }

    // -- damage pipeline ------------------------------------------------

    /// Apply a damage request's effect on this entity's `"health"` resource
    /// (the well-known resource name every entity with a status controller
    /// is expected to configure). Returns the resulting notification and
    /// records it to the recent-damage-taken observer stream.
    ///
    /// Steps (§4.3 `applyDamageRequest`):
    /// 1. An invulnerable (`stat("invulnerable") > 0`) or already-dead
    ///    target takes no damage at all -- returns `None` without mutating
    ///    anything.
    /// 2. Elemental resistance (`elementalType` -> `<type>Resistance` stat)
    ///    reduces the incoming damage, floored at zero.
    /// 3. `DamageKind::Damage` (but not `IgnoresDefense`) is further reduced
    ///    by the target's `defense` stat, floored at zero.
    /// 4. The result is subtracted from health via [`DamageManager::apply`],
    ///    which also applies knockback via the caller.
    /// 5. The request's listed ephemeral effects are instantiated on this
    ///    entity, with `source_entity` filled in from the request.
    pub fn apply_damage_request(
        &mut self,
        request: &DamageRequest,
        target: EntityId,
        position: (f64, f64),
        damage_manager: &mut crate::damage::DamageManager,
    ) -> Option<DamageNotification> {
        let dead = self.resource("health").map(|h| h <= 0.0).unwrap_or(false);
        if dead || self.stat_positive("invulnerable").unwrap_or(false) {
            return None;
        }

        let mut mitigated = request.clone();
        if !matches!(
            request.kind,
            crate::damage::DamageKind::NoDamage | crate::damage::DamageKind::Knockback
        ) {
            if let Some(elemental_type) = &request.elemental_type {
                let resistance = self.stat(&resistance_stat_name(elemental_type)).unwrap_or(0.0);
                mitigated.damage = (mitigated.damage - resistance).max(0.0);
            }
            if request.kind == crate::damage::DamageKind::Damage {
                let defense = self.stat("defense").unwrap_or(0.0);
                mitigated.damage = (mitigated.damage - defense).max(0.0);
            }
        }

        let max_health = self.resource_max("health").ok().flatten().unwrap_or(0.0);
        let notification = damage_manager.apply(&mitigated, target, position, |incoming| {
            let before = self.resources.get("health").map(|r| r.value).unwrap_or(0.0);
            let _ = self.modify_resource("health", -incoming);
            let after = self.resources.get("health").map(|r| r.value).unwrap_or(0.0);
            (before - after, after <= 0.0)
        });
        let notification = notification.map(|mut n| {
            n.hit_type = crate::damage::classify_hit(n.damage_dealt, max_health, n.killed);
            n
        });
        if notification.is_some() {
            for (key, spec) in &request.status_effects {
                self.add_ephemeral_effect(
                    key,
                    EphemeralEffect {
                        duration: spec.duration,
                        source_entity: request.source_entity,
                        modifiers: spec.modifiers.clone(),
                    },
                );
            }
        }
        if let Some(n) = &notification {
            self.recent_damage_taken.add(n.clone());
        }
        notification
    }

    /// Record that this entity dealt a hit to `target`, for
    /// [`inflicted_hits_since`](Self::inflicted_hits_since).
    pub fn hit_other(&mut self, target: EntityId, request: DamageRequest) {
        self.recent_hits_given.add((target, request));
    }

    /// Record that this entity dealt damage to `target`, for
    /// [`inflicted_damage_since`](Self::inflicted_damage_since).
    pub fn damaged_other(&mut self, notification: DamageNotification) {
        self.recent_damage_given.add(notification);
    }

    /// Queue a notification of self-inflicted damage, e.g. from an
    /// environment hazard, pulled by the script host next tick.
    pub fn queue_self_damage_notification(&mut self, notification: DamageNotification) {
        self.pending_self_damage.push(notification);
    }

    /// Drain queued self-damage notifications.
    pub fn pull_self_damage_notifications(&mut self) -> Vec<DamageNotification> {
        std::mem::take(&mut self.pending_self_damage)
    }

    /// Damage notifications taken by this entity since `since`, plus the
    /// cursor to pass on the next call.
    pub fn damage_taken_since(&self, since: u64) -> (Vec<&DamageNotification>, u64) {
        self.recent_damage_taken.query(since)
    }

    /// Hits this entity dealt to others since `since`, plus the cursor to
    /// pass on the next call.
    pub fn inflicted_hits_since(&self, since: u64) -> (Vec<&(EntityId, DamageRequest)>, u64) {
        self.recent_hits_given.query(since)
    }

    /// Damage this entity dealt to others since `since`, plus the cursor to
    /// pass on the next call.
    pub fn inflicted_damage_since(&self, since: u64) -> (Vec<&DamageNotification>, u64) {
        self.recent_damage_given.query(since)
    }

    // -- tick -------------------------------------------------------------

    /// Run down ephemeral effect durations by `dt` seconds, removing any
    /// that have expired. Master-only: effect duration is authoritative
    /// state, not something a slave should drift independently.
    pub fn tick_master(&mut self, dt: f32) {
        self.ephemeral_effects.retain(|_, effect| match &mut effect.duration {
            Some(remaining) => {
                *remaining -= dt;
                *remaining > 0.0
            }
            None => true,
        });
        self.recompute_resource_maxes();
        self.recent_hits_given.tick(1);
        self.recent_damage_given.tick(1);
        self.recent_damage_taken.tick(1);
    }

    /// Slave entities have no authoritative resource/effect state of their
    /// own; durations and resources arrive pre-computed via replication.
    pub fn tick_slave(&mut self, _dt: f32) {}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
