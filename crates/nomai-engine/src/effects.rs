//! Stat-modifier vocabulary shared between [`crate::status`] and
//! [`crate::damage`].
//!
//! Split out of `status.rs` so a [`crate::damage::DamageRequest`] can carry
//! status effects to apply without `damage.rs` depending on `status.rs`,
//! which itself depends on `damage.rs` for `DamageRequest`/`DamageNotification`.

use serde::{Deserialize, Serialize};

/// A single layer contributing to a derived stat's value.
///
/// Applied in three passes in this fixed order: all [`BaseMultiplier`]s
/// scale the base value, all [`ValueModifier`]s then add a flat amount, and
/// finally all [`EffectiveMultiplier`]s scale the running total. This
/// mirrors equipment (base multiplier), consumables/buffs (value modifier),
/// and global difficulty scaling (effective multiplier) layering onto the
/// same stat without needing to know about each other.
///
/// [`BaseMultiplier`]: StatModifier::BaseMultiplier
/// [`ValueModifier`]: StatModifier::ValueModifier
/// [`EffectiveMultiplier`]: StatModifier::EffectiveMultiplier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StatModifier {
    /// Multiplies the base value before flat modifiers are added.
    BaseMultiplier(f32),
    /// Adds a flat amount after base multipliers are applied.
    ValueModifier(f32),
    /// Multiplies the running total after flat modifiers are added.
    EffectiveMultiplier(f32),
}

/// A named ephemeral effect's modifier payload, carried by a
/// [`crate::damage::DamageRequest`] for the target's status controller to
/// instantiate as a full `EphemeralEffect` (with `source_entity` filled in
/// from the request) once the hit actually lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EphemeralEffectSpec {
    /// Remaining duration in seconds, or `None` for an effect that lasts
    /// until explicitly removed.
    pub duration: Option<f32>,
    /// Stat modifiers this effect contributes while active.
    pub modifiers: Vec<(String, StatModifier)>,
}
