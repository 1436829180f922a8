//! Nomai Engine -- the authoritative entity simulation and replication core.
//!
//! This crate builds on [`nomai_ecs`] to provide the per-world simulation
//! driver: [`EntityManager`](manager::EntityManager) owns every entity and
//! drives the master/slave tick order (movement, status, animator, damage,
//! script, net sync) each world tick, applying batched movement results via
//! the [`CommandBuffer`](nomai_ecs::command::CommandBuffer) and emitting wire
//! packets through [`ReplicationBus`](replication::ReplicationBus).
//!
//! # Quick Start
//!
//! ```
//! use nomai_engine::prelude::*;
//!
//! let mut manager = EntityManager::new(42);
//! let output = manager.tick(1.0 / 60.0, None);
//! assert_eq!(manager.tick_number(), 1);
//! assert!(output.destroyed.is_empty());
//! ```

#![deny(unsafe_code)]

pub mod animator;
pub mod config;
pub mod damage;
pub mod effects;
pub mod entity;
pub mod manager;
pub mod movement;
pub mod replication;
pub mod script;
pub mod status;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the ECS crate for convenience.
pub use nomai_ecs;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    // Re-export everything from the ECS prelude.
    pub use nomai_ecs::prelude::*;

    // Engine-specific exports.
    pub use crate::animator::{DynamicTarget, NetworkedAnimator, StateDef};
    pub use crate::config::{ConfigError, VariantConfig};
    pub use crate::damage::{
        DamageCandidate, DamageKind, DamageManager, DamageNotification, DamageRequest,
        DamageShape, DamageSource, HitType,
    };
    pub use crate::effects::{EphemeralEffectSpec, StatModifier};
    pub use crate::entity::{Entity, EntityKind};
    pub use crate::manager::{EntityManager, TickOutput};
    pub use crate::movement::{
        BodyKind, Collider, ColliderShape, MovementAnchor, MovementError, MovementMode,
        MovementState, MovementWorld, WorldGeometry,
    };
    pub use crate::replication::{ReplicationBus, WireMessage};
    pub use crate::script::{ScriptContext, ScriptError, ScriptHandle};
    pub use crate::status::{EphemeralEffect, PersistentEffect, Resource, StatusController, StatusError};
}
