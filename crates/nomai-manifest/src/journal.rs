//! Change journal for tracking every component mutation with causality metadata.
//!
//! The [`ChangeJournal`] records every component mutation that occurs during a
//! tick. Each entry ([`ComponentChange`]) captures the entity, component type,
//! old and new values, and full causality metadata (which system issued the
//! change, why, and at what command index).
//!
//! The journal is populated by the engine during command buffer application via
//! [`ChangeJournal::record_change`]. It is cleared at the start of each tick
//! via [`ChangeJournal::clear`].
//!
//! # Query API
//!
//! The journal supports querying changes by:
//! - **Entity**: [`ChangeJournal::changes_for_entity`]
//! - **Component type**: [`ChangeJournal::changes_for_component`]
//! - **System**: [`ChangeJournal::changes_by_system`]
//!
//! # Example
//!
//! ```
//! use nomai_manifest::journal::{ChangeJournal, ComponentChange};
//! use nomai_ecs::entity::EntityId;
//! use nomai_ecs::identity::SystemId;
//! use nomai_ecs::command::CausalReason;
//!
//! let mut journal = ChangeJournal::new();
//!
//! let entity = EntityId::new(0, 0);
//! journal.record_change(ComponentChange {
//!     entity_id: entity,
//!     component_type_name: "health".to_owned(),
//!     old_value: Some(serde_json::json!(100)),
//!     new_value: Some(serde_json::json!(75)),
//!     changed_by: SystemId(1),
//!     reason: CausalReason::GameRule("damage_applied".to_owned()),
//!     command_index: 0,
//!     tick: 1,
//! });
//!
//! assert_eq!(journal.len(), 1);
//! assert_eq!(journal.changes_for_entity(entity).count(), 1);
//! ```

use nomai_ecs::command::CausalReason;
use nomai_ecs::entity::EntityId;
use nomai_ecs::identity::SystemId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ComponentChange
// ---------------------------------------------------------------------------

/// A single recorded component mutation with full causality metadata.
///
/// Each change captures:
/// - **What** changed: entity, component type, old and new values.
/// - **Who** changed it: the [`SystemId`] that issued the command.
/// - **Why** it changed: the [`CausalReason`] attached to the command.
/// - **When** it changed: the tick number and command index within that tick.
///
/// # Value semantics
///
/// - **Spawn** (component added for the first time): `old_value` is `None`,
///   `new_value` is `Some(...)`.
/// - **Modification** (component overwritten): both `old_value` and `new_value`
///   are `Some(...)`.
/// - **Removal / Despawn** (component removed): `old_value` is `Some(...)`,
///   `new_value` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentChange {
    /// The entity whose component was mutated.
    pub entity_id: EntityId,
    /// The registered name of the component type (e.g. `"health"`, `"position"`).
    pub component_type_name: String,
    /// The component value before the mutation, or `None` if the component
    /// did not exist (spawn / insert).
    pub old_value: Option<serde_json::Value>,
    /// The component value after the mutation, or `None` if the component
    /// was removed (remove / despawn).
    pub new_value: Option<serde_json::Value>,
    /// The system that issued the command producing this change.
    pub changed_by: SystemId,
    /// The causal reason attached to the command that produced this change.
    pub reason: CausalReason,
    /// The sequential command index within the tick's command buffer.
    pub command_index: u64,
    /// The tick number during which this change occurred.
    pub tick: u64,
}

// ---------------------------------------------------------------------------
// ChangeJournal
// ---------------------------------------------------------------------------

/// Accumulates [`ComponentChange`] entries during a tick and provides query
/// methods for downstream consumers (manifest pipeline, debugging tools).
///
/// The journal is designed to be cleared at the start of each tick via
/// [`clear`](Self::clear) and then populated incrementally as commands are
/// applied via [`record_change`](Self::record_change).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeJournal {
    changes: Vec<ComponentChange>,
}

impl ChangeJournal {
    /// Create a new, empty change journal.
    pub fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    /// Record a single component change.
    ///
    /// This is called by the engine during command buffer application. Each
    /// applied command that mutates component state should produce one or more
    /// `ComponentChange` entries.
    pub fn record_change(&mut self, change: ComponentChange) {
        self.changes.push(change);
    }

    /// Clear all recorded changes. Called at the start of each tick.
    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// Returns the number of recorded changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` if no changes have been recorded.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns a slice of all recorded changes in insertion order.
    pub fn all_changes(&self) -> &[ComponentChange] {
        &self.changes
    }

    /// Returns an iterator over changes that affected the given entity.
    pub fn changes_for_entity(&self, entity: EntityId) -> impl Iterator<Item = &ComponentChange> {
        self.changes.iter().filter(move |c| c.entity_id == entity)
    }

    /// Returns an iterator over changes for the given component type name.
    pub fn changes_for_component<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a ComponentChange> {
        self.changes
            .iter()
            .filter(move |c| c.component_type_name == name)
    }

    /// Returns an iterator over changes issued by the given system.
    pub fn changes_by_system(&self, system_id: SystemId) -> impl Iterator<Item = &ComponentChange> {
        self.changes
            .iter()
            .filter(move |c| c.changed_by == system_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
