//! Wire protocol and replication bus: packages entity net-tree deltas for
//! transmission and keeps per-connection last-seen-version bookkeeping so
//! each connection only receives what changed since its last update.
//!
//! Wire packets are tick-synchronous, ordered, and reliable per connection.
//! Integers/strings/json inside a delta's payload are already encoded by
//! [`nomai_ecs::net::NetElementGroup::write_delta`] (bincode varints,
//! length-prefixed UTF-8); this module only frames the outer envelope.

use std::collections::{BTreeMap, HashMap};

use nomai_ecs::entity::EntityId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::damage::DamageRequest;
use crate::entity::{Entity, EntityDelta, EntityKind};

/// Identifies one network connection (a client session, or a server's
/// session with one client, depending on which side this process is).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

/// A pending JSON-RPC-style call against a live entity, and its response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMessage {
    pub target_id: EntityId,
    pub name: String,
    pub args_json: serde_json::Value,
    pub promise_id: u64,
}

/// Response to an [`EntityMessage`]; `Err` carries a human-readable reason
/// (script error, unknown target, etc).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMessageResponse {
    pub promise_id: u64,
    pub result: Result<serde_json::Value, String>,
}

/// One entity's delta inside an [`WireMessage::EntityUpdate`] batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityUpdateEntry {
    pub id: EntityId,
    pub delta_bytes: Vec<u8>,
    pub new_entity_version: u64,
    pub new_animator_version: u64,
}

/// All network packets the replication layer sends or receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireMessage {
    /// Sent server -> client on spawn. `init_payload` is the entity's full
    /// initial state (a delta taken from version 0).
    EntityCreate {
        entity_type: EntityKind,
        id: EntityId,
        client_id: Option<ConnectionId>,
        master_connection: ConnectionId,
        init_payload: Vec<u8>,
    },
    /// Sent when an entity's master destroys it. `final_state` is present
    /// when the destroying side wants observers to see the last frame
    /// (e.g. a death pose) before removing the entity locally.
    EntityDestroy {
        id: EntityId,
        final_state: Option<Vec<u8>>,
    },
    /// Sent every network tick: every entity that changed since the
    /// recipient's last acknowledged version.
    EntityUpdate { batch: Vec<EntityUpdateEntry> },
    /// A hit request for a target whose master lives on another connection.
    RemoteDamageRequest {
        destination_connection: ConnectionId,
        target_id: EntityId,
        req: DamageRequest,
    },
    /// Informs the causing entity's owning connection that a hit landed,
    /// so its script can react via `hitOther`.
    RemoteHitRequest {
        destination_connection: ConnectionId,
        causing_id: EntityId,
        target_id: EntityId,
        req: DamageRequest,
    },
    Message(EntityMessage),
    MessageResponse(EntityMessageResponse),
}

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("failed to encode entity delta: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode entity delta: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("unknown entity id in update batch")]
    UnknownEntity,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ReplicationError> {
    Ok(bincode::serde::encode_to_vec(value, bincode::config::standard())?)
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ReplicationError> {
    Ok(bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map(|(value, _)| value)?)
}

/// Per-connection bookkeeping of the last entity/animator versions
/// acknowledged, so [`ReplicationBus::build_update`] only sends deltas.
#[derive(Debug, Default)]
struct ConnectionState {
    last_seen: HashMap<u64, (u64, u64)>,
}

/// Packages entity deltas into [`WireMessage`]s and tracks what each
/// connection has already seen.
#[derive(Debug, Default)]
pub struct ReplicationBus {
    connections: HashMap<ConnectionId, ConnectionState>,
}

impl ReplicationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a connection. Its first [`ReplicationBus::build_update`]
    /// call will see every entity as new (delta from version 0).
    pub fn register_connection(&mut self, connection: ConnectionId) {
        self.connections.entry(connection).or_default();
    }

    /// Stop tracking a connection (on disconnect).
    pub fn drop_connection(&mut self, connection: ConnectionId) {
        self.connections.remove(&connection);
    }

    /// Build the `EntityCreate` packet for a freshly spawned entity.
    pub fn build_create(
        &self,
        entity: &Entity,
        client_id: Option<ConnectionId>,
        master_connection: ConnectionId,
    ) -> Result<WireMessage, ReplicationError> {
        let delta = entity.write_delta(0, 0);
        Ok(WireMessage::EntityCreate {
            entity_type: entity.kind,
            id: entity.id,
            client_id,
            master_connection,
            init_payload: encode(&delta)?,
        })
    }

    /// Build the `EntityDestroy` packet for an entity its master just
    /// removed. `include_final_state` captures the last frame before the
    /// entity is gone.
    pub fn build_destroy(
        &self,
        entity: &Entity,
        include_final_state: bool,
    ) -> Result<WireMessage, ReplicationError> {
        let final_state = if include_final_state {
            Some(encode(&entity.write_delta(0, 0))?)
        } else {
            None
        };
        Ok(WireMessage::EntityDestroy {
            id: entity.id,
            final_state,
        })
    }

    /// Build the `EntityUpdate` batch a connection is due this tick:
    /// every entity that has changed since the last call for that
    /// connection. Entities with no change since last call are omitted.
    pub fn build_update(
        &mut self,
        connection: ConnectionId,
        entities: &BTreeMap<u64, Entity>,
    ) -> Result<WireMessage, ReplicationError> {
        let state = self.connections.entry(connection).or_default();
        let mut batch = Vec::new();

        for (&raw_id, entity) in entities.iter() {
            let (from_entity, from_animator) = state.last_seen.get(&raw_id).copied().unwrap_or((0, 0));
            let delta = entity.write_delta(from_entity, from_animator);
            if delta.entity_version == from_entity && delta.animator_version == from_animator {
                continue;
            }
            let entry = EntityUpdateEntry {
                id: entity.id,
                new_entity_version: delta.entity_version,
                new_animator_version: delta.animator_version,
                delta_bytes: encode(&delta)?,
            };
            state
                .last_seen
                .insert(raw_id, (delta.entity_version, delta.animator_version));
            batch.push(entry);
        }

        Ok(WireMessage::EntityUpdate { batch })
    }

    /// Apply a received `EntityUpdate` batch to the local (slave-side)
    /// entity map.
    pub fn apply_update(
        &self,
        entities: &mut BTreeMap<u64, Entity>,
        batch: &[EntityUpdateEntry],
        interpolation_time: f32,
    ) -> Result<(), ReplicationError> {
        for entry in batch {
            let entity = entities
                .get_mut(&entry.id.to_raw())
                .ok_or(ReplicationError::UnknownEntity)?;
            let delta: EntityDelta = decode(&entry.delta_bytes)?;
            entity.read_delta(&delta, interpolation_time);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animator::NetworkedAnimator;
    use crate::entity::EntityKind;
    use crate::movement::{MovementMode, MovementState};
    use crate::status::StatusController;
    use nomai_ecs::team::{Team, TeamType};
    use std::collections::HashMap as Map;

    fn make_entity(id: EntityId) -> Entity {
        let movement = MovementState {
            x: 1.0,
            y: 2.0,
            rotation: 0.0,
            dx: 0.0,
            dy: 0.0,
            mode: MovementMode::Master,
            seconds_since_update: 0.0,
        };
        let status = StatusController::new(Map::new(), Map::new());
        let animator = NetworkedAnimator::new(Vec::new());
        Entity::new(
            id,
            EntityKind::Player,
            Team::new(TeamType::Friendly, 0),
            movement,
            None,
            None,
            status,
            animator,
            None,
        )
    }

    #[test]
    fn second_update_only_contains_changed_entities() {
        let mut bus = ReplicationBus::new();
        let conn = ConnectionId(1);
        bus.register_connection(conn);

        let mut world = BTreeMap::new();
        let mut entity = make_entity(EntityId::from_raw(0));
        entity.sync_net_state();
        world.insert(0u64, entity);

        let first = bus.build_update(conn, &world).unwrap();
        let WireMessage::EntityUpdate { batch } = first else {
            panic!("expected EntityUpdate");
        };
        assert_eq!(batch.len(), 1);

        let second = bus.build_update(conn, &world).unwrap();
        let WireMessage::EntityUpdate { batch } = second else {
            panic!("expected EntityUpdate");
        };
        assert!(batch.is_empty(), "no state changed since the first update");
    }

    #[test]
    fn create_payload_round_trips_into_a_fresh_entity() {
        let mut source = make_entity(EntityId::from_raw(7));
        source.movement.x = 42.0;
        source.sync_net_state();

        let bus = ReplicationBus::new();
        let WireMessage::EntityCreate { init_payload, .. } =
            bus.build_create(&source, None, ConnectionId(0)).unwrap()
        else {
            panic!("expected EntityCreate");
        };
        let delta: EntityDelta = decode(&init_payload).unwrap();

        let mut target = make_entity(EntityId::from_raw(7));
        target.read_delta(&delta, 0.0);
        target.pull_net_state();
        assert_eq!(target.movement.x, 42.0);
    }
}
