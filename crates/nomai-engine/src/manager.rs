//! Entity manager: owns every entity in one world, the shared batched
//! movement simulation, and the shared world-level damage pipeline, and
//! drives the master/slave tick order composed in [`crate::entity::Entity`].
//!
//! Entities live in a `BTreeMap<u64, Entity>` keyed by `EntityId::to_raw()`
//! rather than `EntityId` itself, since `EntityId` has no `Ord` impl of its
//! own; raw-id order matches allocation order, which is what drives the
//! ascending-entity-id tick order entities are expected to update in.
//!
//! The batched movement step (`movement::tick_master`/`tick_slave`) writes
//! its results into a [`CommandBuffer`] as `"movement"` `SetComponent`
//! entries rather than mutating entities directly; this manager is what
//! reads that buffer back out and applies it to the right [`Entity`], since
//! the buffer's own `apply` only knows how to target the generic ECS
//! `World`, which this entity-aggregate design does not use.

use std::collections::HashMap;

use nomai_ecs::command::{CommandBuffer, CommandKind};
use nomai_ecs::entity::{EntityAllocator, EntityId};
use nomai_manifest::manifest::GameEvent;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::animator::DynamicTarget;
use crate::damage::{DamageCandidate, DamageManager, DamageNotification, DamageRequest, DamageSource};
use crate::entity::Entity;
use crate::movement::{self, MovementWorld, WorldGeometry};

/// Everything produced by one [`EntityManager::tick`] call.
#[derive(Debug, Default)]
pub struct TickOutput {
    /// Collision/drop/etc events raised this tick, in emission order.
    pub events: Vec<GameEvent>,
    /// Damage notifications produced by the damage pipeline this tick.
    pub damage_notifications: Vec<DamageNotification>,
    /// Per-entity dynamic animator targets (particle bursts, one-shot
    /// sounds) drained for entities ticked as slaves this tick -- the
    /// renderer is responsible for consuming these before they're dropped.
    pub dynamic_targets: HashMap<EntityId, DynamicTarget>,
    /// Entities destroyed (and removed from the manager) this tick.
    pub destroyed: Vec<EntityId>,
}

/// A queued world-level attack awaiting resolution on the next tick.
struct PendingDamage {
    source: DamageSource,
    position: (f64, f64),
}

/// Owns every entity in one world and drives its tick.
pub struct EntityManager {
    allocator: EntityAllocator,
    entities: BTreeMap<u64, Entity>,
    movement_world: MovementWorld,
    damage_manager: DamageManager,
    pending_damage: Vec<PendingDamage>,
    rng: Pcg32,
    tick: u64,
    sim_time: f64,
}

impl EntityManager {
    /// A fresh, empty world. `seed` drives the deterministic RNG used for
    /// animator particle variance and drop-pool rolls: same seed, same
    /// sequence of ticks, same outcomes.
    pub fn new(seed: u64) -> Self {
        Self {
            allocator: EntityAllocator::new(),
            entities: BTreeMap::new(),
            movement_world: MovementWorld::new(),
            damage_manager: DamageManager::new(),
            pending_damage: Vec::new(),
            rng: Pcg32::seed_from_u64(seed),
            tick: 0,
            sim_time: 0.0,
        }
    }

    /// Allocate a fresh entity id without inserting any entity. Callers
    /// building an [`Entity`] need the id up front, since entities are
    /// self-describing rather than stored in a generic component table.
    pub fn allocate(&mut self) -> EntityId {
        self.allocator.allocate()
    }

    /// Insert a fully-constructed entity. Its id must have come from
    /// [`EntityManager::allocate`] on this manager.
    pub fn insert(&mut self, entity: Entity) {
        if let Some(collider) = entity.collider {
            self.movement_world.register(entity.id, &entity.movement, &collider);
        }
        self.entities.insert(entity.id.to_raw(), entity);
    }

    /// Look up an entity by id.
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id.to_raw())
    }

    /// Look up an entity by id, mutably.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id.to_raw())
    }

    /// Number of currently alive entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Current tick counter.
    pub fn tick_number(&self) -> u64 {
        self.tick
    }

    /// Queue a world-level attack. Resolved against every live entity in
    /// [`EntityManager::tick`]'s damage pass, in ascending target-entity-id
    /// order.
    pub fn queue_damage(&mut self, source: DamageSource, position: (f64, f64)) {
        self.pending_damage.push(PendingDamage { source, position });
    }

    /// Remove an entity immediately (e.g. on disconnect), without running
    /// its `destroy()` drop-pool roll. Prefer letting a tick's destroy pass
    /// handle entities that die through gameplay.
    pub fn remove(&mut self, id: EntityId) {
        self.movement_world.unregister(id);
        self.entities.remove(&id.to_raw());
        self.allocator.deallocate(id);
    }

    /// Advance the whole world by one tick.
    ///
    /// Per-entity steps run in ascending entity-id order (`BTreeMap`
    /// iteration order, keyed by raw id). The batched movement step runs
    /// once for the whole world between the "before movement" and "after
    /// movement" per-entity passes, since `movement::tick_master`/
    /// `tick_slave` integrate every body together rather than one at a time.
    pub fn tick(&mut self, dt: f64, geometry: Option<&dyn WorldGeometry>) -> TickOutput {
        self.tick += 1;
        self.sim_time += dt;
        let dt32 = dt as f32;
        let mut output = TickOutput::default();

        // Master entities only: type preamble, script update, death check.
        let entity_count = self.entities.len();
        for entity in self.entities.values_mut() {
            if !entity.is_master() {
                continue;
            }
            entity.apply_type_preamble();

            let snapshot: HashMap<u64, HashMap<String, Value>> = HashMap::new();
            if let Ok(Some(script_output)) =
                entity.run_script(self.tick, self.sim_time, snapshot, entity_count)
            {
                entity.apply_self_commands(&script_output.commands);
                entity.apply_script_intents(script_output.intents);
                output.events.extend(script_output.events);
            }
            entity.check_death();
        }

        // Batched movement integration, master then slave.
        let master_bodies: Vec<_> = self
            .entities
            .values()
            .filter(|e| e.is_master())
            .map(Entity::movement_body)
            .collect();
        let mut master_commands = CommandBuffer::new();
        let collision_events = movement::tick_master(
            &mut self.movement_world,
            geometry,
            &master_bodies,
            &mut master_commands,
            dt,
            self.tick,
        );
        output.events.extend(collision_events);
        apply_movement_commands(&mut self.entities, &master_commands);

        let slave_bodies: Vec<_> = self
            .entities
            .values()
            .filter(|e| !e.is_master())
            .map(|e| (e.id, e.movement.clone()))
            .collect();
        let mut slave_commands = CommandBuffer::new();
        movement::tick_slave(&slave_bodies, &mut slave_commands, dt);
        apply_movement_commands(&mut self.entities, &slave_commands);

        // Status/animator/net sync, split by mode.
        for entity in self.entities.values_mut() {
            if entity.is_master() {
                entity.status_tick_master(dt32);
                entity.animator_update_master(dt32, &mut self.rng);
                entity.sync_net_state();
            } else {
                entity.tick_net_interpolation(dt32);
                entity.pull_net_state();
                entity.status_tick_slave(dt32);
                let target = entity.animator_update_slave(dt32, &mut self.rng);
                output.dynamic_targets.insert(entity.id, target);
            }
        }

        self.run_damage_pass(dt32, &mut output);
        self.run_destroy_pass(&mut output);

        output
    }

    /// World-level damage pipeline: queryHit -> apply -> notify, processed
    /// in ascending target-entity-id order (the order `query_hit` already
    /// sorts its results in).
    fn run_damage_pass(&mut self, dt: f32, output: &mut TickOutput) {
        self.damage_manager.update(dt);

        let pending = std::mem::take(&mut self.pending_damage);
        for PendingDamage { source, position } in pending {
            let candidates: Vec<DamageCandidate> = self
                .entities
                .values()
                .filter(|e| e.is_alive())
                .map(|e| DamageCandidate {
                    entity: e.id,
                    team: e.team,
                    x: e.movement.x,
                    y: e.movement.y,
                    radius: e.hit_radius(),
                })
                .collect();

            let hits = crate::damage::query_hit(&source, &candidates);
            for (target_id, _hit_type) in hits {
                let request = DamageRequest {
                    source_entity: source.source_entity,
                    damage: source.damage,
                    kind: source.kind,
                    knockback: source.knockback,
                    team: source.team,
                    repeat_group: source.repeat_group.clone(),
                    repeat_timeout: source.repeat_timeout,
                    elemental_type: source.elemental_type.clone(),
                    status_effects: source.status_effects.clone(),
                };

                let notification = {
                    let Some(target) = self.entities.get_mut(&target_id.to_raw()) else {
                        continue;
                    };
                    let notification =
                        target
                            .status
                            .apply_damage_request(&request, target_id, position, &mut self.damage_manager);
                    if notification.is_some() {
                        target.movement.dx += request.knockback.0;
                        target.movement.dy += request.knockback.1;
                    }
                    notification
                };

                let Some(notification) = notification else {
                    continue;
                };
                if let Some(source_id) = request.source_entity {
                    if let Some(source_entity) = self.entities.get_mut(&source_id.to_raw()) {
                        source_entity.status.hit_other(target_id, request.clone());
                        source_entity.status.damaged_other(notification.clone());
                    }
                }
                output.damage_notifications.push(notification);
            }
        }
    }

    /// Destroy every entity marked for death this tick, in ascending id
    /// order, collecting drop-pool events and removing them from the world.
    fn run_destroy_pass(&mut self, output: &mut TickOutput) {
        let dying: Vec<u64> = self
            .entities
            .iter()
            .filter(|(_, e)| e.should_destroy())
            .map(|(&raw, _)| raw)
            .collect();

        for raw in dying {
            let id = EntityId::from_raw(raw);
            if let Some(entity) = self.entities.get_mut(&raw) {
                let events = entity.destroy(self.tick, &mut self.rng);
                output.events.extend(events);
            }
            self.movement_world.unregister(id);
            self.entities.remove(&raw);
            self.allocator.deallocate(id);
            output.destroyed.push(id);
        }
    }
}

/// Read the `"movement"` `SetComponent` entries a batched movement call
/// wrote and apply each one to its target entity.
fn apply_movement_commands(entities: &mut BTreeMap<u64, Entity>, buffer: &CommandBuffer) {
    for command in buffer.commands() {
        let CommandKind::SetComponent { component_name, value } = &command.kind else {
            continue;
        };
        if component_name != "movement" {
            continue;
        }
        let Some(target) = command.target else { continue };
        let Some(entity) = entities.get_mut(&target.to_raw()) else {
            continue;
        };
        let x = value.get("x").and_then(Value::as_f64).unwrap_or(entity.movement.x);
        let y = value.get("y").and_then(Value::as_f64).unwrap_or(entity.movement.y);
        let rotation = value
            .get("rotation")
            .and_then(Value::as_f64)
            .unwrap_or(entity.movement.rotation);
        let dx = value.get("dx").and_then(Value::as_f64).unwrap_or(entity.movement.dx);
        let dy = value.get("dy").and_then(Value::as_f64).unwrap_or(entity.movement.dy);
        let seconds_since_update = value
            .get("seconds_since_update")
            .and_then(Value::as_f64)
            .unwrap_or(entity.movement.seconds_since_update);
        entity.apply_movement_result(x, y, rotation, dx, dy, seconds_since_update);
    }
}
