//! Entity aggregate (§4.7): the owning composition of movement, status,
//! animator, and script state for a single simulated entity.
//!
//! An [`Entity`] does not run on top of the generic [`nomai_ecs::world::World`]
//! component store -- it is a plain struct, matching the way
//! [`crate::movement`]/[`crate::status`]/[`crate::damage`]/[`crate::animator`]
//! are already written. Its own [`NetElementGroup`] mirrors the
//! non-net-managed fields (position, rotation, velocity, alive flag) that
//! need to replicate; the [`NetworkedAnimator`] carries a second,
//! independently-versioned tree. The two are never merged into a single
//! version space -- an [`EntityDelta`] ships both halves side by side.
//!
//! [`Entity`] owns everything a tick touches *except* the cross-entity
//! batched movement integration (`movement::tick_master`/`tick_slave`
//! operate over every master/slave body in the world at once) and the
//! world-level [`crate::damage::DamageManager`] -- those stay with
//! [`crate::manager::EntityManager`], which drives this struct's tick
//! methods in the order §4.7 specifies.

use nomai_ecs::command::{CausalReason, CommandBuffer};
use nomai_ecs::entity::EntityId;
use nomai_ecs::identity::SystemId;
use nomai_ecs::net::{NetElementGroup, NetHandle};
use nomai_ecs::team::Team;
use nomai_manifest::manifest::GameEvent;
use nomai_wasm_host::{IntentNamespace, ScriptIntent};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::animator::{DynamicTarget, NetworkedAnimator};
use crate::config::{ConfigError, VariantConfig};
use crate::movement::{Collider, MovementAnchor, MovementMode, MovementState};
use crate::script::{ScriptError, ScriptHandle, ScriptTickOutput};
use crate::status::StatusController;

/// Schema version for an entity's own net tree, independent of
/// [`crate::animator::ANIMATOR_VERSION`].
pub const ENTITY_VERSION: u8 = 1;

/// Hit-test radius assumed for an entity carrying no [`Collider`].
pub const DEFAULT_HIT_RADIUS: f64 = 0.5;

/// Errors raised while constructing an entity from variant configuration.
///
/// Mirrors §7's `InvalidConfig`: surfaced at construction, the entity is
/// never created.
#[derive(Debug, Error)]
pub enum EntityError {
    /// A required configuration key was missing or the wrong shape.
    #[error("invalid entity config: {0}")]
    InvalidConfig(#[from] ConfigError),
    /// The script bytecode failed to load.
    #[error("script failed to load: {0}")]
    Script(#[from] ScriptError),
}

/// Broad category of an entity (§4.7 "type-specific preamble" / "type-specific
/// state"). Drives [`Entity::apply_type_preamble`] and [`Entity::destroy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// A player-controlled character.
    Player,
    /// A non-hostile, non-player character.
    Npc,
    /// A hostile creature with variant data and a drop pool.
    Monster,
    /// A dropped item pickup.
    ItemDrop,
    /// A projectile with a flight config and travel line.
    Projectile,
    /// An inert or interactive world object.
    Object,
    /// A growable/harvestable plant.
    Plant,
    /// A transient visual/audio effect with no gameplay state.
    Effect,
}

/// One entry in a monster/object's loot table: drop `item` with independent
/// probability `chance` (0.0-1.0) on [`Entity::destroy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropPoolEntry {
    /// The item identifier to drop.
    pub item: String,
    /// Independent probability this entry drops, evaluated once per destroy.
    pub chance: f32,
}

/// The net-element handles mirroring an entity's non-net-managed fields.
struct NetMirror {
    x: NetHandle,
    y: NetHandle,
    rotation: NetHandle,
    dx: NetHandle,
    dy: NetHandle,
    alive: NetHandle,
}

impl NetMirror {
    fn install(group: &mut NetElementGroup) -> Self {
        Self {
            x: group.add_float(0.0, true),
            y: group.add_float(0.0, true),
            rotation: group.add_float(0.0, true),
            dx: group.add_float(0.0, false),
            dy: group.add_float(0.0, false),
            alive: group.add_bool(true),
        }
    }
}

/// A replicated delta for one entity: its own net tree (movement/alive
/// mirrors) plus the animator's independently-versioned tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDelta {
    /// New version of the entity's own net tree after this write.
    pub entity_version: u64,
    /// Delta bytes for the entity's own net tree.
    pub entity_bytes: Vec<u8>,
    /// New version of the animator's net tree after this write.
    pub animator_version: u64,
    /// Delta bytes for the animator's net tree.
    pub animator_bytes: Vec<u8>,
}

/// One simulated entity: movement, status, animator, optional script, and
/// type-specific state, composed per §4.7.
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub team: Team,
    pub movement: MovementState,
    pub anchor: Option<MovementAnchor>,
    pub collider: Option<Collider>,
    pub status: StatusController,
    pub animator: NetworkedAnimator,
    pub script: Option<ScriptHandle>,
    pub drop_pool: Vec<DropPoolEntry>,

    net: NetElementGroup,
    mirror: NetMirror,
    alive: bool,
    destroy_requested: bool,
}

impl Entity {
    /// Assemble an entity from already-constructed subsystem state. Entity
    /// variant configuration parsing (§6 "configuration surface") is a
    /// separate concern layered on top -- see [`Entity::from_config`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: EntityId,
        kind: EntityKind,
        team: Team,
        movement: MovementState,
        anchor: Option<MovementAnchor>,
        collider: Option<Collider>,
        status: StatusController,
        animator: NetworkedAnimator,
        script: Option<ScriptHandle>,
    ) -> Self {
        let mut net = NetElementGroup::new();
        let mirror = NetMirror::install(&mut net);
        Self {
            id,
            kind,
            team,
            movement,
            anchor,
            collider,
            status,
            animator,
            script,
            drop_pool: Vec::new(),
            net,
            mirror,
            alive: true,
            destroy_requested: false,
        }
    }

    /// Build an entity from a merged [`VariantConfig`] (§6 configuration
    /// surface: `movementSettings`, `statusSettings`, `animatorConfig`,
    /// `damageTeamType`, `dropPoolConfig`). Scripts, if configured under
    /// `scripts`, are loaded from `script_bytecode` (fetched by the caller --
    /// asset I/O is out of scope here).
    pub fn from_config(
        id: EntityId,
        kind: EntityKind,
        mode: MovementMode,
        config: &VariantConfig,
        script_bytecode: Option<(&nomai_wasm_host::WasmConfig, &[u8])>,
    ) -> Result<Self, EntityError> {
        #[derive(Deserialize)]
        struct MovementSettings {
            #[serde(default)]
            x: f64,
            #[serde(default)]
            y: f64,
        }
        let movement_settings: MovementSettings = config.get_at("movementSettings")?;
        let movement = match mode {
            MovementMode::Master => MovementState::master_at(movement_settings.x, movement_settings.y),
            MovementMode::Slave => MovementState::slave_at(movement_settings.x, movement_settings.y),
        };

        #[derive(Deserialize)]
        struct StatusSettings {
            #[serde(default)]
            base_stats: HashMap<String, f32>,
            #[serde(default)]
            resources: HashMap<String, f32>,
        }
        let status_settings: StatusSettings = config.query("statusSettings").map_or_else(
            || {
                Ok(StatusSettings {
                    base_stats: HashMap::new(),
                    resources: HashMap::new(),
                })
            },
            |v| serde_json::from_value(v.clone()).map_err(|source| ConfigError::WrongType {
                path: "statusSettings".to_owned(),
                source,
            }),
        )?;
        let resources = status_settings
            .resources
            .into_iter()
            .map(|(name, max)| (name, crate::status::Resource::capped(max)))
            .collect();
        let status = StatusController::new(status_settings.base_stats, resources);

        #[derive(Deserialize, Default)]
        struct AnimatorConfig {
            #[serde(default)]
            machines: Vec<(String, Vec<(String, crate::animator::StateDef)>)>,
        }
        let animator_config: AnimatorConfig = config
            .query("animatorConfig")
            .map_or_else(
                || Ok(AnimatorConfig::default()),
                |v| serde_json::from_value(v.clone()).map_err(|source| ConfigError::WrongType {
                    path: "animatorConfig".to_owned(),
                    source,
                }),
            )?;
        let animator = NetworkedAnimator::new(animator_config.machines);

        let team_type = config.get_at("damageTeamType")?;
        let team_number = config.query("damageTeamNumber").and_then(Value::as_u64).unwrap_or(0) as u16;
        let team = Team::new(team_type, team_number);

        let script = match (config.query("scripts"), script_bytecode) {
            (Some(scripts), Some((wasm_config, bytecode))) if scripts.is_array() || scripts.is_string() => {
                let update_delta = config
                    .query("scriptDelta")
                    .and_then(Value::as_u64)
                    .unwrap_or(1) as u32;
                let ctx = crate::script::ScriptContext::load(
                    wasm_config,
                    bytecode,
                    update_delta,
                    config.clone(),
                )?;
                Some(ScriptHandle::new(id, ctx))
            }
            _ => None,
        };

        let drop_pool: Vec<DropPoolEntry> = config
            .query("dropPoolConfig")
            .map(|v| serde_json::from_value(v.clone()).unwrap_or_default())
            .unwrap_or_default();

        let mut entity = Self::new(id, kind, team, movement, None, None, status, animator, script);
        entity.drop_pool = drop_pool;
        Ok(entity)
    }

    /// `true` if this entity is master-authoritative for its own movement.
    pub fn is_master(&self) -> bool {
        self.movement.mode == MovementMode::Master
    }

    /// Hit-test radius for the damage pipeline's `DamageCandidate`: the
    /// collider's own radius (circle) or bounding half-extent (box), or
    /// [`DEFAULT_HIT_RADIUS`] when this entity carries no collider.
    pub fn hit_radius(&self) -> f64 {
        match self.collider.map(|c| c.shape) {
            Some(crate::movement::ColliderShape::Circle { radius }) => radius,
            Some(crate::movement::ColliderShape::Box { half_width, half_height }) => half_width.max(half_height),
            None => DEFAULT_HIT_RADIUS,
        }
    }

    /// The tuple [`crate::movement::tick_master`]/[`crate::movement::tick_slave`]
    /// need, for the manager to batch across every entity in the world.
    pub fn movement_body(&self) -> (EntityId, MovementState, Option<Collider>, Option<MovementAnchor>) {
        (self.id, self.movement.clone(), self.collider, self.anchor.clone())
    }

    /// Write back the result of the batched movement integration for this
    /// tick (§4.7 step 5 on master, or the slave-side extrapolation).
    pub fn apply_movement_result(&mut self, x: f64, y: f64, rotation: f64, dx: f64, dy: f64, seconds_since_update: f64) {
        self.movement.x = x;
        self.movement.y = y;
        self.movement.rotation = rotation;
        self.movement.dx = dx;
        self.movement.dy = dy;
        self.movement.seconds_since_update = seconds_since_update;
    }

    /// §4.7 step 2: type-specific preamble. Monsters/NPCs flip their
    /// animator to match their current facing; other kinds have none.
    pub fn apply_type_preamble(&mut self) {
        if matches!(self.kind, EntityKind::Monster | EntityKind::Npc) && self.movement.dx.abs() > f64::EPSILON {
            self.animator.set_flipped(self.movement.dx < 0.0);
        }
    }

    /// §4.7 step 3: run the script's `update`, if one is attached and this
    /// tick isn't gated out by `update_delta`. Returns `None` if there is no
    /// script, the call was gated, or the script is currently errored.
    pub fn run_script(
        &mut self,
        tick: u64,
        sim_time: f64,
        snapshot: HashMap<u64, HashMap<String, Value>>,
        entity_count: usize,
    ) -> Result<Option<ScriptTickOutput>, ScriptError> {
        match &mut self.script {
            Some(handle) => handle.tick(tick, sim_time, snapshot, entity_count),
            None => Ok(None),
        }
    }

    /// Dispatch a script's namespaced writes (§4.6 `status`/`mcontroller`/
    /// `animator` bindings) to the real subsystems. `commands`/`events` from
    /// the same [`ScriptTickOutput`] are the caller's to apply against the
    /// world; only the narrow per-entity namespaces are handled here.
    pub fn apply_script_intents(&mut self, intents: Vec<ScriptIntent>) {
        for intent in intents {
            match intent.namespace {
                IntentNamespace::Status => self.apply_status_intent(&intent.verb, &intent.name, &intent.args),
                IntentNamespace::MController => self.apply_movement_intent(&intent.verb, &intent.name, &intent.args),
                IntentNamespace::Animator => self.apply_animator_intent(&intent.verb, &intent.name, &intent.args),
            }
        }
    }

    fn apply_status_intent(&mut self, verb: &str, name: &str, args: &Value) {
        let value = args.get("value").and_then(Value::as_f64).or_else(|| args.as_f64());
        match verb {
            "set" => {
                if let Some(v) = value {
                    let _ = self.status.set_resource(name, v as f32);
                }
            }
            "modify" => {
                let amount = args.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
                let _ = self.status.modify_resource(name, amount as f32);
            }
            _ => tracing::trace!(verb, name, "unhandled status intent verb"),
        }
    }

    fn apply_movement_intent(&mut self, verb: &str, name: &str, args: &Value) {
        if verb != "command" {
            tracing::trace!(verb, name, "unhandled mcontroller intent verb");
            return;
        }
        match name {
            "velocity" => {
                self.movement.dx = args.get("dx").and_then(Value::as_f64).unwrap_or(self.movement.dx);
                self.movement.dy = args.get("dy").and_then(Value::as_f64).unwrap_or(self.movement.dy);
            }
            "teleport" => {
                self.movement.x = args.get("x").and_then(Value::as_f64).unwrap_or(self.movement.x);
                self.movement.y = args.get("y").and_then(Value::as_f64).unwrap_or(self.movement.y);
            }
            "reset_anchor" => {
                if let Some(slot) = args.get("slot").and_then(Value::as_u64) {
                    if let Some(anchor) = &mut self.anchor {
                        let _ = anchor.reset(slot as u8, &self.movement);
                    }
                }
            }
            _ => tracing::trace!(name, "unhandled mcontroller command"),
        }
    }

    fn apply_animator_intent(&mut self, verb: &str, name: &str, args: &Value) {
        match verb {
            "set_state" => {
                let state = args.get("state").and_then(Value::as_str).unwrap_or_default();
                let start_new = args.get("start_new").and_then(Value::as_bool).unwrap_or(true);
                let reverse = args.get("reverse").and_then(Value::as_bool).unwrap_or(false);
                self.animator.set_state(name, state, start_new, reverse);
            }
            "trigger" => {
                if self.animator.has_particle_emitter(name) {
                    self.animator.burst_particle_emitter(name);
                }
            }
            _ => tracing::trace!(verb, name, "unhandled animator intent verb"),
        }
    }

    /// §4.7 step 4: mark this entity for death if its script reports
    /// `shouldDie()` or its `"health"` resource has depleted.
    pub fn check_death(&mut self) {
        if self.destroy_requested {
            return;
        }
        let script_wants_death = self
            .script
            .as_mut()
            .map(|s| s.context.should_die())
            .unwrap_or(false);
        let health_depleted = self
            .status
            .resource("health")
            .map(|h| h <= 0.0)
            .unwrap_or(false);
        if script_wants_death || health_depleted {
            self.destroy_requested = true;
        }
    }

    /// §4.7 "shouldDestroy()": `true` once the manager should remove this
    /// entity from the world.
    pub fn should_destroy(&self) -> bool {
        self.destroy_requested
    }

    /// §4.7 "destroy(render?)": type-specific cleanup side effects. Rolls
    /// the drop pool (each entry independently, via `rng`) and returns the
    /// resulting events; the manager despawns the entity afterward.
    pub fn destroy(&mut self, tick: u64, rng: &mut impl Rng) -> Vec<GameEvent> {
        self.alive = false;
        let mut events = Vec::new();
        if matches!(self.kind, EntityKind::Monster | EntityKind::Object | EntityKind::Plant) {
            for entry in &self.drop_pool {
                if rng.gen::<f32>() < entry.chance {
                    events.push(GameEvent {
                        event_type: "item_drop".to_owned(),
                        description: format!("entity {} dropped {}", self.id, entry.item),
                        involved_entities: vec![self.id],
                        caused_by: SystemId::ENGINE_INTERNAL,
                        reason: CausalReason::GameRule("drop_pool".to_owned()),
                        tick,
                    });
                }
            }
        }
        events
    }

    /// §4.7 step 6 (master): tick status effect durations and observer streams.
    pub fn status_tick_master(&mut self, dt: f32) {
        self.status.tick_master(dt);
    }

    /// §4.7 step 3 (slave): status has no authoritative ticking on a slave.
    pub fn status_tick_slave(&mut self, dt: f32) {
        self.status.tick_slave(dt);
    }

    /// §4.7 step 7 (master): advance the animator with no dynamic target.
    pub fn animator_update_master(&mut self, dt: f32, rng: &mut impl Rng) {
        let mut target = DynamicTarget::new();
        self.animator.update(dt, &mut target, rng);
    }

    /// §4.7 step 4 (slave): advance the animator, draining the dynamic
    /// target for the caller (renderer/audio layer) to consume.
    pub fn animator_update_slave(&mut self, dt: f32, rng: &mut impl Rng) -> DynamicTarget {
        let mut target = DynamicTarget::new();
        self.animator.update(dt, &mut target, rng);
        target
    }

    /// §4.7 step 8: push current non-net-managed fields into their
    /// net-element mirrors. Master-side only.
    pub fn sync_net_state(&mut self) {
        self.net.set_float(self.mirror.x, self.movement.x as f32);
        self.net.set_float(self.mirror.y, self.movement.y as f32);
        self.net.set_float(self.mirror.rotation, self.movement.rotation as f32);
        self.net.set_float(self.mirror.dx, self.movement.dx as f32);
        self.net.set_float(self.mirror.dy, self.movement.dy as f32);
        self.net.set_bool(self.mirror.alive, self.alive);
    }

    /// Slave-side "getNetStates(initial=false)": pull mirrored fields back
    /// into local aggregate state after the net tree has interpolated.
    pub fn pull_net_state(&mut self) {
        let x = self.net.get_float(self.mirror.x) as f64;
        let y = self.net.get_float(self.mirror.y) as f64;
        let dx = self.net.get_float(self.mirror.dx) as f64;
        let dy = self.net.get_float(self.mirror.dy) as f64;
        self.movement.rotation = self.net.get_float(self.mirror.rotation) as f64;
        self.movement.apply_replicated(x, y, dx, dy);
        self.alive = self.net.get_bool(self.mirror.alive);
    }

    /// Slave-side "netGroup.tickNetInterpolation(dt)": advance the entity's
    /// own net tree's float interpolation (the animator ticks its own
    /// separately via `animator.update`).
    pub fn tick_net_interpolation(&mut self, dt: f32) {
        self.net.tick_interpolation(dt);
    }

    /// Produce a combined delta for replication, given the last versions the
    /// receiving connection has seen of both trees.
    pub fn write_delta(&self, from_entity_version: u64, from_animator_version: u64) -> EntityDelta {
        let (entity_bytes, entity_version) = self.net.write_delta(from_entity_version);
        let (animator_bytes, animator_version) = self.animator.write_delta(from_animator_version);
        EntityDelta {
            entity_version,
            entity_bytes,
            animator_version,
            animator_bytes,
        }
    }

    /// Apply a combined delta received over replication (slave side).
    pub fn read_delta(&mut self, delta: &EntityDelta, interpolation_time: f32) {
        self.net.read_delta(&delta.entity_bytes, interpolation_time);
        self.animator.read_delta(&delta.animator_bytes, interpolation_time);
    }

    /// Current net tree version, for a freshly-joined connection's initial sync.
    pub fn entity_net_version(&self) -> u64 {
        self.net.version()
    }

    /// Current animator tree version, for a freshly-joined connection's initial sync.
    pub fn animator_net_version(&self) -> u64 {
        self.animator.write_delta(0).1
    }

    /// `false` once [`Entity::destroy`] has run.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Apply a [`CommandBuffer`] produced by [`Entity::run_script`]'s
    /// `ScriptTickOutput::commands` against this entity's own fields, for
    /// the narrow set of component names the script surface understands.
    /// Generic spawn/despawn commands from scripts are intentionally not
    /// interpreted here -- see `DESIGN.md`.
    pub fn apply_self_commands(&mut self, commands: &CommandBuffer) {
        use nomai_ecs::command::CommandKind;
        for command in commands.commands() {
            if command.target != Some(self.id) {
                continue;
            }
            if let CommandKind::Despawn = &command.kind {
                self.destroy_requested = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Resource;
    use nomai_ecs::team::TeamType;
    use std::collections::HashMap as Map;

    fn entity(id: u32) -> Entity {
        let movement = MovementState::master_at(0.0, 0.0);
        let status = StatusController::new(Map::new(), {
            let mut m = Map::new();
            m.insert("health".to_owned(), Resource::capped(100.0));
            m
        });
        let animator = NetworkedAnimator::new(vec![]);
        Entity::new(
            EntityId::new(id, 0),
            EntityKind::Monster,
            Team::new(TeamType::Enemy, 0),
            movement,
            None,
            None,
            status,
            animator,
            None,
        )
    }

    #[test]
    fn sync_then_pull_round_trips_position() {
        let mut master = entity(1);
        master.movement.x = 5.0;
        master.movement.y = -2.0;
        master.movement.dx = 1.5;
        master.sync_net_state();
        let (bytes, _) = master.net.write_delta(0);

        let mut slave = entity(1);
        slave.movement.mode = MovementMode::Slave;
        slave.net.read_delta(&bytes, 0.0);
        slave.pull_net_state();

        assert_eq!(slave.movement.x, 5.0);
        assert_eq!(slave.movement.y, -2.0);
        assert_eq!(slave.movement.dx, 1.5);
    }

    #[test]
    fn health_depletion_marks_for_death() {
        let mut e = entity(1);
        assert!(!e.should_destroy());
        let _ = e.status.modify_resource("health", -1000.0);
        e.check_death();
        assert!(e.should_destroy());
    }

    #[test]
    fn destroy_rolls_drop_pool_deterministically_with_seeded_rng() {
        use rand::SeedableRng;
        let mut e = entity(1);
        e.drop_pool.push(DropPoolEntry {
            item: "bone".to_owned(),
            chance: 1.0,
        });
        let mut rng = rand_pcg::Pcg32::seed_from_u64(0);
        let events = e.destroy(0, &mut rng);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "item_drop");
    }

    #[test]
    fn movement_intent_sets_velocity() {
        let mut e = entity(1);
        e.apply_movement_intent("command", "velocity", &serde_json::json!({"dx": 3.0, "dy": -1.0}));
        assert_eq!(e.movement.dx, 3.0);
        assert_eq!(e.movement.dy, -1.0);
    }

    #[test]
    fn status_intent_set_writes_resource() {
        let mut e = entity(1);
        e.apply_status_intent("set", "health", &serde_json::json!(42.0));
        assert_eq!(e.status.resource("health").unwrap(), 42.0);
    }

    #[test]
    fn not_alive_after_destroy() {
        let mut e = entity(1);
        let mut rng = rand::thread_rng();
        assert!(e.is_alive());
        e.destroy(0, &mut rng);
        assert!(!e.is_alive());
    }
}
