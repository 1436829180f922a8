//! Movement controller: master-authoritative integration and slave-side
//! extrapolation of per-entity position/velocity state.
//!
//! Mirrors the rapier2d-backed `physics` module's shape (a world
//! owned outside the ECS, synced in and out via the command buffer each
//! tick) but generalizes it to the engine's master/slave split:
//!
//! - **Master** mode runs the authoritative kinematic/dynamic integration --
//!   either manual (free-floating entities with no collider) or through
//!   rapier2d (entities carrying a [`Collider`]) -- and always produces a
//!   fresh [`MovementState`] each tick.
//! - **Slave** mode has no physics of its own. It extrapolates from the last
//!   replicated position/velocity for up to [`MAX_EXTRAPOLATION_SECS`]
//!   seconds, then holds position until the next replicated update arrives.
//!   This bounds the visible divergence between a slave's guess and the
//!   master's truth.
//!
//! World tile/terrain storage is out of scope. Where movement needs to ask
//! "is this cell solid", it goes through the narrow [`WorldGeometry`] trait
//! so the concrete geometry representation stays external to this crate.

use std::collections::HashMap;

use nomai_ecs::command::{CausalReason, CommandBuffer};
use nomai_ecs::entity::EntityId;
use nomai_ecs::identity::SystemId;
use nomai_manifest::manifest::GameEvent;
use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// System name used in manifest recording for the master-side integration step.
pub const MOVEMENT_SYSTEM_NAME: &str = "movement";

/// Bound on how long a slave entity may extrapolate past its last replicated
/// update before its velocity is zeroed and position held in place.
pub const MAX_EXTRAPOLATION_SECS: f64 = 0.25;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the movement controller.
#[derive(Debug, Error, PartialEq)]
pub enum MovementError {
    /// An anchor operation referenced a slot that does not exist on the entity.
    #[error("invalid anchor slot {slot}")]
    InvalidAnchor {
        /// The slot index that was requested.
        slot: u8,
    },
    /// An operation that requires [`WorldGeometry`] was invoked without one
    /// configured on the controller.
    #[error("operation requires world geometry to be configured")]
    WorldRequired,
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Movement mode for an entity: who is authoritative over its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementMode {
    /// This process computes the authoritative position.
    Master,
    /// Position arrives via replication; this process only extrapolates.
    Slave,
}

/// Composable movement state: position, velocity, rotation, and the
/// bookkeeping slave mode needs to bound extrapolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementState {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Facing/collider rotation in radians.
    pub rotation: f64,
    /// Horizontal velocity.
    pub dx: f64,
    /// Vertical velocity.
    pub dy: f64,
    /// Which side is authoritative for this entity.
    pub mode: MovementMode,
    /// Seconds elapsed since the last replicated update was applied.
    /// Only meaningful in [`MovementMode::Slave`]; reset to zero whenever
    /// [`apply_replicated`](Self::apply_replicated) is called.
    #[serde(default)]
    pub seconds_since_update: f64,
}

impl MovementState {
    /// A stationary master-mode body at the origin.
    pub fn master_at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            rotation: 0.0,
            dx: 0.0,
            dy: 0.0,
            mode: MovementMode::Master,
            seconds_since_update: 0.0,
        }
    }

    /// A slave-mode body awaiting its first replicated update.
    pub fn slave_at(x: f64, y: f64) -> Self {
        Self {
            mode: MovementMode::Slave,
            ..Self::master_at(x, y)
        }
    }

    /// Record a freshly replicated position/velocity and reset the
    /// extrapolation clock. Called on the slave side when a delta arrives.
    pub fn apply_replicated(&mut self, x: f64, y: f64, dx: f64, dy: f64) {
        self.x = x;
        self.y = y;
        self.dx = dx;
        self.dy = dy;
        self.seconds_since_update = 0.0;
    }
}

/// An anchor constrains an entity's position to stay within `max_distance`
/// of `origin_x`/`origin_y` (e.g. a tether, leash, or mounted-vehicle slot).
/// Exceeding the distance snaps the entity back to the boundary; an anchor
/// can also be reset, which clears any pending snap and recenters on the
/// entity's current position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementAnchor {
    /// Anchor slot identifier (multiple anchors may be layered, e.g. leash +
    /// knockback clamp); used only for error reporting.
    pub slot: u8,
    /// Anchor origin, horizontal.
    pub origin_x: f64,
    /// Anchor origin, vertical.
    pub origin_y: f64,
    /// Maximum allowed distance from the origin.
    pub max_distance: f64,
}

impl MovementAnchor {
    /// Clamp `state` to within this anchor's radius, snapping it back onto
    /// the boundary circle if it has exceeded `max_distance`.
    pub fn snap(&self, state: &mut MovementState) {
        let dx = state.x - self.origin_x;
        let dy = state.y - self.origin_y;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist > self.max_distance && dist > f64::EPSILON {
            let scale = self.max_distance / dist;
            state.x = self.origin_x + dx * scale;
            state.y = self.origin_y + dy * scale;
        }
    }

    /// Reset the anchor to center on the entity's current position, clearing
    /// any accumulated displacement. Returns an error if `slot` does not
    /// match the anchor being reset (callers look up anchors by slot first;
    /// this guards against an apply racing a despawn/respawn that changed slots).
    pub fn reset(&mut self, slot: u8, state: &MovementState) -> Result<(), MovementError> {
        if slot != self.slot {
            return Err(MovementError::InvalidAnchor { slot });
        }
        self.origin_x = state.x;
        self.origin_y = state.y;
        Ok(())
    }
}

/// Physics body kind, mirrors the `physics` module's `PhysicsBodyType` but is
/// owned here since this module supersedes direct rapier integration for
/// all movement, not just dynamic bodies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BodyKind {
    /// Fully simulated by the solver.
    Dynamic,
    /// Driven by game logic; the solver treats it as an immovable pusher.
    Kinematic,
}

/// Collider shape for a [`Collider`] component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    /// Axis-aligned box with half-extents.
    Box {
        /// Half-width along the x-axis.
        half_width: f64,
        /// Half-height along the y-axis.
        half_height: f64,
    },
    /// Circle with radius.
    Circle {
        /// Circle radius.
        radius: f64,
    },
}

/// Attach to a master-mode entity to route its integration through rapier2d
/// instead of the manual free-floating integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    /// Solver treatment for this body.
    pub kind: BodyKind,
    /// Shape used for narrow-phase collision.
    pub shape: ColliderShape,
    /// Coefficient of restitution (bounciness).
    pub restitution: f64,
}

// ---------------------------------------------------------------------------
// WorldGeometry
// ---------------------------------------------------------------------------

/// Narrow capability interface onto world tile/terrain storage.
///
/// World geometry itself (tile grids, chunk storage, biome data) is out of
/// scope for this crate; callers that own that storage implement this trait
/// so the movement controller can ask the one question it needs: whether a
/// point is inside solid terrain.
pub trait WorldGeometry {
    /// Returns `true` if world-space point `(x, y)` is inside solid terrain.
    fn is_solid(&self, x: f64, y: f64) -> bool;

    /// World width in the wraparound axis, or `None` if the world does not
    /// wrap (e.g. a bounded arena). When `Some(width)`, master integration
    /// wraps `x` into `[0, width)` every tick, matching a toroidal overworld.
    fn wrap_width(&self) -> Option<f64> {
        None
    }
}

// ---------------------------------------------------------------------------
// MovementWorld (rapier-backed bodies)
// ---------------------------------------------------------------------------

/// Owns the rapier2d simulation for entities carrying a [`Collider`].
/// Entities with only a [`MovementState`] (no collider) are integrated
/// manually in [`tick_master`] and never registered here.
pub struct MovementWorld {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    entity_to_body: HashMap<u64, RigidBodyHandle>,
    collider_to_entity: HashMap<ColliderHandle, u64>,
}

impl MovementWorld {
    /// Create an empty rapier world with zero gravity (top-down simulation;
    /// vertical "down" has no special meaning in a 2D sandbox world).
    pub fn new() -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![0.0, 0.0],
            integration_params: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            entity_to_body: HashMap::new(),
            collider_to_entity: HashMap::new(),
        }
    }

    /// Register (or re-sync, if already registered) a collidable entity.
    pub fn register(&mut self, entity: EntityId, state: &MovementState, collider: &Collider) {
        let raw_id = entity.to_raw();
        if let Some(&handle) = self.entity_to_body.get(&raw_id) {
            if let Some(rb) = self.rigid_body_set.get_mut(handle) {
                rb.set_translation(vector![state.x as Real, state.y as Real], true);
                rb.set_linvel(vector![state.dx as Real, state.dy as Real], true);
            }
            return;
        }

        let rb = match collider.kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_velocity_based(),
        }
        .translation(vector![state.x as Real, state.y as Real])
        .linvel(vector![state.dx as Real, state.dy as Real])
        .build();

        let handle = self.rigid_body_set.insert(rb);
        self.entity_to_body.insert(raw_id, handle);

        let shape: SharedShape = match collider.shape {
            ColliderShape::Box {
                half_width,
                half_height,
            } => SharedShape::cuboid(half_width as Real, half_height as Real),
            ColliderShape::Circle { radius } => SharedShape::ball(radius as Real),
        };
        let col = ColliderBuilder::new(shape)
            .restitution(collider.restitution as Real)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        let col_handle = self
            .collider_set
            .insert_with_parent(col, handle, &mut self.rigid_body_set);
        self.collider_to_entity.insert(col_handle, raw_id);
    }

    /// Remove an entity from the simulation (no-op if unregistered).
    pub fn unregister(&mut self, entity: EntityId) {
        let raw_id = entity.to_raw();
        if let Some(handle) = self.entity_to_body.remove(&raw_id) {
            self.rigid_body_set.remove(
                handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            );
            self.collider_to_entity.retain(|_, e| *e != raw_id);
        }
    }

    /// Advance the simulation by `dt` seconds and return deterministically
    /// ordered collision pairs that started this step.
    pub fn step(&mut self, dt: f64) -> Vec<(EntityId, EntityId)> {
        self.integration_params.dt = dt as Real;

        let (collision_send, collision_recv) =
            rapier2d::crossbeam::channel::unbounded::<CollisionEvent>();
        let (force_send, _force_recv) =
            rapier2d::crossbeam::channel::unbounded::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &event_handler,
        );

        let mut pairs = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            if let CollisionEvent::Started(h1, h2, _flags) = event {
                let a = self.collider_to_entity.get(&h1).copied();
                let b = self.collider_to_entity.get(&h2).copied();
                if let (Some(a), Some(b)) = (a, b) {
                    pairs.push((EntityId::from_raw(a), EntityId::from_raw(b)));
                }
            }
        }
        pairs.sort_by_key(|(a, b)| {
            let (a, b) = (a.to_raw(), b.to_raw());
            (a.min(b), a.max(b))
        });
        pairs
    }

    /// Read back updated position/velocity for every registered dynamic
    /// body, sorted by raw entity ID for deterministic iteration.
    pub fn read_results(&self) -> Vec<(EntityId, f64, f64, f64, f64)> {
        let mut out = Vec::new();
        for (&raw_id, &handle) in &self.entity_to_body {
            if let Some(rb) = self.rigid_body_set.get(handle) {
                if !rb.is_dynamic() {
                    continue;
                }
                let t = rb.translation();
                let v = rb.linvel();
                out.push((
                    EntityId::from_raw(raw_id),
                    t.x as f64,
                    t.y as f64,
                    v.x as f64,
                    v.y as f64,
                ));
            }
        }
        out.sort_by_key(|(eid, ..)| eid.to_raw());
        out
    }

    /// Whether `entity` currently has a rapier body registered.
    pub fn has_entity(&self, entity: EntityId) -> bool {
        self.entity_to_body.contains_key(&entity.to_raw())
    }
}

impl Default for MovementWorld {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Deterministic segment/box intersection (projectile bounce tie-breaking)
// ---------------------------------------------------------------------------

/// An axis-aligned box used by [`nearest_bounce_normal`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum x.
    pub min_x: f64,
    /// Minimum y.
    pub min_y: f64,
    /// Maximum x.
    pub max_x: f64,
    /// Maximum y.
    pub max_y: f64,
}

/// Which face of an [`Aabb`] a segment crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceAxis {
    /// Crossed a vertical (min_x or max_x) face; reflect the x velocity.
    X,
    /// Crossed a horizontal (min_y or max_y) face; reflect the y velocity.
    Y,
}

/// Find the axis a moving point's segment from `(x0, y0)` to `(x1, y1)`
/// crosses first when entering `aabb`, for deciding which velocity
/// component a projectile should reflect on bounce.
///
/// Standard slab-method ray/AABB intersection returns a parametric `t` per
/// axis; when both axes produce the same `t` (an exact corner hit), the tie
/// is broken in favor of the lower axis index (`X` before `Y`) so that two
/// independent runs computing the same geometry always pick the same
/// reflection axis. Returns `None` if the segment never enters `aabb`.
pub fn nearest_bounce_normal(x0: f64, y0: f64, x1: f64, y1: f64, aabb: Aabb) -> Option<BounceAxis> {
    let dx = x1 - x0;
    let dy = y1 - y0;

    let (tx_enter, tx_exit) = slab(x0, dx, aabb.min_x, aabb.max_x)?;
    let (ty_enter, ty_exit) = slab(y0, dy, aabb.min_y, aabb.max_y)?;

    let enter = tx_enter.max(ty_enter);
    let exit = tx_exit.min(ty_exit);
    if enter > exit || exit < 0.0 || enter > 1.0 {
        return None;
    }

    // Tie-break: lower axis index (X) wins on an exact corner hit.
    if tx_enter >= ty_enter {
        Some(BounceAxis::X)
    } else {
        Some(BounceAxis::Y)
    }
}

/// Slab test for one axis; returns `(t_enter, t_exit)` or `None` if the
/// segment is parallel to the slab and starts outside it.
fn slab(origin: f64, delta: f64, min: f64, max: f64) -> Option<(f64, f64)> {
    if delta.abs() < f64::EPSILON {
        return if origin >= min && origin <= max {
            Some((f64::NEG_INFINITY, f64::INFINITY))
        } else {
            None
        };
    }
    let t1 = (min - origin) / delta;
    let t2 = (max - origin) / delta;
    if t1 <= t2 {
        Some((t1, t2))
    } else {
        Some((t2, t1))
    }
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Integrate every master-mode entity for one tick.
///
/// Entities with a [`Collider`] are synced into `movement_world` and stepped
/// through rapier; collisions are converted to [`GameEvent`]s. Entities
/// without a collider integrate manually (`position += velocity * dt`),
/// then have any [`MovementAnchor`] applied and are wrapped into
/// `geometry`'s wrap width if configured.
#[allow(clippy::too_many_arguments)]
pub fn tick_master(
    movement_world: &mut MovementWorld,
    geometry: Option<&dyn WorldGeometry>,
    bodies: &[(EntityId, MovementState, Option<Collider>, Option<MovementAnchor>)],
    commands: &mut CommandBuffer,
    dt: f64,
    tick: u64,
) -> Vec<GameEvent> {
    for (entity, state, collider, _) in bodies {
        if state.mode != MovementMode::Master {
            continue;
        }
        if let Some(collider) = collider {
            movement_world.register(*entity, state, collider);
        }
    }

    let collisions = movement_world.step(dt);
    let events: Vec<GameEvent> = collisions
        .iter()
        .map(|(a, b)| GameEvent {
            event_type: "movement_collision".to_owned(),
            description: format!("collision between entity {a} and entity {b}"),
            involved_entities: vec![*a, *b],
            caused_by: SystemId::MOVEMENT,
            reason: CausalReason::CollisionResponse(*a, *b),
            tick,
        })
        .collect();

    for (entity, x, y, dx, dy) in movement_world.read_results() {
        emit_state(commands, entity, x, y, dx, dy, MovementMode::Master);
    }

    for (entity, state, collider, anchor) in bodies {
        if state.mode != MovementMode::Master || collider.is_some() {
            continue;
        }
        let mut next = state.clone();
        next.x += next.dx * dt;
        next.y += next.dy * dt;
        if let Some(anchor) = anchor {
            anchor.snap(&mut next);
        }
        if let Some(geometry) = geometry {
            if let Some(width) = geometry.wrap_width() {
                next.x = next.x.rem_euclid(width);
            }
        }
        emit_state(commands, *entity, next.x, next.y, next.dx, next.dy, MovementMode::Master);
    }

    events
}

/// Extrapolate every slave-mode entity for one tick.
///
/// Uses the last replicated velocity to project position forward, bounded
/// by [`MAX_EXTRAPOLATION_SECS`]: once `seconds_since_update` exceeds the
/// bound, velocity is zeroed so the entity holds its last known position
/// rather than drifting indefinitely ahead of the next replicated update.
pub fn tick_slave(
    bodies: &[(EntityId, MovementState)],
    commands: &mut CommandBuffer,
    dt: f64,
) {
    for (entity, state) in bodies {
        if state.mode != MovementMode::Slave {
            continue;
        }
        let elapsed = state.seconds_since_update + dt;
        let (dx, dy) = if elapsed > MAX_EXTRAPOLATION_SECS {
            (0.0, 0.0)
        } else {
            (state.dx, state.dy)
        };
        let x = state.x + dx * dt;
        let y = state.y + dy * dt;

        commands.set_component(
            *entity,
            "movement",
            serde_json::json!({
                "x": x, "y": y, "rotation": state.rotation,
                "dx": dx, "dy": dy, "mode": "Slave",
                "seconds_since_update": elapsed,
            }),
            SystemId::MOVEMENT,
            CausalReason::SystemInternal("movement_extrapolate".to_owned()),
        );
    }
}

fn emit_state(
    commands: &mut CommandBuffer,
    entity: EntityId,
    x: f64,
    y: f64,
    dx: f64,
    dy: f64,
    mode: MovementMode,
) {
    commands.set_component(
        entity,
        "movement",
        serde_json::json!({
            "x": x, "y": y, "rotation": 0.0,
            "dx": dx, "dy": dy,
            "mode": match mode { MovementMode::Master => "Master", MovementMode::Slave => "Slave" },
            "seconds_since_update": 0.0,
        }),
        SystemId::MOVEMENT,
        CausalReason::SystemInternal("movement_integrate".to_owned()),
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
