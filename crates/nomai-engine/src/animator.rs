//! Networked animator: replicated state machines, transformation/rotation
//! groups, particle emitters, lights, and sound pools.
//!
//! Rendering and audio playback are out of scope for this crate -- parts,
//! drawables, and `AudioInstance`s never appear here. What replicates is the
//! *data* a renderer/audio layer downstream would consume: which frame a
//! state machine is on, a transformation group's composed matrix, how many
//! particles an emitter produced this tick, which sound pool entry to play.
//! [`DynamicTarget`] is the pull surface for that transient per-tick output.
//!
//! Every mutable field is a [`nomai_ecs::net::NetElementGroup`] leaf (or a
//! small bundle of leaves); there is no separate diffing pass; replication
//! is just [`NetworkedAnimator::write_delta`]/[`NetworkedAnimator::read_delta`]
//! on the underlying group.

use std::collections::HashMap;

use nomai_ecs::net::{NetElementGroup, NetHandle};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Schema version written alongside every delta so an older reader can skip
/// trailing state it doesn't understand.
pub const ANIMATOR_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// State machines
// ---------------------------------------------------------------------------

/// One named state within a state machine: how many frames it has and how
/// fast they advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDef {
    /// Seconds per frame before `globalAnimationRate` scaling.
    pub frame_time: f32,
    /// Number of frames in this state.
    pub frame_count: u32,
    /// Whether the state repeats from frame 0 after the last frame.
    pub looping: bool,
}

struct Machine {
    states: Vec<(String, StateDef)>,
    current_index: NetHandle,
    reverse: NetHandle,
    started_event: NetHandle,
    timer: f32,
}

/// Replicated state machines, transformation/rotation groups, particle
/// emitters, lights, and sound pools for one entity.
pub struct NetworkedAnimator {
    group: NetElementGroup,
    animation_rate: NetHandle,
    zoom: NetHandle,
    flipped: NetHandle,
    global_tags: HashMap<String, String>,
    part_tags: HashMap<String, HashMap<String, String>>,
    machines: HashMap<String, Machine>,
    transformation_groups: HashMap<String, TransformationGroup>,
    rotation_groups: HashMap<String, RotationGroup>,
    particle_emitters: HashMap<String, ParticleEmitter>,
    lights: HashMap<String, Light>,
    sounds: HashMap<String, Sound>,
}

impl NetworkedAnimator {
    /// Construct an animator with the given state machine configs. Every
    /// other group (transformation, rotation, particle, light, sound) is
    /// added empty and populated via its `add_*` method; the set of
    /// machines, groups, and emitters is fixed for the lifetime of the
    /// animator -- only their scalar contents replicate.
    pub fn new(machine_configs: Vec<(String, Vec<(String, StateDef)>)>) -> Self {
        let mut group = NetElementGroup::new();
        let animation_rate = group.add_float(1.0, false);
        let zoom = group.add_float(1.0, false);
        let flipped = group.add_bool(false);

        let mut machines = HashMap::new();
        for (name, states) in machine_configs {
            let current_index = group.add_int(0);
            let reverse = group.add_bool(false);
            let started_event = group.add_event();
            machines.insert(
                name,
                Machine {
                    states,
                    current_index,
                    reverse,
                    started_event,
                    timer: 0.0,
                },
            );
        }

        Self {
            group,
            animation_rate,
            zoom,
            flipped,
            global_tags: HashMap::new(),
            part_tags: HashMap::new(),
            machines,
            transformation_groups: HashMap::new(),
            rotation_groups: HashMap::new(),
            particle_emitters: HashMap::new(),
            lights: HashMap::new(),
            sounds: HashMap::new(),
        }
    }

    /// Names of every configured state within `machine`.
    pub fn states(&self, machine: &str) -> Vec<&str> {
        self.machines
            .get(machine)
            .map(|m| m.states.iter().map(|(n, _)| n.as_str()).collect())
            .unwrap_or_default()
    }

    /// Change `machine`'s current state. Returns `true` if a change
    /// occurred; if `state` is already current and `start_new` is false,
    /// this is a no-op (idempotent by design -- every public observable of
    /// the animator is unchanged across such a call).
    pub fn set_state(&mut self, machine: &str, state: &str, start_new: bool, reverse: bool) -> bool {
        let Some(m) = self.machines.get_mut(machine) else {
            return false;
        };
        let Some(index) = m.states.iter().position(|(n, _)| n == state) else {
            return false;
        };
        let current = self.group.get_int(m.current_index) as usize;
        if current == index && !start_new {
            return false;
        }
        self.group.set_int(m.current_index, index as i64);
        self.group.set_bool(m.reverse, reverse);
        self.group.trigger_event(m.started_event);
        m.timer = 0.0;
        true
    }

    /// `true` if a started-event fired for `machine` since the last call
    /// (drains the event, same one-shot-per-trigger semantics as any other
    /// net event).
    pub fn state_started(&mut self, machine: &str) -> bool {
        self.machines
            .get(machine)
            .map(|m| self.group.pull_event_occurred(m.started_event))
            .unwrap_or(false)
    }

    /// Current state name of `machine`.
    pub fn state(&self, machine: &str) -> Option<&str> {
        let m = self.machines.get(machine)?;
        let index = self.group.get_int(m.current_index) as usize;
        m.states.get(index).map(|(n, _)| n.as_str())
    }

    /// `true` if `machine` is currently playing its state in reverse.
    pub fn state_reverse(&self, machine: &str) -> bool {
        self.machines
            .get(machine)
            .map(|m| self.group.get_bool(m.reverse))
            .unwrap_or(false)
    }

    /// Seconds elapsed since `machine` entered its current state.
    pub fn state_timer(&self, machine: &str) -> f32 {
        self.machines.get(machine).map(|m| m.timer).unwrap_or(0.0)
    }

    /// Current 0-indexed frame of `machine`'s current state.
    pub fn state_frame(&self, machine: &str) -> u32 {
        let Some(m) = self.machines.get(machine) else {
            return 0;
        };
        let index = self.group.get_int(m.current_index) as usize;
        let Some((_, def)) = m.states.get(index) else {
            return 0;
        };
        frame_for(def, m.timer, self.group.get_bool(m.reverse))
    }

    /// Fractional progress through the current frame, in `[0, 1)`.
    pub fn state_frame_progress(&self, machine: &str) -> f32 {
        let Some(m) = self.machines.get(machine) else {
            return 0.0;
        };
        let index = self.group.get_int(m.current_index) as usize;
        let Some((_, def)) = m.states.get(index) else {
            return 0.0;
        };
        if def.frame_time <= 0.0 {
            return 0.0;
        }
        (m.timer / def.frame_time).fract()
    }

    // -- tags ----------------------------------------------------------------

    /// Set (or clear, if `value` is `None`) a global tag replacement.
    pub fn set_global_tag(&mut self, tag: &str, value: Option<&str>) {
        match value {
            Some(v) => {
                self.global_tags.insert(tag.to_owned(), v.to_owned());
            }
            None => {
                self.global_tags.remove(tag);
            }
        }
    }

    /// Set (or clear) a tag replacement scoped to one part.
    pub fn set_part_tag(&mut self, part: &str, tag: &str, value: Option<&str>) {
        let entry = self.part_tags.entry(part.to_owned()).or_default();
        match value {
            Some(v) => {
                entry.insert(tag.to_owned(), v.to_owned());
            }
            None => {
                entry.remove(tag);
            }
        }
    }

    /// Substitute every `<tag>` occurrence in `template` (part-scoped tags
    /// overlay global tags; `<frame>` is replaced with the part's owning
    /// machine's current frame index, 1-indexed, if `frame` is given).
    pub fn apply_part_tags(&self, part: &str, template: &str, frame: Option<u32>) -> String {
        let mut out = template.to_owned();
        if let Some(f) = frame {
            out = out.replace("<frame>", &(f + 1).to_string());
        }
        for (tag, value) in &self.global_tags {
            out = out.replace(&format!("<{tag}>"), value);
        }
        if let Some(overrides) = self.part_tags.get(part) {
            for (tag, value) in overrides {
                out = out.replace(&format!("<{tag}>"), value);
            }
        }
        out
    }

    // -- global knobs ----------------------------------------------------

    /// Set the animator's global animation rate (1.0 is normal speed).
    pub fn set_animation_rate(&mut self, rate: f32) {
        self.group.set_float(self.animation_rate, rate);
    }

    /// Current global animation rate.
    pub fn animation_rate(&self) -> f32 {
        self.group.get_float(self.animation_rate)
    }

    /// Set the global render zoom factor.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.group.set_float(self.zoom, zoom);
    }

    /// Set whether all parts are horizontally flipped.
    pub fn set_flipped(&mut self, flipped: bool) {
        self.group.set_bool(self.flipped, flipped);
    }

    /// Current flipped state.
    pub fn flipped(&self) -> bool {
        self.group.get_bool(self.flipped)
    }

    // -- transformation groups --------------------------------------------

    /// Register a new transformation group (identity transform).
    pub fn add_transformation_group(&mut self, name: &str) {
        self.transformation_groups
            .entry(name.to_owned())
            .or_insert_with(|| TransformationGroup::new(&mut self.group));
    }

    /// `true` if `name` has been registered via
    /// [`add_transformation_group`](Self::add_transformation_group).
    pub fn has_transformation_group(&self, name: &str) -> bool {
        self.transformation_groups.contains_key(name)
    }

    /// Translate a transformation group in place.
    pub fn translate_transformation_group(&mut self, name: &str, dx: f32, dy: f32) {
        if let Some(tg) = self.transformation_groups.get(name) {
            let current = tg.affine(&self.group);
            let next = current.then_translate(dx, dy);
            self.transformation_groups[name].set_affine(&mut self.group, next);
        }
    }

    /// Rotate a transformation group in place about `(cx, cy)`.
    pub fn rotate_transformation_group(&mut self, name: &str, radians: f32, cx: f32, cy: f32) {
        if let Some(tg) = self.transformation_groups.get(name) {
            let current = tg.affine(&self.group);
            let next = current.then_rotate(radians, cx, cy);
            self.transformation_groups[name].set_affine(&mut self.group, next);
        }
    }

    /// Scale a transformation group in place about `(cx, cy)`.
    pub fn scale_transformation_group(&mut self, name: &str, sx: f32, sy: f32, cx: f32, cy: f32) {
        if let Some(tg) = self.transformation_groups.get(name) {
            let current = tg.affine(&self.group);
            let next = current.then_scale(sx, sy, cx, cy);
            self.transformation_groups[name].set_affine(&mut self.group, next);
        }
    }

    /// Reset a transformation group back to the identity transform.
    pub fn reset_transformation_group(&mut self, name: &str) {
        if let Some(tg) = self.transformation_groups.get(name) {
            tg.set_affine(&mut self.group, Affine2::identity());
        }
    }

    /// The composed affine transform of a transformation group.
    pub fn get_transformation_group(&self, name: &str) -> Option<Affine2> {
        self.transformation_groups.get(name).map(|tg| tg.affine(&self.group))
    }

    // -- rotation groups ---------------------------------------------------

    /// Register a rotation group with the given angular velocity (radians/sec).
    pub fn add_rotation_group(&mut self, name: &str, angular_velocity: f32) {
        self.rotation_groups
            .entry(name.to_owned())
            .or_insert_with(|| RotationGroup::new(&mut self.group, angular_velocity));
    }

    /// `true` if `name` has been registered.
    pub fn has_rotation_group(&self, name: &str) -> bool {
        self.rotation_groups.contains_key(name)
    }

    /// Set a rotation group's target angle. If `immediate`, the current
    /// angle snaps to the target the next time [`update`](Self::update) runs
    /// instead of approaching it at the configured angular velocity.
    pub fn rotate_group(&mut self, name: &str, target_angle: f32, immediate: bool) {
        if let Some(rg) = self.rotation_groups.get(name) {
            self.group.set_float(rg.target_angle, target_angle);
            if immediate {
                self.group.trigger_event(rg.immediate_event);
            }
        }
    }

    /// The rotation group's current (not target) angle.
    pub fn current_rotation_angle(&self, name: &str) -> f32 {
        self.rotation_groups.get(name).map(|rg| rg.current_angle).unwrap_or(0.0)
    }

    // -- particle emitters -------------------------------------------------

    /// Register a particle emitter.
    pub fn add_particle_emitter(&mut self, name: &str, emission_rate: f32, emission_rate_variance: f32) {
        self.particle_emitters
            .entry(name.to_owned())
            .or_insert_with(|| ParticleEmitter::new(&mut self.group, emission_rate, emission_rate_variance));
    }

    /// `true` if `name` has been registered.
    pub fn has_particle_emitter(&self, name: &str) -> bool {
        self.particle_emitters.contains_key(name)
    }

    /// Enable or disable continuous emission for `name`.
    pub fn set_particle_emitter_active(&mut self, name: &str, active: bool) {
        if let Some(pe) = self.particle_emitters.get(name) {
            self.group.set_bool(pe.active, active);
        }
    }

    /// Schedule a one-time burst of `burst_count` emission cycles,
    /// independent of the active flag.
    pub fn burst_particle_emitter(&mut self, name: &str) {
        if let Some(pe) = self.particle_emitters.get(name) {
            self.group.trigger_event(pe.burst_event);
        }
    }

    // -- lights --------------------------------------------------------------

    /// Register a light source.
    pub fn add_light(&mut self, name: &str) {
        self.lights
            .entry(name.to_owned())
            .or_insert_with(|| Light::new(&mut self.group));
    }

    /// `true` if `name` has been registered.
    pub fn has_light(&self, name: &str) -> bool {
        self.lights.contains_key(name)
    }

    /// Enable or disable a light.
    pub fn set_light_active(&mut self, name: &str, active: bool) {
        if let Some(l) = self.lights.get(name) {
            self.group.set_bool(l.active, active);
        }
    }

    /// Set a light's position.
    pub fn set_light_position(&mut self, name: &str, x: f32, y: f32) {
        if let Some(l) = self.lights.get(name) {
            self.group.set_float(l.x, x);
            self.group.set_float(l.y, y);
        }
    }

    /// Set a light's colour, as `(r, g, b, a)` in `[0, 1]`.
    pub fn set_light_color(&mut self, name: &str, rgba: (f32, f32, f32, f32)) {
        if let Some(l) = self.lights.get(name) {
            self.group
                .set_data(l.color, serde_json::json!([rgba.0, rgba.1, rgba.2, rgba.3]));
        }
    }

    // -- sounds --------------------------------------------------------------

    /// Register a sound pool.
    pub fn add_sound(&mut self, name: &str, pool: Vec<String>) {
        self.sounds
            .entry(name.to_owned())
            .or_insert_with(|| Sound::new(&mut self.group, pool));
    }

    /// `true` if `name` has been registered.
    pub fn has_sound(&self, name: &str) -> bool {
        self.sounds.contains_key(name)
    }

    /// Play a random member of `name`'s sound pool, looping `loops` times
    /// (0 = play once).
    pub fn play_sound(&mut self, name: &str, loops: i32) {
        if let Some(s) = self.sounds.get(name) {
            self.group.set_int(s.loops, loops as i64);
            self.group.trigger_event(s.play_event);
        }
    }

    /// Stop all currently-playing sounds from `name`'s pool.
    pub fn stop_all_sounds(&mut self, name: &str) {
        if let Some(s) = self.sounds.get(name) {
            self.group.trigger_event(s.stop_event);
        }
    }

    // -- tick -------------------------------------------------------------

    /// Advance every state machine, rotation group, and particle emitter by
    /// `dt` seconds (scaled by the global animation rate for state
    /// machines). `rng` drives particle-emission variance deterministically
    /// given a seeded source; pass the same seed on master and slave runs
    /// reconstructing the same sequence to keep emission counts identical.
    /// Emitted particle counts, triggered sounds, and light/rotation state
    /// are appended to `target` rather than applied directly, matching the
    /// "nothing persists past one tick" dynamic-target contract.
    pub fn update(&mut self, dt: f32, target: &mut DynamicTarget, rng: &mut impl Rng) {
        let rate = self.animation_rate();
        for m in self.machines.values_mut() {
            let index = self.group.get_int(m.current_index) as usize;
            if let Some((_, def)) = m.states.get(index) {
                m.timer += dt * rate;
                let cycle = def.frame_time * def.frame_count as f32;
                if cycle > 0.0 && !def.looping && m.timer > cycle {
                    m.timer = cycle;
                }
            }
        }

        for rg in self.rotation_groups.values_mut() {
            rg.tick(&mut self.group, dt);
        }

        for (name, pe) in self.particle_emitters.iter_mut() {
            let emitted = pe.tick(&mut self.group, dt, rng);
            if emitted > 0 {
                target.pending_particles.push((name.clone(), emitted));
            }
        }

        for (name, s) in self.sounds.iter_mut() {
            if self.group.pull_event_occurred(s.play_event) {
                let index = rng.gen_range(0..s.pool.len().max(1));
                if let Some(choice) = s.pool.get(index) {
                    target.pending_sounds.push((name.clone(), choice.clone()));
                }
            }
            if self.group.pull_event_occurred(s.stop_event) {
                target.stopped_sounds.push(name.clone());
            }
        }
    }

    /// The schema version every delta is tagged with.
    pub fn version(&self) -> u8 {
        ANIMATOR_VERSION
    }

    /// Emit a delta of every leaf changed since `from_version`.
    pub fn write_delta(&self, from_version: u64) -> (Vec<u8>, u64) {
        self.group.write_delta(from_version)
    }

    /// Apply a delta produced by [`write_delta`](Self::write_delta).
    pub fn read_delta(&mut self, payload: &[u8], interpolation_time: f32) {
        self.group.read_delta(payload, interpolation_time);
    }
}

fn frame_for(def: &StateDef, timer: f32, reverse: bool) -> u32 {
    if def.frame_time <= 0.0 || def.frame_count == 0 {
        return 0;
    }
    let raw = (timer / def.frame_time) as u32;
    let index = if def.looping {
        raw % def.frame_count
    } else {
        raw.min(def.frame_count - 1)
    };
    if reverse {
        def.frame_count - 1 - index
    } else {
        index
    }
}

// ---------------------------------------------------------------------------
// Transformation groups
// ---------------------------------------------------------------------------

/// A 2D affine transform: `[a c tx; b d ty; 0 0 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine2 {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Affine2 {
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            tx: 0.0,
            ty: 0.0,
        }
    }

    fn then_translate(self, dx: f32, dy: f32) -> Self {
        Self {
            tx: self.tx + dx,
            ty: self.ty + dy,
            ..self
        }
    }

    fn then_rotate(self, radians: f32, cx: f32, cy: f32) -> Self {
        let (sin, cos) = radians.sin_cos();
        let rot = Affine2 {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            tx: cx - cos * cx + sin * cy,
            ty: cy - sin * cx - cos * cy,
        };
        rot.compose(self)
    }

    fn then_scale(self, sx: f32, sy: f32, cx: f32, cy: f32) -> Self {
        let scale = Affine2 {
            a: sx,
            b: 0.0,
            c: 0.0,
            d: sy,
            tx: cx - sx * cx,
            ty: cy - sy * cy,
        };
        scale.compose(self)
    }

    /// `self` applied after `other`: `self * other`.
    fn compose(self, other: Self) -> Self {
        Self {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            tx: self.a * other.tx + self.c * other.ty + self.tx,
            ty: self.b * other.tx + self.d * other.ty + self.ty,
        }
    }
}

struct TransformationGroup {
    a: NetHandle,
    b: NetHandle,
    c: NetHandle,
    d: NetHandle,
    tx: NetHandle,
    ty: NetHandle,
}

impl TransformationGroup {
    fn new(group: &mut NetElementGroup) -> Self {
        Self {
            a: group.add_float(1.0, true),
            b: group.add_float(0.0, true),
            c: group.add_float(0.0, true),
            d: group.add_float(1.0, true),
            tx: group.add_float(0.0, true),
            ty: group.add_float(0.0, true),
        }
    }

    fn affine(&self, group: &NetElementGroup) -> Affine2 {
        Affine2 {
            a: group.get_float(self.a),
            b: group.get_float(self.b),
            c: group.get_float(self.c),
            d: group.get_float(self.d),
            tx: group.get_float(self.tx),
            ty: group.get_float(self.ty),
        }
    }

    fn set_affine(&self, group: &mut NetElementGroup, affine: Affine2) {
        group.set_float(self.a, affine.a);
        group.set_float(self.b, affine.b);
        group.set_float(self.c, affine.c);
        group.set_float(self.d, affine.d);
        group.set_float(self.tx, affine.tx);
        group.set_float(self.ty, affine.ty);
    }
}

// ---------------------------------------------------------------------------
// Rotation groups
// ---------------------------------------------------------------------------

struct RotationGroup {
    angular_velocity: f32,
    target_angle: NetHandle,
    immediate_event: NetHandle,
    current_angle: f32,
}

impl RotationGroup {
    fn new(group: &mut NetElementGroup, angular_velocity: f32) -> Self {
        Self {
            angular_velocity,
            target_angle: group.add_float(0.0, false),
            immediate_event: group.add_event(),
            current_angle: 0.0,
        }
    }

    fn tick(&mut self, group: &mut NetElementGroup, dt: f32) {
        let target = group.get_float(self.target_angle);
        if group.pull_event_occurred(self.immediate_event) {
            self.current_angle = target;
            return;
        }
        let max_step = self.angular_velocity.abs() * dt;
        let diff = angle_diff(target, self.current_angle);
        if diff.abs() <= max_step {
            self.current_angle = target;
        } else {
            self.current_angle += max_step * diff.signum();
        }
    }
}

fn angle_diff(target: f32, current: f32) -> f32 {
    let mut diff = (target - current) % std::f32::consts::TAU;
    if diff > std::f32::consts::PI {
        diff -= std::f32::consts::TAU;
    } else if diff < -std::f32::consts::PI {
        diff += std::f32::consts::TAU;
    }
    diff
}

// ---------------------------------------------------------------------------
// Particle emitters
// ---------------------------------------------------------------------------

struct ParticleEmitter {
    emission_rate: NetHandle,
    emission_rate_variance: f32,
    active: NetHandle,
    burst_event: NetHandle,
    accumulator: f32,
}

impl ParticleEmitter {
    fn new(group: &mut NetElementGroup, emission_rate: f32, emission_rate_variance: f32) -> Self {
        Self {
            emission_rate: group.add_float(emission_rate, false),
            emission_rate_variance,
            active: group.add_bool(false),
            burst_event: group.add_event(),
            accumulator: 0.0,
        }
    }

    fn tick(&mut self, group: &mut NetElementGroup, dt: f32, rng: &mut impl Rng) -> u32 {
        let mut emitted = 0u32;
        if group.get_bool(self.active) {
            let rate = group.get_float(self.emission_rate);
            let variance = if self.emission_rate_variance > 0.0 {
                rng.gen_range(-self.emission_rate_variance..=self.emission_rate_variance)
            } else {
                0.0
            };
            self.accumulator += (rate + variance).max(0.0) * dt;
            emitted += self.accumulator.floor() as u32;
            self.accumulator -= self.accumulator.floor();
        }
        if group.pull_event_occurred(self.burst_event) {
            emitted += 1;
        }
        emitted
    }
}

// ---------------------------------------------------------------------------
// Lights
// ---------------------------------------------------------------------------

struct Light {
    active: NetHandle,
    x: NetHandle,
    y: NetHandle,
    color: NetHandle,
    #[allow(dead_code)]
    point_angle: NetHandle,
}

impl Light {
    fn new(group: &mut NetElementGroup) -> Self {
        Self {
            active: group.add_bool(false),
            x: group.add_float(0.0, true),
            y: group.add_float(0.0, true),
            color: group.add_data(serde_json::json!([1.0, 1.0, 1.0, 1.0])),
            point_angle: group.add_float(0.0, true),
        }
    }
}

// ---------------------------------------------------------------------------
// Sounds
// ---------------------------------------------------------------------------

struct Sound {
    pool: Vec<String>,
    loops: NetHandle,
    play_event: NetHandle,
    stop_event: NetHandle,
    #[allow(dead_code)]
    volume: NetHandle,
}

impl Sound {
    fn new(group: &mut NetElementGroup, pool: Vec<String>) -> Self {
        Self {
            pool,
            loops: group.add_int(0),
            play_event: group.add_event(),
            stop_event: group.add_event(),
            volume: group.add_float(1.0, true),
        }
    }
}

// ---------------------------------------------------------------------------
// Dynamic target
// ---------------------------------------------------------------------------

/// Per-tick pull target for transient animator output. Nothing here
/// persists across ticks; a caller that doesn't pull it simply discards it.
#[derive(Debug, Default)]
pub struct DynamicTarget {
    pending_particles: Vec<(String, u32)>,
    pending_sounds: Vec<(String, String)>,
    stopped_sounds: Vec<String>,
}

impl DynamicTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain `(emitter_name, count)` pairs emitted since the last pull.
    pub fn pull_new_particles(&mut self) -> Vec<(String, u32)> {
        std::mem::take(&mut self.pending_particles)
    }

    /// Drain `(pool_name, chosen_sound)` pairs triggered since the last pull.
    pub fn pull_new_sounds(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.pending_sounds)
    }

    /// Drain pool names that received a `stopAllSounds` since the last pull.
    pub fn pull_stopped_sounds(&mut self) -> Vec<String> {
        std::mem::take(&mut self.stopped_sounds)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand_pcg::Pcg64;
    use rand::SeedableRng;

    fn walk_machine() -> Vec<(String, Vec<(String, StateDef)>)> {
        vec![(
            "body".to_owned(),
            vec![
                (
                    "idle".to_owned(),
                    StateDef {
                        frame_time: 0.1,
                        frame_count: 4,
                        looping: true,
                    },
                ),
                (
                    "walk".to_owned(),
                    StateDef {
                        frame_time: 0.1,
                        frame_count: 8,
                        looping: true,
                    },
                ),
            ],
        )]
    }

    #[test]
    fn set_state_no_op_when_already_current() {
        let mut anim = NetworkedAnimator::new(walk_machine());
        assert!(!anim.set_state("body", "idle", false, false));
    }

    #[test]
    fn set_state_changes_and_fires_started_event() {
        let mut anim = NetworkedAnimator::new(walk_machine());
        assert!(anim.set_state("body", "walk", false, false));
        assert_eq!(anim.state("body"), Some("walk"));
        assert!(anim.state_started("body"));
        assert!(!anim.state_started("body"));
    }

    #[test]
    fn start_new_forces_restart_on_same_state() {
        let mut anim = NetworkedAnimator::new(walk_machine());
        anim.set_state("body", "walk", false, false);
        let mut target = DynamicTarget::new();
        let mut rng = Pcg64::seed_from_u64(1);
        anim.update(0.5, &mut target, &mut rng);
        assert!(anim.state_timer("body") > 0.0);
        assert!(anim.set_state("body", "walk", true, false));
        assert_eq!(anim.state_timer("body"), 0.0);
    }

    #[test]
    fn state_frame_progresses_with_time() {
        let mut anim = NetworkedAnimator::new(walk_machine());
        anim.set_state("body", "walk", false, false);
        let mut target = DynamicTarget::new();
        let mut rng = Pcg64::seed_from_u64(1);
        anim.update(0.25, &mut target, &mut rng);
        assert_eq!(anim.state_frame("body"), 2);
    }

    #[test]
    fn looping_state_wraps_frame_index() {
        let mut anim = NetworkedAnimator::new(walk_machine());
        anim.set_state("body", "idle", false, false);
        let mut target = DynamicTarget::new();
        let mut rng = Pcg64::seed_from_u64(1);
        anim.update(1.0, &mut target, &mut rng);
        assert!(anim.state_frame("body") < 4);
    }

    #[test]
    fn tag_substitution_prefers_part_over_global() {
        let mut anim = NetworkedAnimator::new(vec![]);
        anim.set_global_tag("color", Some("red"));
        anim.set_part_tag("head", "color", Some("blue"));
        assert_eq!(anim.apply_part_tags("body", "<color>.png", None), "red.png");
        assert_eq!(anim.apply_part_tags("head", "<color>.png", None), "blue.png");
    }

    #[test]
    fn frame_tag_is_one_indexed() {
        let anim = NetworkedAnimator::new(vec![]);
        assert_eq!(anim.apply_part_tags("p", "f<frame>.png", Some(0)), "f1.png");
    }

    #[test]
    fn transformation_group_composes_translate_then_rotate() {
        let mut anim = NetworkedAnimator::new(vec![]);
        anim.add_transformation_group("tg");
        anim.translate_transformation_group("tg", 10.0, 0.0);
        let t = anim.get_transformation_group("tg").unwrap();
        assert!((t.tx - 10.0).abs() < 1e-5);
    }

    #[test]
    fn reset_transformation_group_restores_identity() {
        let mut anim = NetworkedAnimator::new(vec![]);
        anim.add_transformation_group("tg");
        anim.translate_transformation_group("tg", 10.0, 5.0);
        anim.reset_transformation_group("tg");
        assert_eq!(anim.get_transformation_group("tg").unwrap(), Affine2::identity());
    }

    #[test]
    fn rotation_group_moves_toward_target_bounded_by_velocity() {
        let mut anim = NetworkedAnimator::new(vec![]);
        anim.add_rotation_group("rg", 1.0);
        anim.rotate_group("rg", 10.0, false);
        let mut target = DynamicTarget::new();
        let mut rng = Pcg64::seed_from_u64(1);
        anim.update(0.5, &mut target, &mut rng);
        assert!((anim.current_rotation_angle("rg") - 0.5).abs() < 1e-4);
    }

    #[test]
    fn rotation_group_immediate_snaps() {
        let mut anim = NetworkedAnimator::new(vec![]);
        anim.add_rotation_group("rg", 1.0);
        anim.rotate_group("rg", 2.5, true);
        let mut target = DynamicTarget::new();
        let mut rng = Pcg64::seed_from_u64(1);
        anim.update(0.001, &mut target, &mut rng);
        assert!((anim.current_rotation_angle("rg") - 2.5).abs() < 1e-6);
    }

    #[test]
    fn particle_emitter_accumulates_and_emits() {
        let mut anim = NetworkedAnimator::new(vec![]);
        anim.add_particle_emitter("sparks", 10.0, 0.0);
        anim.set_particle_emitter_active("sparks", true);
        let mut target = DynamicTarget::new();
        let mut rng = Pcg64::seed_from_u64(1);
        anim.update(1.0, &mut target, &mut rng);
        let emitted = target.pull_new_particles();
        assert_eq!(emitted, vec![("sparks".to_owned(), 10)]);
    }

    #[test]
    fn burst_emits_independent_of_active_flag() {
        let mut anim = NetworkedAnimator::new(vec![]);
        anim.add_particle_emitter("burst", 0.0, 0.0);
        anim.burst_particle_emitter("burst");
        let mut target = DynamicTarget::new();
        let mut rng = Pcg64::seed_from_u64(1);
        anim.update(0.016, &mut target, &mut rng);
        let emitted = target.pull_new_particles();
        assert_eq!(emitted, vec![("burst".to_owned(), 1)]);
    }

    #[test]
    fn play_sound_chooses_from_pool_and_pulls_once() {
        let mut anim = NetworkedAnimator::new(vec![]);
        anim.add_sound("step", vec!["a.ogg".to_owned(), "b.ogg".to_owned()]);
        anim.play_sound("step", 0);
        let mut target = DynamicTarget::new();
        let mut rng = Pcg64::seed_from_u64(7);
        anim.update(0.016, &mut target, &mut rng);
        let sounds = target.pull_new_sounds();
        assert_eq!(sounds.len(), 1);
        assert_eq!(sounds[0].0, "step");
    }

    #[test]
    fn stop_all_sounds_pulled_as_stopped() {
        let mut anim = NetworkedAnimator::new(vec![]);
        anim.add_sound("step", vec!["a.ogg".to_owned()]);
        anim.stop_all_sounds("step");
        let mut target = DynamicTarget::new();
        let mut rng = Pcg64::seed_from_u64(7);
        anim.update(0.016, &mut target, &mut rng);
        assert_eq!(target.pull_stopped_sounds(), vec!["step".to_owned()]);
    }

    #[test]
    fn delta_round_trips_current_state() {
        let mut master = NetworkedAnimator::new(walk_machine());
        master.set_state("body", "walk", false, false);
        let (delta, _) = master.write_delta(0);

        let mut slave = NetworkedAnimator::new(walk_machine());
        slave.read_delta(&delta, 0.0);
        assert_eq!(slave.state("body"), Some("walk"));
    }

    #[test]
    fn determinism_same_seed_same_emission() {
        fn run() -> Vec<(String, u32)> {
            let mut anim = NetworkedAnimator::new(vec![]);
            anim.add_particle_emitter("e", 5.0, 2.0);
            anim.set_particle_emitter_active("e", true);
            let mut target = DynamicTarget::new();
            let mut rng = Pcg64::seed_from_u64(42);
            for _ in 0..20 {
                anim.update(1.0 / 60.0, &mut target, &mut rng);
            }
            target.pull_new_particles()
        }
        assert_eq!(run(), run());
    }
}
