//! Host API for WASM gameplay modules.
//!
//! Defines the [`HostState`] that lives inside the Wasmtime [`Store`] and the
//! [`register_host_api`] function that registers all host functions under the
//! `"nomai"` WASM import namespace.
//!
//! # Design
//!
//! - **Reads are immediate:** WASM modules can read entity count, tick number,
//!   sim time, and component values from a pre-populated world snapshot.
//! - **Writes are deferred:** Mutations (set_component, spawn, despawn) are
//!   accumulated in a [`CommandBuffer`] and applied after all scripts finish.
//! - **Every mutation carries causality:** All write commands use
//!   [`SystemId::WASM_GAMEPLAY`] and [`CausalReason::GameRule`] with a reason
//!   string provided by the WASM module.
//!
//! # Host Functions (registered under `"nomai"` module)
//!
//! ## Read
//! - `get_entity_count() -> i32`
//! - `sim_time() -> f64`
//! - `tick_number() -> i64`
//! - `get_component(entity_id: i64, name_ptr: i32, name_len: i32) -> i64`
//!
//! ## Write
//! - `set_component(entity_id: i64, name_ptr, name_len, value_ptr, value_len, reason_ptr, reason_len)`
//! - `spawn_semantic(identity_ptr, identity_len, components_ptr, components_len, reason_ptr, reason_len) -> i64`
//! - `spawn_pooled(identity_ptr, identity_len, components_ptr, components_len, reason_ptr, reason_len) -> i64`
//! - `despawn(entity_id: i64, reason_ptr: i32, reason_len: i32)`
//! - `emit_event(event_ptr: i32, event_len: i32)`
//!
//! ## Utility
//! - `log(level: i32, msg_ptr: i32, msg_len: i32)`
//!
//! ## Namespaced subsystem bindings
//!
//! Alongside the generic `"nomai"` functions above, a handful of narrower
//! namespaces mirror the binding surface a per-entity script sees
//! (`config`, `entity`, `status`, `mcontroller`, `animator`). These are thin
//! wrappers over the same read-snapshot/command-buffer mechanism -- they
//! exist so WASM modules import `"status"::"get"` rather than reconstructing
//! a `status:<name>` component-name convention by hand, not because the data
//! path differs. All output values are written into the caller's linear
//! memory as JSON bytes at `(out_ptr, out_cap)`; the return value is the
//! number of bytes written, or `-1` on failure/truncation.
//!
//! - `config::query(path_ptr, path_len, default_ptr, default_len, out_ptr, out_cap) -> i32`
//! - `entity::id() -> i64`
//! - `entity::position(out_ptr, out_cap) -> i32`
//! - `status::get(name_ptr, name_len, out_ptr, out_cap) -> i32`
//! - `status::set(name_ptr, name_len, value_ptr, value_len, reason_ptr, reason_len)`
//! - `mcontroller::command(name_ptr, name_len, args_ptr, args_len, reason_ptr, reason_len)`
//! - `animator::set_state(machine_ptr, machine_len, state_ptr, state_len, reason_ptr, reason_len)`
//! - `animator::trigger(name_ptr, name_len, reason_ptr, reason_len)`
//! - `storage::get(out_ptr, out_cap) -> i32`
//! - `storage::set(value_ptr, value_len)`
//! - `message::poll(out_ptr, out_cap) -> i32`
//! - `message::respond(value_ptr, value_len)`

use std::collections::HashMap;

use nomai_ecs::command::{CausalReason, CommandBuffer};
use nomai_ecs::entity::EntityId;
use nomai_ecs::identity::{EntityIdentity, PoolIdentity, SystemId};
use nomai_manifest::manifest::GameEvent;
use wasmtime::{Caller, Linker};

// ---------------------------------------------------------------------------
// HostState
// ---------------------------------------------------------------------------

/// State held inside the Wasmtime [`Store`] for host function dispatch.
///
/// Contains the command buffer for deferred mutations, a read-only world
/// snapshot for immediate reads, and bookkeeping for tick metadata and
/// performance measurement.
pub struct HostState {
    /// Accumulated commands from WASM write operations. Drained after all
    /// scripts finish via [`drain_commands`](Self::drain_commands).
    pub commands: CommandBuffer,

    /// Accumulated game events from WASM. Drained after all scripts finish
    /// via [`drain_events`](Self::drain_events).
    pub events: Vec<GameEvent>,

    /// Current tick number, set before each tick via [`begin_tick`](Self::begin_tick).
    pub tick: u64,

    /// Current simulation time in seconds, set before each tick.
    pub sim_time: f64,

    /// Read-only world snapshot: maps `entity_id.to_raw()` to a map of
    /// component name -> JSON value. Populated before each tick via
    /// [`snapshot_world`](Self::snapshot_world).
    pub entity_components: HashMap<u64, HashMap<String, serde_json::Value>>,

    /// Number of alive entities in the world snapshot. Used by
    /// `get_entity_count()`.
    pub entity_count: usize,

    /// Number of host function calls made during the current tick.
    /// Reset on [`begin_tick`](Self::begin_tick). Used for performance
    /// benchmarking.
    pub host_call_count: u32,

    /// Deterministic RNG counter. Incremented on each `random_f32()` call.
    /// Can be seeded for reproducible behavior.
    pub rng_counter: u64,

    /// Raw id of the entity this script instance is bound to. Set once by
    /// the owning script context; `entity::id()` and the namespaced
    /// `status`/`mcontroller`/`animator` functions all operate relative to
    /// this entity.
    pub bound_entity: u64,

    /// Merged variant configuration tree for the bound entity (§10.3's
    /// `VariantConfig` output), queried by `config::query`.
    pub config_tree: serde_json::Value,

    /// Namespaced subsystem writes queued by `status`/`mcontroller`/`animator`
    /// calls this tick. Drained by the owning script context after
    /// `call_tick`, same lifecycle as `commands`.
    pub intents: Vec<ScriptIntent>,

    /// Opaque per-entity persisted storage (§4.6 `get_storage`/`set_storage`),
    /// round-tripped through `storage::get`/`storage::set`.
    pub storage: serde_json::Value,

    /// A message dispatched to this script this tick, if any, consumed via
    /// `message::poll`. Cleared once polled.
    pub pending_message: Option<serde_json::Value>,

    /// The script's reply to `pending_message`, set via `message::respond`.
    /// Read back by the owning script context after `call_tick`.
    pub message_response: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Script intents
// ---------------------------------------------------------------------------

/// Which narrow subsystem handle a [`ScriptIntent`] targets.
///
/// `nomai-wasm-host` has no dependency on `nomai-engine` (that dependency
/// runs the other way), so it cannot call `StatusController`/`MovementWorld`/
/// `NetworkedAnimator` methods directly. Instead a script's namespaced write
/// calls are recorded as intents; the owning script context in `nomai-engine`
/// drains them after `call_tick` and dispatches each one to the real
/// subsystem, the same way `CommandBuffer` commands are drained and applied
/// to the `World`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentNamespace {
    /// Targets the bound entity's status controller.
    Status,
    /// Targets the bound entity's movement controller.
    MController,
    /// Targets the bound entity's networked animator.
    Animator,
}

/// A single namespaced write call queued by a script, awaiting dispatch to
/// the real subsystem by the owning script context.
#[derive(Debug, Clone)]
pub struct ScriptIntent {
    /// Which subsystem this intent targets.
    pub namespace: IntentNamespace,
    /// The verb the script invoked (`"set"`, `"command"`, `"set_state"`, `"trigger"`).
    pub verb: String,
    /// The resource/stat/command/state-machine name the verb applies to.
    pub name: String,
    /// Verb-specific JSON payload (e.g. the value to set, or command args).
    pub args: serde_json::Value,
    /// Why the script made this call, for manifest causal-chain tracking.
    pub reason: CausalReason,
}

impl HostState {
    /// Create a new `HostState` with all fields at their default/empty values.
    pub fn new() -> Self {
        Self {
            commands: CommandBuffer::new(),
            events: Vec::new(),
            tick: 0,
            sim_time: 0.0,
            entity_components: HashMap::new(),
            entity_count: 0,
            host_call_count: 0,
            rng_counter: 0,
            bound_entity: 0,
            config_tree: serde_json::Value::Null,
            intents: Vec::new(),
            storage: serde_json::Value::Null,
            pending_message: None,
            message_response: None,
        }
    }

    /// Bind this host state to a specific entity and its merged config tree.
    /// Called by the owning script context before each `call_tick`.
    pub fn bind_entity(&mut self, entity: EntityId, config_tree: serde_json::Value) {
        self.bound_entity = entity.to_raw();
        self.config_tree = config_tree;
    }

    /// Prepare for a new tick. Resets per-tick state (host call counter)
    /// and sets tick metadata.
    ///
    /// Call this before executing the WASM module's `tick()` function each
    /// frame.
    pub fn begin_tick(&mut self, tick: u64, sim_time: f64) {
        self.tick = tick;
        self.sim_time = sim_time;
        self.host_call_count = 0;
        // Commands and events are NOT cleared here -- they accumulate across
        // multiple WASM modules if there are several. Use drain_commands()
        // and drain_events() after all modules have run.
    }

    /// Populate the read-only world snapshot from a flat map of entity
    /// components.
    ///
    /// The `snapshot` parameter maps raw entity IDs (`EntityId::to_raw()`)
    /// to their component maps. This is called by the engine before
    /// executing WASM modules so they can read state without direct ECS
    /// access.
    pub fn snapshot_world(
        &mut self,
        snapshot: HashMap<u64, HashMap<String, serde_json::Value>>,
        entity_count: usize,
    ) {
        self.entity_components = snapshot;
        self.entity_count = entity_count;
    }

    /// Drain all accumulated commands, returning them and leaving the
    /// buffer empty.
    ///
    /// Call this after all WASM modules have run for the tick.
    pub fn drain_commands(&mut self) -> CommandBuffer {
        std::mem::take(&mut self.commands)
    }

    /// Drain all accumulated events, returning them and leaving the
    /// vec empty.
    ///
    /// Call this after all WASM modules have run for the tick.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drain all accumulated namespaced subsystem intents, returning them
    /// and leaving the vec empty.
    pub fn drain_intents(&mut self) -> Vec<ScriptIntent> {
        std::mem::take(&mut self.intents)
    }
}

impl Default for HostState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostState")
            .field("tick", &self.tick)
            .field("sim_time", &self.sim_time)
            .field("entity_count", &self.entity_count)
            .field("host_call_count", &self.host_call_count)
            .field("rng_counter", &self.rng_counter)
            .field("pending_commands", &self.commands.len())
            .field("pending_events", &self.events.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Host function registration
// ---------------------------------------------------------------------------

/// Register all host functions under the `"nomai"` WASM import namespace.
///
/// After calling this, any WASM module that imports functions from `"nomai"`
/// will be able to call into these host functions.
///
/// # Errors
///
/// Returns an error if any function fails to register (should not happen
/// unless there is a Wasmtime API incompatibility).
pub fn register_host_api(linker: &mut Linker<HostState>) -> Result<(), anyhow::Error> {
    // -- READ functions -------------------------------------------------------

    linker.func_wrap("nomai", "get_entity_count", host_get_entity_count)?;
    linker.func_wrap("nomai", "sim_time", host_sim_time)?;
    linker.func_wrap("nomai", "tick_number", host_tick_number)?;
    linker.func_wrap("nomai", "get_component", host_get_component)?;

    // -- WRITE functions ------------------------------------------------------

    linker.func_wrap("nomai", "set_component", host_set_component)?;
    linker.func_wrap("nomai", "spawn_semantic", host_spawn_semantic)?;
    linker.func_wrap("nomai", "spawn_pooled", host_spawn_pooled)?;
    linker.func_wrap("nomai", "despawn", host_despawn)?;
    linker.func_wrap("nomai", "emit_event", host_emit_event)?;

    // -- UTILITY functions ----------------------------------------------------

    linker.func_wrap("nomai", "log", host_log)?;

    // -- Namespaced subsystem bindings -----------------------------------------

    linker.func_wrap("config", "query", host_config_query)?;
    linker.func_wrap("entity", "id", host_entity_id)?;
    linker.func_wrap("entity", "position", host_entity_position)?;
    linker.func_wrap("status", "get", host_status_get)?;
    linker.func_wrap("status", "set", host_status_set)?;
    linker.func_wrap("mcontroller", "command", host_mcontroller_command)?;
    linker.func_wrap("animator", "set_state", host_animator_set_state)?;
    linker.func_wrap("animator", "trigger", host_animator_trigger)?;
    linker.func_wrap("storage", "get", host_storage_get)?;
    linker.func_wrap("storage", "set", host_storage_set)?;
    linker.func_wrap("message", "poll", host_message_poll)?;
    linker.func_wrap("message", "respond", host_message_respond)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Helper: read a string from WASM linear memory
// ---------------------------------------------------------------------------

/// Read a UTF-8 string from WASM linear memory at the given (ptr, len).
///
/// # Errors
///
/// Returns an error if:
/// - The WASM module has no exported memory named `"memory"`.
/// - The (ptr, len) range is out of bounds.
/// - The bytes are not valid UTF-8.
fn read_wasm_string(
    caller: &mut Caller<'_, HostState>,
    ptr: i32,
    len: i32,
) -> Result<String, String> {
    let memory = caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or_else(|| {
            "WASM module must export 'memory' to use string-based host functions -- \
             add `(memory (export \"memory\") 1)` to your module"
                .to_owned()
        })?;

    if ptr < 0 || len < 0 {
        return Err(format!("WASM string read with negative ptr/len: ptr={ptr}, len={len}"));
    }

    let data = memory.data(&caller);
    let start = ptr as usize;
    let end = start + len as usize;

    if end > data.len() {
        return Err(format!(
            "WASM string read out of bounds: ptr={ptr}, len={len}, memory_size={}",
            data.len()
        ));
    }

    String::from_utf8(data[start..end].to_vec())
        .map_err(|e| format!("WASM string at ptr={ptr} len={len} is not valid UTF-8: {e}"))
}

/// Write `bytes` into WASM linear memory at `out_ptr`, truncated to `out_cap`.
///
/// Returns the number of bytes actually written, or `-1` if the module has
/// no exported memory or `out_ptr` is out of bounds. Truncation is silent
/// (the caller is expected to size its buffer generously) -- the returned
/// length always reflects what was actually written, never the untruncated
/// size, so a short read is detectable.
fn write_wasm_bytes(
    caller: &mut Caller<'_, HostState>,
    out_ptr: i32,
    out_cap: i32,
    bytes: &[u8],
) -> i32 {
    if out_ptr < 0 {
        return -1;
    }

    let memory = match caller.get_export("memory").and_then(|e| e.into_memory()) {
        Some(m) => m,
        None => return -1,
    };

    let start = out_ptr as usize;
    let cap = out_cap.max(0) as usize;
    let write_len = bytes.len().min(cap);
    let end = start + write_len;

    let data = memory.data_mut(caller);
    if end > data.len() {
        return -1;
    }

    data[start..end].copy_from_slice(&bytes[..write_len]);
    write_len as i32
}

// ---------------------------------------------------------------------------
// READ host functions
// ---------------------------------------------------------------------------

/// `get_entity_count() -> i32`
///
/// Returns the number of alive entities in the world snapshot.
fn host_get_entity_count(mut caller: Caller<'_, HostState>) -> i32 {
    caller.data_mut().host_call_count += 1;
    caller.data().entity_count as i32
}

/// `sim_time() -> f64`
///
/// Returns the current simulation time in seconds.
fn host_sim_time(mut caller: Caller<'_, HostState>) -> f64 {
    caller.data_mut().host_call_count += 1;
    caller.data().sim_time
}

/// `tick_number() -> i64`
///
/// Returns the current tick number.
fn host_tick_number(mut caller: Caller<'_, HostState>) -> i64 {
    caller.data_mut().host_call_count += 1;
    caller.data().tick as i64
}

/// `get_component(entity_id: i64, name_ptr: i32, name_len: i32) -> i64`
///
/// Looks up a component value in the world snapshot. Returns 0 if found,
/// -1 if the entity or component does not exist. The actual component value
/// is written to a result buffer (future enhancement -- for now returns
/// existence check only).
fn host_get_component(
    mut caller: Caller<'_, HostState>,
    entity_id: i64,
    name_ptr: i32,
    name_len: i32,
) -> i64 {
    caller.data_mut().host_call_count += 1;

    let name = match read_wasm_string(&mut caller, name_ptr, name_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "get_component: failed to read component name from WASM memory");
            return -1;
        }
    };

    let raw_id = entity_id as u64;
    let exists = caller
        .data()
        .entity_components
        .get(&raw_id)
        .and_then(|components| components.get(&name))
        .is_some();

    if exists {
        0
    } else {
        -1
    }
}

// ---------------------------------------------------------------------------
// WRITE host functions
// ---------------------------------------------------------------------------

/// `set_component(entity_id: i64, name_ptr, name_len, value_ptr, value_len, reason_ptr, reason_len)`
///
/// Queues a `SetComponent` command with `SystemId::WASM_GAMEPLAY` and
/// `CausalReason::GameRule(reason)`.
#[allow(clippy::too_many_arguments)]
fn host_set_component(
    mut caller: Caller<'_, HostState>,
    entity_id: i64,
    name_ptr: i32,
    name_len: i32,
    value_ptr: i32,
    value_len: i32,
    reason_ptr: i32,
    reason_len: i32,
) {
    caller.data_mut().host_call_count += 1;

    let name = match read_wasm_string(&mut caller, name_ptr, name_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "set_component: failed to read component name");
            return;
        }
    };

    let value_str = match read_wasm_string(&mut caller, value_ptr, value_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "set_component: failed to read value");
            return;
        }
    };

    let reason = match read_wasm_string(&mut caller, reason_ptr, reason_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "set_component: failed to read reason");
            return;
        }
    };

    let value: serde_json::Value = match serde_json::from_str(&value_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                error = %e,
                value = %value_str,
                "set_component: value is not valid JSON -- pass a JSON-encoded string"
            );
            return;
        }
    };

    let target = EntityId::from_raw(entity_id as u64);

    caller.data_mut().commands.set_component(
        target,
        &name,
        value,
        SystemId::WASM_GAMEPLAY,
        CausalReason::GameRule(reason),
    );
}

/// `spawn_semantic(identity_ptr, identity_len, components_ptr, components_len, reason_ptr, reason_len) -> i64`
///
/// Queues a `SpawnSemantic` command. Identity and components are passed as
/// JSON strings. Returns a placeholder entity ID (0) -- the real ID is
/// assigned when the command buffer is applied.
fn host_spawn_semantic(
    mut caller: Caller<'_, HostState>,
    identity_ptr: i32,
    identity_len: i32,
    components_ptr: i32,
    components_len: i32,
    reason_ptr: i32,
    reason_len: i32,
) -> i64 {
    caller.data_mut().host_call_count += 1;

    let identity_str = match read_wasm_string(&mut caller, identity_ptr, identity_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "spawn_semantic: failed to read identity");
            return -1;
        }
    };

    let components_str = match read_wasm_string(&mut caller, components_ptr, components_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "spawn_semantic: failed to read components");
            return -1;
        }
    };

    let reason = match read_wasm_string(&mut caller, reason_ptr, reason_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "spawn_semantic: failed to read reason");
            return -1;
        }
    };

    let identity: EntityIdentity = match serde_json::from_str(&identity_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                error = %e,
                identity = %identity_str,
                "spawn_semantic: identity is not valid JSON EntityIdentity"
            );
            return -1;
        }
    };

    let components: Vec<(String, serde_json::Value)> = match serde_json::from_str(&components_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                error = %e,
                components = %components_str,
                "spawn_semantic: components is not valid JSON array of (name, value) pairs"
            );
            return -1;
        }
    };

    caller.data_mut().commands.spawn_semantic(
        identity,
        components,
        SystemId::WASM_GAMEPLAY,
        CausalReason::GameRule(reason),
    );

    0 // placeholder -- real ID assigned on apply
}

/// `spawn_pooled(identity_ptr, identity_len, components_ptr, components_len, reason_ptr, reason_len) -> i64`
///
/// Queues a `SpawnPooled` command. Identity and components are passed as
/// JSON strings. Returns a placeholder entity ID (0) -- the real ID is
/// assigned when the command buffer is applied.
fn host_spawn_pooled(
    mut caller: Caller<'_, HostState>,
    identity_ptr: i32,
    identity_len: i32,
    components_ptr: i32,
    components_len: i32,
    reason_ptr: i32,
    reason_len: i32,
) -> i64 {
    caller.data_mut().host_call_count += 1;

    let identity_str = match read_wasm_string(&mut caller, identity_ptr, identity_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "spawn_pooled: failed to read identity");
            return -1;
        }
    };

    let components_str = match read_wasm_string(&mut caller, components_ptr, components_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "spawn_pooled: failed to read components");
            return -1;
        }
    };

    let reason = match read_wasm_string(&mut caller, reason_ptr, reason_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "spawn_pooled: failed to read reason");
            return -1;
        }
    };

    let identity: PoolIdentity = match serde_json::from_str(&identity_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                error = %e,
                identity = %identity_str,
                "spawn_pooled: identity is not valid JSON PoolIdentity"
            );
            return -1;
        }
    };

    let components: Vec<(String, serde_json::Value)> = match serde_json::from_str(&components_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                error = %e,
                components = %components_str,
                "spawn_pooled: components is not valid JSON array of (name, value) pairs"
            );
            return -1;
        }
    };

    caller.data_mut().commands.spawn_pooled(
        identity,
        components,
        SystemId::WASM_GAMEPLAY,
        CausalReason::GameRule(reason),
    );

    0 // placeholder -- real ID assigned on apply
}

/// `despawn(entity_id: i64, reason_ptr: i32, reason_len: i32)`
///
/// Queues a `Despawn` command with `SystemId::WASM_GAMEPLAY` and
/// `CausalReason::GameRule(reason)`.
fn host_despawn(
    mut caller: Caller<'_, HostState>,
    entity_id: i64,
    reason_ptr: i32,
    reason_len: i32,
) {
    caller.data_mut().host_call_count += 1;

    let reason = match read_wasm_string(&mut caller, reason_ptr, reason_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "despawn: failed to read reason");
            return;
        }
    };

    let target = EntityId::from_raw(entity_id as u64);

    caller.data_mut().commands.despawn(
        target,
        SystemId::WASM_GAMEPLAY,
        CausalReason::GameRule(reason),
    );
}

/// `emit_event(event_ptr: i32, event_len: i32)`
///
/// Emits a game event. The event is passed as a JSON string that must
/// deserialize to a [`GameEvent`].
fn host_emit_event(mut caller: Caller<'_, HostState>, event_ptr: i32, event_len: i32) {
    caller.data_mut().host_call_count += 1;

    let event_str = match read_wasm_string(&mut caller, event_ptr, event_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "emit_event: failed to read event data");
            return;
        }
    };

    let event: GameEvent = match serde_json::from_str(&event_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                error = %e,
                event = %event_str,
                "emit_event: event is not valid JSON GameEvent"
            );
            return;
        }
    };

    caller.data_mut().events.push(event);
}

// ---------------------------------------------------------------------------
// UTILITY host functions
// ---------------------------------------------------------------------------

/// `log(level: i32, msg_ptr: i32, msg_len: i32)`
///
/// Log a message from WASM. Level mapping:
/// - 0 = trace
/// - 1 = debug
/// - 2 = info
/// - 3 = warn
/// - 4 = error
fn host_log(mut caller: Caller<'_, HostState>, level: i32, msg_ptr: i32, msg_len: i32) {
    caller.data_mut().host_call_count += 1;

    let msg = match read_wasm_string(&mut caller, msg_ptr, msg_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "log: failed to read message from WASM memory");
            return;
        }
    };

    match level {
        0 => tracing::trace!(source = "wasm", "{msg}"),
        1 => tracing::debug!(source = "wasm", "{msg}"),
        2 => tracing::info!(source = "wasm", "{msg}"),
        3 => tracing::warn!(source = "wasm", "{msg}"),
        4 => tracing::error!(source = "wasm", "{msg}"),
        _ => tracing::info!(source = "wasm", level = level, "{msg}"),
    }
}

// ---------------------------------------------------------------------------
// Namespaced subsystem host functions
// ---------------------------------------------------------------------------

/// `config::query(path_ptr, path_len, default_ptr, default_len, out_ptr, out_cap) -> i32`
///
/// Looks up a dotted JSON path in the bound entity's merged config tree
/// (`/` or `.` both accepted as separators). Falls back to `default` (itself
/// a JSON-encoded string) if the path is absent.
#[allow(clippy::too_many_arguments)]
fn host_config_query(
    mut caller: Caller<'_, HostState>,
    path_ptr: i32,
    path_len: i32,
    default_ptr: i32,
    default_len: i32,
    out_ptr: i32,
    out_cap: i32,
) -> i32 {
    caller.data_mut().host_call_count += 1;

    let path = match read_wasm_string(&mut caller, path_ptr, path_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "config::query: failed to read path");
            return -1;
        }
    };

    let default_str = match read_wasm_string(&mut caller, default_ptr, default_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "config::query: failed to read default");
            return -1;
        }
    };

    let found = {
        let tree = &caller.data().config_tree;
        path.split(['.', '/'])
            .filter(|segment| !segment.is_empty())
            .try_fold(tree, |node, segment| node.get(segment))
            .cloned()
    };

    let value = found.unwrap_or_else(|| {
        serde_json::from_str(&default_str).unwrap_or(serde_json::Value::Null)
    });

    let bytes = serde_json::to_vec(&value).unwrap_or_default();
    write_wasm_bytes(&mut caller, out_ptr, out_cap, &bytes)
}

/// `entity::id() -> i64`
///
/// Returns the raw id of the entity this script instance is bound to.
fn host_entity_id(mut caller: Caller<'_, HostState>) -> i64 {
    caller.data_mut().host_call_count += 1;
    caller.data().bound_entity as i64
}

/// `entity::position(out_ptr, out_cap) -> i32`
///
/// Writes the bound entity's `position` component (as JSON, e.g.
/// `{"x":1.0,"y":2.0}`) from the world snapshot. Returns `-1` if the
/// snapshot has no position for this entity.
fn host_entity_position(mut caller: Caller<'_, HostState>, out_ptr: i32, out_cap: i32) -> i32 {
    caller.data_mut().host_call_count += 1;

    let bound = caller.data().bound_entity;
    let value = caller
        .data()
        .entity_components
        .get(&bound)
        .and_then(|components| components.get("position"))
        .cloned();

    match value {
        Some(v) => {
            let bytes = serde_json::to_vec(&v).unwrap_or_default();
            write_wasm_bytes(&mut caller, out_ptr, out_cap, &bytes)
        }
        None => -1,
    }
}

/// `status::get(name_ptr, name_len, out_ptr, out_cap) -> i32`
///
/// Reads a named resource/stat from the bound entity's status snapshot
/// (populated by the script context each tick under the `"status:<name>"`
/// key). Returns `-1` if unknown.
fn host_status_get(
    mut caller: Caller<'_, HostState>,
    name_ptr: i32,
    name_len: i32,
    out_ptr: i32,
    out_cap: i32,
) -> i32 {
    caller.data_mut().host_call_count += 1;

    let name = match read_wasm_string(&mut caller, name_ptr, name_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "status::get: failed to read name");
            return -1;
        }
    };

    let bound = caller.data().bound_entity;
    let key = format!("status:{name}");
    let value = caller
        .data()
        .entity_components
        .get(&bound)
        .and_then(|components| components.get(&key))
        .cloned();

    match value {
        Some(v) => {
            let bytes = serde_json::to_vec(&v).unwrap_or_default();
            write_wasm_bytes(&mut caller, out_ptr, out_cap, &bytes)
        }
        None => -1,
    }
}

/// `status::set(name_ptr, name_len, value_ptr, value_len, reason_ptr, reason_len)`
///
/// Queues a [`ScriptIntent`] targeting the bound entity's status controller.
#[allow(clippy::too_many_arguments)]
fn host_status_set(
    mut caller: Caller<'_, HostState>,
    name_ptr: i32,
    name_len: i32,
    value_ptr: i32,
    value_len: i32,
    reason_ptr: i32,
    reason_len: i32,
) {
    queue_namespaced_intent(
        &mut caller,
        IntentNamespace::Status,
        "set",
        name_ptr,
        name_len,
        value_ptr,
        value_len,
        reason_ptr,
        reason_len,
    );
}

/// `mcontroller::command(name_ptr, name_len, args_ptr, args_len, reason_ptr, reason_len)`
///
/// Queues a [`ScriptIntent`] targeting the bound entity's movement
/// controller (e.g. `"pathMove"`, `"approach"`, `"fly"`).
#[allow(clippy::too_many_arguments)]
fn host_mcontroller_command(
    mut caller: Caller<'_, HostState>,
    name_ptr: i32,
    name_len: i32,
    args_ptr: i32,
    args_len: i32,
    reason_ptr: i32,
    reason_len: i32,
) {
    queue_namespaced_intent(
        &mut caller,
        IntentNamespace::MController,
        "command",
        name_ptr,
        name_len,
        args_ptr,
        args_len,
        reason_ptr,
        reason_len,
    );
}

/// `animator::set_state(machine_ptr, machine_len, state_ptr, state_len, reason_ptr, reason_len)`
///
/// Queues a [`ScriptIntent`] setting a state machine's current state.
#[allow(clippy::too_many_arguments)]
fn host_animator_set_state(
    mut caller: Caller<'_, HostState>,
    machine_ptr: i32,
    machine_len: i32,
    state_ptr: i32,
    state_len: i32,
    reason_ptr: i32,
    reason_len: i32,
) {
    queue_namespaced_intent(
        &mut caller,
        IntentNamespace::Animator,
        "set_state",
        machine_ptr,
        machine_len,
        state_ptr,
        state_len,
        reason_ptr,
        reason_len,
    );
}

/// `animator::trigger(name_ptr, name_len, reason_ptr, reason_len)`
///
/// Queues a one-shot animator event (e.g. an immediate rotation snap or a
/// particle burst), keyed by name with no payload.
fn host_animator_trigger(
    mut caller: Caller<'_, HostState>,
    name_ptr: i32,
    name_len: i32,
    reason_ptr: i32,
    reason_len: i32,
) {
    caller.data_mut().host_call_count += 1;

    let name = match read_wasm_string(&mut caller, name_ptr, name_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "animator::trigger: failed to read name");
            return;
        }
    };
    let reason = match read_wasm_string(&mut caller, reason_ptr, reason_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "animator::trigger: failed to read reason");
            return;
        }
    };

    caller.data_mut().intents.push(ScriptIntent {
        namespace: IntentNamespace::Animator,
        verb: "trigger".to_owned(),
        name,
        args: serde_json::Value::Null,
        reason: CausalReason::GameRule(reason),
    });
}

/// `storage::get(out_ptr, out_cap) -> i32`
///
/// Reads the bound entity's persisted opaque storage (§4.6).
fn host_storage_get(mut caller: Caller<'_, HostState>, out_ptr: i32, out_cap: i32) -> i32 {
    caller.data_mut().host_call_count += 1;
    let bytes = serde_json::to_vec(&caller.data().storage).unwrap_or_default();
    write_wasm_bytes(&mut caller, out_ptr, out_cap, &bytes)
}

/// `storage::set(value_ptr, value_len)`
///
/// Overwrites the bound entity's persisted opaque storage.
fn host_storage_set(mut caller: Caller<'_, HostState>, value_ptr: i32, value_len: i32) {
    caller.data_mut().host_call_count += 1;

    let value_str = match read_wasm_string(&mut caller, value_ptr, value_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "storage::set: failed to read value");
            return;
        }
    };
    let value: serde_json::Value = match serde_json::from_str(&value_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, value = %value_str, "storage::set: value is not valid JSON");
            return;
        }
    };

    caller.data_mut().storage = value;
}

/// `message::poll(out_ptr, out_cap) -> i32`
///
/// Reads the message dispatched to this script this tick (`{"sender":...,
/// "name":..., "args":...}`), if any, and clears it. Returns `-1` if no
/// message is pending.
fn host_message_poll(mut caller: Caller<'_, HostState>, out_ptr: i32, out_cap: i32) -> i32 {
    caller.data_mut().host_call_count += 1;

    let message = caller.data_mut().pending_message.take();
    match message {
        Some(v) => {
            let bytes = serde_json::to_vec(&v).unwrap_or_default();
            write_wasm_bytes(&mut caller, out_ptr, out_cap, &bytes)
        }
        None => -1,
    }
}

/// `message::respond(value_ptr, value_len)`
///
/// Sets the reply the owning script context reads back as `receiveMessage`'s
/// return value after this `call_tick` completes.
fn host_message_respond(mut caller: Caller<'_, HostState>, value_ptr: i32, value_len: i32) {
    caller.data_mut().host_call_count += 1;

    let value_str = match read_wasm_string(&mut caller, value_ptr, value_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "message::respond: failed to read value");
            return;
        }
    };
    let value: serde_json::Value = match serde_json::from_str(&value_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, value = %value_str, "message::respond: value is not valid JSON");
            return;
        }
    };

    caller.data_mut().message_response = Some(value);
}

/// Shared body for the `status::set`/`mcontroller::command`/
/// `animator::set_state` host functions: read `name`, a JSON-encoded
/// `value`, and a `reason`, then push a [`ScriptIntent`].
#[allow(clippy::too_many_arguments)]
fn queue_namespaced_intent(
    caller: &mut Caller<'_, HostState>,
    namespace: IntentNamespace,
    verb: &str,
    name_ptr: i32,
    name_len: i32,
    value_ptr: i32,
    value_len: i32,
    reason_ptr: i32,
    reason_len: i32,
) {
    caller.data_mut().host_call_count += 1;

    let name = match read_wasm_string(caller, name_ptr, name_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, namespace = ?namespace, verb, "failed to read name");
            return;
        }
    };
    let value_str = match read_wasm_string(caller, value_ptr, value_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, namespace = ?namespace, verb, "failed to read value");
            return;
        }
    };
    let reason = match read_wasm_string(caller, reason_ptr, reason_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, namespace = ?namespace, verb, "failed to read reason");
            return;
        }
    };

    let args: serde_json::Value = match serde_json::from_str(&value_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, value = %value_str, "value is not valid JSON");
            return;
        }
    };

    caller.data_mut().intents.push(ScriptIntent {
        namespace,
        verb: verb.to_owned(),
        name,
        args,
        reason: CausalReason::GameRule(reason),
    });
}
