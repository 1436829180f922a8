//! Per-entity script host (§4.6): wraps a sandboxed WASM module with the
//! tick-gating, persisted storage, and message dispatch an entity's scripted
//! behavior needs.
//!
//! The scripting language itself is out of scope -- any module satisfying
//! the narrow `init/update/handle_message/shutdown/get_storage/set_storage`
//! surface is acceptable, and `nomai-wasm-host`'s fuel-metered Wasmtime
//! sandbox is the one this crate ships. World state never reaches a script
//! directly: reads go through a pre-built snapshot, writes accumulate as
//! [`CommandBuffer`] commands and [`ScriptIntent`]s that the owning entity
//! aggregate drains and applies after the call returns.

use std::collections::HashMap;

use nomai_ecs::command::CommandBuffer;
use nomai_ecs::entity::EntityId;
use nomai_manifest::manifest::GameEvent;
use nomai_wasm_host::{ScriptIntent, WasmConfig, WasmError, WasmModule};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::VariantConfig;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by a script invocation.
///
/// Mirrors §7's `ScriptError`: `Trapped`/`TimedOut` on top of the underlying
/// WASM-host error. A script that errors is marked errored and stops running
/// (`ScriptContext::is_errored`) until explicitly [`ScriptContext::reset`].
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script raised a trap (e.g. an unreachable instruction or an
    /// out-of-bounds access).
    #[error("script trapped: {0}")]
    Trapped(String),
    /// The script exceeded its per-call fuel budget.
    #[error("script exceeded its time budget of {budget} fuel units")]
    TimedOut {
        /// The configured fuel-per-tick budget that was exhausted.
        budget: u64,
    },
    /// Any other WASM-host failure (compile error, missing export, ...).
    #[error(transparent)]
    Wasm(#[from] WasmError),
}

fn classify(error: WasmError) -> ScriptError {
    match error {
        WasmError::OutOfFuel { budget } => ScriptError::TimedOut { budget },
        WasmError::Trap(msg) => ScriptError::Trapped(msg),
        other => ScriptError::Wasm(other),
    }
}

// ---------------------------------------------------------------------------
// Tick output
// ---------------------------------------------------------------------------

/// Everything a single successful `ScriptContext::tick` call produced,
/// awaiting drain-and-apply by the owning entity aggregate.
#[derive(Debug)]
pub struct ScriptTickOutput {
    /// Deferred ECS mutations queued via the generic `nomai` host functions.
    pub commands: CommandBuffer,
    /// Game events emitted via `emit_event`.
    pub events: Vec<GameEvent>,
    /// Namespaced subsystem writes (`status`/`mcontroller`/`animator`).
    pub intents: Vec<ScriptIntent>,
    /// Fuel consumed by this call, for budget diagnostics.
    pub fuel_consumed: u64,
}

// ---------------------------------------------------------------------------
// ScriptContext
// ---------------------------------------------------------------------------

/// A loaded script module plus the tick-gating and error-latch state around
/// it. Not yet bound to a specific entity -- see [`ScriptHandle`].
pub struct ScriptContext {
    module: WasmModule,
    update_delta: u32,
    ticks_since_update: u32,
    config: VariantConfig,
    errored: bool,
    last_error: Option<String>,
}

impl ScriptContext {
    /// Load a script module from WASM bytecode.
    ///
    /// `update_delta` is the number of ticks between `update()` invocations
    /// (§4.6); a value of 0 is treated as 1 (update every tick).
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Wasm`] if the bytecode fails to compile or
    /// doesn't export `tick()`.
    pub fn load(
        wasm_config: &WasmConfig,
        bytecode: &[u8],
        update_delta: u32,
        config: VariantConfig,
    ) -> Result<Self, ScriptError> {
        let module = WasmModule::from_bytes(wasm_config, bytecode)?;
        Ok(Self {
            module,
            update_delta: update_delta.max(1),
            ticks_since_update: 0,
            config,
            errored: false,
            last_error: None,
        })
    }

    /// Whether the script has errored and is skipped until [`reset`](Self::reset).
    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// The error message from the last failed invocation, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Clear the error latch, resuming normal `update()` invocations.
    pub fn reset(&mut self) {
        self.errored = false;
        self.last_error = None;
        self.ticks_since_update = 0;
    }

    /// The currently loaded merged variant config.
    pub fn config(&self) -> &VariantConfig {
        &self.config
    }

    /// Read the script's persisted opaque storage.
    pub fn get_storage(&self) -> Value {
        self.module.host_state().storage.clone()
    }

    /// Overwrite the script's persisted opaque storage (e.g. after loading
    /// an entity snapshot).
    pub fn set_storage(&mut self, value: Value) {
        self.module.host_state_mut().storage = value;
    }

    /// Advance the update-gating counter and, if `update_delta` ticks have
    /// elapsed, run the script's `update()`.
    ///
    /// Returns `Ok(None)` if this tick was gated out or the script is
    /// currently errored. Returns `Ok(Some(_))` with the drained commands,
    /// events, and intents on a successful update. On failure the script is
    /// latched into the errored state and the error is returned.
    pub fn tick(
        &mut self,
        entity: EntityId,
        tick: u64,
        sim_time: f64,
        snapshot: HashMap<u64, HashMap<String, Value>>,
        entity_count: usize,
    ) -> Result<Option<ScriptTickOutput>, ScriptError> {
        if self.errored {
            return Ok(None);
        }

        self.ticks_since_update += 1;
        if self.ticks_since_update < self.update_delta {
            return Ok(None);
        }
        self.ticks_since_update = 0;

        self.prepare_host_state(entity, tick, sim_time, snapshot, entity_count);

        tracing::trace!(entity = entity.to_raw(), tick, "script update invoked");

        match self.module.call_tick() {
            Ok(fuel_consumed) => Ok(Some(ScriptTickOutput {
                commands: self.module.drain_commands(),
                events: self.module.drain_events(),
                intents: self.module.host_state_mut().drain_intents(),
                fuel_consumed,
            })),
            Err(e) => Err(self.latch_error(entity, e)),
        }
    }

    /// Dispatch a message to the script's `handle_message` entrypoint
    /// (§4.6), bypassing the `update_delta` gate -- messages are delivered
    /// as soon as they arrive, unlike the periodic `update()`.
    ///
    /// The script is expected to check `message::poll` at the top of its
    /// `tick()` export and call `message::respond` with its reply; if it
    /// never calls `respond`, this returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`tick`](Self::tick) and latches the
    /// script errored on failure.
    pub fn handle_message(
        &mut self,
        entity: EntityId,
        tick: u64,
        sim_time: f64,
        sender: Option<EntityId>,
        name: &str,
        args: Value,
    ) -> Result<Option<Value>, ScriptError> {
        if self.errored {
            return Ok(None);
        }

        self.prepare_host_state(entity, tick, sim_time, HashMap::new(), 0);
        self.module.host_state_mut().pending_message = Some(json!({
            "sender": sender.map(EntityId::to_raw),
            "name": name,
            "args": args,
        }));

        match self.module.call_tick() {
            Ok(_) => Ok(self.module.host_state_mut().message_response.take()),
            Err(e) => Err(self.latch_error(entity, e)),
        }
    }

    /// Whether the script reports it should be torn down (§4.6, "the entity
    /// is not killed unless it also reports `shouldDie()`"). Returns `false`
    /// without invoking the module if it doesn't export `should_die`.
    pub fn should_die(&mut self) -> bool {
        let instance = *self.module.instance();
        let exports_should_die = instance
            .get_export(self.module.store_mut(), "should_die")
            .is_some();
        if !exports_should_die {
            return false;
        }
        matches!(self.module.call_i32_export("should_die"), Ok(v) if v != 0)
    }

    /// Tear down the script; after this, `tick`/`handle_message` are no-ops
    /// until [`reset`](Self::reset).
    pub fn shutdown(&mut self) {
        self.errored = true;
        self.last_error = Some("shut down".to_owned());
    }

    fn prepare_host_state(
        &mut self,
        entity: EntityId,
        tick: u64,
        sim_time: f64,
        snapshot: HashMap<u64, HashMap<String, Value>>,
        entity_count: usize,
    ) {
        let config_tree = self.config.tree().clone();
        let host = self.module.host_state_mut();
        host.begin_tick(tick, sim_time);
        host.bind_entity(entity, config_tree);
        host.snapshot_world(snapshot, entity_count);
    }

    fn latch_error(&mut self, entity: EntityId, error: WasmError) -> ScriptError {
        let error = classify(error);
        tracing::warn!(
            entity = entity.to_raw(),
            error = %error,
            "script invocation failed, disabling until reset"
        );
        self.errored = true;
        self.last_error = Some(error.to_string());
        error
    }
}

// ---------------------------------------------------------------------------
// ScriptHandle
// ---------------------------------------------------------------------------

/// A [`ScriptContext`] bound to the entity it governs. This is what the
/// entity aggregate owns: the entity id is threaded through every call so
/// the context itself stays entity-agnostic and reusable in tests.
pub struct ScriptHandle {
    /// The entity this script instance is running for.
    pub entity: EntityId,
    /// The underlying script context.
    pub context: ScriptContext,
}

impl ScriptHandle {
    /// Bind a loaded script context to an entity.
    pub fn new(entity: EntityId, context: ScriptContext) -> Self {
        Self { entity, context }
    }

    /// See [`ScriptContext::tick`].
    pub fn tick(
        &mut self,
        tick: u64,
        sim_time: f64,
        snapshot: HashMap<u64, HashMap<String, Value>>,
        entity_count: usize,
    ) -> Result<Option<ScriptTickOutput>, ScriptError> {
        self.context
            .tick(self.entity, tick, sim_time, snapshot, entity_count)
    }

    /// See [`ScriptContext::handle_message`].
    pub fn handle_message(
        &mut self,
        tick: u64,
        sim_time: f64,
        sender: Option<EntityId>,
        name: &str,
        args: Value,
    ) -> Result<Option<Value>, ScriptError> {
        self.context
            .handle_message(self.entity, tick, sim_time, sender, name, args)
    }
}
