//! Net-element tree: versioned, delta-replicated per-entity state.
//!
//! A [`NetElementGroup`] is an ordered collection of children -- scalars,
//! JSON data blobs, one-shot events, and nested groups -- addressed only by
//! their ordinal index, never by name. Master and slave must add children in
//! the exact same order; the index *is* the schema.
//!
//! Every leaf carries a version stamp from a [`NetVersionCounter`] shared by
//! the whole tree. [`NetElementGroup::write_delta`] walks the tree
//! depth-first and emits only children stamped after `from_version`, prefixed
//! by a leaf-index bitset so the reader knows which ordinals are present.
//! [`NetElementGroup::read_delta`] walks in the same order and applies them.
//! Wire bytes are framed with `bincode`'s varint integer encoding, which
//! satisfies the "VLQ unsigned / zigzag VLQ signed" wire requirement without
//! a hand-rolled codec.
//!
//! Float leaves can opt into interpolation: a `set_target` call on the master
//! (or on read on the slave) stores `(previous, target, duration)` and each
//! [`NetElementGroup::tick_interpolation`] call blends `current` linearly
//! towards `target` until `elapsed >= duration`.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// A process-wide (or tree-wide, if not shared further) monotonic version
/// counter. Every write to a leaf stamps it with `counter.next()`.
///
/// Cloning shares the same underlying counter -- this is how a parent group
/// hands its counter down to nested sub-groups so the whole tree shares one
/// version space, mirroring the source engine's `NetElementVersion` handoff.
#[derive(Debug, Clone)]
pub struct NetVersionCounter(Rc<Cell<u64>>);

impl NetVersionCounter {
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(0)))
    }

    /// Stamp a write and return the new version number.
    pub fn next(&self) -> u64 {
        let v = self.0.get() + 1;
        self.0.set(v);
        v
    }

    /// The most recently issued version number, without advancing.
    pub fn current(&self) -> u64 {
        self.0.get()
    }
}

impl Default for NetVersionCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A stable handle to a child within a [`NetElementGroup`], identifying it by
/// ordinal index. Handles from one group are meaningless against another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetHandle(usize);

#[derive(Debug, Clone)]
struct Interpolation {
    prev: f32,
    target: f32,
    elapsed: f32,
    duration: f32,
}

impl Interpolation {
    fn sample(&self) -> f32 {
        if self.duration <= 0.0 {
            return self.target;
        }
        let t = (self.elapsed / self.duration).clamp(0.0, 1.0);
        self.prev + (self.target - self.prev) * t
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum LeafValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Str(String),
    Data(serde_json::Value),
}

#[derive(Debug, Clone)]
struct Leaf {
    value: LeafValue,
    version: u64,
    interpolation: Option<Interpolation>,
    interpolation_enabled: bool,
}

#[derive(Debug, Clone)]
struct Event {
    /// Occurrences since the tree was created (master) or since the last
    /// applied delta (slave's view of the master's count).
    occurrence_count: u64,
    /// Occurrences not yet returned by `pull_event_occurred`.
    pending: u64,
    version: u64,
}

enum Child {
    Leaf(Leaf),
    Event(Event),
    Group(NetElementGroup),
}

/// An ordered, versioned, delta-replicable tree of entity state.
pub struct NetElementGroup {
    children: Vec<Child>,
    counter: NetVersionCounter,
}

impl NetElementGroup {
    /// Create a new group with its own fresh version counter.
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            counter: NetVersionCounter::new(),
        }
    }

    /// Create a group sharing an existing counter, so it participates in the
    /// same version space as a parent tree.
    pub fn with_counter(counter: NetVersionCounter) -> Self {
        Self {
            children: Vec::new(),
            counter,
        }
    }

    pub fn counter(&self) -> NetVersionCounter {
        self.counter.clone()
    }

    fn push_leaf(&mut self, value: LeafValue, interpolation_enabled: bool) -> NetHandle {
        let version = self.counter.next();
        self.children.push(Child::Leaf(Leaf {
            value,
            version,
            interpolation: None,
            interpolation_enabled,
        }));
        NetHandle(self.children.len() - 1)
    }

    pub fn add_bool(&mut self, initial: bool) -> NetHandle {
        self.push_leaf(LeafValue::Bool(initial), false)
    }

    pub fn add_int(&mut self, initial: i64) -> NetHandle {
        self.push_leaf(LeafValue::Int(initial), false)
    }

    /// Add a float leaf. `interpolate` enables client-side linear blending
    /// towards values received via [`set_float_target`](Self::set_float_target).
    pub fn add_float(&mut self, initial: f32, interpolate: bool) -> NetHandle {
        self.push_leaf(LeafValue::Float(initial), interpolate)
    }

    pub fn add_string(&mut self, initial: impl Into<String>) -> NetHandle {
        self.push_leaf(LeafValue::Str(initial.into()), false)
    }

    pub fn add_data(&mut self, initial: serde_json::Value) -> NetHandle {
        self.push_leaf(LeafValue::Data(initial), false)
    }

    pub fn add_event(&mut self) -> NetHandle {
        let version = self.counter.next();
        self.children.push(Child::Event(Event {
            occurrence_count: 0,
            pending: 0,
            version,
        }));
        NetHandle(self.children.len() - 1)
    }

    /// Add a nested group sharing this tree's counter.
    pub fn add_group(&mut self) -> NetHandle {
        let group = NetElementGroup::with_counter(self.counter.clone());
        self.children.push(Child::Group(group));
        NetHandle(self.children.len() - 1)
    }

    fn leaf(&self, handle: NetHandle) -> &Leaf {
        match &self.children[handle.0] {
            Child::Leaf(leaf) => leaf,
            _ => panic!("net handle {:?} is not a leaf", handle),
        }
    }

    fn leaf_mut(&mut self, handle: NetHandle) -> &mut Leaf {
        match &mut self.children[handle.0] {
            Child::Leaf(leaf) => leaf,
            _ => panic!("net handle {:?} is not a leaf", handle),
        }
    }

    /// Write a leaf value, bumping its version only if the value actually
    /// changed. Keeps `write_delta` from reporting a new version for a
    /// no-op write.
    fn set_leaf(&mut self, handle: NetHandle, value: LeafValue) {
        if self.leaf(handle).value == value {
            return;
        }
        let version = self.counter.next();
        let leaf = self.leaf_mut(handle);
        leaf.value = value;
        leaf.version = version;
    }

    pub fn group_mut(&mut self, handle: NetHandle) -> &mut NetElementGroup {
        match &mut self.children[handle.0] {
            Child::Group(group) => group,
            _ => panic!("net handle {:?} is not a group", handle),
        }
    }

    pub fn group(&self, handle: NetHandle) -> &NetElementGroup {
        match &self.children[handle.0] {
            Child::Group(group) => group,
            _ => panic!("net handle {:?} is not a group", handle),
        }
    }

    pub fn get_bool(&self, handle: NetHandle) -> bool {
        match self.leaf(handle).value {
            LeafValue::Bool(v) => v,
            _ => panic!("net handle {:?} is not a bool leaf", handle),
        }
    }

    pub fn set_bool(&mut self, handle: NetHandle, value: bool) {
        self.set_leaf(handle, LeafValue::Bool(value));
    }

    pub fn get_int(&self, handle: NetHandle) -> i64 {
        match self.leaf(handle).value {
            LeafValue::Int(v) => v,
            _ => panic!("net handle {:?} is not an int leaf", handle),
        }
    }

    pub fn set_int(&mut self, handle: NetHandle, value: i64) {
        self.set_leaf(handle, LeafValue::Int(value));
    }

    pub fn get_string(&self, handle: NetHandle) -> &str {
        match &self.leaf(handle).value {
            LeafValue::Str(v) => v,
            _ => panic!("net handle {:?} is not a string leaf", handle),
        }
    }

    pub fn set_string(&mut self, handle: NetHandle, value: impl Into<String>) {
        self.set_leaf(handle, LeafValue::Str(value.into()));
    }

    pub fn get_data(&self, handle: NetHandle) -> &serde_json::Value {
        match &self.leaf(handle).value {
            LeafValue::Data(v) => v,
            _ => panic!("net handle {:?} is not a data leaf", handle),
        }
    }

    pub fn set_data(&mut self, handle: NetHandle, value: serde_json::Value) {
        self.set_leaf(handle, LeafValue::Data(value));
    }

    /// Current (possibly interpolating) value of a float leaf.
    pub fn get_float(&self, handle: NetHandle) -> f32 {
        let leaf = self.leaf(handle);
        if let Some(interp) = &leaf.interpolation {
            interp.sample()
        } else {
            match leaf.value {
                LeafValue::Float(v) => v,
                _ => panic!("net handle {:?} is not a float leaf", handle),
            }
        }
    }

    /// Set a float leaf directly (master-side authoritative write; no
    /// interpolation is applied since the master always sees the true value).
    pub fn set_float(&mut self, handle: NetHandle, value: f32) {
        if self.leaf(handle).value == LeafValue::Float(value) {
            return;
        }
        let version = self.counter.next();
        let leaf = self.leaf_mut(handle);
        leaf.value = LeafValue::Float(value);
        leaf.version = version;
        leaf.interpolation = None;
    }

    /// Slave-side: begin interpolating towards `value` over `interp_time`
    /// seconds, starting from the leaf's current sampled value.
    pub fn set_float_target(&mut self, handle: NetHandle, value: f32, interp_time: f32) {
        let current = self.get_float(handle);
        let leaf = self.leaf_mut(handle);
        if leaf.interpolation_enabled && interp_time > 0.0 {
            leaf.interpolation = Some(Interpolation {
                prev: current,
                target: value,
                elapsed: 0.0,
                duration: interp_time,
            });
        } else {
            leaf.value = LeafValue::Float(value);
            leaf.interpolation = None;
        }
    }

    /// Raise a one-shot event on the master.
    pub fn trigger_event(&mut self, handle: NetHandle) {
        let version = self.counter.next();
        match &mut self.children[handle.0] {
            Child::Event(event) => {
                event.occurrence_count += 1;
                event.pending += 1;
                event.version = version;
            }
            _ => panic!("net handle {:?} is not an event leaf", handle),
        }
    }

    /// Consume one pending occurrence, if any. Returns `true` exactly once
    /// per trigger; never loses or duplicates occurrences across calls.
    pub fn pull_event_occurred(&mut self, handle: NetHandle) -> bool {
        match &mut self.children[handle.0] {
            Child::Event(event) => {
                if event.pending > 0 {
                    event.pending -= 1;
                    true
                } else {
                    false
                }
            }
            _ => panic!("net handle {:?} is not an event leaf", handle),
        }
    }

    fn child_version(child: &Child) -> u64 {
        match child {
            Child::Leaf(leaf) => leaf.version,
            Child::Event(event) => event.version,
            Child::Group(group) => group.children.iter().map(Self::child_version).max().unwrap_or(0),
        }
    }

    /// Walk the tree depth-first and emit a delta of every child stamped
    /// after `from_version`. Returns `(payload, new_version)`; `new_version`
    /// is the highest version stamp observed anywhere in the tree.
    pub fn write_delta(&self, from_version: u64) -> (Vec<u8>, u64) {
        let mut present = vec![false; self.children.len()];
        let mut payloads: Vec<Vec<u8>> = Vec::new();
        let mut highest = from_version;

        for (i, child) in self.children.iter().enumerate() {
            let version = Self::child_version(child);
            highest = highest.max(version);
            if version <= from_version {
                continue;
            }
            present[i] = true;
            let bytes = match child {
                Child::Leaf(leaf) => {
                    encode(&(leaf.version, leaf.value.clone())).expect("leaf encode never fails")
                }
                Child::Event(event) => {
                    encode(&(event.version, event.occurrence_count)).expect("event encode never fails")
                }
                Child::Group(group) => {
                    let (nested, nested_version) = group.write_delta(from_version);
                    highest = highest.max(nested_version);
                    encode(&nested).expect("nested payload encode never fails")
                }
            };
            payloads.push(bytes);
        }

        let framed = encode(&(present, payloads)).expect("delta frame encode never fails");
        (framed, highest)
    }

    /// Apply a delta produced by [`write_delta`](Self::write_delta). Children
    /// not present in the delta keep their current (possibly interpolating)
    /// value. `interpolation_time` is used to start a new interpolation
    /// window for float leaves rather than snapping them.
    pub fn read_delta(&mut self, payload: &[u8], interpolation_time: f32) {
        let (present, payloads): (Vec<bool>, Vec<Vec<u8>>) =
            match decode(payload) {
                Ok(v) => v,
                Err(_) => return,
            };

        let mut cursor = 0;
        for (i, &is_present) in present.iter().enumerate() {
            if !is_present {
                continue;
            }
            let Some(bytes) = payloads.get(cursor) else {
                break;
            };
            cursor += 1;
            let Some(child) = self.children.get_mut(i) else {
                continue;
            };
            match child {
                Child::Leaf(leaf) => {
                    if let Ok((version, value)) = decode::<(u64, LeafValue)>(bytes) {
                        leaf.version = version;
                        match (&leaf.value, &value) {
                            (LeafValue::Float(_), LeafValue::Float(new)) if leaf.interpolation_enabled => {
                                let current = leaf
                                    .interpolation
                                    .as_ref()
                                    .map(|i| i.sample())
                                    .unwrap_or(match leaf.value {
                                        LeafValue::Float(v) => v,
                                        _ => *new,
                                    });
                                if interpolation_time > 0.0 {
                                    leaf.interpolation = Some(Interpolation {
                                        prev: current,
                                        target: *new,
                                        elapsed: 0.0,
                                        duration: interpolation_time,
                                    });
                                } else {
                                    leaf.value = value;
                                    leaf.interpolation = None;
                                }
                            }
                            _ => {
                                leaf.value = value;
                                leaf.interpolation = None;
                            }
                        }
                    }
                }
                Child::Event(event) => {
                    if let Ok((version, occurrence_count)) = decode::<(u64, u64)>(bytes) {
                        if occurrence_count > event.occurrence_count {
                            event.pending += occurrence_count - event.occurrence_count;
                            event.occurrence_count = occurrence_count;
                        }
                        event.version = version;
                    }
                }
                Child::Group(group) => {
                    if let Ok(nested) = decode::<Vec<u8>>(bytes) {
                        group.read_delta(&nested, interpolation_time);
                    }
                }
            }
        }
    }

    /// Advance all float interpolations and nested groups by `dt` seconds.
    pub fn tick_interpolation(&mut self, dt: f32) {
        for child in &mut self.children {
            match child {
                Child::Leaf(leaf) => {
                    if let Some(interp) = &mut leaf.interpolation {
                        interp.elapsed += dt;
                        if interp.elapsed >= interp.duration {
                            leaf.value = LeafValue::Float(interp.target);
                            leaf.interpolation = None;
                        }
                    }
                }
                Child::Group(group) => group.tick_interpolation(dt),
                Child::Event(_) => {}
            }
        }
    }

    pub fn version(&self) -> u64 {
        self.counter.current()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Default for NetElementGroup {
    fn default() -> Self {
        Self::new()
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::error::EncodeError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, bincode::error::DecodeError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map(|(value, _)| value)
}
