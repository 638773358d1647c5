//! The foreign runtime model: one value stack, C-style calls
//!
//! This module is the "runtime handle" the rest of the crate marshals
//! against: an explicit stack of [`Slot`]s addressed by 1-based
//! positive (absolute) or negative (top-relative) indices, a heap of
//! identity-keyed tables with metatables, globals, native callables
//! and opaque userdata backed by a handle arena.
//!
//! Calls are protected: a failing native truncates the stack to the
//! call site, leaves the error message on top and yields a [`Status`]
//! code. Errors never unwind through the calling convention.

mod heap;
mod slot;

pub use heap::{NativeFn, Ownership};
pub use slot::{HandleId, NativeId, Slot, SlotKind, TableId};

use std::any::Any;
use std::cell::RefCell;
use std::ops::Bound;
use std::rc::Rc;

use thiserror::Error;

use heap::Heap;

/// Maximum `__index` indirections before indexing gives up
const MAX_INDEX_DEPTH: usize = 32;

/// Outcome code of a protected call or chunk execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Runtime,
    File,
    Syntax,
    Memory,
    Handler,
}

/// An error signaled inside the runtime, carrying the message that the
/// protected-call machinery leaves on the stack.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("{0}")]
    Runtime(String),
    #[error("{0}")]
    File(String),
    #[error("{0}")]
    Syntax(String),
    #[error("{0}")]
    Memory(String),
    #[error("{0}")]
    Handler(String),
}

impl ScriptError {
    pub fn status(&self) -> Status {
        match self {
            ScriptError::Runtime(_) => Status::Runtime,
            ScriptError::File(_) => Status::File,
            ScriptError::Syntax(_) => Status::Syntax,
            ScriptError::Memory(_) => Status::Memory,
            ScriptError::Handler(_) => Status::Handler,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ScriptError::Runtime(m)
            | ScriptError::File(m)
            | ScriptError::Syntax(m)
            | ScriptError::Memory(m)
            | ScriptError::Handler(m) => m,
        }
    }

    /// Rebuild the error from a status code plus the recovered message
    pub fn from_status(status: Status, message: String) -> Self {
        match status {
            Status::Ok | Status::Runtime => ScriptError::Runtime(message),
            Status::File => ScriptError::File(message),
            Status::Syntax => ScriptError::Syntax(message),
            Status::Memory => ScriptError::Memory(message),
            Status::Handler => ScriptError::Handler(message),
        }
    }
}

impl From<ScriptError> for crate::error::Error {
    fn from(error: ScriptError) -> Self {
        use crate::error::Error;
        match error {
            ScriptError::Runtime(m) => Error::Runtime(m),
            ScriptError::File(m) => Error::File(m),
            ScriptError::Syntax(m) => Error::Syntax(m),
            ScriptError::Memory(m) => Error::Memory(m),
            ScriptError::Handler(m) => Error::ErrorHandler(m),
        }
    }
}

/// The foreign runtime instance: value stack, call frames and heap.
///
/// Single-threaded and reentrant: a native invoked through [`call`]
/// may itself call back into the engine, forming one logical call
/// stack. Dropping the engine tears it down deterministically,
/// sweeping every handle still flagged as runtime-owned.
///
/// [`call`]: Engine::call
pub struct Engine {
    stack: Vec<Slot>,
    frames: Vec<usize>,
    heap: Heap,
    globals: TableId,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let mut heap = Heap::default();
        let globals = heap.alloc_table();
        Self {
            stack: Vec::with_capacity(32),
            frames: Vec::new(),
            heap,
            globals,
        }
    }

    // ==================== index arithmetic ====================

    fn base(&self) -> usize {
        self.frames.last().copied().unwrap_or(0)
    }

    /// Number of slots in the current call window
    pub fn top(&self) -> usize {
        self.stack.len() - self.base()
    }

    /// Resolve a possibly top-relative index into a positive one.
    /// Positive indices are stable while auxiliary values are pushed
    /// and popped, which is what table traversal needs.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn absolute(&self, index: i32) -> i32 {
        if index < 0 {
            self.top() as i32 + index + 1
        } else {
            index
        }
    }

    #[allow(clippy::cast_sign_loss)]
    fn global_index(&self, index: i32) -> Option<usize> {
        let abs = self.absolute(index);
        if abs < 1 {
            return None;
        }
        let global = self.base() + abs as usize - 1;
        (global < self.stack.len()).then_some(global)
    }

    fn slot(&self, index: i32) -> Option<&Slot> {
        self.global_index(index).map(|g| &self.stack[g])
    }

    /// The type tag at `index`; out-of-range positions read as nil
    pub fn type_of(&self, index: i32) -> SlotKind {
        self.slot(index).map_or(SlotKind::Nil, Slot::kind)
    }

    // ==================== pushes and pops ====================

    pub(crate) fn push_slot(&mut self, slot: Slot) {
        self.stack.push(slot);
    }

    pub fn push_nil(&mut self) {
        self.push_slot(Slot::Nil);
    }

    pub fn push_boolean(&mut self, b: bool) {
        self.push_slot(Slot::Boolean(b));
    }

    pub fn push_number(&mut self, n: f64) {
        self.push_slot(Slot::Number(n));
    }

    pub fn push_string(&mut self, s: &str) {
        self.push_slot(Slot::String(Rc::from(s)));
    }

    /// Push a copy of the slot at `index` (nil when out of range)
    pub fn push_copy(&mut self, index: i32) {
        let copy = self.slot(index).cloned().unwrap_or(Slot::Nil);
        self.push_slot(copy);
    }

    /// Push the globals table itself
    pub fn push_globals(&mut self) {
        self.push_slot(Slot::Table(self.globals));
    }

    /// Pop `n` slots, never reaching below the current call window
    pub fn pop(&mut self, n: usize) {
        let floor = self.base();
        let target = self.stack.len().saturating_sub(n).max(floor);
        self.stack.truncate(target);
    }

    fn pop_slot(&mut self) -> Option<Slot> {
        if self.stack.len() > self.base() {
            self.stack.pop()
        } else {
            None
        }
    }

    /// Remove the slot at `index`, shifting the ones above it down
    pub fn remove(&mut self, index: i32) {
        if let Some(global) = self.global_index(index) {
            self.stack.remove(global);
        }
    }

    /// Move the top slot to `index`, shifting the ones above it up
    pub fn insert(&mut self, index: i32) {
        if let Some(global) = self.global_index(index) {
            if let Some(top) = self.pop_slot() {
                self.stack.insert(global, top);
            }
        }
    }

    // ==================== typed reads ====================

    pub fn to_boolean(&self, index: i32) -> Option<bool> {
        match self.slot(index) {
            Some(Slot::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn to_number(&self, index: i32) -> Option<f64> {
        match self.slot(index) {
            Some(Slot::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn to_str(&self, index: i32) -> Option<&str> {
        match self.slot(index) {
            Some(Slot::String(s)) => Some(s),
            _ => None,
        }
    }

    /// The handle id at `index`, if the slot holds userdata
    pub fn handle_at(&self, index: i32) -> Option<HandleId> {
        match self.slot(index) {
            Some(Slot::Userdata(id)) => Some(*id),
            _ => None,
        }
    }

    // ==================== tables ====================

    /// Push a fresh, empty table
    pub fn new_table(&mut self) {
        let id = self.heap.alloc_table();
        self.push_slot(Slot::Table(id));
    }

    /// `t[k] = v` where `t` is at `index` and `k`, `v` are the two top
    /// slots (value on top). Pops both.
    pub fn set_table(&mut self, index: i32) -> Result<(), ScriptError> {
        let target = self.slot(index).cloned();
        let Some(Slot::Table(table)) = target else {
            let found = target.as_ref().map_or("nil", Slot::type_name);
            return Err(ScriptError::Runtime(format!(
                "attempt to index a {found} value"
            )));
        };
        let value = self.pop_slot().ok_or_else(|| {
            ScriptError::Runtime("set_table: missing value on the stack".to_string())
        })?;
        let key = self.pop_slot().ok_or_else(|| {
            ScriptError::Runtime("set_table: missing key on the stack".to_string())
        })?;
        self.heap.table_mut(table).entries.insert(key, value);
        Ok(())
    }

    /// Pop the key on top and push `t[k]`, following `__index` chains
    /// for tables and userdata. Pushes nil for an absent key.
    pub fn get_table(&mut self, index: i32) -> Result<(), ScriptError> {
        let container = self.slot(index).cloned().unwrap_or(Slot::Nil);
        let key = self.pop_slot().ok_or_else(|| {
            ScriptError::Runtime("get_table: missing key on the stack".to_string())
        })?;

        let mut target = container;
        for _ in 0..MAX_INDEX_DEPTH {
            match target {
                Slot::Table(id) => {
                    if let Some(found) = self.heap.table(id).entries.get(&key) {
                        let found = found.clone();
                        self.push_slot(found);
                        return Ok(());
                    }
                    let fallback = self.heap.table(id).metatable.and_then(|meta| {
                        self.heap.table(meta).entries.get(&Slot::key("__index")).cloned()
                    });
                    match fallback {
                        Some(next) => target = next,
                        None => {
                            self.push_nil();
                            return Ok(());
                        }
                    }
                }
                Slot::Userdata(id) => {
                    let Some(meta) = self.heap.handle(id).metatable else {
                        return Err(ScriptError::Runtime(
                            "attempt to index a userdata value".to_string(),
                        ));
                    };
                    let fallback =
                        self.heap.table(meta).entries.get(&Slot::key("__index")).cloned();
                    match fallback {
                        Some(next) => target = next,
                        None => {
                            self.push_nil();
                            return Ok(());
                        }
                    }
                }
                other => {
                    return Err(ScriptError::Runtime(format!(
                        "attempt to index a {} value",
                        other.type_name()
                    )));
                }
            }
        }
        Err(ScriptError::Runtime(
            "'__index' chain too long; possible loop".to_string(),
        ))
    }

    /// Push `t[name]` for the container at `index`
    pub fn get_field(&mut self, index: i32, name: &str) -> Result<(), ScriptError> {
        let abs = self.absolute(index);
        self.push_string(name);
        self.get_table(abs)
    }

    /// Table traversal step. Pops the control key (nil to start) and,
    /// if the table at `index` has a following pair, pushes key then
    /// value and returns `true`; otherwise pushes nothing and returns
    /// `false`. Every pair is visited exactly once.
    pub fn next(&mut self, index: i32) -> Result<bool, ScriptError> {
        let Some(Slot::Table(table)) = self.slot(index).cloned() else {
            let found = self.type_of(index).name();
            return Err(ScriptError::Runtime(format!(
                "attempt to traverse a {found} value"
            )));
        };
        let key = self.pop_slot().ok_or_else(|| {
            ScriptError::Runtime("next: missing control key on the stack".to_string())
        })?;

        let entry = {
            let entries = &self.heap.table(table).entries;
            match key {
                Slot::Nil => entries.iter().next(),
                ref from => entries
                    .range((Bound::Excluded(from.clone()), Bound::Unbounded))
                    .next(),
            }
            .map(|(k, v)| (k.clone(), v.clone()))
        };

        match entry {
            Some((k, v)) => {
                self.push_slot(k);
                self.push_slot(v);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ==================== globals ====================

    /// Push the global named `name` (nil when absent)
    pub fn get_global(&mut self, name: &str) {
        let value = self
            .heap
            .table(self.globals)
            .entries
            .get(&Slot::key(name))
            .cloned()
            .unwrap_or(Slot::Nil);
        self.push_slot(value);
    }

    /// Pop the top slot and bind it as the global named `name`
    pub fn set_global(&mut self, name: &str) {
        if let Some(value) = self.pop_slot() {
            self.heap
                .table_mut(self.globals)
                .entries
                .insert(Slot::key(name), value);
        }
    }

    // ==================== metatables ====================

    /// Pop the table on top and set it as the metatable of the table
    /// or userdata at `index`
    pub fn set_metatable(&mut self, index: i32) -> Result<(), ScriptError> {
        let target = self.slot(index).cloned();
        let meta = match self.pop_slot() {
            Some(Slot::Table(id)) => id,
            Some(other) => {
                return Err(ScriptError::Runtime(format!(
                    "metatable must be a table, got {}",
                    other.type_name()
                )));
            }
            None => {
                return Err(ScriptError::Runtime(
                    "set_metatable: missing metatable on the stack".to_string(),
                ));
            }
        };
        match target {
            Some(Slot::Table(id)) => {
                self.heap.table_mut(id).metatable = Some(meta);
                Ok(())
            }
            Some(Slot::Userdata(id)) => {
                self.heap.handle_mut(id).metatable = Some(meta);
                Ok(())
            }
            other => Err(ScriptError::Runtime(format!(
                "cannot set a metatable on a {} value",
                other.as_ref().map_or("nil", Slot::type_name)
            ))),
        }
    }

    /// Push the metatable of the slot at `index`, or return `false`
    pub fn get_metatable(&mut self, index: i32) -> bool {
        let meta = match self.slot(index) {
            Some(Slot::Table(id)) => self.heap.table(*id).metatable,
            Some(Slot::Userdata(id)) => self.heap.handle(*id).metatable,
            _ => None,
        };
        match meta {
            Some(id) => {
                self.push_slot(Slot::Table(id));
                true
            }
            None => false,
        }
    }

    // ==================== natives and calls ====================

    /// Push a native callable
    pub fn push_native(&mut self, function: NativeFn) {
        let id = self.heap.alloc_native(function);
        self.push_slot(Slot::Native(id));
    }

    /// Protected call. Expects the callee followed by `nargs` arguments
    /// on top of the stack; both are consumed. On success the callee's
    /// results take their place and `Status::Ok` is returned. On
    /// failure the stack is truncated to the call site, the error
    /// message is pushed and the matching status code is returned;
    /// the error never unwinds through the call boundary.
    pub fn call(&mut self, nargs: usize) -> Status {
        if self.top() < nargs + 1 {
            self.push_string("call: missing callee on the stack");
            return Status::Runtime;
        }
        let callee_at = self.stack.len() - nargs - 1;
        let callee = self.stack[callee_at].clone();
        let Slot::Native(id) = callee else {
            self.stack.truncate(callee_at);
            let message = format!("attempt to call a {} value", callee.type_name());
            self.push_string(&message);
            return Status::Runtime;
        };

        // The callee's window starts at its first argument; the callee
        // slot itself stays outside it.
        let function = self.heap.native(id);
        self.frames.push(callee_at + 1);
        let outcome = function(self);
        self.frames.pop();

        match outcome {
            Ok(nresults) => {
                let window_base = callee_at + 1;
                let nresults = nresults.min(self.stack.len() - window_base);
                let results = self.stack.split_off(self.stack.len() - nresults);
                self.stack.truncate(callee_at);
                self.stack.extend(results);
                Status::Ok
            }
            Err(error) => {
                self.stack.truncate(callee_at);
                let status = error.status();
                let message = error.message().to_string();
                self.push_string(&message);
                status
            }
        }
    }

    /// [`call`](Engine::call) variant for use inside chunks and
    /// natives: recovers the pushed message and returns it as a
    /// `ScriptError` instead of a status code.
    pub fn checked_call(&mut self, nargs: usize) -> Result<(), ScriptError> {
        match self.call(nargs) {
            Status::Ok => Ok(()),
            status => {
                let message = self.to_str(-1).map_or_else(String::new, ToString::to_string);
                self.pop(1);
                Err(ScriptError::from_status(status, message))
            }
        }
    }

    // ==================== userdata and handles ====================

    /// Push a fresh userdata slot wrapping `object`
    pub fn new_userdata(&mut self, object: Rc<RefCell<dyn Any>>, ownership: Ownership) {
        let id = self.heap.alloc_handle(object, ownership);
        self.push_slot(Slot::Userdata(id));
    }

    /// The host object behind a handle, if it is still alive
    pub fn handle_object(&self, id: HandleId) -> Option<Rc<RefCell<dyn Any>>> {
        self.heap.handle(id).object.clone()
    }

    /// Destroy hook. Consumes the ownership flag exactly once; later
    /// invocations on the same handle find the flag cleared and do
    /// nothing. Runtime-owned handles hold the only strong reference,
    /// so releasing it here destroys the object; host-owned handles
    /// merely drop the bridge's reference.
    pub fn destroy_handle(&mut self, id: HandleId) {
        let entry = self.heap.handle_mut(id);
        if entry.ownership.take().is_some() {
            entry.object = None;
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Deterministic teardown: the collector's final visit
        self.heap.sweep_handles();
    }
}
