//! Moonbridge Core - Embedding bridge between Rust hosts and a
//! scripting runtime
//!
//! This crate provides the core functionality:
//! - Value: the runtime's data model as a host-side value type
//! - Engine: the runtime's stack, heap and calling convention
//! - Marshal: moving values across the host/runtime boundary
//! - Adapter: host functions as runtime callables
//! - Bridge: host classes and objects exported to scripts
//! - State: the high-level session facade

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error taxonomy - value-level and boundary-crossing errors
pub mod error;

/// Dynamically-typed values with a total order and JSON interchange
pub mod value;

/// The foreign runtime model - stack, heap, calls, handles
pub mod engine;

/// Marshaling between host values and the runtime stack
pub mod marshal;

/// Adapting host functions to the runtime's calling convention
pub mod adapter;

/// Exporting host classes and objects
pub mod bridge;

/// The session facade over the engine
pub mod state;

/// Convenience re-export of the value type and its aliases
pub use value::{TableMap, Value, ValueKind, ValueList};

/// Convenience re-export of the error types
pub use error::{Error, Result, ValueError};

/// Convenience re-export of the engine surface
pub use engine::{Engine, NativeFn, Ownership, ScriptError, SlotKind, Status};

/// Convenience re-export of the function adapter
pub use adapter::wrap_function;

/// Convenience re-export of the class machinery
pub use bridge::{ClassBuilder, ClassSpec};

/// Convenience re-export of the session facade
pub use state::{Chunk, State, NO_ADDITIONAL_INFO};
