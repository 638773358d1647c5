//! Adapting host functions to the runtime's calling convention
//!
//! A host function takes a `ValueList` and returns a `ValueList`; the
//! runtime instead passes arguments as stack slots `1..=N` and expects
//! results pushed back. [`wrap_function`] bridges the two: it reads the
//! arguments off the stack, invokes the host function, pushes the
//! results and reports the count. Host failures are re-signaled as
//! runtime errors carrying the original message, and panics are
//! contained at the boundary instead of unwinding into the caller.

use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::engine::{Engine, NativeFn, ScriptError};
use crate::error::Result;
use crate::marshal;
use crate::value::ValueList;

/// Message used when a host function fails in a way that carries no
/// diagnostic of its own
pub const UNKNOWN_FAILURE: &str = "unknown exception caught by wrapper";

/// Wrap a host function as a native callable.
///
/// The wrapper reads however many arguments the caller actually
/// passed, so the host function sees the true argument count and can
/// do its own arity checking. An argument with no host representation
/// (a native or userdata slot) fails the call before the host function
/// runs.
pub fn wrap_function<F>(function: F) -> NativeFn
where
    F: Fn(&ValueList) -> Result<ValueList> + 'static,
{
    Rc::new(move |engine: &mut Engine| {
        let nargs = engine.top();
        let mut args = ValueList::with_capacity(nargs);
        for index in 1..=nargs {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let arg = marshal::to_value(engine, index as i32)
                .map_err(|error| ScriptError::Runtime(error.message()))?;
            args.push(arg);
        }
        engine.pop(nargs);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| function(&args)))
            .map_err(|_| ScriptError::Runtime(UNKNOWN_FAILURE.to_string()))?;
        let results =
            outcome.map_err(|error| ScriptError::Runtime(error.message()))?;

        for result in &results {
            marshal::push_value(engine, result)
                .map_err(|error| ScriptError::Runtime(error.message()))?;
        }
        Ok(results.len())
    })
}
