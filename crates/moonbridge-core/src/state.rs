//! The high-level session facade
//!
//! `State` owns an [`Engine`] and exposes the operations a host
//! application actually wants: run chunks, exchange globals, call
//! script-visible functions and methods, and export host functions,
//! classes and objects. Everything below it (stack discipline,
//! marshaling, the calling convention) stays encapsulated.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::adapter::wrap_function;
use crate::bridge::{self, ClassSpec};
use crate::engine::{Engine, ScriptError, Status};
use crate::error::{Error, Result};
use crate::marshal;
use crate::value::{Value, ValueList};

/// Fallback diagnostic used when a failure left no message behind
pub const NO_ADDITIONAL_INFO: &str =
    "sorry, there is no additional information about this error";

/// A unit of script work executed against the engine.
///
/// The runtime modeled here executes externally compiled chunks; the
/// trait keeps `State` independent of where they come from. Any
/// `FnMut(&mut Engine) -> Result<(), ScriptError>` is a chunk, which is
/// also how tests script the engine directly.
pub trait Chunk {
    fn run(&mut self, engine: &mut Engine) -> std::result::Result<(), ScriptError>;
}

impl<F> Chunk for F
where
    F: FnMut(&mut Engine) -> std::result::Result<(), ScriptError>,
{
    fn run(&mut self, engine: &mut Engine) -> std::result::Result<(), ScriptError> {
        self(engine)
    }
}

/// One scripting session: an engine plus the classes exported into it.
#[derive(Default)]
pub struct State {
    engine: Engine,
    classes: BTreeMap<String, Rc<ClassSpec>>,
}

impl State {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct access to the underlying engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Run a chunk and collect everything it returned, in order.
    ///
    /// On failure the stack is restored to its pre-chunk depth and the
    /// error carries the chunk's message, or the fallback text when
    /// the failure produced none.
    pub fn run_chunk<C: Chunk>(&mut self, mut chunk: C) -> Result<ValueList> {
        let baseline = self.engine.top();
        if let Err(error) = chunk.run(&mut self.engine) {
            let status = error.status();
            let leftover = self.engine.top().saturating_sub(baseline);
            self.engine.pop(leftover);
            if !error.message().is_empty() {
                self.engine.push_string(error.message());
            }
            return Err(self.fail(status, baseline));
        }
        marshal::collect_from(&mut self.engine, baseline)
    }

    /// Run a chunk and keep only its first result (nil when it
    /// returned nothing)
    pub fn eval_chunk<C: Chunk>(&mut self, chunk: C) -> Result<Value> {
        let mut results = self.run_chunk(chunk)?;
        if results.is_empty() {
            Ok(Value::Nil)
        } else {
            Ok(results.swap_remove(0))
        }
    }

    /// Read a global as a host value (nil when unset)
    pub fn get_global(&mut self, name: &str) -> Result<Value> {
        self.engine.get_global(name);
        let value = marshal::to_value(&mut self.engine, -1);
        self.engine.pop(1);
        value
    }

    /// Bind a host value as a global
    pub fn set_global(&mut self, name: &str, value: &Value) -> Result<()> {
        marshal::push_value(&mut self.engine, value)?;
        self.engine.set_global(name);
        Ok(())
    }

    /// Export a host function as a global callable
    pub fn register_function<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&ValueList) -> Result<ValueList> + 'static,
    {
        self.engine.push_native(wrap_function(function));
        self.engine.set_global(name);
    }

    /// Export a class. The name must not already be taken.
    pub fn register_class(&mut self, spec: ClassSpec) -> Result<()> {
        if self.classes.contains_key(spec.name()) {
            return Err(Error::Runtime(format!(
                "class '{}' is already registered",
                spec.name()
            )));
        }
        let spec = Rc::new(spec);
        bridge::install(&mut self.engine, &spec)?;
        self.classes.insert(spec.name().to_string(), spec);
        Ok(())
    }

    /// Bind a host-owned object of a registered class at a global path
    pub fn register_object(
        &mut self,
        path: &[Value],
        class_name: &str,
        object: Rc<RefCell<dyn Any>>,
    ) -> Result<()> {
        if !self.classes.contains_key(class_name) {
            return Err(Error::Runtime(format!(
                "class '{class_name}' is not registered"
            )));
        }
        bridge::register_object(&mut self.engine, path, class_name, object)
    }

    /// Call the global function `name` with `args`, returning all of
    /// its results
    pub fn call_global(&mut self, name: &str, args: &[Value]) -> Result<ValueList> {
        let baseline = self.engine.top();
        self.engine.get_global(name);
        for arg in args {
            marshal::push_value(&mut self.engine, arg)?;
        }
        match self.engine.call(args.len()) {
            Status::Ok => marshal::collect_from(&mut self.engine, baseline),
            status => Err(self.fail(status, baseline)),
        }
    }

    /// Call `target:method(args)` where `target` is a global object or
    /// table. The receiver is passed as the first argument.
    pub fn call_method(
        &mut self,
        target: &str,
        method: &str,
        args: &[Value],
    ) -> Result<ValueList> {
        let baseline = self.engine.top();
        self.engine.get_global(target);
        if let Err(error) = self.engine.get_field(-1, method) {
            let leftover = self.engine.top().saturating_sub(baseline);
            self.engine.pop(leftover);
            return Err(error.into());
        }
        self.engine.insert(-2);
        for arg in args {
            marshal::push_value(&mut self.engine, arg)?;
        }
        match self.engine.call(args.len() + 1) {
            Status::Ok => marshal::collect_from(&mut self.engine, baseline),
            status => Err(self.fail(status, baseline)),
        }
    }

    // Recover the message a failure left on top of the stack and turn
    // the status code back into a typed error. Only slots the failed
    // operation pushed above `baseline` are fair game; anything the
    // caller had on the stack beforehand is left alone.
    fn fail(&mut self, status: Status, baseline: usize) -> Error {
        let message = if self.engine.top() > baseline {
            match self.engine.to_str(-1) {
                Some(text) => {
                    let text = text.to_string();
                    self.engine.pop(1);
                    text
                }
                None => NO_ADDITIONAL_INFO.to_string(),
            }
        } else {
            NO_ADDITIONAL_INFO.to_string()
        };
        ScriptError::from_status(status, message).into()
    }
}
