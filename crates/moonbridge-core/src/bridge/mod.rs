//! Exporting host objects and classes to the runtime
//!
//! A class is exported as a global table carrying its name, a `new`
//! constructor, a `delete` destructor (also wired as `__gc`), and one
//! native per method. The table is its own `__index`, so method lookup
//! on an instance goes through the instance's metatable straight back
//! to the class table.
//!
//! Instances are userdata handles. Who destroys the host object behind
//! a handle is decided at creation time: `new` makes runtime-owned
//! instances, [`register_object`] binds host-owned ones that outlive
//! the engine.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

pub use crate::engine::Ownership;

use crate::adapter::UNKNOWN_FAILURE;
use crate::engine::{Engine, NativeFn, ScriptError, SlotKind};
use crate::error::{Error, Result, ValueError};
use crate::marshal;
use crate::value::{Value, ValueList};

/// Type-erased constructor stored in a class descriptor
type Constructor = Rc<dyn Fn(&ValueList) -> Result<Rc<RefCell<dyn Any>>>>;

/// Type-erased method stored in a class descriptor
type Method = Rc<dyn Fn(&mut dyn Any, &ValueList) -> Result<ValueList>>;

/// A complete class descriptor, ready to install into an engine.
///
/// Built with [`ClassBuilder`]; the typed constructor and methods are
/// erased here so one descriptor type covers every host class.
pub struct ClassSpec {
    name: String,
    constructor: Constructor,
    methods: BTreeMap<String, Method>,
}

impl ClassSpec {
    /// The exported class name, also the name of its global table
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

// The constructor and methods are opaque closures, so show the parts
// that identify the class.
impl fmt::Debug for ClassSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSpec")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder assembling a [`ClassSpec`] from typed closures.
///
/// The builder erases the concrete type `T` behind `dyn Any`; each
/// method re-acquires it with a downcast at call time, so calling a
/// method on an instance of another class fails cleanly instead of
/// misinterpreting the object.
pub struct ClassBuilder {
    name: String,
    constructor: Option<Constructor>,
    methods: BTreeMap<String, Method>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructor: None,
            methods: BTreeMap::new(),
        }
    }

    /// Set the constructor: a closure building a `T` from the call
    /// arguments
    #[must_use]
    pub fn constructor<T, F>(mut self, build: F) -> Self
    where
        T: Any,
        F: Fn(&ValueList) -> Result<T> + 'static,
    {
        self.constructor = Some(Rc::new(move |args| {
            let object = build(args)?;
            Ok(Rc::new(RefCell::new(object)) as Rc<RefCell<dyn Any>>)
        }));
        self
    }

    /// Add a method: a closure receiving the instance and the call
    /// arguments (the receiver itself excluded)
    #[must_use]
    pub fn method<T, F>(mut self, name: impl Into<String>, call: F) -> Self
    where
        T: Any,
        F: Fn(&mut T, &ValueList) -> Result<ValueList> + 'static,
    {
        let method_name: String = name.into();
        let reported = method_name.clone();
        self.methods.insert(
            method_name,
            Rc::new(move |object: &mut dyn Any, args: &ValueList| {
                let Some(typed) = object.downcast_mut::<T>() else {
                    return Err(Error::Runtime(format!(
                        "method '{reported}' called on an object of another class"
                    )));
                };
                call(typed, args)
            }),
        );
        self
    }

    /// Finish the descriptor; fails if no constructor was set
    pub fn build(self) -> Result<ClassSpec> {
        let constructor = self.constructor.ok_or_else(|| {
            Error::Runtime(format!("class '{}' has no constructor", self.name))
        })?;
        Ok(ClassSpec {
            name: self.name,
            constructor,
            methods: self.methods,
        })
    }
}

/// Install a class into the engine as a global table named after it.
pub fn install(engine: &mut Engine, spec: &Rc<ClassSpec>) -> Result<()> {
    engine.new_table();
    let table = engine.absolute(-1);

    engine.push_string("classname");
    engine.push_string(&spec.name);
    engine.set_table(table)?;

    engine.push_string("new");
    engine.push_native(constructor_native(spec));
    engine.set_table(table)?;

    // `delete` is the explicit destroy hook; `__gc` aliases it so the
    // collector's visit goes through the same consume-once path.
    let delete = delete_native(spec.name.clone());
    for key in ["delete", "__gc"] {
        engine.push_string(key);
        engine.push_native(Rc::clone(&delete));
        engine.set_table(table)?;
    }

    for (name, method) in &spec.methods {
        engine.push_string(name);
        engine.push_native(method_native(
            spec.name.clone(),
            name.clone(),
            Rc::clone(method),
        ));
        engine.set_table(table)?;
    }

    engine.push_string("__index");
    engine.push_copy(table);
    engine.set_table(table)?;

    engine.set_global(&spec.name);
    Ok(())
}

/// Bind an existing host-owned object at a (possibly nested) global
/// path.
///
/// Every component but the last names an intermediate table; a
/// non-table on the way is a type mismatch. The object stays owned by
/// the host: scripts may use it and even call `delete` on it, but the
/// engine never destroys it.
pub fn register_object(
    engine: &mut Engine,
    path: &[Value],
    class_name: &str,
    object: Rc<RefCell<dyn Any>>,
) -> Result<()> {
    let Some((binding, parents)) = path.split_last() else {
        return Err(Error::Runtime(
            "cannot bind an object to an empty path".to_string(),
        ));
    };

    engine.push_globals();
    for step in parents {
        if engine.type_of(-1) != SlotKind::Table {
            let found = engine.type_of(-1).name();
            engine.pop(1);
            return Err(ValueError::TypeMismatch {
                expected: "table",
                found,
            }
            .into());
        }
        marshal::push_value(engine, step)?;
        engine.get_table(-2)?;
        engine.remove(-2);
    }
    if engine.type_of(-1) != SlotKind::Table {
        let found = engine.type_of(-1).name();
        engine.pop(1);
        return Err(ValueError::TypeMismatch {
            expected: "table",
            found,
        }
        .into());
    }

    marshal::push_value(engine, binding)?;
    engine.new_userdata(object, Ownership::HostOwned);
    engine.get_global(class_name);
    if engine.type_of(-1) != SlotKind::Table {
        engine.pop(3);
        return Err(Error::Runtime(format!(
            "class '{class_name}' is not installed"
        )));
    }
    engine.set_metatable(-2)?;
    engine.set_table(-3)?;
    engine.pop(1);
    Ok(())
}

fn constructor_native(spec: &Rc<ClassSpec>) -> NativeFn {
    let class = spec.name.clone();
    let constructor = Rc::clone(&spec.constructor);
    Rc::new(move |engine: &mut Engine| {
        let args = take_arguments(engine, 1)?;
        let object = panic::catch_unwind(AssertUnwindSafe(|| constructor(&args)))
            .map_err(|_| ScriptError::Runtime(UNKNOWN_FAILURE.to_string()))?
            .map_err(|error| ScriptError::Runtime(error.message()))?;

        engine.new_userdata(object, Ownership::RuntimeOwned);
        engine.get_global(&class);
        engine.set_metatable(-2)?;
        Ok(1)
    })
}

fn delete_native(class: String) -> NativeFn {
    Rc::new(move |engine: &mut Engine| {
        let Some(handle) = engine.handle_at(1) else {
            return Err(ScriptError::Runtime(format!(
                "'delete' must be called on a '{class}' object"
            )));
        };
        engine.pop(engine.top());
        engine.destroy_handle(handle);
        Ok(0)
    })
}

fn method_native(class: String, name: String, method: Method) -> NativeFn {
    Rc::new(move |engine: &mut Engine| {
        let Some(handle) = engine.handle_at(1) else {
            return Err(ScriptError::Runtime(format!(
                "method '{name}' must be called on a '{class}' object"
            )));
        };
        let args = take_arguments(engine, 2)?;
        let Some(object) = engine.handle_object(handle) else {
            return Err(ScriptError::Runtime(format!(
                "attempt to use a destroyed '{class}' object"
            )));
        };

        let results = {
            let mut borrow = object.try_borrow_mut().map_err(|_| {
                ScriptError::Runtime(format!(
                    "object already in use in call to '{name}'"
                ))
            })?;
            panic::catch_unwind(AssertUnwindSafe(|| method(&mut *borrow, &args)))
                .map_err(|_| ScriptError::Runtime(UNKNOWN_FAILURE.to_string()))?
                .map_err(|error| ScriptError::Runtime(error.message()))?
        };

        for result in &results {
            marshal::push_value(engine, result)
                .map_err(|error| ScriptError::Runtime(error.message()))?;
        }
        Ok(results.len())
    })
}

// Read the slots `first..=top` as host values and clear the window.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn take_arguments(engine: &mut Engine, first: usize) -> std::result::Result<ValueList, ScriptError> {
    let top = engine.top();
    let mut args = ValueList::new();
    for index in first..=top {
        let arg = marshal::to_value(engine, index as i32)
            .map_err(|error| ScriptError::Runtime(error.message()))?;
        args.push(arg);
    }
    engine.pop(top);
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Status;

    struct Counter {
        count: f64,
    }

    fn counter_class() -> Rc<ClassSpec> {
        let spec = ClassBuilder::new("Counter")
            .constructor(|args: &ValueList| {
                let start = match args.first() {
                    Some(value) => value.as_number()?,
                    None => 0.0,
                };
                Ok(Counter { count: start })
            })
            .method("increment", |counter: &mut Counter, _: &ValueList| {
                counter.count += 1.0;
                Ok(vec![Value::from(counter.count)])
            })
            .method("get", |counter: &mut Counter, _: &ValueList| {
                Ok(vec![Value::from(counter.count)])
            })
            .build()
            .unwrap();
        Rc::new(spec)
    }

    // Emulates `Class.new(...)`, leaving the instance on the stack.
    fn construct(engine: &mut Engine, class: &str, args: &[Value]) {
        engine.get_global(class);
        engine.get_field(-1, "new").unwrap();
        engine.remove(-2);
        for arg in args {
            marshal::push_value(engine, arg).unwrap();
        }
        assert_eq!(engine.call(args.len()), Status::Ok);
    }

    // Emulates `obj:name(...)` with the instance at `index`.
    fn call_method(engine: &mut Engine, index: i32, name: &str, args: &[Value]) -> Status {
        let instance = engine.absolute(index);
        engine.get_field(instance, name).unwrap();
        engine.push_copy(instance);
        for arg in args {
            marshal::push_value(engine, arg).unwrap();
        }
        engine.call(args.len() + 1)
    }

    #[test]
    fn class_table_carries_its_name() {
        let mut engine = Engine::new();
        install(&mut engine, &counter_class()).unwrap();
        engine.get_global("Counter");
        engine.get_field(-1, "classname").unwrap();
        assert_eq!(engine.to_str(-1), Some("Counter"));
    }

    #[test]
    fn construct_and_call_methods() {
        let mut engine = Engine::new();
        install(&mut engine, &counter_class()).unwrap();

        construct(&mut engine, "Counter", &[Value::from(10.0)]);
        assert_eq!(engine.type_of(1), SlotKind::Userdata);

        assert_eq!(call_method(&mut engine, 1, "increment", &[]), Status::Ok);
        assert_eq!(engine.to_number(-1), Some(11.0));
        engine.pop(1);

        assert_eq!(call_method(&mut engine, 1, "increment", &[]), Status::Ok);
        assert_eq!(engine.to_number(-1), Some(12.0));
    }

    #[test]
    fn delete_then_use_reports_a_destroyed_object() {
        let mut engine = Engine::new();
        install(&mut engine, &counter_class()).unwrap();
        construct(&mut engine, "Counter", &[]);

        assert_eq!(call_method(&mut engine, 1, "delete", &[]), Status::Ok);
        assert_eq!(call_method(&mut engine, 1, "increment", &[]), Status::Runtime);
        assert_eq!(
            engine.to_str(-1),
            Some("attempt to use a destroyed 'Counter' object")
        );
    }

    #[test]
    fn constructor_errors_cross_with_their_message() {
        let spec = Rc::new(
            ClassBuilder::new("Strict")
                .constructor(|args: &ValueList| {
                    if args.is_empty() {
                        return Err(Error::Runtime("bad argument".to_string()));
                    }
                    Ok(Counter { count: 0.0 })
                })
                .build()
                .unwrap(),
        );
        let mut engine = Engine::new();
        install(&mut engine, &spec).unwrap();

        engine.get_global("Strict");
        engine.get_field(-1, "new").unwrap();
        engine.remove(-2);
        assert_eq!(engine.call(0), Status::Runtime);
        assert_eq!(engine.to_str(-1), Some("bad argument"));
    }

    #[test]
    fn method_on_a_non_object_receiver_fails() {
        let mut engine = Engine::new();
        install(&mut engine, &counter_class()).unwrap();

        engine.get_global("Counter");
        engine.get_field(-1, "increment").unwrap();
        engine.remove(-2);
        engine.push_number(5.0);
        assert_eq!(engine.call(1), Status::Runtime);
        assert_eq!(
            engine.to_str(-1),
            Some("method 'increment' must be called on a 'Counter' object")
        );
    }

    #[test]
    fn registered_object_is_host_owned() {
        let object = Rc::new(RefCell::new(Counter { count: 5.0 }));
        let handle: Rc<RefCell<dyn Any>> = Rc::clone(&object) as Rc<RefCell<dyn Any>>;

        let mut engine = Engine::new();
        install(&mut engine, &counter_class()).unwrap();
        register_object(&mut engine, &[Value::string("shared")], "Counter", handle).unwrap();

        engine.get_global("shared");
        assert_eq!(call_method(&mut engine, -1, "increment", &[]), Status::Ok);
        assert_eq!(engine.to_number(-1), Some(6.0));

        drop(engine);
        assert_eq!(object.borrow().count, 6.0, "host object survives teardown");
    }

    #[test]
    fn register_object_walks_nested_paths() {
        let handle: Rc<RefCell<dyn Any>> = Rc::new(RefCell::new(Counter { count: 0.0 }));

        let mut engine = Engine::new();
        install(&mut engine, &counter_class()).unwrap();

        engine.new_table();
        engine.set_global("ns");
        register_object(
            &mut engine,
            &[Value::string("ns"), Value::string("obj")],
            "Counter",
            handle,
        )
        .unwrap();

        engine.get_global("ns");
        engine.get_field(-1, "obj").unwrap();
        assert_eq!(engine.type_of(-1), SlotKind::Userdata);
    }

    #[test]
    fn register_object_rejects_a_non_table_intermediate() {
        let handle: Rc<RefCell<dyn Any>> = Rc::new(RefCell::new(Counter { count: 0.0 }));

        let mut engine = Engine::new();
        install(&mut engine, &counter_class()).unwrap();
        engine.push_number(3.0);
        engine.set_global("blocker");

        let err = register_object(
            &mut engine,
            &[Value::string("blocker"), Value::string("obj")],
            "Counter",
            handle,
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::Value(ValueError::TypeMismatch {
                expected: "table",
                found: "number",
            })
        );
        assert_eq!(engine.top(), 0, "a failed bind leaves the stack clean");
    }

    #[test]
    fn builder_requires_a_constructor() {
        let err = ClassBuilder::new("Empty").build().unwrap_err();
        assert_eq!(
            err,
            Error::Runtime("class 'Empty' has no constructor".to_string())
        );
    }

    #[test]
    fn class_spec_debug_names_the_class_and_methods() {
        let spec = counter_class();
        let text = format!("{spec:?}");
        assert!(text.contains("Counter"));
        assert!(text.contains("increment"));
    }
}
