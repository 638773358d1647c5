//! End-to-end tests driving the whole bridge through the `State`
//! facade: class lifecycle, ownership, error propagation and value
//! round-trips.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use moonbridge_core::{
    ClassBuilder, ClassSpec, Engine, Error, State, Value, ValueList,
};

/// A host object that counts how many times it has been dropped.
struct Counter {
    count: f64,
    drops: Rc<Cell<u32>>,
}

impl Drop for Counter {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

fn counter_class(drops: Rc<Cell<u32>>) -> ClassSpec {
    ClassBuilder::new("Counter")
        .constructor(move |args: &ValueList| {
            let start = match args.first() {
                Some(value) => value.as_number()?,
                None => 0.0,
            };
            Ok(Counter {
                count: start,
                drops: Rc::clone(&drops),
            })
        })
        .method("increment", |counter: &mut Counter, _: &ValueList| {
            counter.count += 1.0;
            Ok(vec![Value::from(counter.count)])
        })
        .method("add", |counter: &mut Counter, args: &ValueList| {
            counter.count += args.first().unwrap_or(&Value::Nil).as_number()?;
            Ok(vec![Value::from(counter.count)])
        })
        .build()
        .unwrap()
}

/// Emulates a chunk doing `global = Class.new()`.
fn construct_into_global(state: &mut State, class: &'static str, global: &'static str) {
    state
        .run_chunk(move |engine: &mut Engine| {
            engine.get_global(class);
            engine.get_field(-1, "new")?;
            engine.remove(-2);
            engine.checked_call(0)?;
            engine.set_global(global);
            Ok(())
        })
        .unwrap();
}

#[test]
fn runtime_owned_object_lives_and_dies_with_the_session() {
    let drops = Rc::new(Cell::new(0));
    let mut state = State::new();
    state.register_class(counter_class(Rc::clone(&drops))).unwrap();
    construct_into_global(&mut state, "Counter", "obj");

    assert_eq!(
        state.call_method("obj", "increment", &[]).unwrap(),
        vec![Value::from(1.0)]
    );
    assert_eq!(
        state.call_method("obj", "increment", &[]).unwrap(),
        vec![Value::from(2.0)]
    );
    assert_eq!(drops.get(), 0, "alive while the session holds it");

    state.call_method("obj", "delete", &[]).unwrap();
    assert_eq!(drops.get(), 1, "an explicit delete destroys it");

    let err = state.call_method("obj", "increment", &[]).unwrap_err();
    assert_eq!(
        err,
        Error::Runtime("attempt to use a destroyed 'Counter' object".to_string())
    );

    drop(state);
    assert_eq!(drops.get(), 1, "teardown must not destroy it a second time");
}

#[test]
fn teardown_destroys_what_scripts_left_behind() {
    let drops = Rc::new(Cell::new(0));
    {
        let mut state = State::new();
        state.register_class(counter_class(Rc::clone(&drops))).unwrap();
        construct_into_global(&mut state, "Counter", "leftover");
        assert_eq!(drops.get(), 0);
    }
    assert_eq!(drops.get(), 1, "session teardown collects its objects");
}

#[test]
fn host_owned_object_is_never_destroyed_by_the_session() {
    let drops = Rc::new(Cell::new(0));
    let object = Rc::new(RefCell::new(Counter {
        count: 10.0,
        drops: Rc::clone(&drops),
    }));
    let shared: Rc<RefCell<dyn Any>> = Rc::clone(&object) as Rc<RefCell<dyn Any>>;

    {
        let mut state = State::new();
        state.register_class(counter_class(Rc::clone(&drops))).unwrap();
        state
            .register_object(&[Value::string("shared")], "Counter", shared)
            .unwrap();

        assert_eq!(
            state.call_method("shared", "increment", &[]).unwrap(),
            vec![Value::from(11.0)]
        );

        // scripts may call delete, but ownership stays with the host
        state.call_method("shared", "delete", &[]).unwrap();
        assert_eq!(drops.get(), 0);
    }
    assert_eq!(drops.get(), 0, "the session never destroys a host object");
    assert_eq!(object.borrow().count, 11.0, "mutations are visible to the host");
}

#[test]
fn method_arguments_follow_the_receiver() {
    let drops = Rc::new(Cell::new(0));
    let mut state = State::new();
    state.register_class(counter_class(Rc::clone(&drops))).unwrap();
    construct_into_global(&mut state, "Counter", "obj");

    let results = state
        .call_method("obj", "add", &[Value::from(40.0)])
        .unwrap();
    assert_eq!(results, vec![Value::from(40.0)]);

    let err = state
        .call_method("obj", "add", &[Value::string("nope")])
        .unwrap_err();
    assert_eq!(
        err,
        Error::Runtime(
            "type mismatch: 'number' was expected but 'string' was found".to_string()
        )
    );
}

#[test]
fn host_error_messages_survive_a_script_round_trip() {
    let mut state = State::new();
    state.register_function("validate", |_: &ValueList| {
        Err(Error::Runtime("bad argument".to_string()))
    });

    // a chunk calls the host function and fails; the host recovers the
    // exact text it raised
    let err = state
        .run_chunk(|engine: &mut Engine| {
            engine.get_global("validate");
            engine.checked_call(0)?;
            Ok(())
        })
        .unwrap_err();
    assert_eq!(err, Error::Runtime("bad argument".to_string()));
    assert_eq!(err.message(), "bad argument");
}

#[test]
fn multiple_results_keep_their_order() {
    let mut state = State::new();
    state.register_function("stats", |args: &ValueList| {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for arg in args {
            let n = arg.as_number()?;
            min = min.min(n);
            max = max.max(n);
        }
        #[allow(clippy::cast_precision_loss)]
        let count = args.len() as f64;
        Ok(vec![Value::from(min), Value::from(max), Value::from(count)])
    });

    let results = state
        .call_global(
            "stats",
            &[Value::from(3.0), Value::from(-1.0), Value::from(7.0)],
        )
        .unwrap();
    assert_eq!(
        results,
        vec![Value::from(-1.0), Value::from(7.0), Value::from(3.0)]
    );
}

#[test]
fn nested_tables_round_trip_through_globals() {
    let mut inner = Value::table();
    inner.set("deep", "value").unwrap();
    inner.set(1.0, true).unwrap();

    let mut middle = Value::table();
    middle.set(false, inner).unwrap();
    middle.set("n", 2.5).unwrap();

    let mut outer = Value::table();
    outer.set("middle", middle.clone()).unwrap();
    outer.set(middle, "table-as-key").unwrap();

    let mut state = State::new();
    state.set_global("payload", &outer).unwrap();
    assert_eq!(state.get_global("payload").unwrap(), outer);
}

#[test]
fn chunks_see_host_globals_and_hosts_see_chunk_globals() {
    let mut state = State::new();
    state.set_global("input", &Value::from(5.0)).unwrap();

    let results = state
        .run_chunk(|engine: &mut Engine| {
            engine.get_global("input");
            let n = engine.to_number(-1).unwrap_or_default();
            engine.pop(1);
            engine.push_number(n * n);
            engine.set_global("output");
            engine.push_string("done");
            Ok(())
        })
        .unwrap();
    assert_eq!(results, vec![Value::string("done")]);
    assert_eq!(state.get_global("output").unwrap(), Value::from(25.0));
}
