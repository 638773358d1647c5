//! Marshaling between host `Value`s and the runtime stack
//!
//! `to_value` reads one stack slot into a host value, flattening tables
//! by full traversal; `push_value` is its inverse. `collect_from`
//! gathers everything a call left above a recorded baseline, in
//! left-to-right order.

use crate::engine::{Engine, SlotKind};
use crate::error::{Error, Result};
use crate::value::{Value, ValueList};

/// Read the slot at `index` as a host value.
///
/// Tables are copied out by traversal, so the result is a snapshot
/// with value semantics. Natives and userdata have no host
/// representation and are rejected.
pub fn to_value(engine: &mut Engine, index: i32) -> Result<Value> {
    match engine.type_of(index) {
        SlotKind::Nil => Ok(Value::Nil),
        SlotKind::Boolean => Ok(engine.to_boolean(index).map_or(Value::Nil, Value::Boolean)),
        SlotKind::Number => Ok(engine.to_number(index).map_or(Value::Nil, Value::Number)),
        SlotKind::String => Ok(engine
            .to_str(index)
            .map_or(Value::Nil, |s| Value::string(s.to_string()))),
        SlotKind::Table => {
            // Pin the table before pushing traversal keys: a negative
            // index would drift as the key and value slots come and go.
            let table = engine.absolute(index);
            let depth = engine.top();
            let out = read_table(engine, table);
            if out.is_err() {
                // drop whatever the interrupted traversal left behind
                let leftover = engine.top().saturating_sub(depth);
                engine.pop(leftover);
            }
            out
        }
        kind @ (SlotKind::Native | SlotKind::Userdata) => Err(Error::UnsupportedType {
            operation: "to_value",
            found: kind.name(),
        }),
    }
}

fn read_table(engine: &mut Engine, table: i32) -> Result<Value> {
    let mut out = Value::table();
    engine.push_nil();
    while engine.next(table)? {
        let key = to_value(engine, -2)?;
        let value = to_value(engine, -1)?;
        out.set(key, value)?;
        engine.pop(1); // drop the value, keep the key as control
    }
    Ok(out)
}

/// Push a host value onto the runtime stack.
///
/// Tables are rebuilt entry by entry; nested tables recurse.
pub fn push_value(engine: &mut Engine, value: &Value) -> Result<()> {
    match value {
        Value::Nil => engine.push_nil(),
        Value::Boolean(b) => engine.push_boolean(*b),
        Value::Number(n) => engine.push_number(*n),
        Value::String(s) => engine.push_string(s),
        Value::Table(entries) => {
            engine.new_table();
            let table = engine.absolute(-1);
            for (key, entry) in entries {
                push_value(engine, key)?;
                push_value(engine, entry)?;
                engine.set_table(table)?;
            }
        }
    }
    Ok(())
}

/// Collect every slot above `baseline` into a list, first-pushed
/// first, and pop them all.
pub fn collect_from(engine: &mut Engine, baseline: usize) -> Result<ValueList> {
    let mut results = ValueList::new();
    while engine.top() > baseline {
        results.push(to_value(engine, -1)?);
        engine.pop(1);
    }
    results.reverse();
    Ok(results)
}
