use crate::expr::Expr;
use crate::value::{EventHandlerRecord, RefHandlerRecord, Value};
use std::collections::HashMap;
use tracing::debug;

/// Per-evaluation substitutions. Event handlers bind the native event to
/// hole `0`, ref callbacks bind the element handle to hole `1`.
#[derive(Debug, Default, Clone)]
pub struct Holes(HashMap<u32, Value>);

impl Holes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, index: u32, value: Value) -> Self {
        self.0.insert(index, value);
        self
    }

    pub fn get(&self, index: u32) -> Value {
        self.0.get(&index).cloned().unwrap_or_default()
    }
}

/// Element handles captured by ref callbacks, keyed by their stable key.
#[derive(Debug, Default)]
pub struct RefStore(HashMap<String, Value>);

impl RefStore {
    pub fn insert(&mut self, key: String, handle: Value) {
        self.0.insert(key, handle);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything an evaluation may read.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub holes: &'a Holes,
    pub refs: &'a RefStore,
    pub global: &'a Value,
}

pub fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Value {
    match expr {
        Expr::Global => scope.global.clone(),
        Expr::Hole(index) => scope.holes.get(*index),
        Expr::Value0(tag) => Value::Tuple(vec![Value::Json(tag.clone())]),
        Expr::Value1(tag, a) => Value::Tuple(vec![Value::Json(tag.clone()), evaluate(a, scope)]),
        Expr::Value2(tag, a, b) => Value::Tuple(vec![
            Value::Json(tag.clone()),
            evaluate(a, scope),
            evaluate(b, scope),
        ]),
        Expr::Literal(value) => Value::Json(value.clone()),
        Expr::Get { key, object } => {
            let key = evaluate(key, scope);
            let object = evaluate(object, scope);
            match key.as_key() {
                Some(key) => object.get(&key),
                None => {
                    debug!(?key, "get with a non-scalar key yields absent");
                    Value::Absent
                }
            }
        }
        Expr::Invoke {
            method,
            object,
            args,
        } => {
            let object = evaluate(object, scope);
            let method = evaluate(method, scope);
            let args: Vec<Value> = args.iter().map(|arg| evaluate(arg, scope)).collect();

            match (&object, method.as_key()) {
                (Value::Host(receiver), Some(method)) => receiver.invoke(&method, &args),
                (_, method) => {
                    debug!(?method, ?object, "invoke on a non-host receiver yields absent");
                    Value::Absent
                }
            }
        }
        Expr::EventHandler {
            prevent_default,
            stop_propagation,
            stop_immediate_propagation,
            action,
        } => Value::EventHandler(EventHandlerRecord {
            prevent_default: evaluate(prevent_default, scope).is_truthy(),
            stop_propagation: evaluate(stop_propagation, scope).is_truthy(),
            stop_immediate_propagation: evaluate(stop_immediate_propagation, scope).is_truthy(),
            action: evaluate(action, scope).into_action(),
        }),
        Expr::Just(inner) => evaluate(inner, scope),
        Expr::Nothing => Value::Absent,
        Expr::RefHandler(action) => Value::RefHandler(RefHandlerRecord {
            action: evaluate(action, scope).into_action(),
        }),
        Expr::Deref(key) => scope.refs.get(key).cloned().unwrap_or_default(),
    }
}
