//! Runtime values produced by the expression evaluator.

use serde_json::{Map, Value as Json};
use std::fmt;
use std::rc::Rc;

/// An object owned by the host platform: the global object, a native event
/// or a rendered element handle.
pub trait HostObject: fmt::Debug {
    fn get(&self, key: &str) -> Value;

    fn invoke(&self, method: &str, args: &[Value]) -> Value;

    /// JSON description sent to the server when the object itself has to
    /// cross the transport.
    fn describe(&self) -> Json;
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventHandlerRecord {
    pub prevent_default: bool,
    pub stop_propagation: bool,
    pub stop_immediate_propagation: bool,
    pub action: Option<Json>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefHandlerRecord {
    pub action: Option<Json>,
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Absent,
    Json(Json),
    /// Tagged tuple: element 0 is the literal tag.
    Tuple(Vec<Value>),
    Host(Rc<dyn HostObject>),
    EventHandler(EventHandlerRecord),
    RefHandler(RefHandlerRecord),
}

impl Value {
    pub fn host(object: impl HostObject + 'static) -> Self {
        Self::Host(Rc::new(object))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent | Self::Json(Json::Null))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Absent => false,
            Self::Json(json) => match json {
                Json::Null => false,
                Json::Bool(flag) => *flag,
                Json::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
                Json::String(s) => !s.is_empty(),
                Json::Array(_) | Json::Object(_) => true,
            },
            Self::Tuple(_) | Self::Host(_) | Self::EventHandler(_) | Self::RefHandler(_) => true,
        }
    }

    /// Property name form of a value used as a `Get`/`Invoke` key.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Self::Json(Json::String(s)) => Some(s.clone()),
            Self::Json(Json::Number(n)) => Some(n.to_string()),
            Self::Json(Json::Bool(b)) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Member lookup with the semantics of `object[key]`.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Self::Host(object) => object.get(key),
            Self::Json(Json::Object(map)) => {
                map.get(key).cloned().map_or(Value::Absent, Value::Json)
            }
            Self::Json(Json::Array(items)) => key
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
                .cloned()
                .map_or(Value::Absent, Value::Json),
            Self::Tuple(items) => key
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
                .cloned()
                .unwrap_or_default(),
            _ => Value::Absent,
        }
    }

    /// Method call on a host object; anything else yields absent.
    pub fn invoke(&self, method: &str, args: &[Value]) -> Value {
        match self {
            Self::Host(object) => object.invoke(method, args),
            _ => Value::Absent,
        }
    }

    /// Payload form used in outbound messages. Absent values become `null`.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Absent => Json::Null,
            Self::Json(json) => json.clone(),
            Self::Tuple(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Self::Host(object) => object.describe(),
            Self::EventHandler(record) => {
                let mut map = Map::new();
                map.insert("preventDefault".into(), record.prevent_default.into());
                map.insert("stopPropagation".into(), record.stop_propagation.into());
                map.insert(
                    "stopImmediatePropagation".into(),
                    record.stop_immediate_propagation.into(),
                );
                map.insert("action".into(), record.action.clone().unwrap_or(Json::Null));
                Json::Object(map)
            }
            Self::RefHandler(record) => {
                let mut map = Map::new();
                map.insert("action".into(), record.action.clone().unwrap_or(Json::Null));
                Json::Object(map)
            }
        }
    }

    /// `Some(payload)` when the value is a truthy action.
    pub fn into_action(self) -> Option<Json> {
        if self.is_truthy() {
            Some(self.to_json())
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Json(Json::String(s)) => Some(s),
            _ => None,
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Self::Json(json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Json(Json::String(s.to_string()))
    }
}

/// Identity comparison for host objects, structural otherwise.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Absent, Self::Absent) => true,
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Host(a), Self::Host(b)) => Rc::ptr_eq(a, b),
            (Self::EventHandler(a), Self::EventHandler(b)) => a == b,
            (Self::RefHandler(a), Self::RefHandler(b)) => a == b,
            _ => false,
        }
    }
}
