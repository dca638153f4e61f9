//! Controlled input adapter.
//!
//! Server-pushed `value` props would otherwise fight the user's typing: the
//! adapter keeps a local value, mirrors every change event into it, and only
//! adopts a pushed value when it differs from that local value.

use crate::context::EventCallback;
use crate::element::{Element, ON_CHANGE_PROP, Prop, Props, VALUE_PROP};
use crate::value::Value;
use serde_json::Value as Json;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

pub struct ControlledInput {
    value: RefCell<String>,
    upstream: RefCell<Option<EventCallback>>,
    on_change: EventCallback,
}

impl ControlledInput {
    pub fn new(props: &Props) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            Self {
                value: RefCell::new(pushed_value(props).unwrap_or_default()),
                upstream: RefCell::new(upstream_callback(props)),
                on_change: Rc::new(move |event: &Value| {
                    if let Some(adapter) = weak.upgrade() {
                        adapter.handle_change(event);
                    }
                }),
            }
        })
    }

    pub fn value(&self) -> String {
        self.value.borrow().clone()
    }

    /// New props from above. The pushed value wins only if it differs from
    /// the adapter's own value.
    pub fn receive_props(&self, props: &Props) {
        *self.upstream.borrow_mut() = upstream_callback(props);

        let next = pushed_value(props).unwrap_or_default();
        let mut value = self.value.borrow_mut();
        if *value != next {
            *value = next;
        }
    }

    /// The element to hand to the host: the caller's props with `value` and
    /// `onChange` taken over by the adapter.
    pub fn render(&self, element: &Element) -> Element {
        let mut props = element.props.clone();
        props.insert(VALUE_PROP.to_string(), Prop::Value(Json::String(self.value())));
        props.insert(ON_CHANGE_PROP.to_string(), Prop::Listener(self.on_change.clone()));

        Element {
            tag: element.tag.clone(),
            key: element.key,
            props,
            children: element.children.clone(),
        }
    }

    pub fn on_change(&self) -> &EventCallback {
        &self.on_change
    }

    fn handle_change(&self, event: &Value) {
        let typed = event.get("target").get("value");
        *self.value.borrow_mut() = json_text(&typed.to_json()).unwrap_or_default();

        let upstream = self.upstream.borrow().clone();
        if let Some(callback) = upstream {
            callback(event);
        }
    }
}

impl fmt::Debug for ControlledInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlledInput")
            .field("value", &self.value.borrow())
            .field("has_upstream", &self.upstream.borrow().is_some())
            .finish()
    }
}

fn pushed_value(props: &Props) -> Option<String> {
    props.get(VALUE_PROP).and_then(Prop::as_json).and_then(json_text)
}

fn upstream_callback(props: &Props) -> Option<EventCallback> {
    props.get(ON_CHANGE_PROP).and_then(Prop::as_listener).cloned()
}

fn json_text(value: &Json) -> Option<String> {
    match value {
        Json::Null => None,
        Json::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn props_with_value(value: &str) -> Props {
        let mut props = Props::new();
        props.insert(VALUE_PROP.into(), Prop::Value(json!(value)));
        props
    }

    fn change_event(text: &str) -> Value {
        Value::Json(json!({"target": {"value": text}}))
    }

    #[test]
    fn initial_value_comes_from_props_or_is_empty() {
        assert_eq!(ControlledInput::new(&props_with_value("foo")).value(), "foo");
        assert_eq!(ControlledInput::new(&Props::new()).value(), "");
    }

    #[test]
    fn typing_updates_local_value_and_calls_upstream() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let mut props = props_with_value("foo");
        props.insert(
            ON_CHANGE_PROP.into(),
            Prop::Listener(Rc::new(move |_: &Value| counter.set(counter.get() + 1))),
        );

        let adapter = ControlledInput::new(&props);
        (adapter.on_change())(&change_event("foob"));

        assert_eq!(adapter.value(), "foob");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn pushed_value_equal_to_local_value_keeps_typing() {
        let adapter = ControlledInput::new(&props_with_value("foo"));
        (adapter.on_change())(&change_event("foob"));

        adapter.receive_props(&props_with_value("foob"));
        assert_eq!(adapter.value(), "foob");
    }

    #[test]
    fn pushed_value_different_from_local_value_is_adopted() {
        let adapter = ControlledInput::new(&props_with_value("foo"));
        (adapter.on_change())(&change_event("foob"));

        adapter.receive_props(&props_with_value("bar"));
        assert_eq!(adapter.value(), "bar");
    }

    #[test]
    fn rendered_element_carries_local_value_and_stable_on_change() {
        let adapter = ControlledInput::new(&props_with_value("foo"));
        let element = Element {
            tag: "input".into(),
            key: Some(2),
            props: props_with_value("ignored"),
            children: vec![],
        };

        let first = adapter.render(&element);
        let second = adapter.render(&element);
        assert_eq!(first.props[VALUE_PROP].as_json(), Some(&json!("foo")));
        assert!(first.props[ON_CHANGE_PROP].same_as(&second.props[ON_CHANGE_PROP]));
        assert_eq!(first.key, Some(2));
    }
}
