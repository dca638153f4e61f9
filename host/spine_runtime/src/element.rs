//! Host element descriptions produced by the interpreter and consumed by the
//! host rendering library.

use crate::context::{EventCallback, RefCallback};
use crate::css::Declarations;
use crate::registry::{ComponentClass, ComponentProps};
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum Prop {
    Value(Json),
    ClassName(String),
    Style(Declarations),
    Listener(EventCallback),
    Ref(RefCallback),
}

impl Prop {
    /// Identity for callbacks, structural for data.
    pub fn same_as(&self, other: &Prop) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::ClassName(a), Self::ClassName(b)) => a == b,
            (Self::Style(a), Self::Style(b)) => a == b,
            (Self::Listener(a), Self::Listener(b)) => Rc::ptr_eq(a, b),
            (Self::Ref(a), Self::Ref(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_listener(&self) -> Option<&EventCallback> {
        match self {
            Self::Listener(callback) => Some(callback),
            _ => None,
        }
    }

    pub fn as_ref_callback(&self) -> Option<&RefCallback> {
        match self {
            Self::Ref(callback) => Some(callback),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Json> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "Value({value})"),
            Self::ClassName(name) => write!(f, "ClassName({name:?})"),
            Self::Style(style) => write!(f, "Style({} decls)", style.len()),
            Self::Listener(callback) => write!(f, "Listener({:p})", Rc::as_ptr(callback)),
            Self::Ref(callback) => write!(f, "Ref({:p})", Rc::as_ptr(callback)),
        }
    }
}

/// Property map in insertion order. Setting an existing name overwrites the
/// value but keeps its original position.
pub type Props = IndexMap<String, Prop>;

pub const REF_PROP: &str = "ref";
pub const CLASS_NAME_PROP: &str = "className";
pub const STYLE_PROP: &str = "style";
pub const VALUE_PROP: &str = "value";
pub const ON_CHANGE_PROP: &str = "onChange";

#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    pub key: Option<u32>,
    pub props: Props,
    pub children: Vec<Node>,
}

/// A text input wrapped in the controlled input adapter.
#[derive(Debug, Clone)]
pub struct InputElement {
    pub element: Element,
}

#[derive(Clone)]
pub struct ComponentElement {
    pub class: Rc<ComponentClass>,
    pub props: ComponentProps,
}

impl fmt::Debug for ComponentElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentElement")
            .field("class", &self.class)
            .field("path", &self.props.path)
            .field("key", &self.props.key)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub enum Node {
    #[default]
    Empty,
    Text(String),
    Element(Element),
    Input(InputElement),
    Component(ComponentElement),
}

impl Node {
    pub fn key(&self) -> Option<u32> {
        match self {
            Self::Empty | Self::Text(_) => None,
            Self::Element(element) => element.key,
            Self::Input(input) => input.element.key,
            Self::Component(component) => component.props.key,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(element),
            Self::Input(input) => Some(&input.element),
            _ => None,
        }
    }
}

/// Event props are named `on` + the capitalized event name.
pub fn listener_prop_name(event: &str) -> String {
    let mut chars = event.chars();
    match chars.next() {
        Some(first) => format!("on{}{}", first.to_uppercase(), chars.as_str()),
        None => "on".to_string(),
    }
}
