//! In-memory host platform.
//!
//! A small keyed reconciler stands in for the host rendering library: it
//! retains the rendered tree, drives component and ref lifecycles, keeps
//! controlled input adapters alive and serializes the result to HTML. The
//! document keeps the stylesheet and window listeners, the history keeps one
//! location string.

use crate::context::{EventCallback, RefCallback};
use crate::css::render_declarations;
use crate::element::{
    CLASS_NAME_PROP, ComponentElement, Element, InputElement, Node, Prop, Props, REF_PROP,
    VALUE_PROP, listener_prop_name,
};
use crate::host::{Document, History, Renderer, StyleSheet};
use crate::input::ControlledInput;
use crate::path::Path;
use crate::protocol::ClientMessage;
use crate::registry::ComponentInstance;
use crate::transport::Transport;
use crate::value::{HostObject, Value};
use serde_json::{Map, Value as Json, json};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace, warn};

const LOADING_CLASS: &str = "spine-loading";
const VOID_TAGS: &[&str] = &["area", "br", "col", "hr", "img", "input", "link", "meta", "wbr"];

struct HeadlessStyleSheet {
    rules: Rc<RefCell<Vec<String>>>,
}

impl StyleSheet for HeadlessStyleSheet {
    fn insert_rule(&mut self, text: &str, index: usize) {
        let mut rules = self.rules.borrow_mut();
        let index = index.min(rules.len());
        rules.insert(index, text.to_string());
    }

    fn rule_count(&self) -> usize {
        self.rules.borrow().len()
    }
}

/// The object `Global` evaluates to. Properties are plain JSON; method calls
/// are recorded.
#[derive(Debug, Default)]
pub struct HeadlessGlobal {
    properties: RefCell<Map<String, Json>>,
    calls: RefCell<Vec<(String, Vec<Json>)>>,
}

impl HeadlessGlobal {
    pub fn set(&self, key: &str, value: Json) {
        self.properties.borrow_mut().insert(key.to_string(), value);
    }

    pub fn calls(&self) -> Vec<(String, Vec<Json>)> {
        self.calls.borrow().clone()
    }
}

impl HostObject for HeadlessGlobal {
    fn get(&self, key: &str) -> Value {
        self.properties
            .borrow()
            .get(key)
            .cloned()
            .map_or(Value::Absent, Value::Json)
    }

    fn invoke(&self, method: &str, args: &[Value]) -> Value {
        self.calls.borrow_mut().push((
            method.to_string(),
            args.iter().map(Value::to_json).collect(),
        ));
        Value::Absent
    }

    fn describe(&self) -> Json {
        json!({"object": "window"})
    }
}

#[derive(Default)]
pub struct HeadlessDocument {
    rules: Rc<RefCell<Vec<String>>>,
    sheets_created: Cell<usize>,
    listeners: RefCell<Vec<(String, EventCallback)>>,
    global: Rc<HeadlessGlobal>,
}

impl HeadlessDocument {
    pub fn rules(&self) -> Vec<String> {
        self.rules.borrow().clone()
    }

    pub fn style_sheets_created(&self) -> usize {
        self.sheets_created.get()
    }

    pub fn global_object(&self) -> &Rc<HeadlessGlobal> {
        &self.global
    }

    pub fn window_listener_count(&self, event: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }

    /// Calls every window listener registered for `event`, in registration
    /// order. Returns how many ran.
    pub fn dispatch_window_event(&self, event: &str, native: &Value) -> usize {
        let callbacks: Vec<EventCallback> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in &callbacks {
            callback(native);
        }
        callbacks.len()
    }
}

impl Document for HeadlessDocument {
    fn create_style_sheet(&self) -> Box<dyn StyleSheet> {
        self.sheets_created.set(self.sheets_created.get() + 1);
        Box::new(HeadlessStyleSheet {
            rules: self.rules.clone(),
        })
    }

    fn global(&self) -> Value {
        Value::Host(self.global.clone())
    }

    fn add_window_listener(&self, event: &str, callback: EventCallback) {
        trace!(event, "adding window listener");
        self.listeners
            .borrow_mut()
            .push((event.to_string(), callback));
    }

    fn remove_window_listener(&self, event: &str, callback: &EventCallback) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(index) = listeners
            .iter()
            .position(|(name, existing)| name == event && Rc::ptr_eq(existing, callback))
        {
            listeners.remove(index);
        }
    }
}

impl fmt::Debug for HeadlessDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessDocument")
            .field("rules", &self.rules.borrow().len())
            .field("window_listeners", &self.listeners.borrow().len())
            .finish()
    }
}

#[derive(Debug)]
pub struct HeadlessHistory {
    current: RefCell<String>,
    pushed: RefCell<Vec<String>>,
}

impl HeadlessHistory {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            current: RefCell::new(initial.into()),
            pushed: RefCell::new(Vec::new()),
        }
    }

    /// User navigation (back/forward). Not recorded as a push.
    pub fn navigate(&self, path: &str) {
        *self.current.borrow_mut() = path.to_string();
    }

    pub fn pushed(&self) -> Vec<String> {
        self.pushed.borrow().clone()
    }
}

impl Default for HeadlessHistory {
    fn default() -> Self {
        Self::new("/")
    }
}

impl History for HeadlessHistory {
    fn current_path(&self) -> String {
        self.current.borrow().clone()
    }

    fn push_path(&self, path: &str) {
        *self.current.borrow_mut() = path.to_string();
        self.pushed.borrow_mut().push(path.to_string());
    }
}

/// Handle of a rendered element, as seen by ref callbacks and event targets.
#[derive(Debug)]
pub struct HeadlessElement {
    tag: String,
    attributes: RefCell<Map<String, Json>>,
    invoked: RefCell<Vec<String>>,
}

impl HeadlessElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: RefCell::new(Map::new()),
            invoked: RefCell::new(Vec::new()),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attribute(&self, name: &str) -> Option<Json> {
        self.attributes.borrow().get(name).cloned()
    }

    pub fn set_attribute(&self, name: &str, value: Json) {
        self.attributes.borrow_mut().insert(name.to_string(), value);
    }

    pub fn invoked(&self) -> Vec<String> {
        self.invoked.borrow().clone()
    }

    fn sync(&self, props: &Props) {
        let mut attributes = self.attributes.borrow_mut();
        attributes.clear();
        for (name, prop) in props {
            let value = match prop {
                Prop::Value(value) => value.clone(),
                Prop::ClassName(classes) => Json::String(classes.clone()),
                Prop::Style(declarations) => Json::String(render_declarations(declarations)),
                Prop::Listener(_) | Prop::Ref(_) => continue,
            };
            attributes.insert(name.clone(), value);
        }
    }
}

impl HostObject for HeadlessElement {
    fn get(&self, key: &str) -> Value {
        if key == "tagName" {
            return Value::from(self.tag.to_ascii_uppercase().as_str());
        }
        self.attribute(key).map_or(Value::Absent, Value::Json)
    }

    fn invoke(&self, method: &str, args: &[Value]) -> Value {
        self.invoked.borrow_mut().push(method.to_string());
        match (method, args) {
            ("getAttribute", [name, ..]) => name
                .as_str()
                .and_then(|name| self.attribute(name))
                .map_or(Value::Absent, Value::Json),
            ("setAttribute", [name, value, ..]) => {
                if let Some(name) = name.as_str() {
                    self.set_attribute(name, value.to_json());
                }
                Value::Absent
            }
            _ => Value::Absent,
        }
    }

    fn describe(&self) -> Json {
        json!({
            "tagName": self.tag.to_ascii_uppercase(),
            "attributes": Json::Object(self.attributes.borrow().clone()),
        })
    }
}

/// Synthetic native event.
#[derive(Debug)]
pub struct HeadlessEvent {
    kind: String,
    target: Option<Rc<HeadlessElement>>,
    detail: Map<String, Json>,
    invoked: RefCell<Vec<String>>,
}

impl HeadlessEvent {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            target: None,
            detail: Map::new(),
            invoked: RefCell::new(Vec::new()),
        }
    }

    pub fn with_target(mut self, target: Rc<HeadlessElement>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_detail(mut self, key: &str, value: Json) -> Self {
        self.detail.insert(key.to_string(), value);
        self
    }

    /// Methods called on the event, in call order.
    pub fn invoked(&self) -> Vec<String> {
        self.invoked.borrow().clone()
    }

    pub fn default_prevented(&self) -> bool {
        self.invoked.borrow().iter().any(|m| m == "preventDefault")
    }
}

impl HostObject for HeadlessEvent {
    fn get(&self, key: &str) -> Value {
        match key {
            "type" => Value::from(self.kind.as_str()),
            "target" => match &self.target {
                Some(target) => Value::Host(target.clone()),
                None => Value::Absent,
            },
            _ => self
                .detail
                .get(key)
                .cloned()
                .map_or(Value::Absent, Value::Json),
        }
    }

    fn invoke(&self, method: &str, _args: &[Value]) -> Value {
        self.invoked.borrow_mut().push(method.to_string());
        Value::Absent
    }

    fn describe(&self) -> Json {
        let mut out = self.detail.clone();
        out.insert("type".to_string(), Json::String(self.kind.clone()));
        Json::Object(out)
    }
}

/// Transport that keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: RefCell<Vec<ClientMessage>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.borrow().clone()
    }

    pub fn sent_json(&self) -> Vec<Json> {
        self.sent.borrow().iter().map(ClientMessage::to_json).collect()
    }

    pub fn take(&self) -> Vec<ClientMessage> {
        self.sent.take()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, message: ClientMessage) {
        self.sent.borrow_mut().push(message);
    }
}

#[derive(Default)]
enum Mounted {
    #[default]
    Empty,
    Text(String),
    Element(MountedElement),
    Component(MountedComponent),
}

struct MountedElement {
    tag: String,
    key: Option<u32>,
    props: Props,
    handle: Rc<HeadlessElement>,
    input: Option<Rc<ControlledInput>>,
    children: Vec<Mounted>,
}

struct MountedComponent {
    instance: Rc<ComponentInstance>,
    child: Box<Mounted>,
}

impl Mounted {
    fn key(&self) -> Option<u32> {
        match self {
            Self::Empty | Self::Text(_) => None,
            Self::Element(element) => element.key,
            Self::Component(component) => component.instance.key(),
        }
    }
}

/// Work deferred until the whole tree is committed, in child-first order.
enum Effect {
    AttachRef(RefCallback, Value),
    DidMount(Rc<ComponentInstance>),
}

fn run_effects(effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::AttachRef(callback, handle) => callback(Some(handle)),
            Effect::DidMount(instance) => instance.did_mount(),
        }
    }
}

fn ref_prop(props: &Props) -> Option<RefCallback> {
    props.get(REF_PROP).and_then(Prop::as_ref_callback).cloned()
}

fn mount(node: Node, effects: &mut Vec<Effect>) -> Mounted {
    match node {
        Node::Empty => Mounted::Empty,
        Node::Text(text) => Mounted::Text(text),
        Node::Element(element) => Mounted::Element(mount_element(element, None, effects)),
        Node::Input(InputElement { element }) => {
            let adapter = ControlledInput::new(&element.props);
            let rendered = adapter.render(&element);
            Mounted::Element(mount_element(rendered, Some(adapter), effects))
        }
        Node::Component(ComponentElement { class, props }) => {
            let instance = class.instantiate(props);
            let child = mount(instance.render(), effects);
            effects.push(Effect::DidMount(instance.clone()));
            Mounted::Component(MountedComponent {
                instance,
                child: Box::new(child),
            })
        }
    }
}

fn mount_element(
    element: Element,
    input: Option<Rc<ControlledInput>>,
    effects: &mut Vec<Effect>,
) -> MountedElement {
    let handle = Rc::new(HeadlessElement::new(&element.tag));
    handle.sync(&element.props);

    let children = element
        .children
        .into_iter()
        .map(|child| mount(child, effects))
        .collect();

    if let Some(callback) = ref_prop(&element.props) {
        effects.push(Effect::AttachRef(callback, Value::Host(handle.clone())));
    }

    MountedElement {
        tag: element.tag,
        key: element.key,
        props: element.props,
        handle,
        input,
        children,
    }
}

/// Tears a subtree down parent-first.
fn unmount(mounted: Mounted) {
    match mounted {
        Mounted::Empty | Mounted::Text(_) => {}
        Mounted::Element(element) => {
            if let Some(callback) = ref_prop(&element.props) {
                callback(None);
            }
            element.children.into_iter().for_each(unmount);
        }
        Mounted::Component(component) => {
            component.instance.will_unmount();
            unmount(*component.child);
        }
    }
}

fn reconcile(old: Mounted, node: Node, effects: &mut Vec<Effect>) -> Mounted {
    match (old, node) {
        (Mounted::Empty, Node::Empty) => Mounted::Empty,
        (Mounted::Text(_), Node::Text(text)) => Mounted::Text(text),
        (Mounted::Element(old), Node::Element(element)) if old.tag == element.tag => {
            Mounted::Element(update_element(old, element, None, effects))
        }
        (Mounted::Element(old), Node::Input(InputElement { element }))
            if old.tag == element.tag =>
        {
            let adapter = match &old.input {
                Some(adapter) => {
                    adapter.receive_props(&element.props);
                    adapter.clone()
                }
                None => ControlledInput::new(&element.props),
            };
            let rendered = adapter.render(&element);
            Mounted::Element(update_element(old, rendered, Some(adapter), effects))
        }
        (Mounted::Component(old), Node::Component(component))
            if Rc::ptr_eq(old.instance.class(), &component.class) =>
        {
            old.instance.receive_props(&component.props);
            let child = reconcile(*old.child, old.instance.render(), effects);
            Mounted::Component(MountedComponent {
                instance: old.instance,
                child: Box::new(child),
            })
        }
        (old, node) => {
            unmount(old);
            mount(node, effects)
        }
    }
}

fn update_element(
    old: MountedElement,
    element: Element,
    input: Option<Rc<ControlledInput>>,
    effects: &mut Vec<Effect>,
) -> MountedElement {
    let MountedElement {
        handle,
        props: old_props,
        children: old_children,
        ..
    } = old;

    let old_ref = ref_prop(&old_props);
    let new_ref = ref_prop(&element.props);
    let ref_changed = match (&old_ref, &new_ref) {
        (Some(a), Some(b)) => !Rc::ptr_eq(a, b),
        (None, None) => false,
        _ => true,
    };

    if ref_changed && let Some(old_ref) = &old_ref {
        old_ref(None);
    }

    handle.sync(&element.props);
    let children = reconcile_children(old_children, element.children, effects);

    if ref_changed && let Some(new_ref) = new_ref {
        effects.push(Effect::AttachRef(new_ref, Value::Host(handle.clone())));
    }

    MountedElement {
        tag: element.tag,
        key: element.key,
        props: element.props,
        handle,
        input,
        children,
    }
}

/// Keyed children are matched by key, unkeyed ones by position.
fn reconcile_children(
    old: Vec<Mounted>,
    nodes: Vec<Node>,
    effects: &mut Vec<Effect>,
) -> Vec<Mounted> {
    let mut old: Vec<Option<Mounted>> = old.into_iter().map(Some).collect();
    let by_key: HashMap<u32, usize> = old
        .iter()
        .enumerate()
        .filter_map(|(index, slot)| Some((slot.as_ref()?.key()?, index)))
        .collect();

    let mut next = Vec::with_capacity(nodes.len());
    for (position, node) in nodes.into_iter().enumerate() {
        let slot = match node.key() {
            Some(key) => by_key.get(&key).copied(),
            None => old
                .get(position)
                .and_then(Option::as_ref)
                .is_some_and(|previous| previous.key().is_none())
                .then_some(position),
        };

        let previous = slot.and_then(|index| old[index].take());
        next.push(match previous {
            Some(previous) => reconcile(previous, node, effects),
            None => mount(node, effects),
        });
    }

    old.into_iter().flatten().for_each(unmount);
    next
}

/// Re-renders controlled inputs whose local value moved ahead of the
/// mounted `value` prop.
fn refresh_inputs(mounted: &mut Mounted) {
    match mounted {
        Mounted::Element(element) => {
            if let Some(adapter) = &element.input {
                let value = Json::String(adapter.value());
                if element.props.get(VALUE_PROP).and_then(Prop::as_json) != Some(&value) {
                    element.props.insert(VALUE_PROP.to_string(), Prop::Value(value));
                    element.handle.sync(&element.props);
                }
            }
            element.children.iter_mut().for_each(refresh_inputs);
        }
        Mounted::Component(component) => refresh_inputs(&mut component.child),
        Mounted::Empty | Mounted::Text(_) => {}
    }
}

fn find_component<'a>(
    mounted: &'a mut Mounted,
    instance: &Rc<ComponentInstance>,
) -> Option<&'a mut MountedComponent> {
    match mounted {
        Mounted::Component(component) => {
            if Rc::ptr_eq(&component.instance, instance) {
                return Some(component);
            }
            find_component(&mut component.child, instance)
        }
        Mounted::Element(element) => element
            .children
            .iter_mut()
            .find_map(|child| find_component(child, instance)),
        Mounted::Empty | Mounted::Text(_) => None,
    }
}

/// Follows spine indices from `mounted`; components are transparent.
fn find_element<'a>(mounted: &'a Mounted, segments: &[u32]) -> Option<&'a MountedElement> {
    match mounted {
        Mounted::Component(component) => find_element(&component.child, segments),
        Mounted::Element(element) => match segments.split_first() {
            None => Some(element),
            Some((index, rest)) => element
                .children
                .iter()
                .find(|child| child.key() == Some(*index))
                .and_then(|child| find_element(child, rest)),
        },
        Mounted::Empty | Mounted::Text(_) => None,
    }
}

fn count_components(mounted: &Mounted) -> usize {
    match mounted {
        Mounted::Component(component) => 1 + count_components(&component.child),
        Mounted::Element(element) => element.children.iter().map(count_components).sum(),
        Mounted::Empty | Mounted::Text(_) => 0,
    }
}

/// Reference renderer over the in-memory document.
pub struct HeadlessRenderer {
    document: Rc<HeadlessDocument>,
    root: RefCell<Mounted>,
    head: RefCell<Vec<Mounted>>,
    frame_requested: Cell<bool>,
    loading: Cell<bool>,
}

impl HeadlessRenderer {
    pub fn new(document: Rc<HeadlessDocument>) -> Self {
        Self {
            document,
            root: RefCell::new(Mounted::Empty),
            head: RefCell::new(Vec::new()),
            frame_requested: Cell::new(false),
            loading: Cell::new(false),
        }
    }

    /// Clears and returns the pending frame request.
    pub fn take_frame_request(&self) -> bool {
        self.frame_requested.replace(false)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.get()
    }

    pub fn mounted_components(&self) -> usize {
        count_components(&self.root.borrow())
            + self.head.borrow().iter().map(count_components).sum::<usize>()
    }

    /// Handle of the element at the spine `path`.
    pub fn element_at(&self, path: &Path) -> Option<Rc<HeadlessElement>> {
        find_element(&self.root.borrow(), path.segments()).map(|element| element.handle.clone())
    }

    /// Fires the `event` listener of the element at `path`. Returns whether
    /// one was installed.
    pub fn dispatch(&self, path: &Path, event: &str, native: &Value) -> bool {
        let callback = {
            let root = self.root.borrow();
            find_element(&root, path.segments()).and_then(|element| {
                element
                    .props
                    .get(&listener_prop_name(event))
                    .and_then(Prop::as_listener)
                    .cloned()
            })
        };

        match callback {
            Some(callback) => {
                callback(native);
                refresh_inputs(&mut self.root.borrow_mut());
                true
            }
            None => {
                debug!(%path, event, "no listener to dispatch to");
                false
            }
        }
    }

    /// Sets the element's value and fires `change` on it, like typing into
    /// a text field.
    pub fn type_text(&self, path: &Path, text: &str) -> bool {
        let Some(handle) = self.element_at(path) else {
            return false;
        };
        handle.set_attribute("value", Json::String(text.to_string()));
        let event = HeadlessEvent::new("change").with_target(handle);
        self.dispatch(path, "change", &Value::host(event))
    }

    /// The document as HTML text: stylesheet and head fragments, then the
    /// mount point.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<head>");
        let rules = self.document.rules();
        if !rules.is_empty() {
            out.push_str("<style>");
            out.push_str(&rules.join("\n"));
            out.push_str("</style>");
        }
        for fragment in self.head.borrow().iter() {
            write_html(fragment, &mut out);
        }
        out.push_str("</head><body>");
        write_html(&self.root.borrow(), &mut out);
        out.push_str("</body>");
        out
    }

    fn loading_node() -> Node {
        let mut props = Props::new();
        props.insert(
            CLASS_NAME_PROP.to_string(),
            Prop::Value(Json::String(LOADING_CLASS.to_string())),
        );
        Node::Element(Element {
            tag: "div".to_string(),
            key: None,
            props,
            children: vec![Node::Text("Loading...".to_string())],
        })
    }
}

impl Renderer for HeadlessRenderer {
    fn request_frame(&self) {
        self.frame_requested.set(true);
    }

    fn render_root(&self, root: Node) {
        let mut effects = Vec::new();
        let previous = self.root.take();
        let next = reconcile(previous, root, &mut effects);
        *self.root.borrow_mut() = next;
        self.loading.set(false);
        run_effects(effects);
    }

    fn render_head(&self, elements: Vec<Node>) {
        let mut effects = Vec::new();
        let previous = self.head.take();
        let next = reconcile_children(previous, elements, &mut effects);
        *self.head.borrow_mut() = next;
        run_effects(effects);
    }

    fn update_component(&self, instance: &Rc<ComponentInstance>) {
        let mut effects = Vec::new();
        {
            let mut root = self.root.borrow_mut();
            let mut head = self.head.borrow_mut();
            let found = find_component(&mut root, instance).or_else(|| {
                head.iter_mut()
                    .find_map(|fragment| find_component(fragment, instance))
            });

            let Some(component) = found else {
                warn!(path = %instance.path(), "component to update is not mounted");
                return;
            };

            let previous = std::mem::take(&mut *component.child);
            *component.child = reconcile(previous, instance.render(), &mut effects);
        }
        run_effects(effects);
    }

    /// Head fragments may hold components of the discarded session, so the
    /// head is emptied along with the root.
    fn show_loading(&self) {
        self.render_head(Vec::new());
        self.render_root(Self::loading_node());
        self.loading.set(true);
    }
}

impl fmt::Debug for HeadlessRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessRenderer")
            .field("components", &self.mounted_components())
            .field("head", &self.head.borrow().len())
            .field("loading", &self.loading.get())
            .finish()
    }
}

fn write_html(mounted: &Mounted, out: &mut String) {
    match mounted {
        Mounted::Empty => {}
        Mounted::Text(text) => escape_into(text, out),
        Mounted::Component(component) => write_html(&component.child, out),
        Mounted::Element(element) => {
            out.push('<');
            out.push_str(&element.tag);
            for (name, prop) in &element.props {
                write_attribute(name, prop, out);
            }
            out.push('>');

            if VOID_TAGS.contains(&element.tag.as_str()) {
                return;
            }

            for child in &element.children {
                write_html(child, out);
            }
            out.push_str("</");
            out.push_str(&element.tag);
            out.push('>');
        }
    }
}

fn write_attribute(name: &str, prop: &Prop, out: &mut String) {
    let name = if name == CLASS_NAME_PROP { "class" } else { name };
    let text = match prop {
        Prop::Value(Json::Null | Json::Bool(false)) | Prop::Listener(_) | Prop::Ref(_) => return,
        Prop::Value(Json::Bool(true)) => {
            out.push(' ');
            out.push_str(name);
            return;
        }
        Prop::Value(Json::String(text)) | Prop::ClassName(text) => text.clone(),
        Prop::Value(other) => other.to_string(),
        Prop::Style(declarations) => render_declarations(declarations),
    };

    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    escape_into(&text, out);
    out.push('"');
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::RuleCompiler;
    use crate::interpreter;
    use crate::session::Session;
    use crate::spine::Spine;

    struct Fixture {
        session: Rc<Session>,
        transport: Rc<RecordingTransport>,
        document: Rc<HeadlessDocument>,
        renderer: HeadlessRenderer,
    }

    impl Fixture {
        fn new() -> Self {
            let transport = Rc::new(RecordingTransport::default());
            let document = Rc::new(HeadlessDocument::default());
            let styles = Rc::new(RefCell::new(RuleCompiler::new(document.clone())));
            Self {
                session: Session::new(transport.clone(), document.clone(), styles),
                transport,
                renderer: HeadlessRenderer::new(document.clone()),
                document,
            }
        }

        fn render(&self, raw: Json) {
            let spine = Spine::decode(&raw, &Path::root()).expect("decode spine");
            let node = interpreter::render(
                &self.session,
                self.session.root_context(),
                &Path::root(),
                &spine,
                None,
            );
            self.renderer.render_root(node);
        }
    }

    fn hooks(id: u64, name: &str, body: Json) -> Json {
        json!({
            "type": "Component",
            "id": id,
            "displayName": name,
            "spine": {
                "spine": body,
                "hooks": {
                    "componentDidMount": [["Value0E", format!("Mount{name}")]],
                    "componentWillUnmount": [["Value0E", format!("Unmount{name}")]]
                }
            }
        })
    }

    #[test]
    fn nested_components_mount_children_first_and_unmount_parent_first() {
        let fixture = Fixture::new();
        let inner = hooks(2, "Inner", json!("leaf"));
        fixture.render(hooks(1, "Outer", json!({"tag": "div", "attributes": [], "children": [[0, inner]]})));
        assert_eq!(fixture.renderer.mounted_components(), 2);
        assert_eq!(fixture.session.mounted_count(), 2);

        fixture.render(json!(null));
        assert_eq!(fixture.renderer.mounted_components(), 0);
        assert_eq!(
            fixture.transport.sent_json(),
            vec![
                json!(["hook", [0], ["MountInner"]]),
                json!(["hook", [], ["MountOuter"]]),
                json!(["hook", [], ["UnmountOuter"]]),
                json!(["hook", [0], ["UnmountInner"]]),
            ]
        );
    }

    #[test]
    fn keyed_children_keep_their_instances() {
        let fixture = Fixture::new();
        let list = |keys: &[u32]| {
            let children: Vec<Json> = keys
                .iter()
                .map(|key| json!([key, hooks(7, "Row", json!(format!("row {key}")))]))
                .collect();
            json!({"tag": "ul", "attributes": [], "children": children})
        };

        fixture.render(list(&[1, 2]));
        fixture.transport.take();

        fixture.render(list(&[2]));
        assert_eq!(
            fixture.transport.sent_json(),
            vec![json!(["hook", [1], ["UnmountRow"]])]
        );
        assert!(fixture.session.mounted_at("2").is_some());
        assert!(fixture.session.mounted_at("1").is_none());
    }

    #[test]
    fn different_class_at_same_position_remounts() {
        let fixture = Fixture::new();
        fixture.render(hooks(1, "A", json!("a")));
        fixture.render(hooks(2, "B", json!("b")));

        assert_eq!(
            fixture.transport.sent_json(),
            vec![
                json!(["hook", [], ["MountA"]]),
                json!(["hook", [], ["UnmountA"]]),
                json!(["hook", [], ["MountB"]]),
            ]
        );
    }

    #[test]
    fn refs_attach_once_and_detach_on_removal() {
        let fixture = Fixture::new();
        let spine = json!({
            "tag": "div",
            "children": [],
            "attributes": [["AREF", {
                "key": "box",
                "attach": ["RefHandlerE", ["JustE", ["Value1E", "Attached", ["GetE", ["LitE", "tagName"], ["DerefE", "box"]]]]],
                "detach": ["RefHandlerE", ["JustE", ["Value0E", "Detached"]]]
            }]]
        });

        fixture.render(spine.clone());
        fixture.render(spine);
        fixture.render(json!(null));

        assert_eq!(
            fixture.transport.sent_json(),
            vec![
                json!(["ref", [], ["Attached", "DIV"]]),
                json!(["ref", [], ["Detached"]]),
            ]
        );
    }

    #[test]
    fn controlled_input_survives_rerenders() {
        let fixture = Fixture::new();
        let input = |value: &str| {
            json!({"tag": "input", "children": [], "attributes": [
                ["AVAL", "value", value],
                ["AEVL", [3, "change", ["EventHandlerE", ["LitE", false], ["LitE", false], ["LitE", false],
                    ["JustE", ["Value1E", "Typed", ["GetE", ["LitE", "value"], ["GetE", ["LitE", "target"], ["HoleE", 0]]]]]]]]
            ]})
        };

        fixture.render(input("foo"));
        assert!(fixture.renderer.type_text(&Path::root(), "foob"));
        assert_eq!(
            fixture.transport.sent_json(),
            vec![json!(["action", [], "change", ["Typed", "foob"]])]
        );
        assert_eq!(
            fixture.renderer.to_html(),
            r#"<head></head><body><input value="foob"></body>"#
        );

        fixture.render(input("foob"));
        assert_eq!(fixture.renderer.to_html(), r#"<head></head><body><input value="foob"></body>"#);

        fixture.render(input("bar"));
        assert_eq!(fixture.renderer.to_html(), r#"<head></head><body><input value="bar"></body>"#);
    }

    #[test]
    fn dispatch_follows_spine_paths_through_components() {
        let fixture = Fixture::new();
        let button = json!({"tag": "button", "children": [[0, "go"]], "attributes": [
            ["AEVL", ["go", "click", ["EventHandlerE", ["LitE", false], ["LitE", false], ["LitE", false], ["JustE", ["Value0E", "Go"]]]]]
        ]});
        fixture.render(json!({"tag": "main", "attributes": [], "children": [
            [4, {"type": "Component", "id": 3, "displayName": "Toolbar", "spine": {"spine": {"tag": "nav", "attributes": [], "children": [[1, button]]}}}]
        ]}));

        let event = Rc::new(HeadlessEvent::new("click"));
        assert!(fixture.renderer.dispatch(&Path::from(vec![4, 1]), "click", &Value::Host(event)));
        assert!(!fixture.renderer.dispatch(&Path::from(vec![4]), "click", &Value::Absent));
        assert_eq!(
            fixture.transport.sent_json(),
            vec![json!(["action", [4, 1], "click", ["Go"]])]
        );
    }

    #[test]
    fn html_snapshot_includes_rules_and_attributes() {
        let fixture = Fixture::new();
        fixture.render(json!({
            "tag": "div",
            "attributes": [
                ["AVAL", "id", "x"],
                ["AVAL", "hidden", false],
                ["ASTY", [[1, "abc", [], [], {"color": "red"}]]]
            ],
            "children": [[0, "a < b"]]
        }));

        assert_eq!(
            fixture.renderer.to_html(),
            r#"<head><style>.sabc{color:red}</style></head><body><div id="x" class="sabc">a &lt; b</div></body>"#
        );
        assert_eq!(fixture.document.style_sheets_created(), 1);
    }

    #[test]
    fn loading_indicator_unmounts_the_tree() {
        let fixture = Fixture::new();
        fixture.render(hooks(1, "App", json!("ready")));
        fixture.renderer.show_loading();

        assert!(fixture.renderer.is_loading());
        assert_eq!(fixture.session.mounted_count(), 0);
        assert!(fixture.renderer.to_html().contains("Loading..."));
    }

    #[test]
    fn window_listeners_are_removed_by_identity() {
        let document = HeadlessDocument::default();
        let first: EventCallback = Rc::new(|_: &Value| {});
        let second: EventCallback = Rc::new(|_: &Value| {});
        document.add_window_listener("scroll", first.clone());
        document.add_window_listener("scroll", second.clone());

        document.remove_window_listener("scroll", &first);
        assert_eq!(document.window_listener_count("scroll"), 1);
        document.remove_window_listener("resize", &second);
        assert_eq!(document.window_listener_count("scroll"), 1);
    }

    #[test]
    fn history_records_pushes_but_not_navigation() {
        let history = HeadlessHistory::default();
        history.push_path("/a");
        history.navigate("/b");
        assert_eq!(history.current_path(), "/b");
        assert_eq!(history.pushed(), vec!["/a".to_string()]);
    }
}
