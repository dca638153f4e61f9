//! Interfaces of the host platform the bridge renders into.
//!
//! The bridge never constructs host state itself; it talks to these traits.
//! [`crate::headless`] provides an in-memory implementation.

use crate::context::EventCallback;
use crate::element::Node;
use crate::registry::ComponentInstance;
use crate::value::Value;
use std::rc::Rc;

pub trait StyleSheet {
    fn insert_rule(&mut self, text: &str, index: usize);

    fn rule_count(&self) -> usize;
}

/// Document-level services.
pub trait Document {
    /// Creates and attaches a new stylesheet. Called at most once by the
    /// rule compiler.
    fn create_style_sheet(&self) -> Box<dyn StyleSheet>;

    /// The object `Global` expressions evaluate to.
    fn global(&self) -> Value;

    fn add_window_listener(&self, event: &str, callback: EventCallback);

    /// Removes a listener previously added with the identical callback.
    fn remove_window_listener(&self, event: &str, callback: &EventCallback);
}

/// Navigation facility.
pub trait History {
    fn current_path(&self) -> String;

    /// Records `path` as current without navigating.
    fn push_path(&self, path: &str);
}

/// The host rendering library.
pub trait Renderer {
    /// Asks for [`crate::Bridge::frame`] to be called on the next display frame.
    fn request_frame(&self);

    /// Reconciles the root element tree into the mount point.
    fn render_root(&self, root: Node);

    /// Mirrors head fragments into the document head.
    fn render_head(&self, elements: Vec<Node>);

    /// Re-renders one mounted component after its local spine changed.
    fn update_component(&self, instance: &Rc<ComponentInstance>);

    /// Empties the head and replaces the mount point content with the loading
    /// indicator.
    fn show_loading(&self);
}
