//! Spine interpreter: walks a spine and produces host elements.
//!
//! Callback props are taken from the rendering context's function identity
//! cache, so re-rendering a node at the same path hands the host the exact
//! same callback objects and the host's diff sees no change.

use crate::context::{EventCallback, RefCallback, RenderContext};
use crate::element::{
    CLASS_NAME_PROP, ComponentElement, Element, InputElement, Node, Prop, Props, REF_PROP,
    STYLE_PROP, listener_prop_name,
};
use crate::eval::{Holes, Scope, evaluate};
use crate::expr::Expr;
use crate::path::Path;
use crate::protocol::ClientMessage;
use crate::registry::ComponentProps;
use crate::session::Session;
use crate::spine::{Attribute, ElementSpine, RefAttribute, Spine, Style};
use crate::value::Value;
use serde_json::Value as Json;
use std::rc::{Rc, Weak};
use tracing::debug;

/// Tag rendered through the controlled input adapter.
pub const TEXT_INPUT_TAG: &str = "input";

/// Hole bound to the native event in listener expressions.
pub const EVENT_HOLE: u32 = 0;

/// Hole bound to the element handle in ref expressions.
pub const REF_HOLE: u32 = 1;

pub fn render(
    session: &Rc<Session>,
    ctx: &Rc<RenderContext>,
    path: &Path,
    spine: &Spine,
    key: Option<u32>,
) -> Node {
    match spine {
        Spine::Empty => Node::Empty,
        Spine::Text(text) => Node::Text(text.clone()),
        Spine::Element(element) => render_element(session, ctx, path, element, key),
        Spine::Component(component) => Node::Component(ComponentElement {
            class: session.component_class(component.id, &component.display_name),
            props: ComponentProps {
                path: path.clone(),
                key,
                spine: component.clone(),
                session: session.clone(),
            },
        }),
    }
}

fn render_element(
    session: &Rc<Session>,
    ctx: &Rc<RenderContext>,
    path: &Path,
    spine: &ElementSpine,
    key: Option<u32>,
) -> Node {
    let children = spine
        .children
        .iter()
        .map(|(index, child)| render(session, ctx, &path.child(*index), child, Some(*index)))
        .collect();

    let mut props = Props::new();
    for attribute in &spine.attributes {
        match attribute {
            Attribute::Value { name, value } => {
                props.insert(name.clone(), Prop::Value(value.clone()));
            }
            Attribute::Listener(listener) => {
                let callback = ctx.listener(path, &listener.fid, || {
                    listener_callback(
                        Rc::downgrade(session),
                        Rc::downgrade(ctx),
                        path.clone(),
                        listener.event.clone(),
                        listener.handler.clone(),
                    )
                });
                props.insert(listener_prop_name(&listener.event), Prop::Listener(callback));
            }
            Attribute::Style(Style::Rules(rules)) => {
                let classes = session.styles().borrow_mut().class_list(rules);
                props.insert(CLASS_NAME_PROP.to_string(), Prop::ClassName(classes));
            }
            Attribute::Style(Style::Inline(declarations)) => {
                props.insert(STYLE_PROP.to_string(), Prop::Style(declarations.clone()));
            }
            Attribute::Ref(attribute) => {
                let callback = ctx.ref_callback(path, || {
                    ref_callback(
                        Rc::downgrade(session),
                        Rc::downgrade(ctx),
                        path.clone(),
                        attribute.clone(),
                    )
                });
                props.insert(REF_PROP.to_string(), Prop::Ref(callback));
            }
        }
    }

    let element = Element {
        tag: spine.tag.clone(),
        key,
        props,
        children,
    };

    if element.tag == TEXT_INPUT_TAG {
        Node::Input(InputElement { element })
    } else {
        Node::Element(element)
    }
}

/// Listener that evaluates `handler` with the native event in hole `0`,
/// applies the propagation flags it asks for, and reports its action as
/// `["action", path, event, action]`.
pub(crate) fn listener_callback(
    session: Weak<Session>,
    ctx: Weak<RenderContext>,
    path: Path,
    event_name: String,
    handler: Expr,
) -> EventCallback {
    Rc::new(move |native: &Value| {
        let (Some(session), Some(ctx)) = (session.upgrade(), ctx.upgrade()) else {
            debug!(%path, event = %event_name, "listener fired after its context was dropped");
            return;
        };

        let holes = Holes::new().with(EVENT_HOLE, native.clone());
        let result = evaluate_in(&session, &ctx, &handler, &holes);

        let Value::EventHandler(record) = result else {
            debug!(
                %path,
                event = %event_name,
                "listener expression did not produce a handler record"
            );
            return;
        };

        if record.prevent_default {
            native.invoke("preventDefault", &[]);
        }
        if record.stop_propagation {
            native.invoke("stopPropagation", &[]);
        }
        if record.stop_immediate_propagation {
            native.invoke("stopImmediatePropagation", &[]);
        }

        if let Some(action) = record.action {
            session.send(ClientMessage::Action {
                path: path.clone(),
                event: event_name.clone(),
                action,
            });
        }
    })
}

/// Ref callback scoped to the rendering context of the declaring node.
fn ref_callback(
    session: Weak<Session>,
    ctx: Weak<RenderContext>,
    path: Path,
    attribute: RefAttribute,
) -> RefCallback {
    Rc::new(move |handle: Option<Value>| {
        let (Some(session), Some(ctx)) = (session.upgrade(), ctx.upgrade()) else {
            debug!(%path, "ref callback fired after its context was dropped");
            return;
        };

        let (expr, bound) = match handle {
            Some(handle) => {
                if let Some(key) = &attribute.key {
                    ctx.attach_ref(key, handle.clone());
                }
                (&attribute.attach, handle)
            }
            None => {
                if let Some(key) = &attribute.key {
                    ctx.detach_ref(key);
                }
                (&attribute.detach, Value::Json(Json::Null))
            }
        };

        let holes = Holes::new().with(REF_HOLE, bound);
        if let Value::RefHandler(record) = evaluate_in(&session, &ctx, expr, &holes)
            && let Some(action) = record.action
        {
            session.send(ClientMessage::Ref {
                path: path.clone(),
                action,
            });
        }
    })
}

fn evaluate_in(session: &Session, ctx: &RenderContext, expr: &Expr, holes: &Holes) -> Value {
    let global = session.global();
    let refs = ctx.refs();
    evaluate(
        expr,
        &Scope {
            holes,
            refs: &refs,
            global: &global,
        },
    )
}
