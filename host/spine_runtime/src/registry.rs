//! Component registry and the wrapper each registered class instantiates.
//!
//! The host decides between reconciling in place and remounting by comparing
//! class identity, so a class is created once per component id and reused
//! for as long as the connection lives.

use crate::context::{EventCallback, RenderContext};
use crate::element::Node;
use crate::eval::{Holes, Scope, evaluate};
use crate::interpreter::{self, listener_callback};
use crate::path::Path;
use crate::protocol::ClientMessage;
use crate::session::Session;
use crate::spine::{ComponentListener, ComponentPayload, ComponentSpine};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

#[derive(Debug, PartialEq, Eq)]
pub struct ComponentClass {
    pub id: u64,
    pub display_name: String,
}

impl ComponentClass {
    pub fn instantiate(self: &Rc<Self>, props: ComponentProps) -> Rc<ComponentInstance> {
        Rc::new(ComponentInstance {
            class: self.clone(),
            payload: RefCell::new(props.spine.payload.clone()),
            session: props.session,
            path: props.path,
            key: props.key,
            ctx: RenderContext::new(),
            attached: RefCell::new(Vec::new()),
            phase: Cell::new(Phase::Created),
        })
    }
}

#[derive(Debug, Default)]
pub struct ComponentRegistry {
    classes: HashMap<u64, Rc<ComponentClass>>,
}

impl ComponentRegistry {
    pub fn get_or_create(&mut self, id: u64, display_name: &str) -> Rc<ComponentClass> {
        self.classes
            .entry(id)
            .or_insert_with(|| {
                debug!(id, display_name, "registering component class");
                Rc::new(ComponentClass {
                    id,
                    display_name: display_name.to_string(),
                })
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Props the interpreter hands to a component element.
#[derive(Clone)]
pub struct ComponentProps {
    pub path: Path,
    pub key: Option<u32>,
    pub spine: ComponentSpine,
    pub session: Rc<Session>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Mounted,
    Unmounted,
}

/// A mounted component wrapper. Owns the rendering context of its subtree.
pub struct ComponentInstance {
    class: Rc<ComponentClass>,
    session: Rc<Session>,
    path: Path,
    key: Option<u32>,
    payload: RefCell<Rc<ComponentPayload>>,
    ctx: Rc<RenderContext>,
    attached: RefCell<Vec<(String, EventCallback)>>,
    phase: Cell<Phase>,
}

impl ComponentInstance {
    pub fn class(&self) -> &Rc<ComponentClass> {
        &self.class
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> Option<u32> {
        self.key
    }

    pub fn context(&self) -> &Rc<RenderContext> {
        &self.ctx
    }

    pub fn is_mounted(&self) -> bool {
        self.phase.get() == Phase::Mounted
    }

    pub fn render(&self) -> Node {
        let payload = self.payload.borrow().clone();
        interpreter::render(&self.session, &self.ctx, &self.path, &payload.spine, self.key)
    }

    pub fn did_mount(self: &Rc<Self>) {
        if self.phase.get() != Phase::Created {
            return;
        }
        self.phase.set(Phase::Mounted);

        self.session
            .register_mounted(self.path.key(), Rc::downgrade(self));

        let payload = self.payload.borrow().clone();
        self.fire_hooks(&payload.on_mount);

        let document = self.session.document().clone();
        let mut attached = self.attached.borrow_mut();
        for listener in &payload.listeners {
            let callback = self.window_listener(listener);
            document.add_window_listener(&listener.event, callback.clone());
            attached.push((listener.event.clone(), callback));
        }

        trace!(path = %self.path, class = %self.class.display_name, "component mounted");
    }

    /// New props from the parent render. The pushed sub-spine replaces the
    /// local one wholesale.
    pub fn receive_props(&self, props: &ComponentProps) {
        self.set_payload(props.spine.payload.clone());
    }

    pub fn set_payload(&self, payload: Rc<ComponentPayload>) {
        *self.payload.borrow_mut() = payload;
    }

    pub fn will_unmount(&self) {
        if self.phase.get() != Phase::Mounted {
            return;
        }
        self.phase.set(Phase::Unmounted);

        let payload = self.payload.borrow().clone();
        self.fire_hooks(&payload.on_unmount);

        let document = self.session.document().clone();
        for (event, callback) in self.attached.borrow_mut().drain(..) {
            document.remove_window_listener(&event, &callback);
        }

        self.session.unregister_mounted(&self.path.key(), self);
        trace!(path = %self.path, class = %self.class.display_name, "component unmounted");
    }

    fn fire_hooks(&self, hooks: &[crate::expr::Expr]) {
        let global = self.session.global();
        let holes = Holes::new();
        for hook in hooks {
            let result = {
                let refs = self.ctx.refs();
                evaluate(
                    hook,
                    &Scope {
                        holes: &holes,
                        refs: &refs,
                        global: &global,
                    },
                )
            };
            self.session.send(ClientMessage::Hook {
                path: self.path.clone(),
                result: result.to_json(),
            });
        }
    }

    fn window_listener(&self, listener: &ComponentListener) -> EventCallback {
        let session = Rc::downgrade(&self.session);
        let ctx = Rc::downgrade(&self.ctx);
        let path = self.path.clone();

        self.ctx.listener(&self.path, &listener.fid, || match &listener.handler {
            Some(handler) => listener_callback(
                session,
                ctx,
                path,
                listener.event.clone(),
                handler.clone(),
            ),
            None => {
                let fid = listener.fid.clone();
                Rc::new(move |event: &Value| {
                    if let Some(session) = Weak::upgrade(&session) {
                        session.send(ClientMessage::Event {
                            path: path.clone(),
                            fid: fid.clone(),
                            event: event.to_json(),
                        });
                    }
                })
            }
        })
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("class", &self.class)
            .field("path", &self.path)
            .field("key", &self.key)
            .field("phase", &self.phase.get())
            .finish()
    }
}
