use crate::context::RenderContext;
use crate::css::RuleCompiler;
use crate::host::Document;
use crate::protocol::ClientMessage;
use crate::registry::{ComponentClass, ComponentInstance, ComponentRegistry};
use crate::transport::Transport;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::warn;

/// Everything that lives exactly as long as one transport connection: the
/// component registry, the root rendering context and the table of mounted
/// components addressable by path.
pub struct Session {
    transport: Rc<dyn Transport>,
    document: Rc<dyn Document>,
    styles: Rc<RefCell<RuleCompiler>>,
    registry: RefCell<ComponentRegistry>,
    root: Rc<RenderContext>,
    mounted: RefCell<HashMap<String, Weak<ComponentInstance>>>,
}

impl Session {
    pub fn new(
        transport: Rc<dyn Transport>,
        document: Rc<dyn Document>,
        styles: Rc<RefCell<RuleCompiler>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            transport,
            document,
            styles,
            registry: RefCell::new(ComponentRegistry::default()),
            root: RenderContext::new(),
            mounted: RefCell::new(HashMap::new()),
        })
    }

    pub fn send(&self, message: ClientMessage) {
        self.transport.send(message);
    }

    pub fn document(&self) -> &Rc<dyn Document> {
        &self.document
    }

    pub fn global(&self) -> Value {
        self.document.global()
    }

    pub fn styles(&self) -> &RefCell<RuleCompiler> {
        &self.styles
    }

    pub fn root_context(&self) -> &Rc<RenderContext> {
        &self.root
    }

    pub fn component_class(&self, id: u64, display_name: &str) -> Rc<ComponentClass> {
        self.registry.borrow_mut().get_or_create(id, display_name)
    }

    pub fn registered_classes(&self) -> usize {
        self.registry.borrow().len()
    }

    pub(crate) fn register_mounted(&self, key: String, instance: Weak<ComponentInstance>) {
        if let Some(previous) = self.mounted.borrow_mut().insert(key.clone(), instance)
            && previous.strong_count() > 0
        {
            warn!(path = %key, "replacing a live component in the path table");
        }
    }

    /// Removes the entry for `key` if it still points at `instance`.
    pub(crate) fn unregister_mounted(&self, key: &str, instance: &ComponentInstance) {
        let mut mounted = self.mounted.borrow_mut();
        let owned = mounted
            .get(key)
            .is_some_and(|entry| std::ptr::eq(entry.as_ptr(), instance));
        if owned {
            mounted.remove(key);
        }
    }

    pub fn mounted_at(&self, key: &str) -> Option<Rc<ComponentInstance>> {
        self.mounted.borrow().get(key).and_then(Weak::upgrade)
    }

    pub fn mounted_count(&self) -> usize {
        self.mounted
            .borrow()
            .values()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("classes", &self.registered_classes())
            .field("mounted", &self.mounted_count())
            .field("root", &self.root)
            .finish()
    }
}
