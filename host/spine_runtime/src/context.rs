//! Rendering contexts: the per-subtree function identity cache and ref store.

use crate::eval::RefStore;
use crate::path::Path;
use crate::value::Value;
use serde::Serialize;
use serde_json::Value as Json;
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

/// Callback installed as an event listener. Receives the native event.
pub type EventCallback = Rc<dyn Fn(&Value)>;

/// Callback installed as a ref. `Some(handle)` on attach, `None` on detach.
pub type RefCallback = Rc<dyn Fn(Option<Value>)>;

/// Logical function id assigned by the server. Echoed back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum FunctionId {
    Number(u64),
    Name(String),
}

impl FunctionId {
    pub fn from_json(raw: &Json) -> Option<Self> {
        match raw {
            Json::Number(n) => n.as_u64().map(Self::Number),
            Json::String(s) => Some(Self::Name(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Name(s) => f.write_str(s),
        }
    }
}

#[derive(Default)]
struct FunctionCache {
    listeners: HashMap<String, HashMap<FunctionId, EventCallback>>,
    refs: HashMap<String, RefCallback>,
}

/// State scoped to one mounted component subtree, or to the root.
///
/// Dropping the context invalidates every callback and ref it holds.
#[derive(Default)]
pub struct RenderContext {
    functions: RefCell<FunctionCache>,
    refs: RefCell<RefStore>,
}

impl RenderContext {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Returns the callback cached for `(path, fid)`, creating it with `make`
    /// on first use. Later calls never replace it.
    pub fn listener(
        &self,
        path: &Path,
        fid: &FunctionId,
        make: impl FnOnce() -> EventCallback,
    ) -> EventCallback {
        let mut functions = self.functions.borrow_mut();
        let at_path = functions.listeners.entry(path.key()).or_default();

        if let Some(existing) = at_path.get(fid) {
            return existing.clone();
        }

        trace!(%path, %fid, "caching listener");
        let callback = make();
        at_path.insert(fid.clone(), callback.clone());
        callback
    }

    /// Ref callback for `path`, cached under the `ref` slot of that path.
    pub fn ref_callback(&self, path: &Path, make: impl FnOnce() -> RefCallback) -> RefCallback {
        let mut functions = self.functions.borrow_mut();
        functions
            .refs
            .entry(path.key())
            .or_insert_with(|| {
                trace!(%path, "caching ref callback");
                make()
            })
            .clone()
    }

    pub fn refs(&self) -> Ref<'_, RefStore> {
        self.refs.borrow()
    }

    pub fn attach_ref(&self, key: &str, handle: Value) {
        self.refs.borrow_mut().insert(key.to_string(), handle);
    }

    pub fn detach_ref(&self, key: &str) {
        self.refs.borrow_mut().remove(key);
    }

    pub fn cached_len(&self) -> usize {
        let functions = self.functions.borrow();
        functions.listeners.values().map(HashMap::len).sum::<usize>() + functions.refs.len()
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("cached", &self.cached_len())
            .field("refs", &self.refs.borrow().len())
            .finish()
    }
}
