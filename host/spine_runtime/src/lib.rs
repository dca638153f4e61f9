//! Client side of a remote-rendering bridge.
//!
//! The server owns all application state and pushes *spines*: serialized,
//! path-addressable UI trees. This crate turns a spine into host elements,
//! keeps callback identities stable across renders, compiles style
//! descriptors into stylesheet rules on demand, and reports DOM events,
//! component lifecycle transitions and ref attachments back to the server.

pub mod bridge;
pub mod config;
pub mod context;
pub mod css;
pub mod element;
pub mod eval;
pub mod expr;
pub mod headless;
pub mod host;
pub mod input;
pub mod interpreter;
pub mod path;
pub mod protocol;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod spine;
pub mod transport;
pub mod value;

pub use crate::bridge::Bridge;
pub use crate::config::{ConfigError, Endpoint, HostConfig, ReconnectPolicy};
pub use crate::context::{EventCallback, FunctionId, RefCallback, RenderContext};
pub use crate::element::{Element, Node, Prop, Props};
pub use crate::expr::{Expr, ExprError};
pub use crate::host::{Document, History, Renderer, StyleSheet};
pub use crate::path::Path;
pub use crate::protocol::{
    CLIENT_TO_SERVER_CAP, ClientMessage, ProtocolError, SERVER_TO_CLIENT_CAP, ServerMessage,
};
pub use crate::registry::{ComponentClass, ComponentInstance, ComponentRegistry};
pub use crate::runner::{Connection, Host, HostError, run};
pub use crate::session::Session;
pub use crate::spine::{Spine, SpineError};
pub use crate::transport::{QueueTransport, Transport};
pub use crate::value::{HostObject, Value};
pub use serde_json;
