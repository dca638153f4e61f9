//! Typed spine tree and its strict decoder.

use crate::context::FunctionId;
use crate::css::{Condition, ConditionKind, Declarations, FontFaceRule, StyleDescriptor, StyleRule};
use crate::expr::{Expr, ExprError};
use crate::path::Path;
use serde_json::Value as Json;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Spine {
    #[default]
    Empty,
    Text(String),
    Element(ElementSpine),
    Component(ComponentSpine),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementSpine {
    pub tag: String,
    pub children: Vec<(u32, Spine)>,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSpine {
    pub id: u64,
    pub display_name: String,
    pub payload: Rc<ComponentPayload>,
}

/// What a mounted component wrapper renders and reacts to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComponentPayload {
    pub spine: Spine,
    pub listeners: Vec<ComponentListener>,
    pub on_mount: Vec<Expr>,
    pub on_unmount: Vec<Expr>,
}

/// A window-level listener declared by a component. Without a handler the
/// raw event is forwarded to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentListener {
    pub fid: FunctionId,
    pub event: String,
    pub handler: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Value { name: String, value: Json },
    Listener(Listener),
    Style(Style),
    Ref(RefAttribute),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub fid: FunctionId,
    pub event: String,
    pub handler: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Style {
    Inline(Declarations),
    Rules(Vec<StyleDescriptor>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefAttribute {
    pub key: Option<String>,
    pub attach: Expr,
    pub detach: Expr,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpineError {
    #[error("unexpected spine value at {path}: {found}")]
    UnknownShape { path: Path, found: String },
    #[error("unknown attribute tag '{tag}' at {path}")]
    UnknownAttribute { path: Path, tag: String },
    #[error("unknown style descriptor kind {kind} at {path}")]
    UnknownStyleKind { path: Path, kind: String },
    #[error("malformed {what} at {path}: {reason}")]
    Malformed {
        path: Path,
        what: &'static str,
        reason: String,
    },
    #[error("bad expression at {path}: {source}")]
    Expr {
        path: Path,
        #[source]
        source: ExprError,
    },
}

impl SpineError {
    pub fn path(&self) -> &Path {
        match self {
            Self::UnknownShape { path, .. }
            | Self::UnknownAttribute { path, .. }
            | Self::UnknownStyleKind { path, .. }
            | Self::Malformed { path, .. }
            | Self::Expr { path, .. } => path,
        }
    }

    /// The offending tag, when the error is a protocol mismatch.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::UnknownShape { found, .. } => Some(found),
            Self::UnknownAttribute { tag, .. } => Some(tag),
            Self::UnknownStyleKind { kind, .. } => Some(kind),
            Self::Expr {
                source: ExprError::UnknownTag { tag },
                ..
            } => Some(tag),
            _ => None,
        }
    }
}

type Result<T> = std::result::Result<T, SpineError>;

static NULL: Json = Json::Null;

impl Spine {
    pub fn decode(raw: &Json, path: &Path) -> Result<Self> {
        match raw {
            Json::Null => Ok(Self::Empty),
            Json::String(text) => Ok(Self::Text(text.clone())),
            Json::Object(object) => match object.get("type").and_then(Json::as_str) {
                Some("Node") => decode_element(raw, path).map(Self::Element),
                None if object.contains_key("tag") => decode_element(raw, path).map(Self::Element),
                Some("Component") => decode_component(raw, path).map(Self::Component),
                Some(other) => Err(SpineError::UnknownShape {
                    path: path.clone(),
                    found: other.to_string(),
                }),
                None => Err(SpineError::UnknownShape {
                    path: path.clone(),
                    found: "object without type".to_string(),
                }),
            },
            other => Err(SpineError::UnknownShape {
                path: path.clone(),
                found: other.to_string(),
            }),
        }
    }
}

impl ComponentPayload {
    /// Decodes the payload object carried by a component reference
    /// (`{"spine": …, "eventListeners": […], "hooks": {…}}`).
    pub fn decode(raw: &Json, path: &Path) -> Result<Self> {
        let spine = Spine::decode(raw.get("spine").unwrap_or(&NULL), path)?;

        let listeners = optional_array(raw, "eventListeners", path, "component listeners")?
            .iter()
            .map(|entry| decode_component_listener(entry, path))
            .collect::<Result<_>>()?;

        let hooks = raw.get("hooks");
        let hook_list = |primary: &str, alias: &str| -> Result<Vec<Expr>> {
            let list = hooks
                .and_then(|hooks| hooks.get(primary).or_else(|| hooks.get(alias)))
                .map(|list| {
                    list.as_array().ok_or_else(|| malformed(path, "hook list", "expected array"))
                })
                .transpose()?;

            list.map(|items| items.iter().map(|item| expr(item, path)).collect::<Result<Vec<_>>>())
                .unwrap_or_else(|| Ok(Vec::new()))
        };

        Ok(Self {
            spine,
            listeners,
            on_mount: hook_list("componentDidMount", "onMount")?,
            on_unmount: hook_list("componentWillUnmount", "onUnmount")?,
        })
    }
}

fn decode_element(raw: &Json, path: &Path) -> Result<ElementSpine> {
    let tag = raw
        .get("tag")
        .and_then(Json::as_str)
        .ok_or_else(|| malformed(path, "element", "missing tag"))?
        .to_string();

    let mut children = Vec::new();
    for entry in optional_array(raw, "children", path, "children")? {
        let pair = entry
            .as_array()
            .filter(|pair| pair.len() == 2)
            .ok_or_else(|| malformed(path, "child entry", "expected [index, spine]"))?;
        let index = pair[0]
            .as_u64()
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| malformed(path, "child index", "expected unsigned integer"))?;
        let child = Spine::decode(&pair[1], &path.child(index))?;
        children.push((index, child));
    }

    let attributes = optional_array(raw, "attributes", path, "attributes")?
        .iter()
        .map(|entry| decode_attribute(entry, path))
        .collect::<Result<_>>()?;

    Ok(ElementSpine {
        tag,
        children,
        attributes,
    })
}

fn decode_component(raw: &Json, path: &Path) -> Result<ComponentSpine> {
    let id = raw
        .get("id")
        .and_then(Json::as_u64)
        .ok_or_else(|| malformed(path, "component", "missing numeric id"))?;
    let display_name = raw
        .get("displayName")
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_string();
    let payload = ComponentPayload::decode(raw.get("spine").unwrap_or(&NULL), path)?;

    Ok(ComponentSpine {
        id,
        display_name,
        payload: Rc::new(payload),
    })
}

fn decode_component_listener(raw: &Json, path: &Path) -> Result<ComponentListener> {
    let items = raw
        .as_array()
        .filter(|items| items.len() == 2 || items.len() == 3)
        .ok_or_else(|| malformed(path, "component listener", "expected [fid, name, expr?]"))?;

    Ok(ComponentListener {
        fid: function_id(&items[0], path)?,
        event: string(&items[1], path, "listener event name")?,
        handler: items.get(2).map(|raw| expr(raw, path)).transpose()?,
    })
}

fn decode_attribute(raw: &Json, path: &Path) -> Result<Attribute> {
    let items = raw
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| malformed(path, "attribute", "expected tagged array"))?;
    let tag = items[0]
        .as_str()
        .ok_or_else(|| malformed(path, "attribute", "tag must be a string"))?;
    let operand = |i: usize| items.get(i).unwrap_or(&NULL);

    match tag {
        "AVAL" => Ok(Attribute::Value {
            name: string(operand(1), path, "attribute name")?,
            value: operand(2).clone(),
        }),
        "AEVL" => {
            let listener = operand(1)
                .as_array()
                .filter(|l| l.len() == 3)
                .ok_or_else(|| malformed(path, "event listener", "expected [fid, name, expr]"))?;
            Ok(Attribute::Listener(Listener {
                fid: function_id(&listener[0], path)?,
                event: string(&listener[1], path, "listener event name")?,
                handler: expr(&listener[2], path)?,
            }))
        }
        "ASTY" => match operand(1) {
            Json::Array(descriptors) => descriptors
                .iter()
                .map(|descriptor| decode_descriptor(descriptor, path))
                .collect::<Result<_>>()
                .map(|rules| Attribute::Style(Style::Rules(rules))),
            Json::Object(map) => Ok(Attribute::Style(Style::Inline(map.clone()))),
            _ => Err(malformed(path, "style attribute", "expected descriptor list or map")),
        },
        "AREF" => {
            let handler = operand(1);
            let key = match handler.get("key") {
                None | Some(Json::Null) => None,
                Some(Json::String(key)) => Some(key.clone()),
                Some(Json::Number(key)) => Some(key.to_string()),
                Some(_) => return Err(malformed(path, "ref key", "expected string")),
            };
            Ok(Attribute::Ref(RefAttribute {
                key,
                attach: expr(handler.get("attach").unwrap_or(&NULL), path)?,
                detach: expr(handler.get("detach").unwrap_or(&NULL), path)?,
            }))
        }
        other => Err(SpineError::UnknownAttribute {
            path: path.clone(),
            tag: other.to_string(),
        }),
    }
}

fn decode_descriptor(raw: &Json, path: &Path) -> Result<StyleDescriptor> {
    let items = raw
        .as_array()
        .filter(|items| items.len() >= 2)
        .ok_or_else(|| malformed(path, "style descriptor", "expected [kind, hash, …]"))?;
    let hash = match &items[1] {
        Json::String(hash) => hash.clone(),
        Json::Number(hash) => hash.to_string(),
        _ => return Err(malformed(path, "style descriptor", "hash must be a string")),
    };

    match items[0].as_u64() {
        Some(1) if items.len() == 5 => {
            let conditions = items[2]
                .as_array()
                .ok_or_else(|| malformed(path, "style conditions", "expected array"))?
                .iter()
                .map(|condition| decode_condition(condition, path))
                .collect::<Result<_>>()?;
            let suffixes = items[3]
                .as_array()
                .ok_or_else(|| malformed(path, "style suffixes", "expected array"))?
                .iter()
                .map(|suffix| string(suffix, path, "style suffix"))
                .collect::<Result<_>>()?;
            Ok(StyleDescriptor::Rule(StyleRule {
                hash,
                conditions,
                suffixes,
                declarations: declarations(&items[4], path)?,
            }))
        }
        Some(5) if items.len() == 3 => Ok(StyleDescriptor::FontFace(FontFaceRule {
            hash,
            declarations: declarations(&items[2], path)?,
        })),
        Some(1 | 5) => Err(malformed(path, "style descriptor", "wrong number of fields")),
        _ => Err(SpineError::UnknownStyleKind {
            path: path.clone(),
            kind: items[0].to_string(),
        }),
    }
}

fn decode_condition(raw: &Json, path: &Path) -> Result<Condition> {
    let pair = raw
        .as_array()
        .filter(|pair| pair.len() == 2)
        .ok_or_else(|| malformed(path, "style condition", "expected [kind, predicate]"))?;
    let kind = if pair[0].as_u64() == Some(1) {
        ConditionKind::Media
    } else {
        ConditionKind::Supports
    };

    Ok(Condition {
        kind,
        predicate: string(&pair[1], path, "condition predicate")?,
    })
}

fn declarations(raw: &Json, path: &Path) -> Result<Declarations> {
    raw.as_object()
        .cloned()
        .ok_or_else(|| malformed(path, "css declarations", "expected object"))
}

fn optional_array<'a>(
    raw: &'a Json,
    field: &str,
    path: &Path,
    what: &'static str,
) -> Result<&'a [Json]> {
    match raw.get(field) {
        None | Some(Json::Null) => Ok(&[]),
        Some(Json::Array(items)) => Ok(items),
        Some(_) => Err(malformed(path, what, "expected array")),
    }
}

fn function_id(raw: &Json, path: &Path) -> Result<FunctionId> {
    FunctionId::from_json(raw)
        .ok_or_else(|| malformed(path, "function id", "expected number or string"))
}

fn string(raw: &Json, path: &Path, what: &'static str) -> Result<String> {
    raw.as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(path, what, "expected string"))
}

fn expr(raw: &Json, path: &Path) -> Result<Expr> {
    Expr::decode(raw).map_err(|source| SpineError::Expr {
        path: path.clone(),
        source,
    })
}

fn malformed(path: &Path, what: &'static str, reason: &str) -> SpineError {
    SpineError::Malformed {
        path: path.clone(),
        what,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_element_without_explicit_type() {
        let raw = json!({"tag": "div", "attributes": [["AVAL", "id", "x"]], "children": [[0, "hello"]]});
        let spine = Spine::decode(&raw, &Path::root()).expect("decode");

        let Spine::Element(element) = spine else {
            panic!("expected element");
        };
        assert_eq!(element.tag, "div");
        assert_eq!(element.children, vec![(0, Spine::Text("hello".into()))]);
        assert_eq!(
            element.attributes,
            vec![Attribute::Value {
                name: "id".into(),
                value: json!("x")
            }]
        );
    }

    #[test]
    fn decodes_component_with_hooks_and_listeners() {
        let raw = json!({
            "type": "Component",
            "id": 4,
            "displayName": "Clock",
            "spine": {
                "spine": {"type": "Node", "tag": "span", "children": [], "attributes": []},
                "eventListeners": [[1, "resize", ["EventHandlerE", ["LitE", false], ["LitE", false], ["LitE", false], ["NothingE"]]], [2, "scroll"]],
                "hooks": {
                    "componentDidMount": [["Value0E", "Mounted"]],
                    "componentWillUnmount": [["Value0E", "Gone"], ["LitE", 1]]
                }
            }
        });

        let Spine::Component(component) = Spine::decode(&raw, &Path::root()).expect("decode") else {
            panic!("expected component");
        };
        assert_eq!(component.id, 4);
        assert_eq!(component.display_name, "Clock");
        assert_eq!(component.payload.listeners.len(), 2);
        assert!(component.payload.listeners[0].handler.is_some());
        assert!(component.payload.listeners[1].handler.is_none());
        assert_eq!(component.payload.on_mount.len(), 1);
        assert_eq!(component.payload.on_unmount.len(), 2);
    }

    #[test]
    fn decodes_style_descriptors_and_ref() {
        let raw = json!({
            "type": "Node",
            "tag": "p",
            "children": [],
            "attributes": [
                ["ASTY", [[1, "abc", [[1, "screen"]], [":hover"], {"color": "red"}], [5, "ff", {"fontFamily": "X"}]]],
                ["AREF", {"key": "para", "attach": ["RefHandlerE", ["NothingE"]], "detach": ["RefHandlerE", ["NothingE"]]}]
            ]
        });

        let Spine::Element(element) = Spine::decode(&raw, &Path::root()).expect("decode") else {
            panic!("expected element");
        };
        match &element.attributes[0] {
            Attribute::Style(Style::Rules(rules)) => {
                assert_eq!(rules.len(), 2);
                assert_eq!(rules[0].hash(), "abc");
                assert!(matches!(rules[1], StyleDescriptor::FontFace(_)));
            }
            other => panic!("expected style rules, got {other:?}"),
        }
        match &element.attributes[1] {
            Attribute::Ref(r) => assert_eq!(r.key.as_deref(), Some("para")),
            other => panic!("expected ref, got {other:?}"),
        }
    }

    #[test]
    fn unknown_spine_type_reports_path() {
        let raw = json!({"type": "Node", "tag": "ul", "children": [[0, {"type": "Portal"}]], "attributes": []});
        let err = Spine::decode(&raw, &Path::root()).expect_err("unknown type");
        assert_eq!(err.path(), &Path::from(vec![0]));
        assert_eq!(err.tag(), Some("Portal"));
    }

    #[test]
    fn unknown_expression_tag_reports_tag_and_path() {
        let raw = json!({
            "type": "Node",
            "tag": "div",
            "children": [[3, {"type": "Node", "tag": "button", "children": [], "attributes": [
                ["AEVL", [0, "click", ["ScriptE", "x"]]]
            ]}]],
            "attributes": []
        });
        let err = Spine::decode(&raw, &Path::root()).expect_err("unknown expression");
        assert_eq!(err.path(), &Path::from(vec![3]));
        assert_eq!(err.tag(), Some("ScriptE"));
    }

    #[test]
    fn numbers_and_booleans_are_not_spines() {
        assert!(matches!(
            Spine::decode(&json!(42), &Path::root()),
            Err(SpineError::UnknownShape { .. })
        ));
        assert_eq!(Spine::decode(&json!(null), &Path::root()), Ok(Spine::Empty));
    }
}
