//! On-demand CSS rule compiler.
//!
//! Structured style descriptors are serialized to CSS text the first time
//! their content hash is seen and appended to a single stylesheet that is
//! created lazily through the host document. The class token (`s<hash>`) is
//! returned on every call, inserted or not.

use crate::host::{Document, StyleSheet};
use serde_json::{Map, Value as Json};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

pub type Declarations = Map<String, Json>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    Media,
    Supports,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub predicate: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub hash: String,
    pub conditions: Vec<Condition>,
    pub suffixes: Vec<String>,
    pub declarations: Declarations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FontFaceRule {
    pub hash: String,
    pub declarations: Declarations,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StyleDescriptor {
    Rule(StyleRule),
    FontFace(FontFaceRule),
}

impl StyleDescriptor {
    pub fn hash(&self) -> &str {
        match self {
            Self::Rule(rule) => &rule.hash,
            Self::FontFace(rule) => &rule.hash,
        }
    }

    pub fn class_name(&self) -> String {
        class_name(self.hash())
    }

    pub fn to_css(&self) -> String {
        match self {
            Self::Rule(rule) => {
                let block = format!(
                    ".{}{}{{{}}}",
                    class_name(&rule.hash),
                    rule.suffixes.concat(),
                    render_declarations(&rule.declarations)
                );
                rule.conditions.iter().fold(block, |inner, condition| {
                    let at_rule = match condition.kind {
                        ConditionKind::Media => "@media",
                        ConditionKind::Supports => "@supports",
                    };
                    format!("{at_rule} {} {{{inner}}}", condition.predicate)
                })
            }
            Self::FontFace(rule) => {
                format!("@font-face{{{}}}", render_declarations(&rule.declarations))
            }
        }
    }
}

pub fn class_name(hash: &str) -> String {
    format!("s{hash}")
}

/// `fontSize` becomes `font-size`; `msFlex` becomes `-ms-flex`.
pub fn hyphenate(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
        }
        out.push(ch);
    }

    if out.starts_with("ms-") {
        out.insert(0, '-');
    }

    out.to_ascii_lowercase()
}

pub fn render_declarations(declarations: &Declarations) -> String {
    let mut out = String::new();
    let mut append = |key: &str, value: &Json| {
        if !out.is_empty() {
            out.push(';');
        }
        out.push_str(&hyphenate(key));
        out.push(':');
        out.push_str(&scalar_text(value));
    };

    for (key, value) in declarations {
        match value {
            Json::Array(values) => values.iter().for_each(|value| append(key, value)),
            scalar => append(key, scalar),
        }
    }

    out
}

fn scalar_text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Deduplicating rule emitter. Lives for the whole process, independent of
/// any connection, so rules inserted before a reconnect are reused after it.
pub struct RuleCompiler {
    document: Rc<dyn Document>,
    sheet: Option<Box<dyn StyleSheet>>,
    seen: HashSet<String>,
}

impl RuleCompiler {
    pub fn new(document: Rc<dyn Document>) -> Self {
        Self {
            document,
            sheet: None,
            seen: HashSet::new(),
        }
    }

    pub fn emit(&mut self, descriptor: &StyleDescriptor) -> String {
        let hash = descriptor.hash();

        if !self.seen.contains(hash) {
            self.seen.insert(hash.to_string());
            let text = descriptor.to_css();
            let sheet = self
                .sheet
                .get_or_insert_with(|| self.document.create_style_sheet());
            let index = sheet.rule_count();
            debug!(hash, index, "inserting style rule");
            sheet.insert_rule(&text, index);
        }

        descriptor.class_name()
    }

    /// Class list for a node: one token per descriptor, space separated.
    pub fn class_list(&mut self, descriptors: &[StyleDescriptor]) -> String {
        descriptors
            .iter()
            .map(|descriptor| self.emit(descriptor))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn emitted(&self) -> usize {
        self.seen.len()
    }
}

impl fmt::Debug for RuleCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleCompiler")
            .field("emitted", &self.seen.len())
            .field("sheet_created", &self.sheet.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDocument;
    use serde_json::json;

    fn decls(raw: Json) -> Declarations {
        match raw {
            Json::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn rule(hash: &str, raw: Json) -> StyleDescriptor {
        StyleDescriptor::Rule(StyleRule {
            hash: hash.to_string(),
            conditions: vec![],
            suffixes: vec![],
            declarations: decls(raw),
        })
    }

    #[test]
    fn hyphenates_camel_case_and_ms_prefix() {
        assert_eq!(hyphenate("fontSize"), "font-size");
        assert_eq!(hyphenate("color"), "color");
        assert_eq!(hyphenate("msFlexAlign"), "-ms-flex-align");
        assert_eq!(hyphenate("WebkitTransition"), "-webkit-transition");
    }

    #[test]
    fn list_values_expand_in_order() {
        let text = render_declarations(&decls(json!({
            "display": ["-webkit-box", "flex"],
            "lineHeight": 1.5,
            "zIndex": 2
        })));
        assert_eq!(text, "display:-webkit-box;display:flex;line-height:1.5;z-index:2");
    }

    #[test]
    fn conditions_wrap_first_innermost_and_suffixes_follow_class() {
        let descriptor = StyleDescriptor::Rule(StyleRule {
            hash: "h1".into(),
            conditions: vec![
                Condition {
                    kind: ConditionKind::Media,
                    predicate: "(min-width: 600px)".into(),
                },
                Condition {
                    kind: ConditionKind::Supports,
                    predicate: "(display: grid)".into(),
                },
            ],
            suffixes: vec![":hover".into(), "::after".into()],
            declarations: decls(json!({"color": "red"})),
        });

        assert_eq!(
            descriptor.to_css(),
            "@supports (display: grid) {@media (min-width: 600px) {.sh1:hover::after{color:red}}}"
        );
    }

    #[test]
    fn font_face_ignores_selector_parts() {
        let descriptor = StyleDescriptor::FontFace(FontFaceRule {
            hash: "ff".into(),
            declarations: decls(json!({"fontFamily": "Inter", "src": "url(a.woff2)"})),
        });
        assert_eq!(descriptor.to_css(), "@font-face{font-family:Inter;src:url(a.woff2)}");
    }

    #[test]
    fn same_hash_is_inserted_once_and_keeps_first_declarations() {
        let document = Rc::new(HeadlessDocument::default());
        let mut compiler = RuleCompiler::new(document.clone());

        let first = compiler.emit(&rule("abc", json!({"color": "red"})));
        let second = compiler.emit(&rule("abc", json!({"color": "blue"})));

        assert_eq!(first, "sabc");
        assert_eq!(second, "sabc");
        assert_eq!(document.rules(), vec![".sabc{color:red}".to_string()]);
    }

    #[test]
    fn stylesheet_is_created_lazily() {
        let document = Rc::new(HeadlessDocument::default());
        let mut compiler = RuleCompiler::new(document.clone());
        assert_eq!(document.style_sheets_created(), 0);

        assert_eq!(compiler.class_list(&[]), "");
        assert_eq!(document.style_sheets_created(), 0);

        let classes =
            compiler.class_list(&[rule("a", json!({"margin": 0})), rule("b", json!({"padding": 0}))]);
        assert_eq!(classes, "sa sb");
        assert_eq!(document.style_sheets_created(), 1);
        assert_eq!(compiler.emitted(), 2);
    }
}
