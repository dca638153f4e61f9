//! The serialized expression language used by event handlers, lifecycle
//! hooks and ref callbacks.
//!
//! Expressions arrive as tagged JSON arrays (`["GetE", key, object]`) and are
//! decoded once into the closed [`Expr`] type. Decoding is the only place an
//! unknown tag can appear; evaluation itself cannot fail.

use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Global,
    Hole(u32),
    Value0(Json),
    Value1(Json, Box<Expr>),
    Value2(Json, Box<Expr>, Box<Expr>),
    Literal(Json),
    Get {
        key: Box<Expr>,
        object: Box<Expr>,
    },
    Invoke {
        method: Box<Expr>,
        object: Box<Expr>,
        args: Vec<Expr>,
    },
    EventHandler {
        prevent_default: Box<Expr>,
        stop_propagation: Box<Expr>,
        stop_immediate_propagation: Box<Expr>,
        action: Box<Expr>,
    },
    Just(Box<Expr>),
    Nothing,
    RefHandler(Box<Expr>),
    Deref(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("unknown expression tag '{tag}'")]
    UnknownTag { tag: String },
    #[error("expression is not a tagged array: {found}")]
    NotTagged { found: String },
    #[error("expression '{tag}' expects {expected} operand(s), got {found}")]
    Arity {
        tag: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("expression '{tag}' has an invalid operand: {reason}")]
    Operand { tag: &'static str, reason: String },
}

impl Expr {
    pub fn decode(raw: &Json) -> Result<Self, ExprError> {
        let items = match raw.as_array() {
            Some(items) if !items.is_empty() => items,
            _ => {
                return Err(ExprError::NotTagged {
                    found: truncate(raw),
                });
            }
        };

        let Some(tag) = items[0].as_str() else {
            return Err(ExprError::NotTagged {
                found: truncate(raw),
            });
        };
        let operands = &items[1..];

        match tag {
            "GlobalE" => Ok(Self::Global),
            "HoleE" => {
                let [index] = exact::<1>("HoleE", operands)?;
                let hole = index
                    .as_u64()
                    .and_then(|i| u32::try_from(i).ok())
                    .or_else(|| index.as_str().and_then(|s| s.parse().ok()))
                    .ok_or_else(|| ExprError::Operand {
                        tag: "HoleE",
                        reason: format!("hole index must be a small integer, got {index}"),
                    })?;
                Ok(Self::Hole(hole))
            }
            "Value0E" => {
                let [tag] = exact::<1>("Value0E", operands)?;
                Ok(Self::Value0(tag.clone()))
            }
            "Value1E" => {
                let [tag, a] = exact::<2>("Value1E", operands)?;
                Ok(Self::Value1(tag.clone(), decode_boxed(a)?))
            }
            "Value2E" => {
                let [tag, a, b] = exact::<3>("Value2E", operands)?;
                Ok(Self::Value2(tag.clone(), decode_boxed(a)?, decode_boxed(b)?))
            }
            "LitE" => {
                let [value] = exact::<1>("LitE", operands)?;
                Ok(Self::Literal(value.clone()))
            }
            "GetE" => {
                let [key, object] = exact::<2>("GetE", operands)?;
                Ok(Self::Get {
                    key: decode_boxed(key)?,
                    object: decode_boxed(object)?,
                })
            }
            "InvokeE" => {
                if operands.len() < 2 {
                    return Err(ExprError::Arity {
                        tag: "InvokeE",
                        expected: 2,
                        found: operands.len(),
                    });
                }
                Ok(Self::Invoke {
                    method: decode_boxed(&operands[0])?,
                    object: decode_boxed(&operands[1])?,
                    args: operands[2..]
                        .iter()
                        .map(Self::decode)
                        .collect::<Result<_, _>>()?,
                })
            }
            "EventHandlerE" => {
                let [pd, sp, sip, action] = exact::<4>("EventHandlerE", operands)?;
                Ok(Self::EventHandler {
                    prevent_default: decode_boxed(pd)?,
                    stop_propagation: decode_boxed(sp)?,
                    stop_immediate_propagation: decode_boxed(sip)?,
                    action: decode_boxed(action)?,
                })
            }
            "JustE" => {
                let [inner] = exact::<1>("JustE", operands)?;
                Ok(Self::Just(decode_boxed(inner)?))
            }
            "NothingE" => Ok(Self::Nothing),
            "RefHandlerE" => {
                let [action] = exact::<1>("RefHandlerE", operands)?;
                Ok(Self::RefHandler(decode_boxed(action)?))
            }
            "DerefE" => {
                let [key] = exact::<1>("DerefE", operands)?;
                let key = match key {
                    Json::String(s) => s.clone(),
                    Json::Number(n) => n.to_string(),
                    other => {
                        return Err(ExprError::Operand {
                            tag: "DerefE",
                            reason: format!("ref key must be a string, got {other}"),
                        });
                    }
                };
                Ok(Self::Deref(key))
            }
            other => Err(ExprError::UnknownTag {
                tag: other.to_string(),
            }),
        }
    }
}

fn decode_boxed(raw: &Json) -> Result<Box<Expr>, ExprError> {
    Expr::decode(raw).map(Box::new)
}

fn exact<'a, const N: usize>(
    tag: &'static str,
    operands: &'a [Json],
) -> Result<&'a [Json; N], ExprError> {
    operands.try_into().map_err(|_| ExprError::Arity {
        tag,
        expected: N,
        found: operands.len(),
    })
}

fn truncate(raw: &Json) -> String {
    let mut text = raw.to_string();
    if text.len() > 64 {
        let mut end = 64;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push('…');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_nested_event_handler() {
        let raw = json!([
            "EventHandlerE",
            ["LitE", true],
            ["LitE", false],
            ["LitE", false],
            ["JustE", ["Value1E", "Input", ["GetE", ["LitE", "value"], ["GetE", ["LitE", "target"], ["HoleE", 0]]]]]
        ]);

        let expr = Expr::decode(&raw).expect("decode handler");
        let Expr::EventHandler { action, .. } = expr else {
            panic!("expected event handler, got {expr:?}");
        };
        assert!(matches!(*action, Expr::Just(ref inner) if matches!(**inner, Expr::Value1(..))));
    }

    #[test]
    fn decodes_invoke_with_ordered_arguments() {
        let raw = json!(["InvokeE", ["LitE", "focus"], ["DerefE", "field"], ["LitE", 1], ["HoleE", 1]]);

        match Expr::decode(&raw).expect("decode invoke") {
            Expr::Invoke { args, .. } => {
                assert_eq!(args, vec![Expr::Literal(json!(1)), Expr::Hole(1)]);
            }
            other => panic!("expected invoke, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_is_reported_even_when_nested() {
        let raw = json!(["JustE", ["EvalE", "alert(1)"]]);
        let err = Expr::decode(&raw).expect_err("unknown tag");
        assert_eq!(
            err,
            ExprError::UnknownTag {
                tag: "EvalE".to_string()
            }
        );
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let err = Expr::decode(&json!(["GetE", ["LitE", "x"]])).expect_err("arity");
        assert!(matches!(err, ExprError::Arity { tag: "GetE", expected: 2, found: 1 }));
    }

    #[test]
    fn non_array_is_rejected() {
        let err = Expr::decode(&json!({"tag": "GlobalE"})).expect_err("not tagged");
        assert!(matches!(err, ExprError::NotTagged { .. }));
    }
}
