//! Parser for the declarative model description format, the standard
//! producer of initial graphs.
//!
//! ```text
//! model ResNetBlock {
//!   input x: Tensor<float32>[1, 64, 56, 56]
//!
//!   conv1 = Conv2D(x, filters=64, kernel=3, padding=1)
//!   bn1 = BatchNorm(conv1)
//!   out = ReLU(bn1)
//!
//!   output out
//! }
//! ```
//!
//! Keyword arguments become typed node attributes: integers, floats,
//! bracketed integer lists (`perm=[0, 2, 1]`) and bare words (strings).
//! `Constant(shape=[..], dtype=..)` declares a typed constant.
//!
//! The parser guarantees the structural invariants the pass pipeline
//! relies on; unknown operators and references to undefined values are
//! reported as errors instead of being silently skipped.

use std::collections::HashMap;

use itertools::Itertools;
use thiserror::Error;

use crate::attr::AttrValue;
use crate::dtype::{DType, TensorType};
use crate::graph::{Edge, Graph, Node, NodeId};
use crate::ops::OpKind;

#[derive(Debug, Clone, Error)]
pub enum DslError {
    #[error("line {line}: invalid tensor type {text:?}, expected Tensor<dtype>[dims]")]
    InvalidTensorType { line: usize, text: String },
    #[error("line {line}: unknown element type {text:?}")]
    UnknownDType { line: usize, text: String },
    #[error("line {line}: unknown operator {op:?}")]
    UnknownOperator { line: usize, op: String },
    #[error("line {line}: operator {op} expects {min}..={max} operands, got {got}")]
    WrongArity {
        line: usize,
        op: OpKind,
        min: usize,
        max: usize,
        got: usize,
    },
    #[error("line {line}: {name:?} is not defined")]
    UndefinedValue { line: usize, name: String },
    #[error("line {line}: cannot parse statement {text:?}")]
    MalformedStatement { line: usize, text: String },
}

#[derive(Debug)]
enum Statement {
    Input {
        name: String,
        ty: TensorType,
    },
    Call {
        line: usize,
        name: String,
        op: String,
        args: Vec<String>,
        kwargs: Vec<(String, AttrValue)>,
    },
    Output {
        line: usize,
        name: String,
    },
}

/// Parse a model description into a graph.
pub fn parse_dsl(source: &str) -> Result<Graph, DslError> {
    let mut model_name = "Untitled".to_owned();
    let mut statements = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let text = strip_comment(raw).trim();
        if text.is_empty() || text == "{" || text == "}" {
            continue;
        }

        if let Some(rest) = text.strip_prefix("model ") {
            model_name = rest.trim_end_matches('{').trim().to_owned();
            continue;
        }

        statements.push(parse_statement(line, text)?);
    }

    build_graph(&model_name, &statements)
}

/// Like [parse_dsl], but when the source has no explicit `output`
/// statement the last assignment becomes the model output.
pub fn parse_dsl_with_implicit_output(source: &str) -> Result<Graph, DslError> {
    let has_output = source
        .lines()
        .map(|l| strip_comment(l).trim().to_owned())
        .any(|l| matches!(parse_output(&l), Some(name) if is_identifier(&name)));
    if has_output {
        return parse_dsl(source);
    }

    let last_assign = source
        .lines()
        .filter_map(|l| {
            let text = strip_comment(l).trim().to_owned();
            let (lhs, _) = text.split_once('=')?;
            let lhs = lhs.trim();
            is_identifier(lhs).then(|| lhs.to_owned())
        })
        .last();

    match last_assign {
        Some(name) => parse_dsl(&format!("{}\noutput {}", source, name)),
        None => parse_dsl(source),
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(index) => &line[..index],
        None => line,
    }
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !text.starts_with(|c: char| c.is_ascii_digit())
}

fn parse_output(text: &str) -> Option<String> {
    let rest = text.strip_prefix("output ")?;
    let rest = rest.trim();
    (!rest.contains('=')).then(|| rest.to_owned())
}

fn parse_statement(line: usize, text: &str) -> Result<Statement, DslError> {
    // input x: Tensor<float32>[1, 64, 56, 56]
    if let Some(rest) = text.strip_prefix("input ") {
        let (name, spec) = rest.split_once(':').ok_or_else(|| DslError::MalformedStatement {
            line,
            text: text.to_owned(),
        })?;
        let ty = parse_tensor_type(line, spec.trim())?;
        return Ok(Statement::Input {
            name: name.trim().to_owned(),
            ty,
        });
    }

    // name = Op(arg, key=value, ...)
    if let Some((lhs, rhs)) = text.split_once('=') {
        let name = lhs.trim();
        let rhs = rhs.trim();
        if is_identifier(name) {
            if let Some((op, inner)) = rhs
                .split_once('(')
                .and_then(|(op, rest)| Some((op.trim(), rest.strip_suffix(')')?)))
            {
                let mut args = Vec::new();
                let mut kwargs = Vec::new();
                for part in split_args(inner) {
                    match split_kwarg(&part) {
                        Some((key, value)) => kwargs.push((key, value)),
                        None => args.push(part),
                    }
                }
                return Ok(Statement::Call {
                    line,
                    name: name.to_owned(),
                    op: op.to_owned(),
                    args,
                    kwargs,
                });
            }
        }
        return Err(DslError::MalformedStatement {
            line,
            text: text.to_owned(),
        });
    }

    // output out
    if let Some(name) = parse_output(text) {
        if is_identifier(&name) {
            return Ok(Statement::Output { line, name });
        }
    }

    Err(DslError::MalformedStatement {
        line,
        text: text.to_owned(),
    })
}

fn parse_tensor_type(line: usize, spec: &str) -> Result<TensorType, DslError> {
    let invalid = || DslError::InvalidTensorType {
        line,
        text: spec.to_owned(),
    };

    let rest = spec.strip_prefix("Tensor<").ok_or_else(invalid)?;
    let (dtype_text, rest) = rest.split_once('>').ok_or_else(invalid)?;
    let dims_text = rest
        .trim()
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .ok_or_else(invalid)?;

    let dtype: DType = dtype_text.trim().parse().map_err(|_| DslError::UnknownDType {
        line,
        text: dtype_text.trim().to_owned(),
    })?;
    let shape = dims_text
        .split(',')
        .map(|d| d.trim().parse::<usize>().map_err(|_| invalid()))
        .try_collect()?;

    Ok(TensorType::new(dtype, shape))
}

/// Split an argument list on top-level commas, respecting brackets.
fn split_args(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;

    for c in text.chars() {
        match c {
            '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_owned());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_owned());
    }
    parts
}

fn split_kwarg(part: &str) -> Option<(String, AttrValue)> {
    let (key, value) = part.split_once('=')?;
    let key = key.trim();
    is_identifier(key).then(|| (key.to_owned(), parse_attr_value(value)))
}

fn parse_attr_value(text: &str) -> AttrValue {
    let text = text.trim();

    if text == "true" {
        return AttrValue::Bool(true);
    }
    if text == "false" {
        return AttrValue::Bool(false);
    }
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        if inner.trim().is_empty() {
            return AttrValue::Ints(Vec::new());
        }
        let ints: Result<Vec<i64>, _> = inner.split(',').map(|p| p.trim().parse()).collect();
        if let Ok(ints) = ints {
            return AttrValue::Ints(ints);
        }
        return AttrValue::Str(text.to_owned());
    }
    if let Ok(x) = text.parse::<i64>() {
        return AttrValue::Int(x);
    }
    if let Ok(x) = text.parse::<f32>() {
        return AttrValue::float(x);
    }
    AttrValue::Str(text.to_owned())
}

fn build_graph(model_name: &str, statements: &[Statement]) -> Result<Graph, DslError> {
    let mut graph = Graph::new(model_name, "Parsed from DSL");
    let mut by_name: HashMap<&str, NodeId> = HashMap::new();

    // inputs first so operator arguments can refer to them
    for statement in statements {
        if let Statement::Input { name, ty, .. } = statement {
            let id = graph.add_node(Node::input(name.clone(), ty.clone()));
            by_name.insert(name.as_str(), id);
        }
    }

    for statement in statements {
        let Statement::Call {
            line,
            name,
            op,
            args,
            kwargs,
        } = statement
        else {
            continue;
        };

        let op: OpKind = op.parse().map_err(|_| DslError::UnknownOperator {
            line: *line,
            op: op.clone(),
        })?;
        let sig = op.signature();
        if !(sig.min_inputs..=sig.max_inputs).contains(&args.len()) {
            return Err(DslError::WrongArity {
                line: *line,
                op,
                min: sig.min_inputs,
                max: sig.max_inputs,
                got: args.len(),
            });
        }

        let mut node = Node::new(op, name.clone(), args.len());
        for (key, value) in kwargs {
            node.attrs.insert(key.clone(), value.clone());
        }
        if op == OpKind::Constant {
            apply_constant_type(&mut node);
        }

        let id = node.id;
        graph.add_node(node);
        by_name.insert(name.as_str(), id);

        for (port, arg) in args.iter().enumerate() {
            let source = *by_name.get(arg.as_str()).ok_or_else(|| DslError::UndefinedValue {
                line: *line,
                name: arg.clone(),
            })?;
            graph.add_edge(Edge::between(source, 0, id, port));
        }
    }

    for statement in statements {
        let Statement::Output { line, name } = statement else {
            continue;
        };

        let source = *by_name.get(name.as_str()).ok_or_else(|| DslError::UndefinedValue {
            line: *line,
            name: name.clone(),
        })?;
        let id = graph.add_node(Node::output(format!("output_{}", name)));
        graph.add_edge(Edge::between(source, 0, id, 0));
    }

    Ok(graph)
}

/// `Constant(shape=[..], dtype=..)` declares its output type inline.
fn apply_constant_type(node: &mut Node) {
    let Some(shape) = node.attrs.get("shape").and_then(|v| v.as_ints()) else {
        return;
    };
    let shape = shape.iter().map(|&d| d.max(0) as usize).collect_vec();
    let dtype = node
        .attrs
        .get("dtype")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(DType::F32);
    node.outputs[0].ty = Some(TensorType::new(dtype, shape));
}
