//! Variable substitution inside document scalars, built on `nom`.
//!
//! Supported forms: `$VAR`, `${VAR}`, `${VAR:-default}` (default when
//! unset or empty), `${VAR-default}` (default when unset),
//! `${VAR:?message}` (error when unset or empty), `${VAR?message}`
//! (error when unset), and `$$` as a literal dollar escape.
//!
//! Substitution reads only the variable set captured in
//! [`ResolveOptions`]; undefined variables without a default follow the
//! configured [`UndefinedVarPolicy`]. Defaults are taken literally, with
//! no nested expansion.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_till1, take_while, take_while1},
    character::complete::char,
    combinator::{map, opt, verify},
    multi::many0,
    sequence::{delimited, preceded},
};
use serde_yaml::Value;
use stackfile_common::error::{ComposeError, ErrorSet};
use stackfile_common::options::{ResolveOptions, UndefinedVarPolicy};

/// One piece of a scalar after splitting on substitution sites.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Verbatim text.
    Literal(String),
    /// A substitution site.
    Var(VarExpr),
}

/// A parsed `${...}` or `$VAR` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
struct VarExpr {
    name: String,
    op: Option<VarOp>,
}

/// Modifier following the variable name inside braces.
#[derive(Debug, Clone, PartialEq, Eq)]
enum VarOp {
    /// `:-word`
    DefaultIfUnsetOrEmpty(String),
    /// `-word`
    DefaultIfUnset(String),
    /// `:?word`
    ErrorIfUnsetOrEmpty(String),
    /// `?word`
    ErrorIfUnset(String),
}

fn var_name(input: &str) -> IResult<&str, &str> {
    verify(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        |name: &str| !name.starts_with(|c: char| c.is_ascii_digit()),
    )
    .parse(input)
}

fn op_word(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| c != '}').parse(input)
}

fn var_op(input: &str) -> IResult<&str, VarOp> {
    let word = op_word;
    alt((
        map(preceded(tag(":-"), word), |w: &str| {
            VarOp::DefaultIfUnsetOrEmpty(w.to_string())
        }),
        map(preceded(tag(":?"), word), |w: &str| {
            VarOp::ErrorIfUnsetOrEmpty(w.to_string())
        }),
        map(preceded(tag("-"), word), |w: &str| {
            VarOp::DefaultIfUnset(w.to_string())
        }),
        map(preceded(tag("?"), word), |w: &str| {
            VarOp::ErrorIfUnset(w.to_string())
        }),
    ))
    .parse(input)
}

fn braced_var(input: &str) -> IResult<&str, Segment> {
    map(
        delimited(tag("${"), (var_name, opt(var_op)), char('}')),
        |(name, op)| {
            Segment::Var(VarExpr {
                name: name.to_string(),
                op,
            })
        },
    )
    .parse(input)
}

fn simple_var(input: &str) -> IResult<&str, Segment> {
    map(preceded(char('$'), var_name), |name: &str| {
        Segment::Var(VarExpr {
            name: name.to_string(),
            op: None,
        })
    })
    .parse(input)
}

fn dollar_escape(input: &str) -> IResult<&str, Segment> {
    map(tag("$$"), |_| Segment::Literal("$".to_string())).parse(input)
}

/// A `$` that starts neither an escape nor a variable is literal text.
fn lone_dollar(input: &str) -> IResult<&str, Segment> {
    map(char('$'), |_| Segment::Literal("$".to_string())).parse(input)
}

fn literal(input: &str) -> IResult<&str, Segment> {
    map(take_till1(|c: char| c == '$'), |text: &str| {
        Segment::Literal(text.to_string())
    })
    .parse(input)
}

fn segments(input: &str) -> IResult<&str, Vec<Segment>> {
    many0(alt((
        dollar_escape,
        braced_var,
        simple_var,
        lone_dollar,
        literal,
    )))
    .parse(input)
}

/// Substitutes variables in one scalar string.
///
/// # Errors
///
/// Returns a message describing the first failed substitution.
pub(crate) fn substitute(input: &str, opts: &ResolveOptions) -> Result<String, String> {
    let (rest, parts) =
        segments(input).map_err(|err| format!("unparsable substitution syntax: {err}"))?;
    debug_assert!(rest.is_empty());

    let mut out = String::with_capacity(input.len());
    for part in parts {
        match part {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Var(expr) => out.push_str(&resolve_var(&expr, opts)?),
        }
    }
    Ok(out)
}

fn resolve_var(expr: &VarExpr, opts: &ResolveOptions) -> Result<String, String> {
    let current = opts.variables.get(&expr.name);

    match &expr.op {
        Some(VarOp::DefaultIfUnsetOrEmpty(default)) => Ok(current
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| default.clone())),
        Some(VarOp::DefaultIfUnset(default)) => {
            Ok(current.cloned().unwrap_or_else(|| default.clone()))
        }
        Some(VarOp::ErrorIfUnsetOrEmpty(message)) => current
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| required_message(&expr.name, message)),
        Some(VarOp::ErrorIfUnset(message)) => current
            .cloned()
            .ok_or_else(|| required_message(&expr.name, message)),
        None => current.cloned().map_or_else(
            || match opts.undefined_vars {
                UndefinedVarPolicy::Empty => Ok(String::new()),
                UndefinedVarPolicy::Error => Err(format!("variable \"{}\" is not set", expr.name)),
            },
            Ok,
        ),
    }
}

fn required_message(name: &str, message: &str) -> String {
    if message.is_empty() {
        format!("required variable \"{name}\" is not set")
    } else {
        format!("required variable \"{name}\" is not set: {message}")
    }
}

/// Applies substitution to every string scalar in the tree, in place.
///
/// Failures are independent per scalar; all of them are collected.
///
/// # Errors
///
/// Returns the collected interpolation errors, each carrying the document
/// path of the offending scalar.
pub fn apply(root: &mut Value, opts: &ResolveOptions) -> Result<(), ErrorSet> {
    let mut errors = ErrorSet::new();
    walk(root, opts, &mut String::new(), &mut errors);
    errors.into_result(())
}

fn walk(value: &mut Value, opts: &ResolveOptions, path: &mut String, errors: &mut ErrorSet) {
    match value {
        Value::String(text) => {
            if text.contains('$') {
                match substitute(text, opts) {
                    Ok(replaced) => *text = replaced,
                    Err(message) => errors.push(ComposeError::Interpolation {
                        path: path.clone(),
                        message,
                    }),
                }
            }
        }
        Value::Sequence(items) => {
            for (idx, item) in items.iter_mut().enumerate() {
                with_segment(path, &idx.to_string(), |p| walk(item, opts, p, errors));
            }
        }
        Value::Mapping(map) => {
            for (key, item) in map.iter_mut() {
                let label = crate::loader::scalar_to_string(key).unwrap_or_default();
                with_segment(path, &label, |p| walk(item, opts, p, errors));
            }
        }
        _ => {}
    }
}

fn with_segment(path: &mut String, segment: &str, f: impl FnOnce(&mut String)) {
    let saved = path.len();
    if !path.is_empty() {
        path.push('.');
    }
    path.push_str(segment);
    f(path);
    path.truncate(saved);
}
