//! Template expansion
//!
//! Rewrites `template(inner, args...)` wrappers before parsing. Placeholders
//! `$1` or `$name` inside `inner` are bound from the call's own arguments,
//! then from any enclosing template, then from request-level
//! `template[key]=value` parameters.
//!
//! ```text
//! template(constantLine($1), 12)            -> constantLine(12)
//! template(time($name), name="cpu")         -> time("cpu")
//! template(sumSeries(hosts.$1.cpu), "web1") -> sumSeries(hosts.web1.cpu)
//! ```
//!
//! A placeholder that makes up a whole argument becomes a literal: numbers
//! unquoted, strings quoted. A placeholder inside a path is spliced in as
//! plain text.

use std::collections::BTreeMap;

use crate::query::ast::format_number;
use crate::query::error::{QueryError, QueryResult};

const WRAPPER: &str = "template(";

/// A bound template value
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Number(f64),
    Text(String),
}

impl TemplateValue {
    /// Interpret an external `template[key]` parameter
    pub fn from_param(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Self::Number(n),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Interpret an inline template argument (a literal as written in the target)
    fn from_literal(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(text) = unquote(raw) {
            return Self::Text(text);
        }
        Self::from_param(raw)
    }

    fn as_literal(&self) -> String {
        match self {
            Self::Number(n) => format_number(*n),
            Self::Text(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        }
    }

    fn as_text(&self) -> String {
        match self {
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.clone(),
        }
    }
}

/// Placeholder bindings, keyed by position (`"1"`) or name
pub type TemplateArgs = BTreeMap<String, TemplateValue>;

/// Build bindings from request-level `template[key]` parameters
pub fn args_from_params<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> TemplateArgs {
    params
        .into_iter()
        .map(|(k, v)| (k.to_string(), TemplateValue::from_param(v)))
        .collect()
}

/// Expand every `template(...)` wrapper in a target
pub fn expand(target: &str, request_args: &TemplateArgs) -> QueryResult<String> {
    expand_scoped(target, request_args)
}

fn expand_scoped(target: &str, scope: &TemplateArgs) -> QueryResult<String> {
    let mut out = String::with_capacity(target.len());
    let mut rest = target;
    let mut offset = 0;

    while let Some(start) = find_wrapper(rest) {
        out.push_str(&rest[..start]);

        let args_start = start + WRAPPER.len();
        let close = matching_paren(rest, args_start).ok_or_else(|| {
            QueryError::InvalidExpression {
                fragment: rest[start..].to_string(),
                position: offset + start,
            }
        })?;

        let parts = split_top_level(&rest[args_start..close]);
        let (inner, bindings) = match parts.split_first() {
            Some((inner, bindings)) if !inner.trim().is_empty() => (inner.trim(), bindings),
            _ => {
                return Err(QueryError::InvalidExpression {
                    fragment: rest[start..=close].to_string(),
                    position: offset + start,
                })
            }
        };

        let mut inner_scope = scope.clone();
        let mut position = 0;
        for binding in bindings {
            match split_keyword(binding) {
                Some((key, value)) => {
                    inner_scope.insert(key.to_string(), TemplateValue::from_literal(value));
                }
                None => {
                    position += 1;
                    inner_scope.insert(position.to_string(), TemplateValue::from_literal(binding));
                }
            }
        }

        let expanded = expand_scoped(inner, &inner_scope)?;
        out.push_str(&substitute(&expanded, &inner_scope)?);

        offset += close + 1;
        rest = &rest[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$'
}

/// Byte offset of the next `template(` that starts a token, outside quotes
fn find_wrapper(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev: Option<char> = None;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
        } else if c == '\'' || c == '"' {
            quote = Some(c);
        } else if s[i..].starts_with(WRAPPER) && !prev.map(is_word_char).unwrap_or(false) {
            return Some(i);
        }
        prev = Some(c);
    }
    None
}

/// Offset of the `)` closing the call whose arguments start at `from`
fn matching_paren(s: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in s[from..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' if depth == 0 => return Some(from + i),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Split at commas outside parens, braces, brackets and quotes
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut last = 0;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[last..]);
    parts
}

/// `name=value` at the top level of an argument
fn split_keyword(arg: &str) -> Option<(&str, &str)> {
    let arg = arg.trim();
    let (key, value) = arg.split_once('=')?;
    let key = key.trim();
    let valid = key
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some((key, value.trim()))
}

fn unquote(raw: &str) -> Option<String> {
    let quote = raw.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    if raw.len() < 2 || !raw.ends_with(quote) {
        return None;
    }

    let mut out = String::new();
    let mut chars = raw[1..raw.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Replace `$1` / `$name` placeholders outside quotes
fn substitute(expr: &str, scope: &TemplateArgs) -> QueryResult<String> {
    let mut out = String::with_capacity(expr.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut chars = expr.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '$' => {
                let key_start = i + 1;
                let mut key_end = key_start;
                let numeric = expr[key_start..]
                    .chars()
                    .next()
                    .map(|c| c.is_ascii_digit())
                    .unwrap_or(false);
                while let Some(&(j, k)) = chars.peek() {
                    let accept = if numeric {
                        k.is_ascii_digit()
                    } else {
                        k.is_ascii_alphanumeric() || k == '_'
                    };
                    if !accept {
                        break;
                    }
                    key_end = j + k.len_utf8();
                    chars.next();
                }

                if key_end == key_start {
                    out.push(c);
                    continue;
                }

                let key = &expr[key_start..key_end];
                let value = scope
                    .get(key)
                    .ok_or_else(|| QueryError::UndefinedTemplateArg(key.to_string()))?;

                if is_standalone(&expr[..i], &expr[key_end..]) {
                    out.push_str(&value.as_literal());
                } else {
                    out.push_str(&value.as_text());
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Whether the text between `before` and `after` is a whole argument
fn is_standalone(before: &str, after: &str) -> bool {
    let prev = before.trim_end().chars().last();
    let next = after.trim_start().chars().next();
    matches!(prev, None | Some('(') | Some(',') | Some('='))
        && matches!(next, None | Some(')') | Some(','))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_args() -> TemplateArgs {
        TemplateArgs::new()
    }

    #[test]
    fn test_no_template_is_unchanged() {
        assert_eq!(expand("hosts.worker1.cpu", &no_args()).unwrap(), "hosts.worker1.cpu");
        assert_eq!(
            expand("template(hosts.worker1.cpu)", &no_args()).unwrap(),
            "hosts.worker1.cpu"
        );
    }

    #[test]
    fn test_positional_and_named_inline() {
        assert_eq!(
            expand("template(constantLine($1),12)", &no_args()).unwrap(),
            "constantLine(12)"
        );
        assert_eq!(
            expand("template(constantLine($num),num=12)", &no_args()).unwrap(),
            "constantLine(12)"
        );
        assert_eq!(
            expand("template(time($1),\"nameOfSeries\")", &no_args()).unwrap(),
            "time(\"nameOfSeries\")"
        );
        assert_eq!(
            expand("template(time($name),name=\"nameOfSeries\")", &no_args()).unwrap(),
            "time(\"nameOfSeries\")"
        );
    }

    #[test]
    fn test_request_params() {
        let args = args_from_params([("1", "12"), ("host", "worker*")]);
        assert_eq!(
            expand("template(constantLine($1))", &args).unwrap(),
            "constantLine(12)"
        );
        assert_eq!(
            expand("template(sumSeries(hosts.$host.cpu))", &args).unwrap(),
            "sumSeries(hosts.worker*.cpu)"
        );
    }

    #[test]
    fn test_inline_overrides_request() {
        let args = args_from_params([("1", "worker*")]);
        assert_eq!(
            expand("template(sumSeries(hosts.$1.cpu),\"worker1\")", &args).unwrap(),
            "sumSeries(hosts.worker1.cpu)"
        );
    }

    #[test]
    fn test_nested_scope() {
        let target = "template(sumSeries(template(a.$1.$2, \"x\"), b.$2), \"outer\", \"y\")";
        assert_eq!(
            expand(target, &no_args()).unwrap(),
            "sumSeries(a.x.y, b.y)"
        );
    }

    #[test]
    fn test_undefined_placeholder() {
        let err = expand("template(constantLine($1))", &no_args()).unwrap_err();
        assert_eq!(err, QueryError::UndefinedTemplateArg("1".to_string()));
    }

    #[test]
    fn test_placeholders_in_quotes_are_left_alone() {
        assert_eq!(
            expand("template(alias(a.b, \"$1\"), 3)", &no_args()).unwrap(),
            "alias(a.b, \"$1\")"
        );
    }

    #[test]
    fn test_unterminated_template() {
        let err = expand("template(a.$1", &no_args()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidExpression { position: 0, .. }));
    }

    #[test]
    fn test_template_inside_call() {
        assert_eq!(
            expand("scale(template(a.$1, \"b\"), 2)", &no_args()).unwrap(),
            "scale(a.b, 2)"
        );
        assert_eq!(expand("mytemplate(a)", &no_args()).unwrap(), "mytemplate(a)");
    }
}
