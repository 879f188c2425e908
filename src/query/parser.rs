//! Target Parser
//!
//! Parses target expression strings into the [`Expr`] AST.
//!
//! # Supported Syntax
//!
//! ```text
//! expr   := call | bool | number | string | path
//! call   := NAME '(' [arg (',' arg)*] ')'
//! arg    := NAME '=' expr | expr
//! path   := segment characters, dots, glob metacharacters, {a,b} groups
//! ```
//!
//! # Examples
//!
//! ```text
//! hosts.web1.cpu
//! sumSeries(hosts.*.cpu)
//! alias(hosts.web1.cpu, "web")
//! movingAverage(hosts.{web,db}1.cpu, 5, xFilesFactor=0.5)
//! ```

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit0, digit1, multispace0, one_of, satisfy},
    combinator::{cut, map, map_res, not, opt, peek, recognize, value},
    multi::{many1, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::query::ast::Expr;
use crate::query::error::{QueryError, QueryResult};

/// Parse a target string into an expression
pub fn parse_target(input: &str) -> QueryResult<Expr> {
    match delimited(multispace0, parse_expr, multispace0)(input) {
        Ok((remaining, expr)) => {
            if remaining.is_empty() {
                Ok(expr)
            } else {
                Err(invalid(input, remaining))
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(invalid(input, e.input)),
        Err(nom::Err::Incomplete(_)) => Err(invalid(input, "")),
    }
}

fn invalid(input: &str, remaining: &str) -> QueryError {
    let position = input.len() - remaining.len();
    let fragment = if remaining.is_empty() {
        input.to_string()
    } else {
        remaining.to_string()
    };
    QueryError::InvalidExpression { fragment, position }
}

/// Characters allowed in a path outside of `{...}` groups
fn is_segment_char(c: char) -> bool {
    c.is_alphanumeric() || "_-.*?[]!#%@~+^".contains(c)
}

/// Characters that may continue a path token
fn is_path_char(c: char) -> bool {
    is_segment_char(c) || c == '{' || c == '}'
}

/// Argument in a call list
enum Arg {
    Positional(Expr),
    Keyword(String, Expr),
}

/// Parse any expression
fn parse_expr(input: &str) -> IResult<&str, Expr> {
    alt((parse_call, parse_bool, parse_number, parse_string, parse_path))(input)
}

/// Parse a function call like `scale(a.b, 2)`
fn parse_call(input: &str) -> IResult<&str, Expr> {
    let (input, name) = parse_identifier(input)?;
    let (input, _) = char('(')(input)?;

    // Past the open paren this can only be a call
    let (input, items) = cut(terminated(
        delimited(
            multispace0,
            separated_list0(
                delimited(multispace0, char(','), multispace0),
                parse_arg,
            ),
            multispace0,
        ),
        char(')'),
    ))(input)?;

    let mut args = Vec::new();
    let mut kwargs = Vec::new();
    for item in items {
        match item {
            Arg::Positional(expr) => args.push(expr),
            Arg::Keyword(key, expr) => kwargs.push((key, expr)),
        }
    }

    Ok((
        input,
        Expr::Call {
            name: name.to_string(),
            args,
            kwargs,
        },
    ))
}

/// Parse a call argument
fn parse_arg(input: &str) -> IResult<&str, Arg> {
    alt((
        map(parse_kwarg, |(key, expr)| Arg::Keyword(key.to_string(), expr)),
        map(parse_expr, Arg::Positional),
    ))(input)
}

/// Parse `key=expr`
fn parse_kwarg(input: &str) -> IResult<&str, (&str, Expr)> {
    let (input, key) = parse_identifier(input)?;
    let (input, _) = delimited(multispace0, char('='), multispace0)(input)?;
    let (input, expr) = parse_expr(input)?;
    Ok((input, (key, expr)))
}

/// Parse identifier (function or keyword name)
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// Guard: the token must not run on into a path
fn end_of_token(input: &str) -> IResult<&str, ()> {
    not(peek(satisfy(is_path_char)))(input)
}

/// Parse `true` / `false`, any case
fn parse_bool(input: &str) -> IResult<&str, Expr> {
    terminated(
        alt((
            value(Expr::Bool(true), tag_no_case("true")),
            value(Expr::Bool(false), tag_no_case("false")),
        )),
        end_of_token,
    )(input)
}

/// Parse a number like `12`, `-0.5`, `1e3`
fn parse_number(input: &str) -> IResult<&str, Expr> {
    map_res(
        terminated(
            recognize(tuple((
                opt(one_of("+-")),
                alt((
                    recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                    recognize(pair(char('.'), digit1)),
                )),
                opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
            ))),
            end_of_token,
        ),
        |s: &str| s.parse::<f64>().map(Expr::Number),
    )(input)
}

/// Parse a single or double quoted string with backslash escapes
fn parse_string(input: &str) -> IResult<&str, Expr> {
    map(alt((quoted('\''), quoted('"'))), Expr::String)(input)
}

fn quoted(quote: char) -> impl FnMut(&str) -> IResult<&str, String> {
    move |input: &str| {
        let stop = if quote == '\'' { "\\'" } else { "\\\"" };
        let (input, _) = char(quote)(input)?;
        let (input, content) = opt(escaped_transform(
            is_not(stop),
            '\\',
            alt((
                value("\\", tag("\\")),
                value("'", tag("'")),
                value("\"", tag("\"")),
                value("\n", tag("n")),
                value("\t", tag("t")),
            )),
        ))(input)?;
        let (input, _) = char(quote)(input)?;
        Ok((input, content.unwrap_or_default()))
    }
}

/// Parse a path pattern; commas are allowed inside `{...}`
fn parse_path(input: &str) -> IResult<&str, Expr> {
    map(
        recognize(many1(alt((
            take_while1(is_segment_char),
            recognize(delimited(
                char('{'),
                take_while(|c: char| c != '}' && c != '(' && c != ')' && !c.is_whitespace()),
                char('}'),
            )),
        )))),
        |p: &str| Expr::Path(p.to_string()),
    )(input)
}

/// Parse a bare path; used by endpoints that accept a pattern, not a target
pub fn parse_pattern(input: &str) -> QueryResult<String> {
    match preceded(multispace0, parse_path)(input) {
        Ok((rest, Expr::Path(p))) if rest.trim().is_empty() => Ok(p),
        Ok((rest, _)) => Err(invalid(input, rest)),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(invalid(input, e.input)),
        Err(nom::Err::Incomplete(_)) => Err(invalid(input, "")),
    }
}
