//! Function registry
//!
//! Every render function is declared once in a table: its name, aliases,
//! kind and parameter signature, plus the implementation. Arguments are
//! checked against the signature when the call is dispatched, so
//! implementations only ever see well-typed input.
//!
//! - **combine**: many series in, one out (`sumSeries`, `divideSeries`, ...)
//! - **transform**: one series out per series in (`scale`, `alias`, ...)
//! - **filter**: subsets and reorderings (`limit`, `sortByName`, ...)
//! - **generate**: series from constants (`constantLine`, `sin`, ...)
//!
//! # Adding a Function
//!
//! ```rust,ignore
//! registry.register(
//!     FunctionSpec::new("double", FunctionKind::Transformer, double)
//!         .param(Param::series("seriesList")),
//! );
//! ```

mod combine;
mod filter;
mod generate;
mod transform;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::query::ast::format_number;
use crate::query::error::{QueryError, QueryResult};
use crate::query::timerange::TimeWindow;
use crate::store::TimeSeries;

/// An evaluated argument
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    SeriesList(Vec<TimeSeries>),
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::SeriesList(_) => "series list",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::Bool(_) => "boolean",
        }
    }
}

/// What a parameter accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Series,
    Number,
    Text,
    Bool,
    /// A point count or a duration string like `"5min"`
    Interval,
}

impl ArgKind {
    fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Series, Value::SeriesList(_))
                | (Self::Number, Value::Number(_))
                | (Self::Text, Value::Text(_))
                | (Self::Bool, Value::Bool(_))
                | (Self::Interval, Value::Number(_))
                | (Self::Interval, Value::Text(_))
        )
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Series => "series list",
            Self::Number => "number",
            Self::Text => "string",
            Self::Bool => "boolean",
            Self::Interval => "number or interval string",
        };
        write!(f, "{}", name)
    }
}

/// One declared parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
    pub variadic: bool,
}

impl Param {
    fn new(name: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            variadic: false,
        }
    }

    pub fn series(name: &'static str) -> Self {
        Self::new(name, ArgKind::Series)
    }

    pub fn number(name: &'static str) -> Self {
        Self::new(name, ArgKind::Number)
    }

    pub fn text(name: &'static str) -> Self {
        Self::new(name, ArgKind::Text)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, ArgKind::Bool)
    }

    pub fn interval(name: &'static str) -> Self {
        Self::new(name, ArgKind::Interval)
    }

    /// Mark as optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Accept all remaining positional arguments
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
}

/// How a function relates input series to output series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// N series in, fewer out
    Combiner,
    /// N series in, N (or a subset) out
    Transformer,
    /// No series in
    Generator,
}

/// Per-call context handed to implementations
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    /// Request window
    pub window: TimeWindow,
}

/// Capability every function implementation provides
pub trait SeriesFunction: Send + Sync {
    fn call(&self, args: Args, ctx: &CallContext) -> QueryResult<Vec<TimeSeries>>;
}

impl<F> SeriesFunction for F
where
    F: Fn(Args, &CallContext) -> QueryResult<Vec<TimeSeries>> + Send + Sync,
{
    fn call(&self, args: Args, ctx: &CallContext) -> QueryResult<Vec<TimeSeries>> {
        self(args, ctx)
    }
}

/// A registered function
pub struct FunctionSpec {
    pub name: &'static str,
    pub aliases: Vec<&'static str>,
    pub kind: FunctionKind,
    pub params: Vec<Param>,
    imp: Box<dyn SeriesFunction>,
}

impl fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .finish()
    }
}

impl FunctionSpec {
    /// Declare a function; parameters are added with [`param`](Self::param)
    pub fn new(name: &'static str, kind: FunctionKind, imp: impl SeriesFunction + 'static) -> Self {
        Self {
            name,
            aliases: Vec::new(),
            kind,
            params: Vec::new(),
            imp: Box::new(imp),
        }
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn alias(mut self, alias: &'static str) -> Self {
        self.aliases.push(alias);
        self
    }

    /// Check arguments against the signature and run the implementation
    pub fn invoke(
        &self,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
        ctx: &CallContext,
    ) -> QueryResult<Vec<TimeSeries>> {
        let bound = self.bind(args, kwargs)?;
        self.imp.call(bound, ctx)
    }

    fn bind(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> QueryResult<Args> {
        let mut values: HashMap<&'static str, Vec<Value>> = HashMap::new();
        let given = args.len();
        let mut positional = args.into_iter();

        for param in &self.params {
            if param.variadic {
                let rest: Vec<Value> = positional.by_ref().collect();
                if !rest.is_empty() {
                    values.insert(param.name, rest);
                }
                break;
            }
            match positional.next() {
                Some(value) => {
                    values.insert(param.name, vec![value]);
                }
                None => break,
            }
        }

        if positional.next().is_some() {
            return Err(QueryError::invalid_args(
                self.name,
                format!("expected at most {} arguments, got {}", self.params.len(), given),
            ));
        }

        for (key, value) in kwargs {
            let param = self
                .params
                .iter()
                .find(|p| p.name == key)
                .ok_or_else(|| {
                    QueryError::invalid_args(self.name, format!("unexpected keyword argument '{}'", key))
                })?;
            if values.contains_key(param.name) {
                return Err(QueryError::invalid_args(
                    self.name,
                    format!("got multiple values for argument '{}'", key),
                ));
            }
            values.insert(param.name, vec![value]);
        }

        for param in &self.params {
            match values.get(param.name) {
                None if param.required => {
                    return Err(QueryError::invalid_args(
                        self.name,
                        format!("missing required argument '{}'", param.name),
                    ));
                }
                None => {}
                Some(given) => {
                    if let Some(bad) = given.iter().find(|v| !param.kind.accepts(v)) {
                        return Err(QueryError::invalid_args(
                            self.name,
                            format!(
                                "argument '{}' must be a {}, got a {}",
                                param.name,
                                param.kind,
                                bad.kind_name()
                            ),
                        ));
                    }
                }
            }
        }

        Ok(Args {
            function: self.name,
            values,
        })
    }
}

/// Arguments bound to parameter names
#[derive(Debug)]
pub struct Args {
    function: &'static str,
    values: HashMap<&'static str, Vec<Value>>,
}

impl Args {
    /// Name of the function being called
    pub fn function(&self) -> &'static str {
        self.function
    }

    /// Take every series passed for `name`, flattened in argument order
    pub fn series(&mut self, name: &str) -> Vec<TimeSeries> {
        self.values
            .remove(name)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|v| match v {
                Value::SeriesList(list) => list,
                _ => Vec::new(),
            })
            .collect()
    }

    /// Take the series lists passed for a variadic `name`, one per argument
    pub fn series_lists(&mut self, name: &str) -> Vec<Vec<TimeSeries>> {
        self.values
            .remove(name)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| match v {
                Value::SeriesList(list) => Some(list),
                _ => None,
            })
            .collect()
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.first(name) {
            Some(Value::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn numbers(&self, name: &str) -> Vec<f64> {
        self.values
            .get(name)
            .map(|vs| {
                vs.iter()
                    .filter_map(|v| match v {
                        Value::Number(n) => Some(*n),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A non-negative whole number
    pub fn count(&self, name: &str) -> QueryResult<Option<usize>> {
        match self.number(name) {
            None => Ok(None),
            Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(Some(n as usize)),
            Some(n) => Err(self.invalid(format!(
                "argument '{}' must be a non-negative integer, got {}",
                name,
                format_number(n)
            ))),
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.first(name) {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.first(name) {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.first(name)
    }

    /// Error about this call's arguments
    pub fn invalid(&self, message: impl Into<String>) -> QueryError {
        QueryError::invalid_args(self.function, message)
    }

    fn first(&self, name: &str) -> Option<&Value> {
        self.values.get(name).and_then(|vs| vs.first())
    }
}

/// Name → function table, populated once at startup
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<&'static str, Arc<FunctionSpec>>,
}

impl FunctionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every bundled function
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        combine::register(&mut registry);
        transform::register(&mut registry);
        filter::register(&mut registry);
        generate::register(&mut registry);
        registry
    }

    /// Add a function under its name and aliases; later entries replace earlier ones
    pub fn register(&mut self, spec: FunctionSpec) {
        let spec = Arc::new(spec);
        for alias in &spec.aliases {
            self.functions.insert(*alias, Arc::clone(&spec));
        }
        self.functions.insert(spec.name, spec);
    }

    /// Look a function up by name or alias
    pub fn get(&self, name: &str) -> QueryResult<&Arc<FunctionSpec>> {
        self.functions
            .get(name)
            .ok_or_else(|| QueryError::UnknownFunction(name.to_string()))
    }

    /// Registered names (including aliases), sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// `name(a,b,...)` over the sorted, de-duplicated path expressions of `series`
pub(crate) fn combined_name(function: &str, series: &[TimeSeries]) -> String {
    let mut exprs: Vec<&str> = series.iter().map(|s| s.path_expression.as_str()).collect();
    exprs.sort_unstable();
    exprs.dedup();
    format!("{}({})", function, exprs.join(","))
}
