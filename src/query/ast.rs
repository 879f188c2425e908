//! Target Expression Abstract Syntax Tree
//!
//! A target is a function-call DSL over dotted metric paths.
//!
//! # Example Targets
//!
//! ```text
//! hosts.web*.cpu
//! sumSeries(hosts.{web,db}1.cpu)
//! alias(scale(hosts.web1.cpu, 0.5), "half cpu")
//! movingAverage(hosts.web1.cpu, 5, xFilesFactor=0.5)
//! ```

use std::fmt;

/// A parsed target expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `name(arg, ..., key=value, ...)`
    Call {
        name: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    /// Glob pattern over dotted metric paths
    Path(String),
    /// Quoted string literal
    String(String),
    /// Numeric literal
    Number(f64),
    /// `true` / `false`
    Bool(bool),
}

impl Expr {
    /// Build a call node without keyword arguments
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            name: name.into(),
            args,
            kwargs: Vec::new(),
        }
    }

    /// Build a path node
    pub fn path(pattern: impl Into<String>) -> Self {
        Self::Path(pattern.into())
    }

    /// Whether this node evaluates without touching the store
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::String(_) | Self::Number(_) | Self::Bool(_))
    }

    /// Every path pattern referenced by this expression, left to right
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Path(p) => out.push(p),
            Self::Call { args, kwargs, .. } => {
                for arg in args {
                    arg.collect_paths(out);
                }
                for (_, arg) in kwargs {
                    arg.collect_paths(out);
                }
            }
            _ => {}
        }
    }
}

/// Render a number the way series names show it: integral values drop `.0`
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call { name, args, kwargs } => {
                write!(f, "{}(", name)?;
                let mut first = true;
                for arg in args {
                    if !first {
                        write!(f, ",")?;
                    }
                    first = false;
                    write!(f, "{}", arg)?;
                }
                for (key, arg) in kwargs {
                    if !first {
                        write!(f, ",")?;
                    }
                    first = false;
                    write!(f, "{}={}", key, arg)?;
                }
                write!(f, ")")
            }
            Self::Path(p) => write!(f, "{}", p),
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.5), "0.5");
    }

    #[test]
    fn test_display_round_trips_shape() {
        let expr = Expr::Call {
            name: "movingAverage".to_string(),
            args: vec![Expr::path("a.b"), Expr::Number(5.0)],
            kwargs: vec![("xFilesFactor".to_string(), Expr::Number(0.5))],
        };
        assert_eq!(expr.to_string(), "movingAverage(a.b,5,xFilesFactor=0.5)");
        assert_eq!(Expr::String("it's".to_string()).to_string(), "'it\\'s'");
    }

    #[test]
    fn test_paths() {
        let expr = Expr::call(
            "sumSeries",
            vec![
                Expr::path("a.*"),
                Expr::call("scale", vec![Expr::path("b.c"), Expr::Number(2.0)]),
            ],
        );
        assert_eq!(expr.paths(), vec!["a.*", "b.c"]);
        assert!(!expr.is_literal());
        assert!(Expr::Bool(true).is_literal());
    }
}
