//! Path Matcher
//!
//! Hierarchical glob matching for dotted metric names.
//!
//! # Syntax
//!
//! ```text
//! hosts.*.cpu          * matches any run of characters within a segment
//! hosts.worker?.cpu    ? matches exactly one character
//! hosts.worker[12].cpu character classes, ranges ([a-c]) and negation ([!a])
//! hosts.{web,db}.cpu   alternation
//! hosts.**.cpu         recursive descent (only when compiled recursive)
//! ```
//!
//! Matching is segment-count exact: `a.*` never matches `a.b.c`. The `**`
//! segment is an extension a finder opts into; in exact mode it behaves like
//! `*`.

use regex::Regex;

use crate::store::error::{StoreError, StoreResult};

/// Characters that make a segment a glob rather than a literal
const GLOB_CHARS: &[char] = &['*', '?', '[', '{'];

/// One compiled segment of a pattern
#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Glob(Regex),
    Recursive,
}

impl Segment {
    fn matches(&self, name: &str) -> bool {
        match self {
            Segment::Literal(lit) => lit == name,
            Segment::Glob(re) => re.is_match(name),
            Segment::Recursive => true,
        }
    }
}

/// A compiled dotted glob pattern
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: String,
    segments: Vec<Segment>,
    recursive: bool,
}

impl PathMatcher {
    /// Compile a pattern with exact-arity semantics
    pub fn compile(pattern: &str) -> StoreResult<Self> {
        Self::build(pattern, false)
    }

    /// Compile a pattern where a `**` segment spans zero or more segments
    pub fn compile_recursive(pattern: &str) -> StoreResult<Self> {
        Self::build(pattern, true)
    }

    fn build(pattern: &str, recursive: bool) -> StoreResult<Self> {
        let segments = split_segments(pattern)?
            .into_iter()
            .map(|seg| {
                if recursive && seg == "**" {
                    Ok(Segment::Recursive)
                } else if seg.contains(GLOB_CHARS) {
                    compile_segment(seg).map(Segment::Glob)
                } else {
                    Ok(Segment::Literal(seg.to_string()))
                }
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
            recursive,
        })
    }

    /// The source pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Number of dotted segments in the pattern
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Whether the pattern uses recursive descent
    pub fn has_recursive(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Recursive))
    }

    /// Whether the pattern contains no glob characters at all
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Match a single segment name against segment `index`
    ///
    /// Tree-walking finders use this to prune directories level by level.
    pub fn segment_matches(&self, index: usize, name: &str) -> bool {
        self.segments
            .get(index)
            .map(|s| s.matches(name))
            .unwrap_or(false)
    }

    /// Whether a full dotted name matches
    pub fn matches(&self, name: &str) -> bool {
        let parts: Vec<&str> = name.split('.').collect();
        if self.recursive {
            match_recursive(&self.segments, &parts)
        } else {
            parts.len() == self.segments.len()
                && self
                    .segments
                    .iter()
                    .zip(&parts)
                    .all(|(seg, part)| seg.matches(part))
        }
    }

    /// Whether a dotted name could be a prefix of a matching name
    ///
    /// Used to decide which branches are worth descending into.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        let parts: Vec<&str> = prefix.split('.').collect();
        let mut seg_idx = 0;
        for part in &parts {
            match self.segments.get(seg_idx) {
                Some(Segment::Recursive) => return true,
                Some(seg) if seg.matches(part) => seg_idx += 1,
                _ => return false,
            }
        }
        true
    }
}

/// One-shot convenience: compile `pattern` and match `name`
pub fn matches(pattern: &str, name: &str) -> bool {
    PathMatcher::compile(pattern)
        .map(|m| m.matches(name))
        .unwrap_or(false)
}

fn match_recursive(segments: &[Segment], parts: &[&str]) -> bool {
    match segments.split_first() {
        None => parts.is_empty(),
        Some((Segment::Recursive, rest)) => {
            (0..=parts.len()).any(|skip| match_recursive(rest, &parts[skip..]))
        }
        Some((seg, rest)) => match parts.split_first() {
            Some((part, remaining)) => seg.matches(part) && match_recursive(rest, remaining),
            None => false,
        },
    }
}

/// Split on dots that are not inside braces or brackets
fn split_segments(pattern: &str) -> StoreResult<Vec<&str>> {
    let mut segments = Vec::new();
    let mut depth_brace = 0usize;
    let mut in_class = false;
    let mut start = 0;

    for (i, c) in pattern.char_indices() {
        match c {
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '{' if !in_class => depth_brace += 1,
            '}' if !in_class => {
                depth_brace = depth_brace.checked_sub(1).ok_or_else(|| {
                    StoreError::InvalidPattern(format!("unbalanced '}}' in {}", pattern))
                })?
            }
            '.' if !in_class && depth_brace == 0 => {
                segments.push(&pattern[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if in_class || depth_brace != 0 {
        return Err(StoreError::InvalidPattern(format!(
            "unterminated glob in {}",
            pattern
        )));
    }

    segments.push(&pattern[start..]);
    Ok(segments)
}

fn compile_segment(segment: &str) -> StoreResult<Regex> {
    let body = glob_to_regex(segment)?;
    Regex::new(&format!("^(?:{})$", body))
        .map_err(|e| StoreError::InvalidPattern(format!("{}: {}", segment, e)))
}

/// Translate one segment's glob syntax into regex syntax
fn glob_to_regex(glob: &str) -> StoreResult<String> {
    let mut out = String::with_capacity(glob.len() * 2);
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str("[^.]*"),
            '?' => out.push_str("[^.]"),
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!') | Some('^')) {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                for cc in chars.by_ref() {
                    if cc == ']' {
                        closed = true;
                        break;
                    }
                    if cc == '\\' || cc == '[' {
                        out.push('\\');
                    }
                    out.push(cc);
                }
                if !closed {
                    return Err(StoreError::InvalidPattern(format!(
                        "unterminated character class in {}",
                        glob
                    )));
                }
                out.push(']');
            }
            '{' => {
                let mut inner = String::new();
                let mut closed = false;
                for cc in chars.by_ref() {
                    if cc == '}' {
                        closed = true;
                        break;
                    }
                    inner.push(cc);
                }
                if !closed {
                    return Err(StoreError::InvalidPattern(format!(
                        "unterminated alternation in {}",
                        glob
                    )));
                }
                let alternatives = inner
                    .split(',')
                    .map(glob_to_regex)
                    .collect::<StoreResult<Vec<_>>>()?;
                out.push_str("(?:");
                out.push_str(&alternatives.join("|"));
                out.push(')');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let m = PathMatcher::compile("hosts.worker1.cpu").unwrap();
        assert!(m.is_literal());
        assert!(m.matches("hosts.worker1.cpu"));
        assert!(!m.matches("hosts.worker2.cpu"));
    }

    #[test]
    fn test_wildcards_are_segment_bound() {
        assert!(matches("hosts.*.cpu", "hosts.worker1.cpu"));
        assert!(!matches("hosts.*", "hosts.worker1.cpu"));
        assert!(!matches("hosts.*.cpu", "hosts.a.b.cpu"));
        assert!(matches("hosts.worker?.cpu", "hosts.worker7.cpu"));
        assert!(!matches("hosts.worker?.cpu", "hosts.worker10.cpu"));
    }

    #[test]
    fn test_character_classes() {
        assert!(matches("host[12]", "host1"));
        assert!(!matches("host[12]", "host3"));
        assert!(matches("host[a-c]", "hostb"));
        assert!(matches("host[!a-c]", "hostz"));
        assert!(!matches("host[!a-c]", "hosta"));
    }

    #[test]
    fn test_alternation() {
        assert!(matches("hosts.{web,db}.cpu", "hosts.web.cpu"));
        assert!(matches("hosts.{web,db}.cpu", "hosts.db.cpu"));
        assert!(!matches("hosts.{web,db}.cpu", "hosts.cache.cpu"));
        assert!(matches("hosts.{web*,db}.cpu", "hosts.web01.cpu"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(matches("a+b.c", "a+b.c"));
        assert!(!matches("a+b.c", "aab.c"));
    }

    #[test]
    fn test_recursive_only_when_requested() {
        let exact = PathMatcher::compile("a.**.z").unwrap();
        assert!(exact.matches("a.b.z"));
        assert!(!exact.matches("a.b.c.z"));

        let recursive = PathMatcher::compile_recursive("a.**.z").unwrap();
        assert!(recursive.has_recursive());
        assert!(recursive.matches("a.z"));
        assert!(recursive.matches("a.b.z"));
        assert!(recursive.matches("a.b.c.z"));
        assert!(!recursive.matches("a.b.c"));
    }

    #[test]
    fn test_prefix_matching() {
        let m = PathMatcher::compile("hosts.*.cpu").unwrap();
        assert!(m.matches_prefix("hosts"));
        assert!(m.matches_prefix("hosts.worker1"));
        assert!(!m.matches_prefix("other"));
        assert!(m.segment_matches(1, "anything"));
        assert!(!m.segment_matches(3, "cpu"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PathMatcher::compile("a.[bc").is_err());
        assert!(PathMatcher::compile("a.{b,c").is_err());
        assert!(PathMatcher::compile("a.b}").is_err());
        assert!(!matches("a.[bc", "a.b"));
    }
}
