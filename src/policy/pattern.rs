// ABOUTME: Resource glob patterns with segment wildcards, recursive wildcards and alternation
// ABOUTME: Compiled once at policy load, matched per evaluation without allocation-heavy regexes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Resource patterns
//!
//! Resources are `/`-separated paths. Pattern syntax:
//!
//! - `projects` matches that exact segment
//! - `*` matches within one segment (`*` alone is any single segment, `*.txt` a suffix)
//! - `**` as a whole segment matches zero or more segments
//! - `{a,b}` matches any listed alternative within a segment

use qtoken_core::errors::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Star,
    Alternation(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Parts(Vec<Part>),
    Recursive,
}

/// Compiled resource pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePattern {
    source: String,
    segments: Vec<Segment>,
}

/// Split a resource path into segments, ignoring empty ones
pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl ResourcePattern {
    /// Compile a pattern
    ///
    /// # Errors
    ///
    /// Returns `policy-invalid` for empty patterns, unbalanced braces or empty
    /// alternatives
    pub fn compile(pattern: &str) -> AppResult<Self> {
        let segments = path_segments(pattern)
            .map(compile_segment)
            .collect::<AppResult<Vec<_>>>()?;
        if segments.is_empty() {
            return Err(AppError::policy_invalid(format!(
                "resource pattern '{pattern}' is empty"
            )));
        }
        Ok(Self {
            source: pattern.to_owned(),
            segments,
        })
    }

    /// Pattern text as written
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `resource` matches
    #[must_use]
    pub fn matches(&self, resource: &str) -> bool {
        let path: Vec<&str> = path_segments(resource).collect();
        let (pattern_len, path_len) = (self.segments.len(), path.len());

        // reachable[j]: pattern prefix consumed so far can end at path position j
        let mut reachable = vec![false; path_len + 1];
        reachable[0] = true;
        for segment in &self.segments {
            let mut next = vec![false; path_len + 1];
            match segment {
                Segment::Recursive => {
                    let mut seen = false;
                    for j in 0..=path_len {
                        seen |= reachable[j];
                        next[j] = seen;
                    }
                }
                Segment::Parts(parts) => {
                    for j in 0..path_len {
                        if reachable[j] && match_parts(parts, path[j]) {
                            next[j + 1] = true;
                        }
                    }
                }
            }
            reachable = next;
        }
        pattern_len > 0 && reachable[path_len]
    }
}

fn compile_segment(segment: &str) -> AppResult<Segment> {
    if segment == "**" {
        return Ok(Segment::Recursive);
    }
    if segment.contains("**") {
        return Err(AppError::policy_invalid(format!(
            "'**' must be a whole segment in '{segment}'"
        )));
    }

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                flush_literal(&mut literal, &mut parts);
                parts.push(Part::Star);
            }
            '{' => {
                flush_literal(&mut literal, &mut parts);
                let mut body = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' | '*' => {
                            return Err(AppError::policy_invalid(format!(
                                "nested pattern inside alternation in '{segment}'"
                            )))
                        }
                        other => body.push(other),
                    }
                }
                let options: Vec<String> = body.split(',').map(str::to_owned).collect();
                if !closed || options.iter().any(String::is_empty) {
                    return Err(AppError::policy_invalid(format!(
                        "malformed alternation in '{segment}'"
                    )));
                }
                parts.push(Part::Alternation(options));
            }
            '}' => {
                return Err(AppError::policy_invalid(format!(
                    "unbalanced '}}' in '{segment}'"
                )))
            }
            other => literal.push(other),
        }
    }
    flush_literal(&mut literal, &mut parts);
    Ok(Segment::Parts(parts))
}

fn flush_literal(literal: &mut String, parts: &mut Vec<Part>) {
    if !literal.is_empty() {
        parts.push(Part::Literal(std::mem::take(literal)));
    }
}

fn match_parts(parts: &[Part], text: &str) -> bool {
    match parts.split_first() {
        None => text.is_empty(),
        Some((Part::Literal(literal), rest)) => text
            .strip_prefix(literal.as_str())
            .is_some_and(|remaining| match_parts(rest, remaining)),
        Some((Part::Alternation(options), rest)) => options.iter().any(|option| {
            text.strip_prefix(option.as_str())
                .is_some_and(|remaining| match_parts(rest, remaining))
        }),
        Some((Part::Star, rest)) => text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .any(|split| match_parts(rest, &text[split..])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, resource: &str) -> bool {
        ResourcePattern::compile(pattern).unwrap().matches(resource)
    }

    #[test]
    fn test_recursive_wildcard() {
        assert!(matches("data/**", "data/a/b/c.txt"));
        assert!(matches("data/**", "data"));
        assert!(!matches("data/**", "other/a.txt"));
        assert!(matches("**/secret", "a/b/secret"));
        assert!(matches("a/**/z", "a/z"));
        assert!(!matches("a/**/z", "a/b/y"));
    }

    #[test]
    fn test_single_segment_wildcard() {
        assert!(matches("projects/*", "projects/alpha"));
        assert!(!matches("projects/*", "projects/alpha/files"));
        assert!(!matches("projects/*", "projects"));
        assert!(matches("logs/*.txt", "logs/app.txt"));
        assert!(!matches("logs/*.txt", "logs/app.csv"));
    }

    #[test]
    fn test_alternation() {
        assert!(matches("reports/{q1,q2}", "reports/q2"));
        assert!(!matches("reports/{q1,q2}", "reports/q3"));
        assert!(matches("export.{pdf,csv}", "export.csv"));
        assert!(matches("/projects/secret/", "projects/secret"));
    }

    #[test]
    fn test_invalid_patterns() {
        for bad in ["", "/", "a/{b", "a/b}", "a/{x,}", "a/x**"] {
            assert!(ResourcePattern::compile(bad).is_err(), "{bad}");
        }
    }
}
