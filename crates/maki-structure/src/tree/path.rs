//! FSH path parsing
//!
//! Supports:
//! - simple paths: `name.given`
//! - slices and reslices: `component[systolic].code`, `identifier[mrn][sub]`
//! - extension slices by URL: `extension[http://example.org/ext].value[x]`
//! - choice elements: `value[x]`
//! - numeric and soft indices: `contact[0]`, `contact[+]`, `contact[=]`

use std::fmt;
use thiserror::Error;

/// A single segment of a FSH path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// Element name; choice elements keep their `[x]` suffix
    pub base: String,
    pub brackets: Vec<Bracket>,
}

/// Bracket types in FSH paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bracket {
    /// Slice name (or extension URL/name) `[sliceName]`
    Slice(String),
    /// Array index `[0]`
    Index(usize),
    /// Soft indexing `[+]` or `[=]`
    Soft(SoftIndexOp),
}

/// Soft indexing operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoftIndexOp {
    /// `[+]` - next array index
    Increment,
    /// `[=]` - repeat last array index
    Repeat,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Invalid path syntax: {0}")]
    InvalidSyntax(String),
}

impl PathSegment {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            brackets: Vec::new(),
        }
    }

    /// Slice names in order, e.g. `["mrn", "sub"]` for `identifier[mrn][sub]`
    pub fn slice_names(&self) -> impl Iterator<Item = &str> {
        self.brackets.iter().filter_map(|b| match b {
            Bracket::Slice(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)?;
        for bracket in &self.brackets {
            match bracket {
                Bracket::Slice(name) => write!(f, "[{name}]")?,
                Bracket::Index(i) => write!(f, "[{i}]")?,
                Bracket::Soft(SoftIndexOp::Increment) => f.write_str("[+]")?,
                Bracket::Soft(SoftIndexOp::Repeat) => f.write_str("[=]")?,
            }
        }
        Ok(())
    }
}

fn parse_bracket(content: &str) -> Bracket {
    match content {
        "+" => Bracket::Soft(SoftIndexOp::Increment),
        "=" => Bracket::Soft(SoftIndexOp::Repeat),
        _ => match content.parse::<usize>() {
            Ok(index) => Bracket::Index(index),
            Err(_) => Bracket::Slice(content.to_string()),
        },
    }
}

/// Split a FSH path into segments
///
/// Dots inside brackets (URLs) do not split segments. An empty path or `.`
/// yields no segments and addresses the root element.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, PathError> {
    let path = path.trim();
    if path.is_empty() || path == "." {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut current: Option<PathSegment> = None;
    let mut name = String::new();
    let mut bracket = String::new();
    let mut depth = 0usize;

    for ch in path.chars() {
        match ch {
            '[' if depth == 0 => {
                depth = 1;
                bracket.clear();
            }
            '[' => {
                depth += 1;
                bracket.push(ch);
            }
            ']' if depth == 1 => {
                depth = 0;
                let segment = current.get_or_insert_with(|| PathSegment::new(name.clone()));
                if bracket == "x" && segment.brackets.is_empty() {
                    segment.base.push_str("[x]");
                } else {
                    segment.brackets.push(parse_bracket(&bracket));
                }
            }
            ']' if depth > 1 => {
                depth -= 1;
                bracket.push(ch);
            }
            ']' => {
                return Err(PathError::InvalidSyntax(format!(
                    "unbalanced ']' in {path}"
                )));
            }
            '.' if depth == 0 => {
                let segment = current.take().unwrap_or_else(|| PathSegment::new(name.clone()));
                if segment.base.is_empty() {
                    return Err(PathError::InvalidSyntax(format!("empty segment in {path}")));
                }
                segments.push(segment);
                name.clear();
            }
            _ if depth > 0 => bracket.push(ch),
            _ => {
                if current.is_some() {
                    return Err(PathError::InvalidSyntax(format!(
                        "unexpected '{ch}' after ']' in {path}"
                    )));
                }
                name.push(ch);
            }
        }
    }

    if depth != 0 {
        return Err(PathError::InvalidSyntax(format!("unclosed '[' in {path}")));
    }
    let last = current.unwrap_or_else(|| PathSegment::new(name));
    if last.base.is_empty() {
        return Err(PathError::InvalidSyntax(format!("empty segment in {path}")));
    }
    segments.push(last);
    Ok(segments)
}

/// Render segments back into a FSH path
pub fn join_path(segments: &[PathSegment]) -> String {
    segments
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_path() {
        let segments = parse_path("name.given").unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], PathSegment::new("name"));
        assert_eq!(segments[1].base, "given");
    }

    #[test]
    fn test_choice_and_slice() {
        let segments = parse_path("component[systolic].value[x]").unwrap();
        assert_eq!(segments[0].base, "component");
        assert_eq!(segments[0].brackets, vec![Bracket::Slice("systolic".into())]);
        assert_eq!(segments[1].base, "value[x]");
        assert!(segments[1].brackets.is_empty());
    }

    #[test]
    fn test_url_slice_keeps_dots() {
        let segments =
            parse_path("extension[http://hl7.org/fhir/StructureDefinition/patient-birthPlace].value[x]")
                .unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(
            segments[0].slice_names().collect::<Vec<_>>(),
            vec!["http://hl7.org/fhir/StructureDefinition/patient-birthPlace"]
        );
    }

    #[test]
    fn test_reslice_and_indices() {
        let segments = parse_path("identifier[mrn][sub]").unwrap();
        assert_eq!(segments[0].slice_names().collect::<Vec<_>>(), vec!["mrn", "sub"]);

        let segments = parse_path("contact[+].telecom[=].value").unwrap();
        assert_eq!(
            segments[0].brackets,
            vec![Bracket::Soft(SoftIndexOp::Increment)]
        );
        assert_eq!(segments[1].brackets, vec![Bracket::Soft(SoftIndexOp::Repeat)]);

        let segments = parse_path("name[0].given[1]").unwrap();
        assert_eq!(segments[0].brackets, vec![Bracket::Index(0)]);
        assert_eq!(join_path(&segments), "name[0].given[1]");
    }

    #[test]
    fn test_root_and_invalid_paths() {
        assert!(parse_path(".").unwrap().is_empty());
        assert!(parse_path("").unwrap().is_empty());
        assert!(parse_path("name..given").is_err());
        assert!(parse_path("name[0").is_err());
        assert!(parse_path("name]").is_err());
    }
}
