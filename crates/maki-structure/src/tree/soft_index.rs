//! Soft index resolution for caret paths
//!
//! `[+]` advances to the next index of an array and `[=]` repeats the last
//! one. Indices are tracked per array path (with earlier indices already
//! resolved), so `contact[+].telecom[+]` and `contact[=].telecom[+]` address
//! `contact[0].telecom[0]` and `contact[0].telecom[1]`.

use super::path::{Bracket, PathSegment, SoftIndexOp};
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct SoftIndexCursor {
    last: HashMap<String, usize>,
}

impl SoftIndexCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace soft indices in `segments` with concrete ones
    ///
    /// `scope` distinguishes arrays on different targets (e.g. two elements
    /// both using `^extension[+]`).
    pub fn resolve(&mut self, scope: &str, segments: &mut [PathSegment]) -> Result<(), String> {
        let mut prefix = scope.to_string();
        for segment in segments.iter_mut() {
            prefix.push('.');
            prefix.push_str(&segment.base);
            for bracket in segment.brackets.iter_mut() {
                let index = match bracket {
                    Bracket::Soft(SoftIndexOp::Increment) => {
                        self.last.get(&prefix).map(|last| last + 1).unwrap_or(0)
                    }
                    Bracket::Soft(SoftIndexOp::Repeat) => match self.last.get(&prefix) {
                        Some(last) => *last,
                        None => {
                            return Err(format!(
                                "[=] used on {} before any [+] or numeric index",
                                segment.base
                            ));
                        }
                    },
                    Bracket::Index(index) => *index,
                    Bracket::Slice(name) => {
                        prefix.push('[');
                        prefix.push_str(name);
                        prefix.push(']');
                        continue;
                    }
                };
                let entry = self.last.entry(prefix.clone()).or_insert(index);
                if index > *entry || matches!(bracket, Bracket::Soft(_)) {
                    *entry = index;
                }
                *bracket = Bracket::Index(index);
                prefix.push_str(&format!("[{index}]"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::path::{join_path, parse_path};

    fn resolve(cursor: &mut SoftIndexCursor, path: &str) -> String {
        let mut segments = parse_path(path).unwrap();
        cursor.resolve("sd", &mut segments).unwrap();
        join_path(&segments)
    }

    #[test]
    fn test_increment_and_repeat() {
        let mut cursor = SoftIndexCursor::new();
        assert_eq!(resolve(&mut cursor, "contact[+].name"), "contact[0].name");
        assert_eq!(resolve(&mut cursor, "contact[=].telecom[+].value"), "contact[0].telecom[0].value");
        assert_eq!(resolve(&mut cursor, "contact[=].telecom[+].value"), "contact[0].telecom[1].value");
        assert_eq!(resolve(&mut cursor, "contact[+].name"), "contact[1].name");
        assert_eq!(resolve(&mut cursor, "contact[=].telecom[+].value"), "contact[1].telecom[0].value");
    }

    #[test]
    fn test_numeric_index_advances_cursor() {
        let mut cursor = SoftIndexCursor::new();
        assert_eq!(resolve(&mut cursor, "keyword[2].code"), "keyword[2].code");
        assert_eq!(resolve(&mut cursor, "keyword[+].code"), "keyword[3].code");
    }

    #[test]
    fn test_repeat_without_history_fails() {
        let mut cursor = SoftIndexCursor::new();
        let mut segments = parse_path("contact[=].name").unwrap();
        assert!(cursor.resolve("sd", &mut segments).is_err());
    }
}
