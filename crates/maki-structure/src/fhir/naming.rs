//! FHIR id and name grammar checks

use regex::Regex;
use std::sync::LazyLock;

static ID_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-.]{1,64}$").unwrap());

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]([A-Za-z0-9_]){0,254}$").unwrap());

// Element names: no whitespace and none of the reserved punctuation
static ELEMENT_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[^\s.,:;'"/|?!@#$%&*()\[\]{}]{1,64}$"#).unwrap());

static SIMPLE_ELEMENT_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").unwrap());

pub const MAX_ID_LENGTH: usize = 64;

pub fn is_valid_id(id: &str) -> bool {
    ID_REGEX.is_match(id)
}

pub fn is_valid_name(name: &str) -> bool {
    NAME_REGEX.is_match(name)
}

/// Turn an arbitrary entity name into a valid FHIR id
///
/// Disallowed characters become `-` and the result is cut to 64 characters.
pub fn machine_id(name: &str) -> String {
    let mut id: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    id.truncate(MAX_ID_LENGTH);
    id
}

/// Outcome of checking a new element name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementNameCheck {
    Valid,
    /// Legal, but not a simple alphanumeric name
    Unconventional(String),
    Invalid(String),
}

/// Validate the final segment of an element path (a trailing `[x]` is allowed)
pub fn check_element_name(name: &str) -> ElementNameCheck {
    let bare = name.strip_suffix("[x]").unwrap_or(name);
    if bare.is_empty() {
        return ElementNameCheck::Invalid("element names cannot be empty".into());
    }
    if !ELEMENT_NAME_REGEX.is_match(bare) {
        return ElementNameCheck::Invalid(
            "element names must be at most 64 characters and cannot contain whitespace or any of .,:;'\"/|?!@#$%&*()[]{}"
                .into(),
        );
    }
    if !SIMPLE_ELEMENT_NAME_REGEX.is_match(bare) {
        return ElementNameCheck::Unconventional(
            "element names should start with a letter and contain only letters and digits".into(),
        );
    }
    ElementNameCheck::Valid
}
