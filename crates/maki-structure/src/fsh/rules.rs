//! Rules authored on profiles, extensions, logical models and resources
//!
//! Rules arrive already parsed, with rule sets inserted. The compiler
//! dispatches on the closed [`Rule`] enum.

use super::value::FshValue;
use crate::fhir::BindingStrength;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Cardinality(CardinalityRule),
    Flag(FlagRule),
    Binding(BindingRule),
    Type(TypeRule),
    Assignment(AssignmentRule),
    Contains(ContainsRule),
    CaretValue(CaretValueRule),
    Obeys(ObeysRule),
    AddElement(AddElementRule),
    Mapping(MappingRule),
}

impl Rule {
    /// Element path the rule targets (`.` or empty for the root)
    pub fn path(&self) -> &str {
        match self {
            Rule::Cardinality(r) => &r.path,
            Rule::Flag(r) => &r.path,
            Rule::Binding(r) => &r.path,
            Rule::Type(r) => &r.path,
            Rule::Assignment(r) => &r.path,
            Rule::Contains(r) => &r.path,
            Rule::CaretValue(r) => r.path.as_deref().unwrap_or(""),
            Rule::Obeys(r) => r.path.as_deref().unwrap_or(""),
            Rule::AddElement(r) => &r.path,
            Rule::Mapping(r) => r.path.as_deref().unwrap_or(""),
        }
    }

    pub fn rule_type(&self) -> &'static str {
        match self {
            Rule::Cardinality(_) => "CardinalityRule",
            Rule::Flag(_) => "FlagRule",
            Rule::Binding(_) => "BindingRule",
            Rule::Type(_) => "TypeRule",
            Rule::Assignment(_) => "AssignmentRule",
            Rule::Contains(_) => "ContainsRule",
            Rule::CaretValue(_) => "CaretValueRule",
            Rule::Obeys(_) => "ObeysRule",
            Rule::AddElement(_) => "AddElementRule",
            Rule::Mapping(_) => "MappingRule",
        }
    }
}

/// `* path min..max`
#[derive(Debug, Clone, PartialEq)]
pub struct CardinalityRule {
    pub path: String,
    pub min: Option<u32>,
    /// Can be "*"
    pub max: Option<String>,
}

impl CardinalityRule {
    pub fn new(path: impl Into<String>, min: Option<u32>, max: Option<&str>) -> Self {
        Self {
            path: path.into(),
            min,
            max: max.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    MustSupport, // MS
    Summary,     // SU
    Modifier,    // ?!
    TrialUse,    // TU
    Normative,   // N
    Draft,       // D
}

impl Flag {
    pub fn to_fsh(&self) -> &'static str {
        match self {
            Flag::MustSupport => "MS",
            Flag::Summary => "SU",
            Flag::Modifier => "?!",
            Flag::TrialUse => "TU",
            Flag::Normative => "N",
            Flag::Draft => "D",
        }
    }
}

/// `* path MS SU ?!`
///
/// Flags are tri-state so that an explicit `false` (from generated rules)
/// can be told apart from an absent flag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlagRule {
    pub path: String,
    pub must_support: Option<bool>,
    pub summary: Option<bool>,
    pub modifier: Option<bool>,
    pub trial_use: bool,
    pub normative: bool,
    pub draft: bool,
}

impl FlagRule {
    pub fn new(path: impl Into<String>, flags: &[Flag]) -> Self {
        let mut rule = Self {
            path: path.into(),
            ..Default::default()
        };
        for flag in flags {
            match flag {
                Flag::MustSupport => rule.must_support = Some(true),
                Flag::Summary => rule.summary = Some(true),
                Flag::Modifier => rule.modifier = Some(true),
                Flag::TrialUse => rule.trial_use = true,
                Flag::Normative => rule.normative = true,
                Flag::Draft => rule.draft = true,
            }
        }
        rule
    }
}

/// `* path from ValueSet (strength)`
#[derive(Debug, Clone, PartialEq)]
pub struct BindingRule {
    pub path: String,
    pub value_set: String,
    pub strength: BindingStrength,
}

impl BindingRule {
    pub fn new(
        path: impl Into<String>,
        value_set: impl Into<String>,
        strength: BindingStrength,
    ) -> Self {
        Self {
            path: path.into(),
            value_set: value_set.into(),
            strength,
        }
    }
}

/// How a type in an `only` list is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRefKind {
    Plain,
    /// `Reference(X)`
    Reference,
    /// `Canonical(X)`
    Canonical,
    /// `CodeableReference(X)`
    CodeableReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeReference {
    pub type_name: String,
    pub kind: TypeRefKind,
}

impl TypeReference {
    pub fn plain(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            kind: TypeRefKind::Plain,
        }
    }

    pub fn reference(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            kind: TypeRefKind::Reference,
        }
    }

    pub fn canonical(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            kind: TypeRefKind::Canonical,
        }
    }

    pub fn codeable_reference(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            kind: TypeRefKind::CodeableReference,
        }
    }

    /// Type code of the element type this reference constrains
    pub fn wrapper_code(&self) -> Option<&'static str> {
        match self.kind {
            TypeRefKind::Plain => None,
            TypeRefKind::Reference => Some("Reference"),
            TypeRefKind::Canonical => Some("canonical"),
            TypeRefKind::CodeableReference => Some("CodeableReference"),
        }
    }
}

impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeRefKind::Plain => f.write_str(&self.type_name),
            TypeRefKind::Reference => write!(f, "Reference({})", self.type_name),
            TypeRefKind::Canonical => write!(f, "Canonical({})", self.type_name),
            TypeRefKind::CodeableReference => {
                write!(f, "CodeableReference({})", self.type_name)
            }
        }
    }
}

/// `* path only A or Reference(B)`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRule {
    pub path: String,
    pub types: Vec<TypeReference>,
}

impl TypeRule {
    pub fn new(path: impl Into<String>, types: Vec<TypeReference>) -> Self {
        Self {
            path: path.into(),
            types,
        }
    }
}

/// `* path = value (exactly)`
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentRule {
    pub path: String,
    pub value: FshValue,
    /// true for `(exactly)`, producing fixed[x] instead of pattern[x]
    pub exactly: bool,
}

impl AssignmentRule {
    pub fn new(path: impl Into<String>, value: FshValue) -> Self {
        Self {
            path: path.into(),
            value,
            exactly: false,
        }
    }

    pub fn exactly(mut self) -> Self {
        self.exactly = true;
        self
    }
}

/// One `name` / `Type named name` entry of a contains rule
#[derive(Debug, Clone, PartialEq)]
pub struct ContainsItem {
    pub name: String,
    /// Extension name, id, URL or alias
    pub type_name: Option<String>,
    pub min: Option<u32>,
    pub max: Option<String>,
    pub flags: Vec<Flag>,
}

impl ContainsItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            min: None,
            max: None,
            flags: Vec::new(),
        }
    }

    pub fn named(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::new(name)
        }
    }

    pub fn card(mut self, min: u32, max: &str) -> Self {
        self.min = Some(min);
        self.max = Some(max.to_string());
        self
    }

    pub fn flags(mut self, flags: &[Flag]) -> Self {
        self.flags = flags.to_vec();
        self
    }
}

/// `* path contains a and B named b`
#[derive(Debug, Clone, PartialEq)]
pub struct ContainsRule {
    pub path: String,
    pub items: Vec<ContainsItem>,
}

impl ContainsRule {
    pub fn new(path: impl Into<String>, items: Vec<ContainsItem>) -> Self {
        Self {
            path: path.into(),
            items,
        }
    }
}

/// `* path ^caret.path = value`
#[derive(Debug, Clone, PartialEq)]
pub struct CaretValueRule {
    /// None addresses the StructureDefinition itself
    pub path: Option<String>,
    pub caret_path: String,
    pub value: FshValue,
}

impl CaretValueRule {
    pub fn on_definition(caret_path: impl Into<String>, value: FshValue) -> Self {
        Self {
            path: None,
            caret_path: caret_path.into(),
            value,
        }
    }

    pub fn on_element(
        path: impl Into<String>,
        caret_path: impl Into<String>,
        value: FshValue,
    ) -> Self {
        Self {
            path: Some(path.into()),
            caret_path: caret_path.into(),
            value,
        }
    }
}

/// `* path obeys inv-1`
#[derive(Debug, Clone, PartialEq)]
pub struct ObeysRule {
    /// None for definition-level obeys
    pub path: Option<String>,
    pub invariant: String,
}

impl ObeysRule {
    pub fn new(path: Option<&str>, invariant: impl Into<String>) -> Self {
        Self {
            path: path.map(str::to_string),
            invariant: invariant.into(),
        }
    }
}

/// `* path min..max Type "short" "definition"` (logical models and resources)
#[derive(Debug, Clone, PartialEq)]
pub struct AddElementRule {
    pub path: String,
    pub min: u32,
    pub max: String,
    pub types: Vec<TypeReference>,
    /// `contentReference #Path` instead of types
    pub content_reference: Option<String>,
    pub short: Option<String>,
    pub definition: Option<String>,
    pub flags: Vec<Flag>,
}

impl AddElementRule {
    pub fn new(path: impl Into<String>, min: u32, max: &str, short: &str) -> Self {
        Self {
            path: path.into(),
            min,
            max: max.to_string(),
            types: Vec::new(),
            content_reference: None,
            short: Some(short.to_string()),
            definition: None,
            flags: Vec::new(),
        }
    }

    pub fn typed(mut self, types: Vec<TypeReference>) -> Self {
        self.types = types;
        self
    }

    pub fn content_reference(mut self, target: impl Into<String>) -> Self {
        self.content_reference = Some(target.into());
        self
    }

    pub fn definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    pub fn flags(mut self, flags: &[Flag]) -> Self {
        self.flags = flags.to_vec();
        self
    }
}

/// `* path -> "map" "comment"` inside a Mapping applied to the definition
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRule {
    pub path: Option<String>,
    pub identity: String,
    pub map: String,
    pub comment: Option<String>,
    pub language: Option<String>,
    /// Target specification URI, written to StructureDefinition.mapping
    pub uri: Option<String>,
    pub name: Option<String>,
}

impl MappingRule {
    pub fn new(path: Option<&str>, identity: impl Into<String>, map: impl Into<String>) -> Self {
        Self {
            path: path.map(str::to_string),
            identity: identity.into(),
            map: map.into(),
            comment: None,
            language: None,
            uri: None,
            name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_rule_from_flags() {
        let rule = FlagRule::new("status", &[Flag::MustSupport, Flag::TrialUse]);
        assert_eq!(rule.must_support, Some(true));
        assert_eq!(rule.summary, None);
        assert!(rule.trial_use);
        assert!(!rule.draft);
    }

    #[test]
    fn test_rule_paths() {
        let caret = Rule::CaretValue(CaretValueRule::on_definition(
            "status",
            FshValue::String("active".into()),
        ));
        assert_eq!(caret.path(), "");
        let card = Rule::Cardinality(CardinalityRule::new("subject", Some(1), None));
        assert_eq!(card.path(), "subject");
        assert_eq!(card.rule_type(), "CardinalityRule");
    }

    #[test]
    fn test_type_reference_display() {
        assert_eq!(TypeReference::reference("Patient").to_string(), "Reference(Patient)");
        assert_eq!(TypeReference::plain("Quantity").to_string(), "Quantity");
        assert_eq!(
            TypeReference::canonical("Questionnaire").wrapper_code(),
            Some("canonical")
        );
    }
}
