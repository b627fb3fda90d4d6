//! Values on the right-hand side of assignment and caret rules

use std::fmt;

/// A FSH value
#[derive(Debug, Clone, PartialEq)]
pub enum FshValue {
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    /// `system#code "display"`
    Code(FshCode),
    /// `5.4 'mg'`
    Quantity(FshQuantity),
    /// `Reference(name)`
    Reference(FshReference),
    /// `Canonical(name|version)`
    Canonical(FshCanonical),
    /// Bare name of an instance in the same project
    Instance(String),
}

/// FSH Code: `#code` or `system#code`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FshCode {
    /// System URL, alias or code system name
    pub system: Option<String>,
    pub code: String,
    pub display: Option<String>,
    pub version: Option<String>,
}

impl FshCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn with_system(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Parse `system#code` / `#code` notation
    pub fn parse(text: &str) -> Option<Self> {
        let (system, code) = text.split_once('#')?;
        if code.is_empty() {
            return None;
        }
        let code = code.trim_matches('"');
        Some(Self {
            system: (!system.is_empty()).then(|| system.to_string()),
            code: code.to_string(),
            ..Default::default()
        })
    }
}

impl fmt::Display for FshCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(system) = &self.system {
            write!(f, "{system}")?;
        }
        write!(f, "#{}", self.code)?;
        if let Some(display) = &self.display {
            write!(f, " \"{display}\"")?;
        }
        Ok(())
    }
}

/// FSH Quantity: value with a UCUM unit or coded unit
#[derive(Debug, Clone, PartialEq)]
pub struct FshQuantity {
    pub value: Option<f64>,
    pub unit: Option<FshCode>,
}

impl fmt::Display for FshQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(value) = self.value {
            write!(f, "{value}")?;
        }
        if let Some(unit) = &self.unit {
            if self.value.is_some() {
                f.write_str(" ")?;
            }
            write!(f, "'{}'", unit.code)?;
        }
        Ok(())
    }
}

/// FSH Reference: `Reference(target)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FshReference {
    pub target: String,
    pub display: Option<String>,
}

impl FshReference {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            display: None,
        }
    }
}

/// FSH Canonical: `Canonical(entity|version)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FshCanonical {
    pub entity: String,
    pub version: Option<String>,
}

impl FshCanonical {
    pub fn new(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        match entity.split_once('|') {
            Some((name, version)) => Self {
                entity: name.to_string(),
                version: Some(version.to_string()),
            },
            None => Self {
                entity,
                version: None,
            },
        }
    }
}

impl FshValue {
    /// Short label for the value's kind, used in messages
    pub fn kind(&self) -> &'static str {
        match self {
            FshValue::Boolean(_) => "boolean",
            FshValue::Integer(_) => "integer",
            FshValue::Decimal(_) => "decimal",
            FshValue::String(_) => "string",
            FshValue::Code(_) => "code",
            FshValue::Quantity(_) => "Quantity",
            FshValue::Reference(_) => "Reference",
            FshValue::Canonical(_) => "canonical",
            FshValue::Instance(_) => "instance",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FshValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FshValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FshValue::Boolean(b) => write!(f, "{b}"),
            FshValue::Integer(i) => write!(f, "{i}"),
            FshValue::Decimal(d) => write!(f, "{d}"),
            FshValue::String(s) => write!(f, "\"{s}\""),
            FshValue::Code(code) => write!(f, "{code}"),
            FshValue::Quantity(q) => write!(f, "{q}"),
            FshValue::Reference(r) => write!(f, "Reference({})", r.target),
            FshValue::Canonical(c) => match &c.version {
                Some(v) => write!(f, "Canonical({}|{v})", c.entity),
                None => write!(f, "Canonical({})", c.entity),
            },
            FshValue::Instance(name) => f.write_str(name),
        }
    }
}
