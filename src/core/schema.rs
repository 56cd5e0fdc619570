//! Purpose: Declarative field-level validation for untrusted JSON input.
//! Exports: `Schema`, `Field`, `FieldKind`, `Constraint`, `Issue`.
//! Role: Shared contract applied at every mutating API boundary.
//! Invariants: All violations are collected in one pass; no short-circuit.
//! Invariants: A failed validation never returns an empty issue list.
//! Invariants: A successful value carries exactly the declared fields,
//! with defaults substituted for omitted fields that declare one.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One field-level violation, identified by field path and reason.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
}

#[derive(Clone, Debug)]
pub enum Constraint {
    MinLen(usize),
    MaxLen(usize),
    Pattern(Regex),
    OneOf(&'static [&'static str]),
    Uuid,
    Range(i64, i64),
}

#[derive(Clone, Debug)]
pub struct Field {
    name: &'static str,
    kind: FieldKind,
    required: bool,
    default: Option<Value>,
    constraints: Vec<Constraint>,
}

impl Field {
    pub fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
            constraints: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Marks the field optional with a substitute value for omitted input.
    pub fn with_default(mut self, value: Value) -> Self {
        self.required = false;
        self.default = Some(value);
        self
    }

    pub fn min_len(mut self, len: usize) -> Self {
        self.constraints.push(Constraint::MinLen(len));
        self
    }

    pub fn max_len(mut self, len: usize) -> Self {
        self.constraints.push(Constraint::MaxLen(len));
        self
    }

    /// Panics on an invalid pattern; schemas are static configuration.
    pub fn pattern(mut self, pattern: &str) -> Self {
        let regex = Regex::new(pattern).expect("valid field pattern");
        self.constraints.push(Constraint::Pattern(regex));
        self
    }

    pub fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.constraints.push(Constraint::OneOf(values));
        self
    }

    pub fn uuid(mut self) -> Self {
        self.constraints.push(Constraint::Uuid);
        self
    }

    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.constraints.push(Constraint::Range(min, max));
        self
    }
}

/// Fixed field set for one mutating resource; immutable configuration.
#[derive(Clone, Debug)]
pub struct Schema {
    resource: &'static str,
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(resource: &'static str, fields: Vec<Field>) -> Self {
        Self { resource, fields }
    }

    pub fn resource(&self) -> &'static str {
        self.resource
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Validates untrusted input, collecting every violation in one pass.
    ///
    /// On success the returned map contains exactly the declared fields;
    /// unknown input keys are dropped.
    pub fn validate(&self, input: &Value) -> Result<Map<String, Value>, Vec<Issue>> {
        let Some(object) = input.as_object() else {
            return Err(vec![Issue::new("", "expected a JSON object")]);
        };

        let mut output = Map::new();
        let mut issues = Vec::new();

        for field in &self.fields {
            match object.get(field.name) {
                Some(Value::Null) | None => {
                    if let Some(default) = &field.default {
                        output.insert(field.name.to_string(), default.clone());
                    } else if field.required {
                        issues.push(Issue::new(field.name, "is required"));
                    }
                }
                Some(value) => {
                    check_field(field, value, &mut issues);
                    output.insert(field.name.to_string(), value.clone());
                }
            }
        }

        if issues.is_empty() {
            Ok(output)
        } else {
            Err(issues)
        }
    }
}

fn check_field(field: &Field, value: &Value, issues: &mut Vec<Issue>) {
    match field.kind {
        FieldKind::Text => {
            let Some(text) = value.as_str() else {
                issues.push(Issue::new(field.name, "must be a string"));
                return;
            };
            for constraint in &field.constraints {
                check_text(field.name, text, constraint, issues);
            }
        }
        FieldKind::Integer => {
            let Some(number) = value.as_i64() else {
                issues.push(Issue::new(field.name, "must be an integer"));
                return;
            };
            for constraint in &field.constraints {
                if let Constraint::Range(min, max) = constraint {
                    if !(*min..=*max).contains(&number) {
                        issues.push(Issue::new(
                            field.name,
                            format!("must be between {min} and {max}"),
                        ));
                    }
                }
            }
        }
        FieldKind::Boolean => {
            if !value.is_boolean() {
                issues.push(Issue::new(field.name, "must be a boolean"));
            }
        }
    }
}

fn check_text(name: &'static str, text: &str, constraint: &Constraint, issues: &mut Vec<Issue>) {
    match constraint {
        Constraint::MinLen(min) => {
            if text.chars().count() < *min {
                issues.push(Issue::new(
                    name,
                    format!("must be at least {min} characters"),
                ));
            }
        }
        Constraint::MaxLen(max) => {
            if text.chars().count() > *max {
                issues.push(Issue::new(name, format!("must be at most {max} characters")));
            }
        }
        Constraint::Pattern(regex) => {
            if !regex.is_match(text) {
                issues.push(Issue::new(name, format!("must match {}", regex.as_str())));
            }
        }
        Constraint::OneOf(values) => {
            if !values.contains(&text) {
                issues.push(Issue::new(
                    name,
                    format!("must be one of: {}", values.join(", ")),
                ));
            }
        }
        Constraint::Uuid => {
            if Uuid::parse_str(text).is_err() {
                issues.push(Issue::new(name, "must be a valid UUID"));
            }
        }
        Constraint::Range(_, _) => {}
    }
}
