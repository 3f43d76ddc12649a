//! Field-path validation errors
//!
//! Errors render the way the Kubernetes API server renders them, e.g.
//! `spec.listeners[0].port: Invalid value: -1: must be between 1 and 65535, inclusive`,
//! so messages surfaced as events read the same as admission errors.

use std::fmt;

use thiserror::Error;

/// Dotted path to a field inside an object, e.g. `spec.rules[1].host`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(root: &str) -> Self {
        Self(root.to_string())
    }

    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}.{}", self.0, name))
    }

    pub fn index(&self, i: usize) -> Self {
        Self(format!("{}[{}]", self.0, i))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The offending value attached to an error
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{:?}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i64::from(i))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldErrorKind {
    Required,
    Invalid(FieldValue),
    Duplicate(FieldValue),
    NotFound(FieldValue),
    Forbidden,
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldErrorKind::Required => f.write_str("Required value"),
            FieldErrorKind::Invalid(v) => write!(f, "Invalid value: {}", v),
            FieldErrorKind::Duplicate(v) => write!(f, "Duplicate value: {}", v),
            FieldErrorKind::NotFound(v) => write!(f, "Not found: {}", v),
            FieldErrorKind::Forbidden => f.write_str("Forbidden"),
        }
    }
}

/// A single validation failure at a field path
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{path}: {kind}{}", suffix(.detail))]
pub struct FieldError {
    pub path: FieldPath,
    pub kind: FieldErrorKind,
    pub detail: String,
}

impl FieldError {
    pub fn required(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self {
            path: path.clone(),
            kind: FieldErrorKind::Required,
            detail: detail.into(),
        }
    }

    pub fn invalid(path: &FieldPath, value: impl Into<FieldValue>, detail: impl Into<String>) -> Self {
        Self {
            path: path.clone(),
            kind: FieldErrorKind::Invalid(value.into()),
            detail: detail.into(),
        }
    }

    pub fn duplicate(path: &FieldPath, value: impl Into<FieldValue>) -> Self {
        Self {
            path: path.clone(),
            kind: FieldErrorKind::Duplicate(value.into()),
            detail: String::new(),
        }
    }

    pub fn not_found(path: &FieldPath, value: impl Into<FieldValue>) -> Self {
        Self {
            path: path.clone(),
            kind: FieldErrorKind::NotFound(value.into()),
            detail: String::new(),
        }
    }

    pub fn forbidden(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self {
            path: path.clone(),
            kind: FieldErrorKind::Forbidden,
            detail: detail.into(),
        }
    }
}


/// An ordered list of field errors, rendered as one message
#[derive(Clone, Debug, Default, PartialEq, Eq, Error)]
#[error("{}", render(.0))]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: FieldError) {
        self.0.push(err);
    }

    pub fn extend(&mut self, other: FieldErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// `Ok(())` when no errors were collected
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<FieldError> for FieldErrors {
    fn from(err: FieldError) -> Self {
        Self(vec![err])
    }
}

fn suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {}", detail)
    }
}

/// One error renders bare, several render as `[a, b]`
fn render(errors: &[FieldError]) -> String {
    match errors {
        [] => String::new(),
        [single] => single.to_string(),
        many => {
            let joined: Vec<String> = many.iter().map(ToString::to_string).collect();
            format!("[{}]", joined.join(", "))
        }
    }
}
