//! Field-scoped error types shared by validation, the confirmation flows and
//! the HTTP adapter.

use std::fmt;

use serde::Serialize;

/// Request part a field error refers to
pub const INPUT_BODY: &str = "body";

/// A single field-level error, safe to show verbatim to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub name: String,
    pub input: String,
    pub message: String,
}

impl FieldError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: INPUT_BODY.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field error: {}{{{}: {}}}", self.input, self.name, self.message)
    }
}

/// Ordered list of field errors collected for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn single(error: FieldError) -> Self {
        Self(vec![error])
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn add(&mut self, name: &str, message: impl Into<String>) {
        self.push(FieldError::new(name, message));
    }

    /// Whether an error for `name` was already reported
    pub fn has_field(&self, name: &str) -> bool {
        self.0.iter().any(|e| e.name == name)
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

    /// `Ok(())` when nothing was collected
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<FieldError> for FieldErrors {
    fn from(error: FieldError) -> Self {
        Self::single(error)
    }
}

impl IntoIterator for FieldErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Caller-facing rendering of any error: a message plus optional field list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorView {
    pub message: String,
    #[serde(skip_serializing_if = "FieldErrors::is_empty")]
    pub fields: FieldErrors,
}

impl ErrorView {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: FieldErrors::new(),
        }
    }

    pub fn fields(fields: FieldErrors) -> Self {
        Self {
            message: "validation failed".to_string(),
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_serializes_flat() {
        let err = FieldError::new("verification_code", "code is wrong");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "verification_code",
                "input": "body",
                "message": "code is wrong"
            })
        );
    }

    #[test]
    fn test_has_field() {
        let mut errors = FieldErrors::new();
        errors.add("phone", "phone is invalid");

        assert!(errors.has_field("phone"));
        assert!(!errors.has_field("referrer_phone"));
        assert!(errors.clone().into_result().is_err());
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_error_view_omits_empty_fields() {
        let view = ErrorView::message("such action not allowed");
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json, serde_json::json!({ "message": "such action not allowed" }));
    }
}
