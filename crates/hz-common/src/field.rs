//! Field-level validation errors
//!
//! Admission checks collect every violation instead of stopping at the
//! first one. Each violation names the offending field by its JSON path so
//! the API server can surface it next to the field in `kubectl` output.

use std::fmt;

/// Dotted path to a field, e.g. `spec.bucketConfiguration.bucketURI`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Root path
    pub fn new(root: impl Into<String>) -> Self {
        Self(vec![root.into()])
    }

    /// Path to a child field
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Category of a field error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// Value is not acceptable
    Invalid,
    /// Field may not be set or changed
    Forbidden,
    /// Value collides with another resource
    Duplicate,
    /// Validation itself failed
    Internal,
}

impl FieldErrorKind {
    /// Reason string used by the Kubernetes API (`FieldValueInvalid`, ...)
    pub fn reason(self) -> &'static str {
        match self {
            Self::Invalid => "FieldValueInvalid",
            Self::Forbidden => "FieldValueForbidden",
            Self::Duplicate => "FieldValueDuplicate",
            Self::Internal => "InternalError",
        }
    }
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "Invalid value"),
            Self::Forbidden => write!(f, "Forbidden"),
            Self::Duplicate => write!(f, "Duplicate value"),
            Self::Internal => write!(f, "Internal error"),
        }
    }
}

/// A single field violation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    /// Category
    pub kind: FieldErrorKind,
    /// Offending field
    pub path: FieldPath,
    /// Offending value, rendered for display
    pub bad_value: Option<String>,
    /// Human-readable explanation
    pub detail: String,
}

impl FieldError {
    /// Value is not acceptable
    pub fn invalid(path: FieldPath, value: impl fmt::Debug, detail: impl Into<String>) -> Self {
        Self {
            kind: FieldErrorKind::Invalid,
            path,
            bad_value: Some(format!("{value:?}")),
            detail: detail.into(),
        }
    }

    /// Field may not be changed
    pub fn forbidden(path: FieldPath, detail: impl Into<String>) -> Self {
        Self {
            kind: FieldErrorKind::Forbidden,
            path,
            bad_value: None,
            detail: detail.into(),
        }
    }

    /// Value collides with another resource
    pub fn duplicate(path: FieldPath, value: impl fmt::Debug) -> Self {
        Self {
            kind: FieldErrorKind::Duplicate,
            path,
            bad_value: Some(format!("{value:?}")),
            detail: String::new(),
        }
    }

    /// Validation could not be performed
    pub fn internal(path: FieldPath, detail: impl Into<String>) -> Self {
        Self {
            kind: FieldErrorKind::Internal,
            path,
            bad_value: None,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bad_value {
            Some(value) => write!(f, "{}: {}: {}", self.path, self.kind, value)?,
            None => write!(f, "{}: {}", self.path, self.kind)?,
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// Render a list of field errors as `[a, b]`, the way the API server does
pub fn join(errors: &[FieldError]) -> String {
    let parts: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_renders_dotted() {
        let path = FieldPath::new("spec")
            .child("bucketConfiguration")
            .child("bucketURI");
        assert_eq!(path.to_string(), "spec.bucketConfiguration.bucketURI");
    }

    #[test]
    fn forbidden_error_reads_like_the_api_server() {
        let err = FieldError::forbidden(
            FieldPath::new("spec").child("mainClass"),
            "field cannot be updated",
        );
        assert_eq!(err.to_string(), "spec.mainClass: Forbidden: field cannot be updated");
        assert_eq!(err.kind.reason(), "FieldValueForbidden");
    }

    #[test]
    fn invalid_error_includes_value() {
        let err = FieldError::invalid(
            FieldPath::new("spec").child("state"),
            "Suspended",
            "should be set to Running on creation",
        );
        assert_eq!(
            err.to_string(),
            "spec.state: Invalid value: \"Suspended\": should be set to Running on creation"
        );
    }

    #[test]
    fn join_lists_every_error() {
        let errs = vec![
            FieldError::forbidden(FieldPath::new("spec").child("name"), "field cannot be updated"),
            FieldError::forbidden(FieldPath::new("spec").child("jarName"), "field cannot be updated"),
        ];
        let joined = join(&errs);
        assert!(joined.starts_with("[spec.name"));
        assert!(joined.contains(", spec.jarName"));
    }
}
