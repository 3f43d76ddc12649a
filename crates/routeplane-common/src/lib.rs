//! routeplane-common: validation helpers shared by the routeplane crates

pub mod field;
pub mod validation;

pub use field::{FieldError, FieldErrorKind, FieldErrors, FieldPath, FieldValue};
pub use validation::{
    validate_dns1035_label, validate_hostname, validate_ip_address, ValidationError,
    ValidationResult,
};
