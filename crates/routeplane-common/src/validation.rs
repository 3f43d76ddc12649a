use regex::Regex;
use std::net::IpAddr;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("{0}")]
    InvalidHostname(String),

    #[error("{0}")]
    InvalidLabel(String),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

// RFC 1123 label, lower case only
static LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("valid regex"));

// Leading '*.' is allowed so wildcard hosts can be routed
static WILDCARD_PREFIX: &str = "*.";

static DNS1035_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"));

const DNS1035_MESSAGE: &str = "a DNS-1035 label must consist of lower case alphanumeric characters or '-', start with an alphabetic character, and end with an alphanumeric character";

/// Validates an IP address (IPv4 or IPv6)
pub fn validate_ip_address(ip: &str) -> ValidationResult<IpAddr> {
    ip.parse::<IpAddr>()
        .map_err(|_| ValidationError::InvalidIpAddress(ip.to_string()))
}

/// Validates a routing hostname.
///
/// Rules:
/// - Total length: 1-253 characters (RFC 1035)
/// - Lower case labels separated by dots, each 1-63 chars
/// - A single leading `*.` wildcard label is allowed
pub fn validate_hostname(hostname: &str) -> ValidationResult<()> {
    if hostname.is_empty() {
        return Err(ValidationError::InvalidHostname(
            "must not be empty".to_string(),
        ));
    }

    if hostname.len() > 253 {
        return Err(ValidationError::InvalidHostname(
            "must be no more than 253 characters".to_string(),
        ));
    }

    let name = hostname.strip_prefix(WILDCARD_PREFIX).unwrap_or(hostname);

    if name.starts_with('.') || name.ends_with('.') {
        return Err(ValidationError::InvalidHostname(
            "must not start or end with '.'".to_string(),
        ));
    }

    for label in name.split('.') {
        if !LABEL_REGEX.is_match(label) {
            return Err(ValidationError::InvalidHostname(format!(
                "label '{}' must consist of lower case alphanumeric characters or '-'",
                label
            )));
        }
    }

    Ok(())
}

/// Validates a DNS-1035 label (listener names, upstream names)
pub fn validate_dns1035_label(value: &str) -> ValidationResult<()> {
    if value.len() > 63 {
        return Err(ValidationError::InvalidLabel(
            "must be no more than 63 characters".to_string(),
        ));
    }
    if !DNS1035_REGEX.is_match(value) {
        return Err(ValidationError::InvalidLabel(DNS1035_MESSAGE.to_string()));
    }
    Ok(())
}
