//! Listener registry built from the GlobalConfiguration
//!
//! Invalid listeners are dropped one by one; the rest stay usable. Errors for
//! the dropped listeners are collected and returned together.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use routeplane_common::{
    validate_dns1035_label, validate_ip_address, FieldError, FieldErrors, FieldPath,
};

use crate::crd::{GlobalConfiguration, Listener, TLS_PASSTHROUGH_LISTENER_NAME};

pub const PROTOCOL_HTTP: &str = "HTTP";
pub const PROTOCOL_TCP: &str = "TCP";
pub const PROTOCOL_UDP: &str = "UDP";

const ALLOWED_PROTOCOLS: [&str; 3] = [PROTOCOL_HTTP, PROTOCOL_TCP, PROTOCOL_UDP];

/// A validated listener
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerInfo {
    pub name: String,
    pub port: u16,
    pub ip: Option<String>,
    pub protocol: String,
    pub ssl: bool,
}

/// Validated listeners by name
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListenerRegistry {
    listeners: BTreeMap<String, ListenerInfo>,
    deployed: bool,
}

impl ListenerRegistry {
    /// Registry with no GlobalConfiguration deployed
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the registry from already validated listeners
    pub fn from_listeners(listeners: &[Listener]) -> Self {
        let listeners = listeners
            .iter()
            .filter_map(|l| {
                let port = u16::try_from(l.port).ok()?;
                Some((
                    l.name.clone(),
                    ListenerInfo {
                        name: l.name.clone(),
                        port,
                        ip: l.ip.clone(),
                        protocol: l.protocol.clone(),
                        ssl: l.ssl,
                    },
                ))
            })
            .collect();

        Self {
            listeners,
            deployed: true,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ListenerInfo> {
        self.listeners.get(name)
    }

    /// Whether a GlobalConfiguration is deployed, even one without listeners
    pub fn is_deployed(&self) -> bool {
        self.deployed
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.listeners.keys().map(String::as_str)
    }
}

/// Validates GlobalConfiguration listeners
#[derive(Clone, Debug, Default)]
pub struct ListenerValidator {
    forbidden_ports: BTreeSet<i32>,
}

impl ListenerValidator {
    pub fn new(forbidden_ports: &[i32]) -> Self {
        Self {
            forbidden_ports: forbidden_ports.iter().copied().collect(),
        }
    }

    /// Returns `gc` reduced to its valid listeners, plus errors for the rest
    pub fn validate(&self, gc: &GlobalConfiguration) -> (GlobalConfiguration, FieldErrors) {
        let path = FieldPath::new("spec").child("listeners");
        let (valid, errors) = self.valid_listeners(&gc.spec.listeners, &path);

        let mut validated = gc.clone();
        validated.spec.listeners = valid;
        (validated, errors)
    }

    pub fn valid_listeners(&self, listeners: &[Listener], path: &FieldPath) -> (Vec<Listener>, FieldErrors) {
        let mut errors = FieldErrors::new();
        let mut names = BTreeSet::new();
        // ip -> port -> protocol
        let mut combinations: HashMap<String, HashMap<i32, String>> = HashMap::new();
        let mut valid = Vec::new();

        for (i, listener) in listeners.iter().enumerate() {
            let idx_path = path.index(i);

            let listener_errors = self.validate_listener(listener, &idx_path);
            if !listener_errors.is_empty() {
                errors.extend(listener_errors);
                continue;
            }

            if let Some(ip) = listener.ip.as_deref().filter(|ip| !ip.is_empty()) {
                if validate_ip_address(ip).is_err() {
                    errors.push(FieldError::invalid(&idx_path.child("IP"), ip, "invalid IP address"));
                    continue;
                }
            }

            if !names.insert(listener.name.clone()) {
                errors.push(FieldError::duplicate(&idx_path.child("name"), listener.name.as_str()));
                continue;
            }

            let by_port = combinations
                .entry(listener.ip.clone().unwrap_or_default())
                .or_default();
            if let Some(err) = check_port_protocol(by_port, listener, path) {
                errors.push(err);
                continue;
            }
            by_port.insert(listener.port, listener.protocol.clone());

            valid.push(listener.clone());
        }

        (valid, errors)
    }

    fn validate_listener(&self, listener: &Listener, path: &FieldPath) -> FieldErrors {
        let mut errors = FieldErrors::new();

        let name_path = path.child("name");
        if listener.name == TLS_PASSTHROUGH_LISTENER_NAME {
            errors.push(FieldError::forbidden(&name_path, "is the name of a built-in listener"));
        } else if let Err(e) = validate_dns1035_label(&listener.name) {
            errors.push(FieldError::invalid(&name_path, listener.name.as_str(), e.to_string()));
        }

        let port_path = path.child("port");
        if self.forbidden_ports.contains(&listener.port) {
            errors.push(FieldError::forbidden(
                &port_path,
                format!("Listener {}: port {} is forbidden", listener.name, listener.port),
            ));
        } else if !(1..=65535).contains(&listener.port) {
            errors.push(FieldError::invalid(
                &port_path,
                listener.port,
                "must be between 1 and 65535, inclusive",
            ));
        }

        if !ALLOWED_PROTOCOLS.contains(&listener.protocol.as_str()) {
            errors.push(FieldError::invalid(
                &path.child("protocol"),
                listener.protocol.as_str(),
                format!(
                    "must specify a valid protocol. Accepted values: {}",
                    ALLOWED_PROTOCOLS.join(",")
                ),
            ));
        }

        errors
    }
}

fn check_port_protocol(
    by_port: &HashMap<i32, String>,
    listener: &Listener,
    path: &FieldPath,
) -> Option<FieldError> {
    let existing = by_port.get(&listener.port)?;

    if *existing == listener.protocol {
        Some(FieldError::duplicate(
            path,
            format!(
                "Listener {}: Duplicated port/protocol combination {}/{}",
                listener.name, listener.port, listener.protocol
            ),
        ))
    } else if listener.protocol == PROTOCOL_HTTP || existing == PROTOCOL_HTTP {
        Some(FieldError::invalid(
            &path.child("port"),
            listener.port,
            format!(
                "Listener {}: Port {} is used with a different protocol (current: {}, new: {})",
                listener.name, listener.port, existing, listener.protocol
            ),
        ))
    } else {
        None
    }
}
