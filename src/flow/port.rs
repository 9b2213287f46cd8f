//! Port naming for brick connections.
//!
//! Ports are free-form names chosen by the brick modules. A connection that
//! leaves a side unset uses [`DEFAULT_PORT`].

use serde::{Deserialize, Serialize};

/// Port used when a connection does not name one
pub const DEFAULT_PORT: &str = "default";

/// Resolve an optional port name.
pub fn port_or_default(port: Option<&str>) -> String {
    match port {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => DEFAULT_PORT.to_string(),
    }
}

/// Source and target port of one link, as sent to runners.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortLink {
    pub source_port: String,
    pub target_port: String,
}

impl PortLink {
    pub fn new(source_port: impl Into<String>, target_port: impl Into<String>) -> Self {
        Self {
            source_port: source_port.into(),
            target_port: target_port.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_or_default() {
        assert_eq!(port_or_default(None), DEFAULT_PORT);
        assert_eq!(port_or_default(Some("")), DEFAULT_PORT);
        assert_eq!(port_or_default(Some("errors")), "errors");
    }
}
