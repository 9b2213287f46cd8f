//! Directed links between bricks.

use super::brick::Brick;
use super::port::{port_or_default, PortLink};
use crate::config::ConnectionDefinition;
use std::sync::{Arc, Weak};

/// One link from a source brick's port to a target brick's port.
///
/// Holds non-owning references; the flow owns both bricks.
#[derive(Debug, Clone)]
pub struct BrickConnection {
    source: Weak<Brick>,
    target: Weak<Brick>,
    source_name: String,
    target_name: String,
    source_port: String,
    target_port: String,
}

impl BrickConnection {
    pub fn new(source: &Arc<Brick>, target: &Arc<Brick>, def: &ConnectionDefinition) -> Self {
        Self {
            source: Arc::downgrade(source),
            target: Arc::downgrade(target),
            source_name: source.name().to_string(),
            target_name: target.name().to_string(),
            source_port: port_or_default(def.source_port.as_deref()),
            target_port: port_or_default(def.target_port.as_deref()),
        }
    }

    pub fn source(&self) -> Option<Arc<Brick>> {
        self.source.upgrade()
    }

    pub fn target(&self) -> Option<Arc<Brick>> {
        self.target.upgrade()
    }

    pub(crate) fn target_weak(&self) -> &Weak<Brick> {
        &self.target
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn source_port(&self) -> &str {
        &self.source_port
    }

    pub fn target_port(&self) -> &str {
        &self.target_port
    }

    pub fn port_link(&self) -> PortLink {
        PortLink::new(&self.source_port, &self.target_port)
    }
}
