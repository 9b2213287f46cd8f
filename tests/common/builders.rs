//! Test data builders for topologies

use brickflow::config::{BrickDefinition, ConnectionDefinition, FlowDefinition, Topology};

/// Builder for a single brick definition
pub struct BrickBuilder {
    def: BrickDefinition,
}

impl BrickBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            def: BrickDefinition {
                name: name.to_string(),
                module: format!("bricks.{}", name.to_lowercase()),
                parameters: Default::default(),
                max_instances: None,
                scale_threshold: None,
                idle_timeout_secs: None,
            },
        }
    }

    pub fn module(mut self, module: &str) -> Self {
        self.def.module = module.to_string();
        self
    }

    pub fn max_instances(mut self, max: usize) -> Self {
        self.def.max_instances = Some(max);
        self
    }

    pub fn scale_threshold(mut self, threshold: u32) -> Self {
        self.def.scale_threshold = Some(threshold);
        self
    }

    pub fn parameter(mut self, key: &str, value: serde_json::Value) -> Self {
        self.def.parameters.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> BrickDefinition {
        self.def
    }
}

/// Builder for a flow definition
pub struct FlowBuilder {
    def: FlowDefinition,
}

impl FlowBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            def: FlowDefinition {
                name: name.to_string(),
                idle_timeout_secs: None,
                bricks: Vec::new(),
                connections: Vec::new(),
            },
        }
    }

    pub fn brick(mut self, brick: BrickBuilder) -> Self {
        self.def.bricks.push(brick.build());
        self
    }

    pub fn connect(self, source: &str, target: &str) -> Self {
        self.connect_ports(source, None, target, None)
    }

    pub fn connect_ports(
        mut self,
        source: &str,
        source_port: Option<&str>,
        target: &str,
        target_port: Option<&str>,
    ) -> Self {
        self.def.connections.push(ConnectionDefinition {
            source: source.to_string(),
            target: target.to_string(),
            source_port: source_port.map(str::to_string),
            target_port: target_port.map(str::to_string),
        });
        self
    }

    pub fn build(self) -> FlowDefinition {
        self.def
    }
}

/// Builder for a whole topology
#[derive(Default)]
pub struct TopologyBuilder {
    flows: Vec<FlowDefinition>,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flow(mut self, flow: FlowBuilder) -> Self {
        self.flows.push(flow.build());
        self
    }

    pub fn build(self) -> Topology {
        Topology { flows: self.flows }
    }
}

/// `A → B` with `A.max_instances = 2`
pub fn two_stage_topology() -> Topology {
    TopologyBuilder::new()
        .flow(
            FlowBuilder::new("scenario")
                .brick(BrickBuilder::new("A").max_instances(2))
                .brick(BrickBuilder::new("B"))
                .connect("A", "B"),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_builder() {
        let flow = FlowBuilder::new("f")
            .brick(BrickBuilder::new("Reader").scale_threshold(5))
            .brick(BrickBuilder::new("Writer"))
            .connect_ports("Reader", Some("out"), "Writer", None)
            .build();

        assert_eq!(flow.bricks[0].module, "bricks.reader");
        assert_eq!(flow.bricks[0].scale_threshold, Some(5));
        assert_eq!(flow.connections[0].source_port.as_deref(), Some("out"));
        assert!(flow.validate().is_ok());
    }
}
