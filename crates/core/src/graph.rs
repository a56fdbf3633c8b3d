//! Arena-based vertex/port graph model.
//!
//! The graph owns flat tables of vertices and ports; every relation (port
//! owner, opposite ports) is an id lookup into those tables, so there are no
//! ownership cycles. A [`GraphModel`] is built once via [`GraphBuilder`] and
//! never mutated during a run.

use std::collections::{HashMap, VecDeque};

use crate::error::EngineError;
use crate::movement::Movement;

/// Index of a vertex in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(usize);

/// Index of a port in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(usize);

impl VertexId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl PortId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which side of a vertex a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// A schedulable stage of the dataflow graph.
#[derive(Debug)]
pub struct VertexInfo {
    pub name: String,
    /// Per-vertex concurrency hint. 0 = no vertex-level cap.
    pub max_concurrency: usize,
    pub inputs: Vec<PortId>,
    pub outputs: Vec<PortId>,
}

/// A named edge endpoint of a vertex.
#[derive(Debug)]
pub struct PortInfo {
    pub name: String,
    pub owner: VertexId,
    pub direction: Direction,
    pub movement: Movement,
    /// Whether records on this port carry a key prefix.
    pub has_key: bool,
    /// Name of the secondary value comparator (scatter-gather only).
    pub comparator: Option<String>,
    /// Connected ports on the other side of the edge.
    pub opposites: Vec<PortId>,
}

/// Immutable vertex/port/edge structure driving one run.
#[derive(Debug)]
pub struct GraphModel {
    vertices: Vec<VertexInfo>,
    ports: Vec<PortInfo>,
}

impl GraphModel {
    pub fn vertex(&self, id: VertexId) -> &VertexInfo {
        &self.vertices[id.0]
    }

    pub fn port(&self, id: PortId) -> &PortInfo {
        &self.ports[id.0]
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> {
        (0..self.vertices.len()).map(VertexId)
    }

    pub fn vertex_by_name(&self, name: &str) -> Option<VertexId> {
        self.vertices
            .iter()
            .position(|v| v.name == name)
            .map(VertexId)
    }

    /// Look up an input port of a vertex by name.
    pub fn input_port(&self, vertex: VertexId, name: &str) -> Option<PortId> {
        self.vertex(vertex)
            .inputs
            .iter()
            .copied()
            .find(|&p| self.port(p).name == name)
    }

    /// Look up an output port of a vertex by name.
    pub fn output_port(&self, vertex: VertexId, name: &str) -> Option<PortId> {
        self.vertex(vertex)
            .outputs
            .iter()
            .copied()
            .find(|&p| self.port(p).name == name)
    }

    /// Qualified `vertex.port` label for diagnostics.
    pub fn port_label(&self, id: PortId) -> String {
        let port = self.port(id);
        format!("{}.{}", self.vertex(port.owner).name, port.name)
    }

    /// Producers-before-consumers order over the vertex graph.
    ///
    /// Kahn's algorithm over the producer→consumer edges derived from
    /// connected ports; a cycle is a graph error.
    pub fn topological_order(&self) -> Result<Vec<VertexId>, EngineError> {
        let n = self.vertices.len();
        let mut in_degree = vec![0usize; n];
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (vi, vertex) in self.vertices.iter().enumerate() {
            for &out in &vertex.outputs {
                for &opp in &self.port(out).opposites {
                    let consumer = self.port(opp).owner.0;
                    downstream[vi].push(consumer);
                    in_degree[consumer] += 1;
                }
            }
        }

        let mut ready: VecDeque<usize> = (0..n).filter(|&v| in_degree[v] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(v) = ready.pop_front() {
            order.push(VertexId(v));
            for &consumer in &downstream[v] {
                in_degree[consumer] -= 1;
                if in_degree[consumer] == 0 {
                    ready.push_back(consumer);
                }
            }
        }
        if order.len() != n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&v| in_degree[v] > 0)
                .map(|v| self.vertices[v].name.as_str())
                .collect();
            return Err(EngineError::Graph(format!(
                "vertex graph contains a cycle involving: {}",
                stuck.join(", ")
            )));
        }
        Ok(order)
    }
}

/// Builds a [`GraphModel`], validating edges as they are connected.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    vertices: Vec<VertexInfo>,
    ports: Vec<PortInfo>,
    names: HashMap<String, VertexId>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex. `max_concurrency` of 0 means no vertex-level cap.
    pub fn add_vertex(
        &mut self,
        name: &str,
        max_concurrency: usize,
    ) -> Result<VertexId, EngineError> {
        if self.names.contains_key(name) {
            return Err(EngineError::Graph(format!("duplicate vertex name: {name}")));
        }
        let id = VertexId(self.vertices.len());
        self.vertices.push(VertexInfo {
            name: name.to_string(),
            max_concurrency,
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn add_input(
        &mut self,
        vertex: VertexId,
        name: &str,
        movement: Movement,
    ) -> Result<PortId, EngineError> {
        self.add_port(vertex, name, Direction::Input, movement, false, None)
    }

    pub fn add_keyed_input(
        &mut self,
        vertex: VertexId,
        name: &str,
        movement: Movement,
    ) -> Result<PortId, EngineError> {
        self.add_port(vertex, name, Direction::Input, movement, true, None)
    }

    pub fn add_output(
        &mut self,
        vertex: VertexId,
        name: &str,
        movement: Movement,
    ) -> Result<PortId, EngineError> {
        self.add_port(vertex, name, Direction::Output, movement, false, None)
    }

    /// Add a keyed output port, optionally naming a secondary value comparator.
    pub fn add_keyed_output(
        &mut self,
        vertex: VertexId,
        name: &str,
        movement: Movement,
        comparator: Option<&str>,
    ) -> Result<PortId, EngineError> {
        self.add_port(vertex, name, Direction::Output, movement, true, comparator)
    }

    fn add_port(
        &mut self,
        vertex: VertexId,
        name: &str,
        direction: Direction,
        movement: Movement,
        has_key: bool,
        comparator: Option<&str>,
    ) -> Result<PortId, EngineError> {
        if vertex.0 >= self.vertices.len() {
            return Err(EngineError::Graph(format!("unknown vertex id: {vertex:?}")));
        }
        if movement == Movement::ScatterGather && !has_key {
            return Err(EngineError::Graph(format!(
                "scatter-gather port {}.{} requires keyed records",
                self.vertices[vertex.0].name, name
            )));
        }
        if comparator.is_some() && movement != Movement::ScatterGather {
            return Err(EngineError::Graph(format!(
                "value comparator on {}.{} is only meaningful for scatter-gather",
                self.vertices[vertex.0].name, name
            )));
        }
        let owner = &mut self.vertices[vertex.0];
        let slots = match direction {
            Direction::Input => &mut owner.inputs,
            Direction::Output => &mut owner.outputs,
        };
        let id = PortId(self.ports.len());
        slots.push(id);
        self.ports.push(PortInfo {
            name: name.to_string(),
            owner: vertex,
            direction,
            movement,
            has_key,
            comparator: comparator.map(str::to_string),
            opposites: Vec::new(),
        });
        Ok(id)
    }

    /// Connect an output port to an input port.
    ///
    /// The movement kind and key-ness must match on both sides.
    pub fn connect(&mut self, output: PortId, input: PortId) -> Result<(), EngineError> {
        let out = &self.ports[output.0];
        let inp = &self.ports[input.0];
        if out.direction != Direction::Output || inp.direction != Direction::Input {
            return Err(EngineError::Graph(format!(
                "edge must connect an output to an input: {} -> {}",
                self.label(output),
                self.label(input)
            )));
        }
        if out.movement != inp.movement {
            return Err(EngineError::Graph(format!(
                "movement mismatch on edge {} ({:?}) -> {} ({:?})",
                self.label(output),
                out.movement,
                self.label(input),
                inp.movement
            )));
        }
        if out.has_key != inp.has_key {
            return Err(EngineError::Graph(format!(
                "key-ness mismatch on edge {} -> {}",
                self.label(output),
                self.label(input)
            )));
        }
        self.ports[output.0].opposites.push(input);
        self.ports[input.0].opposites.push(output);
        Ok(())
    }

    fn label(&self, id: PortId) -> String {
        let port = &self.ports[id.0];
        format!("{}.{}", self.vertices[port.owner.0].name, port.name)
    }

    pub fn build(self) -> GraphModel {
        GraphModel {
            vertices: self.vertices,
            ports: self.ports,
        }
    }
}
