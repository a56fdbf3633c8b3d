pub mod config;
pub mod error;
pub mod graph;
pub mod movement;

pub use config::{AccessMode, EngineConfig};
pub use error::EngineError;
pub use graph::{GraphBuilder, GraphModel, PortId, PortInfo, VertexId, VertexInfo};
pub use movement::Movement;
