//! # FlowWeave
//!
//! A flow-based programming runtime on tokio.
//!
//! Components run as independent tasks and talk to each other only by
//! sending information packets through ports. Output ports fan out to any
//! number of connections; input ports accept exactly one, so merges are
//! always explicit components.
//!
//! ## Key Features
//!
//! - **Single-Owner Packets**: every packet has at most one owner; ownership
//!   only moves through an explicit `copy()`
//! - **Bounded or Unbounded Connections**: FIFO per connection, with optional
//!   backpressure
//! - **Fan-in Barrier**: `receive_packets` waits for one packet on every open
//!   input
//! - **Fail-Fast Scheduling**: the first failing component cancels the rest
//!   of the graph
//! - **Nested Graphs**: a graph is itself a component with exported ports
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowweave::{Apply, Collector, Component, GeneratorSource, Multigraph};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = Multigraph::new("sum");
//! let left = GeneratorSource::new("left", vec![1i64, 2, 3]).into_node();
//! let right = GeneratorSource::new("right", vec![10i64, 20, 30]).into_node();
//! let adder = Apply::new("adder", &["a", "b"], &["sum"], |inputs, outputs| {
//!   outputs.set("sum", inputs.get::<i64>("a")? + inputs.get::<i64>("b")?);
//!   Ok(())
//! })
//! .into_node();
//! let sink = Collector::<i64>::new("sink").into_node();
//!
//! graph.connect(&left.outputs().get("OUT")?, &adder.inputs().get("a")?)?;
//! graph.connect(&right.outputs().get("OUT")?, &adder.inputs().get("b")?)?;
//! graph.connect(&adder.outputs().get("sum")?, &sink.inputs().get("IN")?)?;
//! graph.run().await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Component trait, handles and lifecycle.
pub mod component;
/// Built-in components.
pub mod components;
/// Graph configuration.
pub mod config;
/// FIFO channels between ports.
pub mod connection;
mod dot;
/// Error types.
pub mod error;
/// The graph scheduler.
pub mod graph;
/// Information packets.
pub mod packet;
/// Input and output ports.
pub mod port;
/// Named port collections.
pub mod register;
/// Thread-local construction scopes.
pub mod scope;
/// Sub-graph boundary adapters.
pub mod subgraph;

pub use component::{
  Component, ComponentCore, ComponentHandle, ComponentId, ComponentState, GraphContext, Status,
};
pub use components::{
  Apply, ApplyInputs, ApplyOutputs, Collector, ConstantSource, Filter, GeneratorSource,
  PathFormatter, Product, Shell, ShowInputs, Split,
};
pub use config::GraphConfig;
pub use connection::{Capacity, Connection};
pub use error::{ComponentError, ConfigError, GraphError, PacketError, PortError};
pub use graph::Multigraph;
pub use packet::{Kickstart, Packet, PacketId, Payload};
pub use port::{Direction, Port, WeakPort};
pub use register::{PacketSet, PortRegister};
pub use scope::GraphScope;
pub use subgraph::{SubIn, SubOut};

#[cfg(test)]
mod graph_test;
