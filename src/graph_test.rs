//! # Multigraph Test Suite
//!
//! ## Test Coverage
//!
//! - **Membership**: explicit, implicit (scope) and connect-driven registration
//! - **Wiring**: arcs, initial packets, seeds and cycles
//! - **Execution**: completion states, failure propagation, cancellation, panics
//! - **Nesting**: exported ports, workdir inheritance, DOT clusters

use crate::component::{Component, ComponentCore, ComponentState};
use crate::components::{Apply, Collector, ConstantSource, GeneratorSource, Product, Split};
use crate::config::GraphConfig;
use crate::connection::Capacity;
use crate::error::{ComponentError, GraphError, PortError};
use crate::graph::Multigraph;
use crate::port::Port;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;

// ============================================================================
// Test components
// ============================================================================

/// Forwards the first packet, then fails like a broken command would.
struct Faulty {
  core: ComponentCore,
}

impl Faulty {
  fn new(name: &str) -> Self {
    Self {
      core: ComponentCore::with_ports(name, &["IN"], &["OUT"]),
    }
  }
}

#[async_trait]
impl Component for Faulty {
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    let packet = self.inputs().get("IN")?.receive_packet().await?;
    self.outputs().get("OUT")?.send_packet(packet).await?;
    Err(ComponentError::CommandFailed {
      component: self.name().to_string(),
      command: "false".to_string(),
      code: Some(1),
      stderr: String::new(),
    })
  }
}

struct Panicking {
  core: ComponentCore,
}

#[async_trait]
impl Component for Panicking {
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    panic!("component exploded");
  }
}

/// Waits forever on its input.
struct Sleeper {
  core: ComponentCore,
}

#[async_trait]
impl Component for Sleeper {
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    let input = self.inputs().get("IN")?;
    loop {
      input.receive_packet().await?;
    }
  }
}

fn doubler(name: &str) -> Apply {
  Apply::new(name, &["IN"], &["OUT"], |inputs, outputs| {
    outputs.set("OUT", inputs.get::<i64>("IN")? * 2);
    Ok(())
  })
}

// ============================================================================
// Membership
// ============================================================================

#[test]
fn test_add_node_is_idempotent() {
  let graph = Multigraph::new("g");
  let node = Collector::<i32>::new("sink").into_node();
  graph.add_node(&node);
  graph.add_node(&node);
  assert_eq!(graph.nodes().len(), 1);
  assert_eq!(node.handle().state(), ComponentState::Registered);
  assert_eq!(node.handle().context().unwrap().graph, "g");
}

#[test]
fn test_scope_registers_components() {
  let graph = Multigraph::new("g");
  let sink = {
    let _scope = graph.enter();
    Collector::<i32>::new("sink").into_node()
  };
  let outside = Collector::<i32>::new("outside").into_node();
  assert!(graph.has_node(sink.handle()));
  assert!(!graph.has_node(outside.handle()));
}

#[test]
fn test_connect_registers_owners() {
  let graph = Multigraph::new("g");
  let source = GeneratorSource::new("source", 0..1i32).into_node();
  let sink = Collector::<i32>::new("sink").into_node();
  graph
    .connect(&source.outputs().get("OUT").unwrap(), &sink.inputs().get("IN").unwrap())
    .unwrap();
  assert!(graph.has_node(source.handle()));
  assert!(graph.has_node(sink.handle()));

  let arcs = graph.iter_arcs();
  assert_eq!(arcs.len(), 1);
  assert_eq!(arcs[0].0.qualified_name(), "source:OUT");
  assert_eq!(arcs[0].1.qualified_name(), "sink:IN");
}

#[test]
fn test_connect_unowned_port_fails() {
  let graph = Multigraph::new("g");
  let sink = Collector::<i32>::new("sink").into_node();
  let err = graph
    .connect(&Port::output("loose"), &sink.inputs().get("IN").unwrap())
    .unwrap_err();
  assert!(matches!(err, GraphError::Unregistered { .. }));
}

#[test]
fn test_connect_reports_port_errors() {
  let graph = Multigraph::new("g");
  let a = GeneratorSource::new("a", 0..1i32).into_node();
  let b = GeneratorSource::new("b", 0..1i32).into_node();
  let sink = Collector::<i32>::new("sink").into_node();
  let input = sink.inputs().get("IN").unwrap();
  graph.connect(&a.outputs().get("OUT").unwrap(), &input).unwrap();
  let err = graph.connect(&b.outputs().get("OUT").unwrap(), &input).unwrap_err();
  assert!(matches!(
    err,
    GraphError::Port(crate::error::PortError::MultipleConnection { .. })
  ));
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_run_completes_every_component() {
  let graph = Multigraph::new("g");
  let source = GeneratorSource::new("source", 0..3i64).into_node();
  let double = doubler("double").into_node();
  let sink = Collector::<i64>::new("sink").into_node();
  graph
    .connect(&source.outputs().get("OUT").unwrap(), &double.inputs().get("IN").unwrap())
    .unwrap();
  graph
    .connect(&double.outputs().get("OUT").unwrap(), &sink.inputs().get("IN").unwrap())
    .unwrap();

  timeout(Duration::from_secs(5), graph.run()).await.unwrap().unwrap();
  assert_eq!(sink.values(), vec![0, 2, 4]);
  for node in graph.iter_nodes() {
    assert_eq!(node.handle().state(), ComponentState::Completed, "{}", node.name());
    assert_eq!(node.handle().owned_packets(), 0, "{}", node.name());
  }
}

#[tokio::test]
async fn test_failure_cancels_the_rest() {
  let graph = Multigraph::new("g");
  let source = ConstantSource::new("source", 1u8).into_node();
  let middle = Faulty::new("middle").into_node();
  let sink = Collector::<u8>::new("sink").into_node();
  graph
    .connect(&source.outputs().get("OUT").unwrap(), &middle.inputs().get("IN").unwrap())
    .unwrap();
  graph
    .connect(&middle.outputs().get("OUT").unwrap(), &sink.inputs().get("IN").unwrap())
    .unwrap();

  let err = timeout(Duration::from_secs(5), graph.run())
    .await
    .expect("cancellation must not hang")
    .unwrap_err();
  match err {
    GraphError::ComponentFailed { component, source } => {
      assert_eq!(component, "middle");
      assert!(matches!(source, ComponentError::CommandFailed { .. }));
    }
    other => panic!("unexpected error {other:?}"),
  }
  assert_eq!(middle.handle().state(), ComponentState::Failed);
  assert_eq!(source.handle().state(), ComponentState::Cancelled);
  assert_eq!(sink.handle().state(), ComponentState::Cancelled);
}

#[tokio::test]
async fn test_panic_is_a_failure() {
  let graph = Multigraph::new("g");
  let bomb = Panicking {
    core: ComponentCore::new("bomb"),
  }
  .into_node();
  let sleeper = Sleeper {
    core: ComponentCore::with_ports("sleeper", &["IN"], &[]),
  }
  .into_node();
  graph.add_node(&bomb);
  let source = ConstantSource::new("source", 0u8).into_node();
  graph
    .connect(&source.outputs().get("OUT").unwrap(), &sleeper.inputs().get("IN").unwrap())
    .unwrap();

  let err = timeout(Duration::from_secs(5), graph.run()).await.unwrap().unwrap_err();
  match err {
    GraphError::ComponentFailed {
      component,
      source: ComponentError::Panicked(message),
    } => {
      assert_eq!(component, "bomb");
      assert_eq!(message, "component exploded");
    }
    other => panic!("unexpected error {other:?}"),
  }
  assert_eq!(sleeper.handle().state(), ComponentState::Cancelled);
}

#[tokio::test]
async fn test_disconnected_required_port_fails_component() {
  let graph = Multigraph::new("g");
  let sink = Collector::<i32>::new("sink").into_node();
  graph.add_node(&sink);
  let err = graph.run().await.unwrap_err();
  assert!(matches!(
    err,
    GraphError::ComponentFailed {
      source: ComponentError::Port(crate::error::PortError::Disconnected { .. }),
      ..
    }
  ));
}

#[tokio::test]
async fn test_empty_graph_runs() {
  Multigraph::new("empty").run().await.unwrap();
}

// ============================================================================
// Initial packets, seeds and cycles
// ============================================================================

#[tokio::test]
async fn test_initial_packet_feeds_component_without_upstream() {
  let graph = Multigraph::new("g");
  let double = doubler("double").into_node();
  let sink = Collector::<i64>::new("sink").into_node();
  graph
    .set_initial_packet(&double.inputs().get("IN").unwrap(), 21i64)
    .unwrap();
  graph
    .connect(&double.outputs().get("OUT").unwrap(), &sink.inputs().get("IN").unwrap())
    .unwrap();

  timeout(Duration::from_secs(5), graph.run()).await.unwrap().unwrap();
  assert_eq!(sink.values(), vec![42]);
}

#[tokio::test]
async fn test_initial_packet_feeds_collector() {
  let graph = Multigraph::new("g");
  let sink = Collector::<i64>::new("sink").into_node();
  graph
    .set_initial_packet(&sink.inputs().get("IN").unwrap(), 7i64)
    .unwrap();

  timeout(Duration::from_secs(5), graph.run()).await.unwrap().unwrap();
  assert_eq!(sink.values(), vec![7]);
  assert_eq!(sink.handle().state(), ComponentState::Completed);
}

#[tokio::test]
async fn test_initial_packet_joins_product() {
  let graph = Multigraph::new("g");
  let numbers = GeneratorSource::new("numbers", 0..3i64).into_node();
  let product = Product::new("prod").into_node();
  let split = Split::new("split").into_node();
  let firsts = Collector::<i64>::new("firsts").into_node();
  let seconds = Collector::<i64>::new("seconds").into_node();
  graph
    .connect(&numbers.outputs().get("OUT").unwrap(), &product.inputs().get("IN_1").unwrap())
    .unwrap();
  graph
    .set_initial_packet(&product.inputs().get("IN_2").unwrap(), 10i64)
    .unwrap();
  graph
    .connect(&product.outputs().get("OUT").unwrap(), &split.inputs().get("IN").unwrap())
    .unwrap();
  graph
    .connect(&split.outputs().get("OUT_1").unwrap(), &firsts.inputs().get("IN").unwrap())
    .unwrap();
  graph
    .connect(&split.outputs().get("OUT_2").unwrap(), &seconds.inputs().get("IN").unwrap())
    .unwrap();

  timeout(Duration::from_secs(5), graph.run()).await.unwrap().unwrap();
  assert_eq!(firsts.values(), vec![0, 1, 2]);
  assert_eq!(seconds.values(), vec![10, 10, 10]);
  assert_eq!(product.handle().state(), ComponentState::Completed);
}

#[tokio::test]
async fn test_initial_packet_rejected_on_connected_input() {
  let graph = Multigraph::with_config(
    "g",
    GraphConfig::default().with_capacity(Capacity::Bounded(1)),
  );
  let source = GeneratorSource::new("source", 0..5i64).into_node();
  let double = doubler("double").into_node();
  let sink = Collector::<i64>::new("sink").into_node();
  let input = double.inputs().get("IN").unwrap();
  graph.connect(&source.outputs().get("OUT").unwrap(), &input).unwrap();
  graph
    .connect(&double.outputs().get("OUT").unwrap(), &sink.inputs().get("IN").unwrap())
    .unwrap();

  let err = graph.set_initial_packet(&input, 21i64).unwrap_err();
  assert!(matches!(
    err,
    GraphError::Port(PortError::InitialPacketConflict { .. })
  ));

  timeout(Duration::from_secs(5), graph.run()).await.unwrap().unwrap();
  assert_eq!(sink.values(), vec![0, 2, 4, 6, 8]);
  assert_eq!(source.handle().state(), ComponentState::Completed);
}

#[tokio::test]
async fn test_seeded_cycle_keeps_running_total() {
  let graph = Multigraph::new("g");
  let source = GeneratorSource::new("numbers", 1..=4i64).into_node();
  let accumulate = Apply::new("accumulate", &["x", "acc"], &["next", "total"], |inputs, outputs| {
    let sum = inputs.get::<i64>("x")? + inputs.get::<i64>("acc")?;
    outputs.set("next", sum);
    outputs.set("total", sum);
    Ok(())
  })
  .into_node();
  let sink = Collector::<i64>::new("totals").into_node();

  graph
    .connect(&source.outputs().get("OUT").unwrap(), &accumulate.inputs().get("x").unwrap())
    .unwrap();
  graph
    .connect(
      &accumulate.outputs().get("next").unwrap(),
      &accumulate.inputs().get("acc").unwrap(),
    )
    .unwrap();
  graph
    .connect(&accumulate.outputs().get("total").unwrap(), &sink.inputs().get("IN").unwrap())
    .unwrap();
  graph
    .set_seed_packet(&accumulate.inputs().get("acc").unwrap(), 0i64)
    .unwrap();

  timeout(Duration::from_secs(5), graph.run()).await.unwrap().unwrap();
  assert_eq!(sink.values(), vec![1, 3, 6, 10]);
}

#[tokio::test]
async fn test_kickstarter_triggers_once() {
  let graph = Multigraph::new("g");
  let trigger = Apply::new("trigger", &["GO"], &["OUT"], |inputs, outputs| {
    inputs.get::<crate::packet::Kickstart>("GO")?;
    outputs.set("OUT", "fired".to_string());
    Ok(())
  })
  .into_node();
  let sink = Collector::<String>::new("sink").into_node();
  graph.set_kickstarter(&trigger.inputs().get("GO").unwrap()).unwrap();
  graph
    .connect(&trigger.outputs().get("OUT").unwrap(), &sink.inputs().get("IN").unwrap())
    .unwrap();
  // GO has no upstream; once the seed is consumed it must read as end of stream.
  trigger.inputs().get("GO").unwrap().set_optional(true);

  timeout(Duration::from_secs(5), graph.run()).await.unwrap().unwrap();
  assert_eq!(sink.values(), vec!["fired".to_string()]);
}

// ============================================================================
// Nesting
// ============================================================================

#[tokio::test]
async fn test_subgraph_exports_ports() {
  let parent = Multigraph::new("parent");
  let (source, sub, sink) = {
    let _scope = parent.enter();
    let source = GeneratorSource::new("source", vec![1i64, 2, 3]).into_node();
    let sub = Multigraph::new("sub");
    {
      let _inner = sub.enter();
      let double = doubler("double").into_node();
      sub
        .export_input(&double.inputs().get("IN").unwrap(), "IN")
        .unwrap();
      sub
        .export_output(&double.outputs().get("OUT").unwrap(), "OUT")
        .unwrap();
    }
    let sink = Collector::<i64>::new("sink").into_node();
    (source, sub, sink)
  };
  assert!(parent.has_node(sub.handle()));
  parent
    .connect(&source.outputs().get("OUT").unwrap(), &sub.inputs().get("IN").unwrap())
    .unwrap();
  parent
    .connect(&sub.outputs().get("OUT").unwrap(), &sink.inputs().get("IN").unwrap())
    .unwrap();

  // source, double, two adapters, sink
  assert_eq!(parent.iter_nodes().len(), 5);

  timeout(Duration::from_secs(5), parent.run()).await.unwrap().unwrap();
  assert_eq!(sink.values(), vec![2, 4, 6]);
}

#[tokio::test]
async fn test_initial_packet_on_subgraph_input() {
  let parent = Multigraph::new("parent");
  let (sub, sink) = {
    let _scope = parent.enter();
    let sub = Multigraph::new("sub");
    {
      let _inner = sub.enter();
      let square = Apply::new("square", &["IN"], &["OUT"], |inputs, outputs| {
        let x = inputs.get::<i64>("IN")?;
        outputs.set("OUT", x * x);
        Ok(())
      })
      .into_node();
      sub
        .export_input(&square.inputs().get("IN").unwrap(), "IN")
        .unwrap();
      sub
        .export_output(&square.outputs().get("OUT").unwrap(), "OUT")
        .unwrap();
    }
    let sink = Collector::<i64>::new("sink").into_node();
    (sub, sink)
  };
  parent
    .set_initial_packet(&sub.inputs().get("IN").unwrap(), 5i64)
    .unwrap();
  parent
    .connect(&sub.outputs().get("OUT").unwrap(), &sink.inputs().get("IN").unwrap())
    .unwrap();

  timeout(Duration::from_secs(5), parent.run()).await.unwrap().unwrap();
  assert_eq!(sink.values(), vec![25]);
  assert!(
    sub
      .iter_nodes()
      .iter()
      .all(|node| node.handle().state() == ComponentState::Completed)
  );
}

#[test]
fn test_nested_graph_inherits_workdir() {
  let parent = Multigraph::with_config("parent", GraphConfig::default().with_workdir("/data"));
  let sub = {
    let _scope = parent.enter();
    Multigraph::new("sub")
  };
  assert_eq!(sub.workdir(), PathBuf::from("/data"));

  let own = {
    let _scope = parent.enter();
    Multigraph::with_config("own", GraphConfig::default().with_workdir("/elsewhere"))
  };
  assert_eq!(own.workdir(), PathBuf::from("/elsewhere"));
  assert_eq!(Multigraph::new("lonely").workdir(), PathBuf::from("./"));
}

#[test]
fn test_dot_renders_nodes_clusters_and_iips() {
  let parent = Multigraph::new("top");
  let (source, sub) = {
    let _scope = parent.enter();
    let source = GeneratorSource::new("source", 0..1i64).into_node();
    let sub = Multigraph::new("inner");
    {
      let _inner = sub.enter();
      let double = doubler("double").into_node();
      sub.export_input(&double.inputs().get("IN").unwrap(), "IN").unwrap();
    }
    (source, sub)
  };
  parent
    .connect(&source.outputs().get("OUT").unwrap(), &sub.inputs().get("IN").unwrap())
    .unwrap();
  let lone = doubler("lone").into_node();
  parent
    .set_initial_packet(&lone.inputs().get("IN").unwrap(), 7i64)
    .unwrap();

  let dot = parent.dot();
  assert!(dot.starts_with("digraph \"top\" {"));
  assert!(dot.contains(&format!("subgraph cluster_{}", sub.handle().id())));
  assert!(dot.contains("source<BR/>(GeneratorSource)"));
  assert!(dot.contains("double<BR/>(Apply)"));
  assert!(dot.contains("label=\"7\""));
  let port = sub.inputs().get("IN").unwrap();
  assert!(dot.contains(&format!(
    "n{}:p{} -> p{};",
    source.handle().id(),
    source.outputs().get("OUT").unwrap().id(),
    port.id()
  )));
}
