//! # Multigraph
//!
//! The composition root and scheduler. A [`Multigraph`] owns its member
//! components (sub-graphs included), wires their ports and drives them.
//!
//! ## Construction
//!
//! Components join a graph in one of three ways:
//!
//! - explicitly, with [`Multigraph::add_node`]
//! - implicitly, when one of their ports is passed to [`Multigraph::connect`]
//! - implicitly, when they are finished with
//!   [`Component::into_node`] while the graph's [`Multigraph::enter`] scope
//!   is active
//!
//! ```rust,no_run
//! use flowweave::{Collector, Component, GeneratorSource, Multigraph};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = Multigraph::new("numbers");
//! let (source, sink) = {
//!   let _scope = graph.enter();
//!   let source = GeneratorSource::new("source", 0..5i64).into_node();
//!   let sink = Collector::<i64>::new("sink").into_node();
//!   (source, sink)
//! };
//! graph.connect(&source.outputs().get("OUT")?, &sink.inputs().get("IN")?)?;
//! graph.run().await?;
//! assert_eq!(sink.values(), vec![0, 1, 2, 3, 4]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Execution
//!
//! [`Multigraph::run`] flattens the graph into its leaf components and spawns
//! one tokio task per leaf. Nested graphs are not tasks of their own: their
//! members are scheduled on the same runtime as everybody else. The run ends
//! when every task has finished. The first failure is logged, every other
//! task is aborted, and the failure is returned naming the component.

use crate::component::{
  Component, ComponentCore, ComponentHandle, ComponentState, GraphContext, bind_node, iter_nodes,
};
use crate::config::GraphConfig;
use crate::connection::Connection;
use crate::dot;
use crate::error::{ComponentError, GraphError, PortError};
use crate::port::Port;
use crate::scope::GraphScope;
use crate::subgraph::{SubIn, SubOut};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// A directed multigraph of components; itself a component, so graphs nest.
pub struct Multigraph {
  core: ComponentCore,
  config: RwLock<GraphConfig>,
  members: Mutex<Vec<Arc<dyn Component>>>,
}

impl Multigraph {
  /// Creates an empty graph with default configuration.
  pub fn new(name: impl Into<String>) -> Arc<Self> {
    Self::with_config(name, GraphConfig::default())
  }

  /// Creates an empty graph.
  ///
  /// Inside another graph's construction scope the new graph becomes a
  /// member of it.
  pub fn with_config(name: impl Into<String>, config: GraphConfig) -> Arc<Self> {
    Multigraph {
      core: ComponentCore::new(name),
      config: RwLock::new(config),
      members: Mutex::new(Vec::new()),
    }
    .into_node()
  }

  /// Returns a copy of the configuration.
  pub fn config(&self) -> GraphConfig {
    self
      .config
      .read()
      .map(|config| config.clone())
      .unwrap_or_default()
  }

  /// Sets the working directory.
  pub fn set_workdir(&self, workdir: impl Into<PathBuf>) {
    if let Ok(mut config) = self.config.write() {
      config.workdir = Some(workdir.into());
    }
  }

  /// Effective working directory: the configured one, else the parent
  /// graph's, else `./`.
  pub fn workdir(&self) -> PathBuf {
    self
      .config()
      .workdir
      .unwrap_or_else(|| self.handle().workdir())
  }

  /// Makes this graph the implicit registration target on this thread until
  /// the returned guard is dropped.
  pub fn enter(self: &Arc<Self>) -> GraphScope {
    GraphScope::push(Arc::clone(self))
  }

  fn context(&self) -> GraphContext {
    GraphContext {
      graph: self.name().to_string(),
      workdir: self.workdir(),
    }
  }

  fn lock_members(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn Component>>> {
    match self.members.lock() {
      Ok(members) => members,
      Err(poisoned) => poisoned.into_inner(),
    }
  }

  /// Registers `node` as a member.
  pub fn add_node<C: Component>(&self, node: &Arc<C>) {
    self.add_dyn(node.clone());
  }

  /// Registers a type-erased member. Adding a member twice, or the graph to
  /// itself, is a no-op.
  pub fn add_dyn(&self, node: Arc<dyn Component>) {
    if *node.handle() == *self.handle() || self.has_node(node.handle()) {
      return;
    }
    node.handle().set_context(self.context());
    node.handle().set_state(ComponentState::Registered);
    debug!(graph = %self.name(), component = %node.name(), "registered");
    self.lock_members().push(node);
  }

  /// Returns `true` if the component is a member, directly or through a
  /// nested graph.
  pub fn has_node(&self, handle: &ComponentHandle) -> bool {
    self.nodes().iter().any(|node| {
      node.handle() == handle || node.as_graph().is_some_and(|graph| graph.has_node(handle))
    })
  }

  /// Direct members, in registration order.
  pub fn nodes(&self) -> Vec<Arc<dyn Component>> {
    self.lock_members().clone()
  }

  /// Leaf components, nested graphs flattened.
  pub fn iter_nodes(&self) -> Vec<Arc<dyn Component>> {
    self.nodes().iter().flat_map(iter_nodes).collect()
  }

  /// Every connection inside the graph, as `(source, destination)` pairs.
  pub fn iter_arcs(&self) -> Vec<(Port, Port)> {
    let mut sources: Vec<Port> = self.outputs().ports();
    self.collect_outputs(&mut sources);
    let mut arcs = Vec::new();
    for port in sources {
      for connection in port.connections() {
        if let Some(destination) = connection.destination() {
          arcs.push((port.clone(), destination));
        }
      }
    }
    arcs
  }

  fn collect_outputs(&self, into: &mut Vec<Port>) {
    for node in self.nodes() {
      into.extend(node.outputs().ports());
      if let Some(graph) = node.as_graph() {
        graph.collect_outputs(into);
      }
    }
  }

  fn ensure_member(&self, port: &Port) -> Result<(), GraphError> {
    let owner = port.component().ok_or_else(|| GraphError::Unregistered {
      port: port.qualified_name(),
    })?;
    if owner == *self.handle() || self.has_node(&owner) {
      return Ok(());
    }
    let node = owner.node().ok_or_else(|| GraphError::Unregistered {
      port: port.qualified_name(),
    })?;
    self.add_dyn(node);
    Ok(())
  }

  /// Connects `source` to `destination`, registering both owners if needed.
  ///
  /// The connection uses the graph's configured capacity.
  pub fn connect(&self, source: &Port, destination: &Port) -> Result<Connection, GraphError> {
    self.ensure_member(source)?;
    self.ensure_member(destination)?;
    let connection = source.connect_with(destination, self.config().connection_capacity)?;
    Ok(connection)
  }

  /// Pre-loads a one-shot initial packet on `port`.
  pub fn set_initial_packet<T>(&self, port: &Port, value: T) -> Result<(), GraphError>
  where
    T: Any + Send + Sync + fmt::Debug,
  {
    self.ensure_member(port)?;
    port.set_initial_packet(value)?;
    Ok(())
  }

  /// Seeds `port` with a content-free kickstart packet.
  pub fn set_kickstarter(&self, port: &Port) -> Result<(), GraphError> {
    self.ensure_member(port)?;
    port.kickstart()?;
    Ok(())
  }

  /// Seeds `port` with `value`, delivered before live traffic.
  pub fn set_seed_packet<T: Any + Send + Sync>(&self, port: &Port, value: T) -> Result<(), GraphError> {
    self.ensure_member(port)?;
    port.seed(value)?;
    Ok(())
  }

  /// Exposes the inner input port `inner` as this graph's input `name`.
  ///
  /// Returns the boundary port; a pass-through adapter forwards what arrives
  /// on it to `inner`.
  pub fn export_input(&self, inner: &Port, name: &str) -> Result<Port, GraphError> {
    if !inner.is_input() {
      return Err(
        PortError::OutputOnly {
          port: inner.qualified_name(),
        }
        .into(),
      );
    }
    self.ensure_member(inner)?;
    let boundary = Port::input(name);
    boundary.set_optional(inner.is_optional());
    let boundary = self.inputs().add(boundary)?;
    let adapter = bind_node(SubIn::new(
      format!("{}.{}", self.name(), name),
      boundary.clone(),
    ));
    self.add_node(&adapter);
    self.connect(&adapter.outputs().get(SubIn::OUT)?, inner)?;
    Ok(boundary)
  }

  /// Exposes the inner output port `inner` as this graph's output `name`.
  pub fn export_output(&self, inner: &Port, name: &str) -> Result<Port, GraphError> {
    if !inner.is_output() {
      return Err(
        PortError::InputOnly {
          port: inner.qualified_name(),
        }
        .into(),
      );
    }
    self.ensure_member(inner)?;
    let boundary = Port::output(name);
    boundary.set_optional(inner.is_optional());
    let boundary = self.outputs().add(boundary)?;
    let adapter = bind_node(SubOut::new(
      format!("{}.{}", self.name(), name),
      boundary.clone(),
    ));
    self.add_node(&adapter);
    self.connect(inner, &adapter.inputs().get(SubOut::IN)?)?;
    Ok(boundary)
  }

  /// Renders the topology in Graphviz DOT.
  pub fn dot(&self) -> String {
    dot::render(self)
  }

  fn propagate_context(&self) {
    let context = self.context();
    for node in self.nodes() {
      node.handle().set_context(context.clone());
      if let Some(graph) = node.as_graph() {
        graph.propagate_context();
      }
    }
  }

  /// Runs every leaf component until all have finished.
  ///
  /// # Errors
  ///
  /// [`GraphError::ComponentFailed`] for the first component whose `run()`
  /// failed (end of stream excepted) or panicked. All other tasks are
  /// aborted before this returns; they end up
  /// [`ComponentState::Cancelled`].
  pub async fn run(&self) -> Result<(), GraphError> {
    let span = info_span!("graph", graph = %self.name());
    async move {
      self.propagate_context();
      let leaves = self.iter_nodes();
      info!(components = leaves.len(), workdir = %self.workdir().display(), "starting graph");

      let mut tasks = JoinSet::new();
      for node in &leaves {
        node.handle().set_state(ComponentState::Running);
        let span = info_span!("component", component = %node.name(), kind = node.kind());
        tasks.spawn(drive(Arc::clone(node)).instrument(span));
      }

      let mut failure: Option<GraphError> = None;
      while let Some(joined) = tasks.join_next().await {
        let (component, result) = match joined {
          Ok(outcome) => outcome,
          Err(err) if err.is_cancelled() => continue,
          Err(err) => ("<unknown>".to_string(), Err(ComponentError::Panicked(err.to_string()))),
        };
        if let Err(source) = result {
          if failure.is_none() {
            error!(component = %component, error = %source, "component failed, cancelling graph");
            tasks.abort_all();
            failure = Some(GraphError::ComponentFailed { component, source });
          } else {
            warn!(component = %component, error = %source, "component failed during cancellation");
          }
        }
      }

      for node in &leaves {
        if node.handle().state() == ComponentState::Running {
          node.handle().set_state(ComponentState::Cancelled);
        }
        node.handle().inactive();
      }

      match failure {
        Some(err) => Err(err),
        None => {
          info!("graph completed");
          Ok(())
        }
      }
    }
    .instrument(span)
    .await
  }
}

/// Runs one component to completion and settles its lifecycle state.
async fn drive(node: Arc<dyn Component>) -> (String, Result<(), ComponentError>) {
  let handle = node.handle().clone();
  handle.active();
  let outcome = AssertUnwindSafe(node.run()).catch_unwind().await;
  handle.inactive();

  let mut result = match outcome {
    Ok(Ok(())) => Ok(()),
    Ok(Err(err)) if err.is_end_of_stream() => {
      debug!(reason = %err, "stopped on end of stream");
      Ok(())
    }
    Ok(Err(err)) => Err(err),
    Err(panic) => Err(ComponentError::Panicked(panic_message(panic.as_ref()))),
  };

  if result.is_ok() {
    if let Err(err) = node.close_downstream().await {
      result = Err(err.into());
    }
  }

  match &result {
    Ok(()) => {
      handle.set_state(ComponentState::Completed);
      let leaked = handle.owned_packets();
      if leaked > 0 {
        warn!(leaked, "component finished while still owning packets");
      }
      debug!("completed");
    }
    Err(_) => handle.set_state(ComponentState::Failed),
  }
  (handle.name().to_string(), result)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(message) = panic.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = panic.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic".to_string()
  }
}

#[async_trait]
impl Component for Multigraph {
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  /// Runs the graph standalone. Inside a parent graph this is never called:
  /// the parent schedules the members directly.
  async fn run(&self) -> Result<(), ComponentError> {
    Multigraph::run(self).await.map_err(ComponentError::from)
  }

  fn children(&self) -> Vec<Arc<dyn Component>> {
    self.nodes()
  }

  fn as_graph(&self) -> Option<&Multigraph> {
    Some(self)
  }
}

impl fmt::Debug for Multigraph {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Multigraph")
      .field("name", &self.name())
      .field("members", &self.nodes().iter().map(|n| n.name().to_string()).collect::<Vec<_>>())
      .finish()
  }
}
