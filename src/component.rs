//! # Components
//!
//! A component is the unit of concurrent execution. It owns an input and an
//! output [`PortRegister`], and exposes one async entry point,
//! [`Component::run`], that the scheduler drives as its own task.
//!
//! ## Authoring contract
//!
//! - Declare ports at construction time, through [`ComponentCore`].
//! - In `run()`, receive from inputs and send to outputs. Returning the
//!   end-of-stream error from a receive (usually via `?`) is a normal way to
//!   finish.
//! - Close outputs when done. The scheduler closes whatever is still open
//!   after `run()` returns, so downstream components never hang.
//! - Never mutate payloads; `copy()` a foreign packet before re-sending it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use flowweave::{Component, ComponentCore, ComponentError};
//!
//! struct Doubler {
//!   core: ComponentCore,
//! }
//!
//! #[async_trait]
//! impl Component for Doubler {
//!   fn core(&self) -> &ComponentCore {
//!     &self.core
//!   }
//!
//!   async fn run(&self) -> Result<(), ComponentError> {
//!     let input = self.inputs().get("IN")?;
//!     let output = self.outputs().get("OUT")?;
//!     loop {
//!       let value = input.receive::<i64>().await?;
//!       output.send(*value * 2).await?;
//!     }
//!   }
//! }
//!
//! let doubler = Doubler {
//!   core: ComponentCore::with_ports("doubler", &["IN"], &["OUT"]),
//! }
//! .into_node();
//! ```

use crate::error::{ComponentError, PortError};
use crate::graph::Multigraph;
use crate::packet::PacketId;
use crate::port::Port;
use crate::register::PortRegister;
use crate::scope;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use tracing::warn;

/// Process-unique component identifier.
pub type ComponentId = u64;

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a component as driven by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
  /// Built, not yet part of a graph.
  Constructed,
  /// Member of a graph.
  Registered,
  /// Its task is running.
  Running,
  /// `run()` returned normally or on end of stream.
  Completed,
  /// `run()` returned an error.
  Failed,
  /// Aborted because another component failed.
  Cancelled,
}

impl ComponentState {
  fn from_u8(value: u8) -> Self {
    match value {
      0 => ComponentState::Constructed,
      1 => ComponentState::Registered,
      2 => ComponentState::Running,
      3 => ComponentState::Completed,
      4 => ComponentState::Failed,
      _ => ComponentState::Cancelled,
    }
  }
}

/// Display colour of a component; purely diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  /// Not currently executing.
  Idle,
  /// Executing its `run()`.
  Active,
}

impl Status {
  /// Colour used for this status in DOT output.
  pub fn color(self) -> &'static str {
    match self {
      Status::Idle => "grey",
      Status::Active => "green",
    }
  }
}

/// What a component inherits from the graph it is registered in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphContext {
  /// Name of the owning graph.
  pub graph: String,
  /// Working directory of the owning graph.
  pub workdir: PathBuf,
}

struct HandleInner {
  id: ComponentId,
  name: String,
  ledger: Mutex<HashSet<PacketId>>,
  node: OnceLock<Weak<dyn Component>>,
  state: AtomicU8,
  active: AtomicU8,
  context: RwLock<Option<GraphContext>>,
}

/// Shared identity of a component.
///
/// Ports and packets point back at their owner through this handle. It holds
/// the packet ledger, the lifecycle state and the graph context, and a weak
/// link to the component object itself so that a graph can register a
/// component reached only through one of its ports.
#[derive(Clone)]
pub struct ComponentHandle {
  inner: Arc<HandleInner>,
}

impl ComponentHandle {
  /// Creates a handle for a component named `name`.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      inner: Arc::new(HandleInner {
        id: NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed),
        name: name.into(),
        ledger: Mutex::new(HashSet::new()),
        node: OnceLock::new(),
        state: AtomicU8::new(ComponentState::Constructed as u8),
        active: AtomicU8::new(0),
        context: RwLock::new(None),
      }),
    }
  }

  /// Returns the component identifier.
  pub fn id(&self) -> ComponentId {
    self.inner.id
  }

  /// Returns the component name.
  pub fn name(&self) -> &str {
    &self.inner.name
  }

  /// Charges packet `id` to this component.
  pub fn register_packet(&self, id: PacketId) {
    if let Ok(mut ledger) = self.inner.ledger.lock() {
      ledger.insert(id);
    }
  }

  /// Releases packet `id` from this component.
  ///
  /// Releasing a packet that is not registered is logged as a warning: it
  /// means the packet was dropped by someone other than its owner.
  pub fn deregister_packet(&self, id: PacketId) {
    let removed = self
      .inner
      .ledger
      .lock()
      .map(|mut ledger| ledger.remove(&id))
      .unwrap_or(false);
    if !removed {
      warn!(component = %self.name(), packet = id, "dropped a packet it does not own");
    }
  }

  /// Number of packets currently charged to this component.
  pub fn owned_packets(&self) -> usize {
    self.inner.ledger.lock().map(|ledger| ledger.len()).unwrap_or(0)
  }

  /// Returns the lifecycle state.
  pub fn state(&self) -> ComponentState {
    ComponentState::from_u8(self.inner.state.load(Ordering::Acquire))
  }

  pub(crate) fn set_state(&self, state: ComponentState) {
    self.inner.state.store(state as u8, Ordering::Release);
  }

  /// Returns the diagnostic status flag.
  pub fn status(&self) -> Status {
    if self.inner.active.load(Ordering::Acquire) == 1 {
      Status::Active
    } else {
      Status::Idle
    }
  }

  /// Marks the component as active.
  pub fn active(&self) {
    self.inner.active.store(1, Ordering::Release);
  }

  /// Marks the component as idle.
  pub fn inactive(&self) {
    self.inner.active.store(0, Ordering::Release);
  }

  /// Returns the graph context, once registered.
  pub fn context(&self) -> Option<GraphContext> {
    self.inner.context.read().ok().and_then(|ctx| ctx.clone())
  }

  pub(crate) fn set_context(&self, context: GraphContext) {
    if let Ok(mut slot) = self.inner.context.write() {
      *slot = Some(context);
    }
  }

  /// Working directory inherited from the owning graph (`./` if none).
  pub fn workdir(&self) -> PathBuf {
    self
      .context()
      .map(|ctx| ctx.workdir)
      .unwrap_or_else(|| PathBuf::from("./"))
  }

  pub(crate) fn bind(&self, node: Weak<dyn Component>) {
    let _ = self.inner.node.set(node);
  }

  /// Returns the component object, if it was built with [`Component::into_node`].
  pub fn node(&self) -> Option<Arc<dyn Component>> {
    self.inner.node.get().and_then(Weak::upgrade)
  }
}

impl PartialEq for ComponentHandle {
  fn eq(&self, other: &Self) -> bool {
    self.inner.id == other.inner.id
  }
}

impl Eq for ComponentHandle {}

impl fmt::Debug for ComponentHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ComponentHandle")
      .field("id", &self.inner.id)
      .field("name", &self.inner.name)
      .field("state", &self.state())
      .finish()
  }
}

impl fmt::Display for ComponentHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.inner.name)
  }
}

/// The state every component carries: its handle and its two port registers.
pub struct ComponentCore {
  handle: ComponentHandle,
  inputs: PortRegister,
  outputs: PortRegister,
}

impl ComponentCore {
  /// Creates a core with empty registers.
  pub fn new(name: impl Into<String>) -> Self {
    let handle = ComponentHandle::new(name);
    Self {
      inputs: PortRegister::new(handle.clone()),
      outputs: PortRegister::new(handle.clone()),
      handle,
    }
  }

  /// Creates a core with the named input and output ports.
  ///
  /// # Panics
  ///
  /// If a port name is declared twice in the same direction. Use
  /// [`ComponentCore::try_with_ports`] when the names come from user input.
  pub fn with_ports(name: impl Into<String>, inputs: &[&str], outputs: &[&str]) -> Self {
    let name = name.into();
    match Self::try_with_ports(name.clone(), inputs, outputs) {
      Ok(core) => core,
      Err(err) => panic!("component {name}: {err}"),
    }
  }

  /// Creates a core with the named input and output ports.
  ///
  /// # Errors
  ///
  /// [`PortError::AlreadyExisting`] if a name repeats within `inputs` or
  /// within `outputs`.
  pub fn try_with_ports(
    name: impl Into<String>,
    inputs: &[&str],
    outputs: &[&str],
  ) -> Result<Self, PortError> {
    let core = Self::new(name);
    for input in inputs {
      core.add_input(Port::input(*input))?;
    }
    for output in outputs {
      core.add_output(Port::output(*output))?;
    }
    Ok(core)
  }

  /// Adds an input port, returning the registered handle.
  ///
  /// # Errors
  ///
  /// [`PortError::AlreadyExisting`] if the port already belongs to a
  /// component or the name is taken.
  pub fn add_input(&self, port: Port) -> Result<Port, PortError> {
    self.inputs.add(port)
  }

  /// Adds an output port, returning the registered handle.
  ///
  /// # Errors
  ///
  /// Same conditions as [`ComponentCore::add_input`].
  pub fn add_output(&self, port: Port) -> Result<Port, PortError> {
    self.outputs.add(port)
  }

  /// Returns the component handle.
  pub fn handle(&self) -> &ComponentHandle {
    &self.handle
  }

  /// Returns the component name.
  pub fn name(&self) -> &str {
    self.handle.name()
  }

  /// Returns the input register.
  pub fn inputs(&self) -> &PortRegister {
    &self.inputs
  }

  /// Returns the output register.
  pub fn outputs(&self) -> &PortRegister {
    &self.outputs
  }
}

/// The unit of concurrent execution in a flow graph.
#[async_trait]
pub trait Component: Send + Sync + 'static {
  /// Returns the shared component state.
  fn core(&self) -> &ComponentCore;

  /// The component's execution entry point.
  async fn run(&self) -> Result<(), ComponentError>;

  /// Returns the component name.
  fn name(&self) -> &str {
    self.core().name()
  }

  /// Returns the component handle.
  fn handle(&self) -> &ComponentHandle {
    self.core().handle()
  }

  /// Returns the input register.
  fn inputs(&self) -> &PortRegister {
    self.core().inputs()
  }

  /// Returns the output register.
  fn outputs(&self) -> &PortRegister {
    self.core().outputs()
  }

  /// Short type name, used in diagnostics.
  fn kind(&self) -> &'static str {
    short_type_name(std::any::type_name::<Self>())
  }

  /// Members of a composite component; empty for leaves.
  fn children(&self) -> Vec<Arc<dyn Component>> {
    Vec::new()
  }

  /// The graph, if this component is one.
  fn as_graph(&self) -> Option<&Multigraph> {
    None
  }

  /// Closes every output port, propagating end of stream downstream.
  async fn close_downstream(&self) -> Result<(), PortError> {
    self.outputs().close_all().await
  }

  /// Moves the component behind an `Arc`, binds its handle, and registers it
  /// with the graph whose construction scope is active, if any.
  fn into_node(self) -> Arc<Self>
  where
    Self: Sized,
  {
    let node = bind_node(self);
    if let Some(graph) = scope::current() {
      graph.add_dyn(node.clone());
    }
    node
  }
}

/// Moves `component` behind an `Arc` and binds its handle, without touching
/// any construction scope.
pub(crate) fn bind_node<C: Component>(component: C) -> Arc<C> {
  let node = Arc::new(component);
  let as_dyn: Arc<dyn Component> = node.clone();
  node.handle().bind(Arc::downgrade(&as_dyn));
  node
}

/// Flattens a component into the leaves the scheduler runs.
pub fn iter_nodes(node: &Arc<dyn Component>) -> Vec<Arc<dyn Component>> {
  let children = node.children();
  if children.is_empty() && node.as_graph().is_none() {
    return vec![Arc::clone(node)];
  }
  children.iter().flat_map(iter_nodes).collect()
}

fn short_type_name(full: &'static str) -> &'static str {
  let base = full.split('<').next().unwrap_or(full);
  base.rsplit("::").next().unwrap_or(base)
}
