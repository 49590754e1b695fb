//! # Construction Scope
//!
//! While a [`GraphScope`] guard is alive, components finished with
//! [`Component::into_node`](crate::Component::into_node) on the same thread
//! register themselves with its graph. Scopes nest: a sub-graph entered
//! inside its parent's scope becomes the implicit target until its guard is
//! dropped, after which the parent is restored.
//!
//! The stack is thread-local and holds weak references, so a scope never
//! keeps a graph alive on its own.

use crate::graph::Multigraph;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

thread_local! {
  static SCOPES: RefCell<Vec<Weak<Multigraph>>> = const { RefCell::new(Vec::new()) };
}

/// Returns the graph whose construction scope is innermost on this thread.
pub fn current() -> Option<Arc<Multigraph>> {
  SCOPES.with(|scopes| scopes.borrow().last().and_then(Weak::upgrade))
}

/// Guard returned by [`Multigraph::enter`]; leaving it restores the previous scope.
#[must_use = "the scope ends as soon as the guard is dropped"]
pub struct GraphScope {
  graph: Arc<Multigraph>,
  // Tied to the thread whose stack it pushed onto.
  _not_send: PhantomData<*const ()>,
}

impl GraphScope {
  pub(crate) fn push(graph: Arc<Multigraph>) -> Self {
    SCOPES.with(|scopes| scopes.borrow_mut().push(Arc::downgrade(&graph)));
    Self {
      graph,
      _not_send: PhantomData,
    }
  }

  /// The graph this scope registers into.
  pub fn graph(&self) -> &Arc<Multigraph> {
    &self.graph
  }
}

impl Drop for GraphScope {
  fn drop(&mut self) {
    SCOPES.with(|scopes| {
      let mut scopes = scopes.borrow_mut();
      if let Some(pos) = scopes
        .iter()
        .rposition(|entry| entry.as_ptr() == Arc::as_ptr(&self.graph))
      {
        scopes.remove(pos);
      }
    });
  }
}
