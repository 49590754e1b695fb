//! Graphviz rendering of a [`Multigraph`].
//!
//! Leaf components are HTML-like tables: a row of input ports, the component
//! name coloured by status, a row of output ports. Nested graphs become
//! `cluster_` subgraphs whose boundary ports are small circles. Pending
//! initial packets are rendered as rounded boxes feeding their port. The
//! output is for humans; nothing reads it back.

use crate::component::Component;
use crate::graph::Multigraph;
use crate::port::Port;
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;

pub(crate) fn render(graph: &Multigraph) -> String {
  let mut leaves = HashSet::new();
  collect_leaves(graph, &mut leaves);

  let mut out = String::new();
  let _ = writeln!(out, "digraph \"{}\" {{", escape(graph.name()));
  let _ = writeln!(out, "  graph [bgcolor=white, margin=0, rankdir=TB];");
  let _ = writeln!(out, "  node [shape=plaintext];");
  render_body(graph, &leaves, &mut out, 1);
  for (source, destination) in graph.iter_arcs() {
    let _ = writeln!(
      out,
      "  {} -> {};",
      endpoint(&source, &leaves),
      endpoint(&destination, &leaves)
    );
  }
  out.push_str("}\n");
  out
}

fn collect_leaves(graph: &Multigraph, leaves: &mut HashSet<u64>) {
  for node in graph.nodes() {
    match node.as_graph() {
      Some(inner) => collect_leaves(inner, leaves),
      None => {
        leaves.insert(node.handle().id());
      }
    }
  }
}

fn render_body(graph: &Multigraph, leaves: &HashSet<u64>, out: &mut String, depth: usize) {
  let pad = "  ".repeat(depth);
  for node in graph.nodes() {
    match node.as_graph() {
      Some(inner) => {
        let _ = writeln!(out, "{}subgraph cluster_{} {{", pad, inner.handle().id());
        let _ = writeln!(out, "{}  label=\"{}\";", pad, escape(inner.name()));
        let _ = writeln!(out, "{}  color=blue;", pad);
        for port in inner.inputs().ports().iter().chain(inner.outputs().ports().iter()) {
          let _ = writeln!(
            out,
            "{}  p{} [shape=circle, label=\"{}\"];",
            pad,
            port.id(),
            escape(&port.name())
          );
        }
        render_body(inner, leaves, out, depth + 1);
        let _ = writeln!(out, "{}}}", pad);
      }
      None => render_leaf(&node, leaves, out, &pad),
    }
  }
}

fn render_leaf(node: &Arc<dyn Component>, leaves: &HashSet<u64>, out: &mut String, pad: &str) {
  let id = node.handle().id();
  let row = |ports: Vec<Port>| {
    if ports.is_empty() {
      return String::new();
    }
    let cells: String = ports
      .iter()
      .map(|port| format!("<TD PORT=\"p{}\">{}</TD>", port.id(), escape(&port.name())))
      .collect();
    format!("<TR>{}</TR>", cells)
  };
  let _ = writeln!(
    out,
    "{}n{} [label=<<TABLE BORDER=\"0\" CELLBORDER=\"1\" CELLSPACING=\"0\">{}<TR><TD COLSPAN=\"10\" BGCOLOR=\"{}\">{}<BR/>({})</TD></TR>{}</TABLE>>];",
    pad,
    id,
    row(node.inputs().ports()),
    node.handle().status().color(),
    escape(node.name()),
    node.kind(),
    row(node.outputs().ports()),
  );
  for (port, label) in node.inputs().pending_initials() {
    let _ = writeln!(
      out,
      "{}iip{} [shape=box, style=rounded, label=\"{}\"];",
      pad,
      port.id(),
      escape(&label)
    );
    let _ = writeln!(out, "{}iip{} -> {};", pad, port.id(), endpoint(&port, leaves));
  }
}

fn endpoint(port: &Port, leaves: &HashSet<u64>) -> String {
  match port.component() {
    Some(owner) if leaves.contains(&owner.id()) => format!("n{}:p{}", owner.id(), port.id()),
    _ => format!("p{}", port.id()),
  }
}

fn escape(text: &str) -> String {
  text
    .replace('&', "&amp;")
    .replace('"', "&quot;")
    .replace('<', "&lt;")
    .replace('>', "&gt;")
}
