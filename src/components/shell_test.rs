//! # Shell Test Suite
//!
//! Runs the file operator inside a graph whose working directory is a
//! temporary directory.

use crate::component::{Component, ComponentState};
use crate::components::{Collector, GeneratorSource, Shell};
use crate::config::GraphConfig;
use crate::error::{ComponentError, GraphError};
use crate::graph::Multigraph;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

struct Fixture {
  dir: TempDir,
  graph: Arc<Multigraph>,
  shell: Arc<Shell>,
  sink: Arc<Collector<PathBuf>>,
}

fn fixture(values: Vec<String>, shell: Shell) -> Fixture {
  let dir = TempDir::new().unwrap();
  let graph = Multigraph::with_config("files", GraphConfig::default().with_workdir(dir.path()));
  let source = GeneratorSource::new("names", values).into_node();
  let shell = Arc::new(shell);
  let sink = Collector::<PathBuf>::new("paths").into_node();
  graph.add_node(&shell);
  graph
    .connect(&source.outputs().get("OUT").unwrap(), &shell.inputs().get("IN").unwrap())
    .unwrap();
  graph
    .connect(&shell.outputs().get("OUT").unwrap(), &sink.inputs().get("IN").unwrap())
    .unwrap();
  Fixture {
    dir,
    graph,
    shell,
    sink,
  }
}

async fn run(graph: &Multigraph) -> Result<(), GraphError> {
  timeout(Duration::from_secs(10), graph.run()).await.unwrap()
}

#[tokio::test]
async fn test_shell_produces_files() {
  let shell = Shell::new("writer", "printf {inputs.IN} > {outputs.OUT}", &["IN"], &["OUT"])
    .dynamic_formatter("OUT", "{inputs.IN}.txt");
  let f = fixture(vec!["alpha".to_string(), "beta".to_string()], shell);

  run(&f.graph).await.unwrap();

  let paths = f.sink.values();
  assert_eq!(
    paths,
    vec![f.dir.path().join("alpha.txt"), f.dir.path().join("beta.txt")]
  );
  assert_eq!(std::fs::read_to_string(&paths[0]).unwrap(), "alpha");
  assert_eq!(std::fs::read_to_string(&paths[1]).unwrap(), "beta");
  assert_eq!(f.shell.handle().state(), ComponentState::Completed);
}

#[tokio::test]
async fn test_shell_skips_existing_outputs() {
  let shell = Shell::new("writer", "printf new > {outputs.OUT}", &["IN"], &["OUT"])
    .fixed_formatter("OUT", "result.txt");
  let f = fixture(vec!["x".to_string()], shell);
  let target = f.dir.path().join("result.txt");
  std::fs::write(&target, "old").unwrap();

  run(&f.graph).await.unwrap();

  assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
  assert_eq!(f.sink.values(), vec![target]);
}

#[tokio::test]
async fn test_shell_command_failure_cancels_graph() {
  let shell = Shell::new("failing", "echo boom >&2; exit 3", &["IN"], &["OUT"])
    .fixed_formatter("OUT", "never.txt");
  let f = fixture(vec!["x".to_string()], shell);

  let err = run(&f.graph).await.unwrap_err();
  match err {
    GraphError::ComponentFailed {
      component,
      source: ComponentError::CommandFailed { code, stderr, .. },
    } => {
      assert_eq!(component, "failing");
      assert_eq!(code, Some(3));
      assert_eq!(stderr, "boom");
    }
    other => panic!("unexpected error {other:?}"),
  }
  assert_eq!(f.shell.handle().state(), ComponentState::Failed);
  assert!(f.sink.values().is_empty());
}

#[tokio::test]
async fn test_shell_missing_outputs_after_command() {
  let shell = Shell::new("lazy", "true", &["IN"], &["OUT"]).fixed_formatter("OUT", "expected.txt");
  let f = fixture(vec!["x".to_string()], shell);

  let err = run(&f.graph).await.unwrap_err();
  match err {
    GraphError::ComponentFailed {
      source: ComponentError::FileNotExisting { paths, .. },
      ..
    } => assert_eq!(paths, vec![f.dir.path().join("expected.txt")]),
    other => panic!("unexpected error {other:?}"),
  }
}

#[tokio::test]
async fn test_shell_unknown_placeholder() {
  let shell = Shell::new("typo", "echo {inputs.nope} > {outputs.OUT}", &["IN"], &["OUT"])
    .fixed_formatter("OUT", "out.txt");
  let f = fixture(vec!["x".to_string()], shell);

  let err = run(&f.graph).await.unwrap_err();
  assert!(matches!(
    err,
    GraphError::ComponentFailed {
      source: ComponentError::FormatterMissing { .. },
      ..
    }
  ));
}
