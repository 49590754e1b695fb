//! # Grouping Test Suite
//!
//! Product and Split, alone and chained inside a graph.

use crate::component::Component;
use crate::components::{Collector, GeneratorSource, Product, Split};
use crate::graph::Multigraph;
use crate::port::Port;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_product_emits_bracket_groups() {
  let product = Product::new("product");
  let a = Port::output("a");
  let b = Port::output("b");
  let out = Port::input("out");
  a.connect(&product.inputs().get("IN_1").unwrap()).unwrap();
  b.connect(&product.inputs().get("IN_2").unwrap()).unwrap();
  product.outputs().get("OUT").unwrap().connect(&out).unwrap();

  for i in 0..2i32 {
    a.send(i).await.unwrap();
  }
  a.close().await.unwrap();
  b.send("x").await.unwrap();
  b.close().await.unwrap();

  product.run().await.unwrap();
  let mut groups = Vec::new();
  while let Ok(group) = out.receive_group().await {
    groups.push((
      *group[0].value::<i32>().unwrap(),
      *group[1].value::<&str>().unwrap(),
    ));
  }
  assert_eq!(groups, vec![(0, "x"), (1, "x")]);
  assert_eq!(product.handle().owned_packets(), 0);
}

#[tokio::test]
async fn test_split_sends_each_element_on_its_port() {
  let split = Split::new("split");
  let up = Port::output("up");
  let first = Port::input("first");
  let second = Port::input("second");
  up.connect(&split.inputs().get("IN").unwrap()).unwrap();
  split.outputs().get("OUT_1").unwrap().connect(&first).unwrap();
  split.outputs().get("OUT_2").unwrap().connect(&second).unwrap();

  up.send_group(vec![1u8, 2]).await.unwrap();
  up.send(3u8).await.unwrap();
  up.send_group(vec![4u8, 5, 6]).await.unwrap();
  up.close().await.unwrap();

  let err = split.run().await.unwrap_err();
  assert!(!err.is_end_of_stream(), "a group of three cannot be split in two");

  assert_eq!(*first.receive::<u8>().await.unwrap(), 1);
  assert_eq!(*second.receive::<u8>().await.unwrap(), 2);
  assert_eq!(*first.receive::<u8>().await.unwrap(), 3);
}

#[tokio::test]
async fn test_product_split_pipeline() {
  let graph = Multigraph::new("product_split");
  let (left, right) = {
    let _scope = graph.enter();
    let gen_a = GeneratorSource::new("range_a", 0..3i64).into_node();
    let gen_b = GeneratorSource::new("range_b", 0..3i64).into_node();
    let product = Product::new("product").into_node();
    let split = Split::new("split").into_node();
    let left = Collector::<i64>::new("left").into_node();
    let right = Collector::<i64>::new("right").into_node();

    graph
      .connect(&gen_a.outputs().get("OUT").unwrap(), &product.inputs().get("IN_1").unwrap())
      .unwrap();
    graph
      .connect(&gen_b.outputs().get("OUT").unwrap(), &product.inputs().get("IN_2").unwrap())
      .unwrap();
    graph
      .connect(&product.outputs().get("OUT").unwrap(), &split.inputs().get("IN").unwrap())
      .unwrap();
    graph
      .connect(&split.outputs().get("OUT_1").unwrap(), &left.inputs().get("IN").unwrap())
      .unwrap();
    graph
      .connect(&split.outputs().get("OUT_2").unwrap(), &right.inputs().get("IN").unwrap())
      .unwrap();
    (left, right)
  };

  timeout(Duration::from_secs(5), graph.run())
    .await
    .unwrap()
    .unwrap();

  let firsts = left.values();
  let seconds = right.values();
  assert_eq!(firsts.len(), 9);
  assert_eq!(seconds.len(), 9);
  let pairs: HashSet<(i64, i64)> = firsts.into_iter().zip(seconds).collect();
  let expected: HashSet<(i64, i64)> = (0..3).flat_map(|a| (0..3).map(move |b| (a, b))).collect();
  assert_eq!(pairs, expected);
}
