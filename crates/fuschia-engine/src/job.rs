//! A single unit of scheduled work (§3 "ExecutionJob"): one node, one arrival
//! of input data, at a given loop `run_index`.

use fuschia_value::Item;

#[derive(Debug, Clone)]
pub struct ExecutionJob {
  pub node_name: String,
  pub input_items: Vec<Item>,
  /// Which loop iteration this job belongs to — increments only when the
  /// edge that produced it left via a `"loop"`-named output port (§3, §9
  /// Open Question 2: "loop iteration scoping").
  pub run_index: u32,
}

impl ExecutionJob {
  pub fn new(node_name: impl Into<String>, input_items: Vec<Item>, run_index: u32) -> Self {
    Self { node_name: node_name.into(), input_items, run_index }
  }
}
