//! Graph loader: the abstract `ModelGraph` representation the compiler
//! consumes, the `ModelSource` injection boundary, and the deterministic
//! topological sort used to fix a schedule order.

pub mod builder;

use std::collections::{HashMap, VecDeque};

use crate::error::{AccelError, AccelResult};

/// One dimension of a tensor shape: a known extent, or an unresolved `?`
/// (the ONNX-style dynamic-axis placeholder described in §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    Known(usize),
    Unknown,
}

/// A tensor shape as carried by the shape map.
pub type Shape = Vec<Dim>;

/// Total element count of a shape, treating any `Unknown` dimension as 0
/// (matching the reference `tensor_size` helper).
pub fn shape_size(shape: &Shape) -> usize {
    let mut size = 1usize;
    for dim in shape {
        match dim {
            Dim::Known(n) => size *= n,
            Dim::Unknown => return 0,
        }
    }
    size
}

/// The operator kinds this compiler understands (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    MatMul,
    Gemm,
    Add,
    Relu,
    Reshape,
}

/// One node of the computation graph: an operator plus its ordered input
/// and output tensor names.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub name: String,
    pub kind: NodeKind,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Whether an initializer is a weight matrix (rank ≥ 2) or a bias vector
/// (rank 1), per §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorKind {
    Weight,
    Bias,
}

/// A dense float initializer plus its shape and derived kind.
#[derive(Debug, Clone)]
pub struct Initializer {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
    pub kind: TensorKind,
}

/// The boundary to the training side (§6): anything that can enumerate
/// initializers, nodes, shapes and the graph's single input/output name
/// satisfies this trait. The compiler depends on nothing else about the
/// file format a model originally came from.
pub trait ModelSource {
    fn initializers(&self) -> &HashMap<String, Initializer>;
    fn nodes(&self) -> &[GraphNode];
    fn shape_of(&self, tensor: &str) -> Option<&Shape>;
    fn graph_input(&self) -> &str;
    fn graph_output(&self) -> &str;
}

/// An owned, in-memory `ModelGraph`. Implements [`ModelSource`] directly;
/// [`builder::GraphBuilder`] is the ergonomic way to construct one.
#[derive(Debug, Clone, Default)]
pub struct ModelGraph {
    pub nodes: Vec<GraphNode>,
    pub initializers: HashMap<String, Initializer>,
    pub shapes: HashMap<String, Shape>,
    pub input: String,
    pub output: String,
}

impl ModelSource for ModelGraph {
    fn initializers(&self) -> &HashMap<String, Initializer> {
        &self.initializers
    }
    fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }
    fn shape_of(&self, tensor: &str) -> Option<&Shape> {
        self.shapes.get(tensor)
    }
    fn graph_input(&self) -> &str {
        &self.input
    }
    fn graph_output(&self) -> &str {
        &self.output
    }
}

/// Classifies a raw initializer by rank: rank 1 is a bias, anything else
/// (rank ≥ 2) is a weight. Rank > 4 is rejected as `InvalidGraph` — the
/// scheduler's row/col collapse only handles up to 4 dimensions.
pub fn classify_initializer(shape: &[usize]) -> AccelResult<TensorKind> {
    match shape.len() {
        0 => Err(AccelError::InvalidGraph(
            "initializer has rank 0 (scalar initializers are not supported)".into(),
        )),
        1 => Ok(TensorKind::Bias),
        2..=4 => Ok(TensorKind::Weight),
        n => Err(AccelError::InvalidGraph(format!(
            "initializer has unsupported rank {n} (max 4)"
        ))),
    }
}

/// Collapses a weight's shape into `(rows, cols)`: all but the last
/// dimension multiply into `rows`, the last dimension is `cols`.
pub fn weight_rows_cols(shape: &[usize]) -> (usize, usize) {
    let cols = *shape.last().unwrap_or(&0);
    let rows = shape[..shape.len().saturating_sub(1)]
        .iter()
        .product::<usize>()
        .max(1);
    (rows, cols)
}

/// Deterministic topological sort (Kahn's algorithm, §4.2). Ties are
/// broken by original node order so the emitted schedule never depends on
/// hash-map iteration order.
pub fn topological_sort(nodes: &[GraphNode]) -> AccelResult<Vec<usize>> {
    // tensor name -> producing node index
    let mut producer: HashMap<&str, usize> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        for out in &node.outputs {
            producer.insert(out.as_str(), i);
        }
    }

    let mut indegree = vec![0usize; nodes.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for input in &node.inputs {
            if let Some(&parent) = producer.get(input.as_str()) {
                children[parent].push(i);
                indegree[i] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(i) = queue.pop_front() {
        order.push(i);
        // Stable order: scan children in original node order rather than
        // discovery order, so two runs over the same graph always produce
        // the same schedule.
        let mut newly_ready: Vec<usize> = Vec::new();
        for &child in &children[i] {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                newly_ready.push(child);
            }
        }
        newly_ready.sort_unstable();
        for child in newly_ready {
            queue.push_back(child);
        }
    }

    if order.len() != nodes.len() {
        return Err(AccelError::InvalidGraph(
            "graph contains a cycle (topological sort did not cover every node)".into(),
        ));
    }

    Ok(order)
}
