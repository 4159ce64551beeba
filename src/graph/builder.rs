//! An ergonomic, in-memory way to build a [`ModelGraph`] via a builder-method
//! chain. This is the crate's one built-in [`ModelSource`]; loading a
//! specific on-disk interchange format is left to the caller.

use std::collections::HashMap;

use super::{Dim, GraphNode, Initializer, ModelGraph, NodeKind, Shape, TensorKind};

/// Incrementally assembles a [`ModelGraph`] by adding initializers and
/// nodes in any order, then fixing the graph's single input/output names.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: ModelGraph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a weight or bias initializer. `shape` determines the
    /// [`TensorKind`] (rank 1 is a bias, rank ≥ 2 is a weight).
    pub fn initializer(mut self, name: &str, data: Vec<f32>, shape: Vec<usize>) -> Self {
        let kind = match shape.len() {
            1 => TensorKind::Bias,
            _ => TensorKind::Weight,
        };
        self.graph
            .initializers
            .insert(name.to_string(), Initializer { data, shape, kind });
        self
    }

    /// Records a known shape for a (non-initializer) tensor, e.g. an
    /// activation appearing between two layers.
    pub fn shape(mut self, tensor: &str, dims: &[usize]) -> Self {
        let shape: Shape = dims.iter().map(|&d| Dim::Known(d)).collect();
        self.graph.shapes.insert(tensor.to_string(), shape);
        self
    }

    pub fn node(mut self, name: &str, kind: NodeKind, inputs: &[&str], outputs: &[&str]) -> Self {
        self.graph.nodes.push(GraphNode {
            name: name.to_string(),
            kind,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn input(mut self, name: &str) -> Self {
        self.graph.input = name.to_string();
        self
    }

    pub fn output(mut self, name: &str) -> Self {
        self.graph.output = name.to_string();
        self
    }

    pub fn build(self) -> ModelGraph {
        self.graph
    }
}

/// A minimal JSON-on-disk representation of a [`ModelGraph`], used by the
/// `build` CLI subcommand (§10.4). This is *not* any standard interchange
/// format; it exists purely so the binary has something concrete to read
/// without pulling in an external model-format crate.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct JsonModel {
    pub input: String,
    pub output: String,
    pub initializers: HashMap<String, JsonInitializer>,
    pub nodes: Vec<JsonNode>,
    #[serde(default)]
    pub shapes: HashMap<String, Vec<usize>>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct JsonInitializer {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct JsonNode {
    pub name: String,
    pub op: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl JsonModel {
    pub fn into_graph(self) -> crate::error::AccelResult<ModelGraph> {
        use crate::error::AccelError;

        let mut builder = GraphBuilder::new().input(&self.input).output(&self.output);

        for (name, init) in self.initializers {
            builder = builder.initializer(&name, init.data, init.shape);
        }
        for (name, dims) in self.shapes {
            builder = builder.shape(&name, &dims);
        }
        for n in self.nodes {
            let kind = match n.op.as_str() {
                "MatMul" => NodeKind::MatMul,
                "Gemm" => NodeKind::Gemm,
                "Add" => NodeKind::Add,
                "Relu" => NodeKind::Relu,
                "Reshape" => NodeKind::Reshape,
                other => {
                    return Err(AccelError::InvalidGraph(format!(
                        "unknown op type {other:?} in node {:?}",
                        n.name
                    )))
                }
            };
            let inputs: Vec<&str> = n.inputs.iter().map(String::as_str).collect();
            let outputs: Vec<&str> = n.outputs.iter().map(String::as_str).collect();
            builder = builder.node(&n.name, kind, &inputs, &outputs);
        }

        Ok(builder.build())
    }
}
