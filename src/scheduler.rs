//! Instruction scheduler (§4.4): walks the topologically ordered graph,
//! assigns ping-pong scratchpad buffer ids, and emits the linear
//! instruction sequence the assembler packs into the image.

use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::{AccelError, AccelResult};
use crate::graph::{shape_size, ModelSource, NodeKind, TensorKind};
use crate::isa::Instruction;
use crate::memory_image::PlacementMap;

/// Buffer id reserved for the initial input activation; never ping-ponged.
pub const INPUT_BUF: u8 = 9;

/// A ping-ponging pair of scratchpad ids, alternating between `a` and `b`
/// on every [`PingPong::advance`] call, one pair per producer/consumer role
/// (matrix, bias, gemv, relu) so that successive uses of a role never
/// collide with a read still in flight.
#[derive(Debug, Clone, Copy)]
struct PingPong {
    current: u8,
    other: u8,
}

impl PingPong {
    fn new(a: u8, b: u8) -> Self {
        Self { current: a, other: b }
    }

    fn current(&self) -> u8 {
        self.current
    }

    fn advance(&mut self) {
        std::mem::swap(&mut self.current, &mut self.other);
    }
}

/// Owns the four ping-pong cursors for one compilation run.
struct BufferAllocator {
    matrix: PingPong,
    bias: PingPong,
    gemv: PingPong,
    relu: PingPong,
}

impl BufferAllocator {
    fn new() -> Self {
        Self {
            matrix: PingPong::new(1, 2),
            bias: PingPong::new(3, 4),
            gemv: PingPong::new(5, 6),
            relu: PingPong::new(7, 8),
        }
    }
}

/// Result of scheduling: the linear instruction sequence plus the buffer
/// id the final `STORE` read from (useful for tests and the driver).
pub struct Schedule {
    pub instructions: Vec<Instruction>,
    pub output_buffer: u8,
}

/// Walks a topologically ordered graph and lowers each node to zero or
/// more instructions per the rules in §4.4. Owns its own buffer cursors;
/// borrows the graph and the memory builder's placement map read-only.
pub struct Scheduler;

impl Scheduler {
    #[instrument(skip(graph, order, placements, config), fields(nodes = order.len()))]
    pub fn schedule(
        graph: &dyn ModelSource,
        order: &[usize],
        placements: &PlacementMap,
        config: &Config,
    ) -> AccelResult<Schedule> {
        let nodes = graph.nodes();
        let mut alloc = BufferAllocator::new();
        let mut instructions = Vec::new();
        let mut tensor_buffer: HashMap<String, u8> = HashMap::new();
        let mut tensor_size: HashMap<String, u32> = HashMap::new();
        let mut input_loaded = false;
        let mut output_buffer: Option<u8> = None;

        for &idx in order {
            let node = &nodes[idx];
            match node.kind {
                NodeKind::Reshape => {
                    let input = &node.inputs[0];
                    if !tensor_buffer.contains_key(input) && !input_loaded {
                        let size = graph
                            .shape_of(input)
                            .map(shape_size)
                            .unwrap_or(0) as u32;
                        instructions.push(Instruction::LoadV {
                            dest: INPUT_BUF,
                            addr: config.inputs_base as u32,
                            len: size,
                        });
                        input_loaded = true;
                        debug!(tensor = %input, "LOAD_V input (via Reshape)");
                    }
                    tensor_buffer.insert(input.clone(), INPUT_BUF);
                    for out in &node.outputs {
                        tensor_buffer.insert(out.clone(), INPUT_BUF);
                    }
                }
                NodeKind::MatMul | NodeKind::Gemm => {
                    if node.inputs.len() < 2 {
                        return Err(AccelError::UnsupportedGraph(format!(
                            "node {:?} of kind Gemm/MatMul needs at least 2 inputs",
                            node.name
                        )));
                    }
                    let x_name = &node.inputs[0];
                    let w_name = &node.inputs[1];

                    let x_buf = match tensor_buffer.get(x_name) {
                        Some(&buf) => buf,
                        None => {
                            // First node in the graph: the graph input has
                            // not been routed through a Reshape.
                            if !input_loaded {
                                let size = graph.shape_of(x_name).map(shape_size).unwrap_or(0) as u32;
                                instructions.push(Instruction::LoadV {
                                    dest: INPUT_BUF,
                                    addr: config.inputs_base as u32,
                                    len: size,
                                });
                                input_loaded = true;
                                debug!(tensor = %x_name, "LOAD_V input (direct)");
                            }
                            tensor_buffer.insert(x_name.clone(), INPUT_BUF);
                            INPUT_BUF
                        }
                    };

                    let w_placement = placements.get(w_name).ok_or_else(|| {
                        AccelError::InvalidGraph(format!("weight {w_name:?} has no placement"))
                    })?;
                    if w_placement.kind != TensorKind::Weight {
                        return Err(AccelError::UnsupportedGraph(format!(
                            "second input to {:?} ({w_name:?}) is not a weight matrix",
                            node.name
                        )));
                    }
                    let mat_buf = alloc.matrix.current();
                    instructions.push(Instruction::LoadM {
                        dest: mat_buf,
                        addr: w_placement.addr as u32,
                        rows: w_placement.rows as u16,
                        cols: w_placement.cols as u16,
                    });
                    alloc.matrix.advance();

                    let bias_name = find_bias_input(graph, nodes, order, idx, &node.outputs[0]);
                    let bias_placement = bias_name
                        .as_ref()
                        .and_then(|n| placements.get(n))
                        .ok_or_else(|| {
                            AccelError::UnsupportedGraph(format!(
                                "node {:?} has no associated bias Add feeding the graph output or a later node",
                                node.name
                            ))
                        })?;
                    let bias_buf = alloc.bias.current();
                    instructions.push(Instruction::LoadV {
                        dest: bias_buf,
                        addr: bias_placement.addr as u32,
                        len: bias_placement.len as u32,
                    });
                    alloc.bias.advance();

                    let gemv_buf = alloc.gemv.current();
                    instructions.push(Instruction::Gemv {
                        dest: gemv_buf,
                        w: mat_buf,
                        x: x_buf,
                        b: bias_buf,
                        rows: w_placement.rows as u16,
                        cols: w_placement.cols as u16,
                    });
                    alloc.gemv.advance();

                    let out_name = &node.outputs[0];
                    tensor_buffer.insert(out_name.clone(), gemv_buf);
                    tensor_size.insert(out_name.clone(), w_placement.rows as u32);
                    output_buffer = Some(gemv_buf);
                }
                NodeKind::Add => {
                    // Folded into the preceding Gemm/MatMul; emits nothing
                    // on its own (§4.4). We still thread the buffer/size
                    // bookkeeping through so a following node (Relu, or
                    // the graph output) sees the Gemm's output under the
                    // Add's output name.
                    if let (Some(gemm_out), true) = (node.inputs.first(), node.inputs.len() == 2) {
                        if let Some(&buf) = tensor_buffer.get(gemm_out) {
                            for out in &node.outputs {
                                tensor_buffer.insert(out.clone(), buf);
                            }
                            if let Some(&size) = tensor_size.get(gemm_out) {
                                for out in &node.outputs {
                                    tensor_size.insert(out.clone(), size);
                                }
                            }
                            output_buffer = Some(buf);
                        }
                    }
                }
                NodeKind::Relu => {
                    let input = &node.inputs[0];
                    let x_buf = *tensor_buffer.get(input).ok_or_else(|| {
                        AccelError::UnsupportedGraph(format!(
                            "Relu node {:?} has no buffer for its input {:?}",
                            node.name, input
                        ))
                    })?;
                    let length = *tensor_size.get(input).unwrap_or(&0);
                    let relu_buf = alloc.relu.current();
                    instructions.push(Instruction::Relu {
                        dest: relu_buf,
                        x: x_buf,
                        len: length,
                    });
                    alloc.relu.advance();

                    let out_name = &node.outputs[0];
                    tensor_buffer.insert(out_name.clone(), relu_buf);
                    tensor_size.insert(out_name.clone(), length);
                    output_buffer = Some(relu_buf);
                }
            }

            if node.outputs.iter().any(|o| o == graph.graph_output()) {
                let buf = output_buffer.ok_or_else(|| {
                    AccelError::UnsupportedGraph("graph output produced no buffer".into())
                })?;
                let size = *tensor_size.get(graph.graph_output()).unwrap_or(&(config.output_length as u32));
                instructions.push(Instruction::Store {
                    src: buf,
                    addr: config.outputs_base as u32,
                    len: size,
                });
                debug!(buf, size, "STORE graph output");
            }
        }

        let output_buffer = output_buffer.ok_or_else(|| {
            AccelError::UnsupportedGraph("graph produced no output-carrying instruction".into())
        })?;

        Ok(Schedule { instructions, output_buffer })
    }
}

/// Finds the bias initializer associated with a Gemm/MatMul's output: the
/// `Add` node that consumes it together with a bias initializer. This is
/// either an explicit `Add` later in the order, or a bias initializer
/// declared as a third direct input to the Gemm/MatMul node itself. We
/// check both: prefer a third Gemm input if present, otherwise scan
/// forward for the matching `Add`.
fn find_bias_input(
    graph: &dyn ModelSource,
    nodes: &[crate::graph::GraphNode],
    order: &[usize],
    gemm_idx: usize,
    gemm_output: &str,
) -> Option<String> {
    let gemm_node = &nodes[gemm_idx];
    if let Some(third) = gemm_node.inputs.get(2) {
        if graph.initializers().contains_key(third) {
            return Some(third.clone());
        }
    }

    for &idx in order {
        let node = &nodes[idx];
        if node.kind != NodeKind::Add {
            continue;
        }
        if node.inputs.iter().any(|i| i == gemm_output) {
            for input in &node.inputs {
                if input != gemm_output && graph.initializers().contains_key(input) {
                    return Some(input.clone());
                }
            }
        }
    }
    None
}
