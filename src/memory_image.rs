//! The memory image builder (§4.3): quantizes every initializer used by a
//! graph, row-pads weight matrices to the tile width, and assigns each one
//! a byte address inside a single flat [`MemoryImage`].

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::{AccelError, AccelResult};
use crate::graph::{classify_initializer, weight_rows_cols, ModelSource, TensorKind};
use crate::quantize::{pick_scale, quantize_f32_to_i8};

/// Where one initializer ended up: a DRAM address, its element length and
/// whether it is a weight or a bias (the scheduler needs `kind` to decide
/// whether to emit `LOAD_M` or `LOAD_V`, and `rows`/`cols` for weights).
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub addr: usize,
    pub len: usize,
    pub kind: TensorKind,
    /// Only meaningful for weights: the unpadded `(rows, cols)`.
    pub rows: usize,
    pub cols: usize,
}

pub type PlacementMap = HashMap<String, Placement>;

/// A fixed-size flat byte array standing in for the accelerator's DRAM.
/// Bytes are stored as the signed view the golden model operates on
/// directly; the hex serialization reinterprets them as unsigned on the
/// way out, per §4.3.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    bytes: Vec<i8>,
    pub config: Config,
}

impl MemoryImage {
    pub fn new(config: Config) -> Self {
        Self {
            bytes: vec![0i8; config.mem_size_bytes],
            config,
        }
    }

    pub fn as_bytes(&self) -> &[i8] {
        &self.bytes
    }

    /// Writes `data` starting at `addr`, failing with `ImageOverflow` if it
    /// would run past `limit` (the base of the next region, or
    /// `mem_size_bytes` for the last region).
    fn write_checked(&mut self, region: &'static str, addr: usize, limit: usize, data: &[i8]) -> AccelResult<()> {
        let end = addr + data.len();
        if end > limit {
            return Err(AccelError::ImageOverflow {
                region,
                needed: end.saturating_sub(addr),
                available: limit.saturating_sub(addr),
            });
        }
        self.bytes[addr..end].copy_from_slice(data);
        Ok(())
    }

    /// Writes the already-assembled instruction stream at offset 0,
    /// bounded by `inputs_base`.
    pub fn write_instructions(&mut self, words: &[u8]) -> AccelResult<()> {
        let signed: Vec<i8> = words.iter().map(|&b| b as i8).collect();
        self.write_checked("instructions", self.config.instructions_base, self.config.inputs_base, &signed)
    }

    /// Patches the quantized input activation at `inputs_base`, bounded by
    /// `biases_base`.
    pub fn write_input(&mut self, input: &[i8]) -> AccelResult<()> {
        let limit = self.config.biases_base;
        self.write_checked("inputs", self.config.inputs_base, limit, input)
    }

    /// Writes already-quantized bytes directly at `addr`, bounded only by
    /// the end of the image. For driving memory images in tests without
    /// going through [`MemoryBuilder`]; production callers place data via
    /// `MemoryBuilder::build` or `write_input`.
    pub fn write(&mut self, addr: usize, data: &[i8]) -> AccelResult<()> {
        let limit = self.config.mem_size_bytes;
        self.write_checked("raw", addr, limit, data)
    }

    /// Reads back `len` bytes starting at `addr` (used by tests and by the
    /// driver to confirm a STORE landed where expected).
    pub fn read(&self, addr: usize, len: usize) -> &[i8] {
        &self.bytes[addr..addr + len]
    }

    /// Serializes the image to the ASCII hex format of §6: one byte per
    /// line, two uppercase hex digits, unsigned view, LF terminators.
    pub fn write_hex_file(&self, path: impl AsRef<Path>) -> AccelResult<()> {
        let mut file = std::fs::File::create(path)?;
        let mut out = String::with_capacity(self.bytes.len() * 3);
        for &b in &self.bytes {
            out.push_str(&format!("{:02X}\n", b as u8));
        }
        file.write_all(out.as_bytes())?;
        Ok(())
    }

    /// Parses the ASCII hex format back into a `MemoryImage`.
    pub fn from_hex_str(config: Config, text: &str) -> AccelResult<Self> {
        let mut bytes = Vec::with_capacity(config.mem_size_bytes);
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value = u8::from_str_radix(line, 16)
                .map_err(|e| AccelError::MalformedImage(format!("{line:?}: {e}")))?;
            bytes.push(value as i8);
        }
        if bytes.len() != config.mem_size_bytes {
            return Err(AccelError::MalformedImage(format!(
                "expected {} lines, found {}",
                config.mem_size_bytes,
                bytes.len()
            )));
        }
        Ok(Self { bytes, config })
    }
}

/// Places every initializer a graph uses into a [`MemoryImage`], in one
/// pass over the topologically ordered nodes (§4.3). Address assignment
/// (the "plan") is kept separate from the backing store (the flat
/// `MemoryImage` itself, the "pool").
pub struct MemoryBuilder;

impl MemoryBuilder {
    #[instrument(skip(graph, order, config), fields(nodes = order.len()))]
    pub fn build(
        graph: &dyn ModelSource,
        order: &[usize],
        config: &Config,
    ) -> AccelResult<(MemoryImage, PlacementMap)> {
        let mut image = MemoryImage::new(*config);
        let mut placements = PlacementMap::new();
        let mut bias_cursor = 0usize;
        let mut weight_cursor = 0usize;

        let nodes = graph.nodes();
        for &idx in order {
            let node = &nodes[idx];
            for input_name in &node.inputs {
                if placements.contains_key(input_name) {
                    continue;
                }
                let Some(init) = graph.initializers().get(input_name) else {
                    continue;
                };

                let kind = classify_initializer(&init.shape)?;
                let scale = pick_scale(&init.data);
                let quantized = quantize_f32_to_i8(&init.data, scale);

                let placement = match kind {
                    TensorKind::Bias => {
                        let addr = config.biases_base + bias_cursor;
                        let limit = config.outputs_base;
                        image.write_checked("biases", addr, limit, &quantized)?;
                        bias_cursor += quantized.len();
                        debug!(tensor = %input_name, addr, len = quantized.len(), "placed bias");
                        Placement {
                            addr,
                            len: quantized.len(),
                            kind,
                            rows: quantized.len(),
                            cols: 1,
                        }
                    }
                    TensorKind::Weight => {
                        let (rows, cols) = weight_rows_cols(&init.shape);
                        let padded_cols = config.padded_cols(cols);
                        let mut padded = vec![0i8; rows * padded_cols];
                        for r in 0..rows {
                            let src = &quantized[r * cols..(r + 1) * cols];
                            padded[r * padded_cols..r * padded_cols + cols].copy_from_slice(src);
                        }
                        verify_padding(input_name, &padded, rows, cols, padded_cols)?;

                        let addr = config.weights_base + weight_cursor;
                        let limit = config.mem_size_bytes;
                        image.write_checked("weights", addr, limit, &padded)?;
                        weight_cursor += padded.len();
                        debug!(tensor = %input_name, addr, rows, cols, padded_cols, "placed weight");
                        Placement {
                            addr,
                            len: padded.len(),
                            kind,
                            rows,
                            cols,
                        }
                    }
                };

                placements.insert(input_name.clone(), placement);
            }
        }

        Ok((image, placements))
    }
}

/// Post-write check that every padding byte is a literal zero (§4.3,
/// testable property 4). A violation here indicates a builder bug, never
/// a data condition, and is always fatal.
fn verify_padding(tensor: &str, padded: &[i8], rows: usize, cols: usize, padded_cols: usize) -> AccelResult<()> {
    for r in 0..rows {
        for c in cols..padded_cols {
            if padded[r * padded_cols + c] != 0 {
                return Err(AccelError::PaddingViolation {
                    tensor: tensor.to_string(),
                    row: r,
                    offset: c,
                });
            }
        }
    }
    Ok(())
}
