//! The golden model (§4.6): a cycle-agnostic, bit-exact functional
//! simulator of the instruction set. Owns its scratchpad buffer map for
//! the duration of one run; borrows a memory snapshot read/write.

use tracing::{debug, instrument, warn};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::config::Config;
use crate::error::{AccelError, AccelResult};
use crate::isa::{disassemble, Instruction};
use crate::memory_image::MemoryImage;
use crate::quantize::requantize_i32_to_i8_exact;

/// Number of addressable scratchpad buffers (§3: `buffer_id ∈ [0,31]`).
const BUFFER_COUNT: usize = 32;

/// Whether an unknown opcode halts the run or is logged and skipped. The
/// hardware-faithful default (§7, §9) is `Skip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownOpcodePolicy {
    #[default]
    Skip,
    Fatal,
}

/// Executes one program against a [`MemoryImage`] snapshot. A fresh
/// `Simulator` is created per run; nothing about it is reused across runs
/// (§9: "no justification for process-wide state").
pub struct Simulator {
    buffers: Vec<Option<Vec<i8>>>,
    output_buffer: u8,
    config: Config,
    unknown_opcode_policy: UnknownOpcodePolicy,
}

impl Simulator {
    pub fn new(config: Config) -> Self {
        Self::with_policy(config, UnknownOpcodePolicy::default())
    }

    pub fn with_policy(config: Config, unknown_opcode_policy: UnknownOpcodePolicy) -> Self {
        Self {
            buffers: vec![None; BUFFER_COUNT],
            output_buffer: 0,
            config,
            unknown_opcode_policy,
        }
    }

    /// Runs the program encoded in `image`'s instruction region against
    /// `image`'s data regions, returning the first `output_length` bytes
    /// of whatever buffer the last `STORE` read from. If no `STORE` ever
    /// executes, buffer 0 is used, which reads back as all zeros (an
    /// all-zero/NOP program).
    #[instrument(skip(self, image))]
    pub fn run(&mut self, image: &MemoryImage) -> AccelResult<Vec<i8>> {
        let memory = image.as_bytes();
        let instr_region = &memory[image.config.instructions_base..image.config.inputs_base];

        for chunk in instr_region.chunks_exact(8) {
            let bytes: [u8; 8] = std::array::from_fn(|i| chunk[i] as u8);
            let word = u64::from_be_bytes(bytes);
            if word == 0 {
                break;
            }
            match disassemble(word) {
                Some(instr) => self.dispatch(&instr, memory)?,
                None => {
                    let opcode = (word & 0x1F) as u8;
                    match self.unknown_opcode_policy {
                        UnknownOpcodePolicy::Skip => {
                            warn!(opcode, "unknown opcode, skipping");
                        }
                        UnknownOpcodePolicy::Fatal => {
                            return Err(AccelError::UnknownOpcode(opcode));
                        }
                    }
                }
            }
        }

        let out_len = self.config.output_length;
        let out = self.buffers[self.output_buffer as usize]
            .as_ref()
            .map(|b| {
                let mut v = b.clone();
                v.resize(out_len, 0);
                v.truncate(out_len);
                v
            })
            .unwrap_or_else(|| vec![0i8; out_len]);
        Ok(out)
    }

    fn dispatch(&mut self, instr: &Instruction, memory: &[i8]) -> AccelResult<()> {
        match *instr {
            Instruction::Nop => {}
            Instruction::LoadV { dest, addr, len } => {
                let (addr, len) = (addr as usize, len as usize);
                self.buffers[dest as usize] = Some(memory[addr..addr + len].to_vec());
                debug!(dest, addr, len, "LOAD_V");
            }
            Instruction::LoadM { dest, addr, rows, cols } => {
                let (addr, rows, cols) = (addr as usize, rows as usize, cols as usize);
                let padded_cols = self.config.padded_cols(cols);
                let len = rows * padded_cols;
                self.buffers[dest as usize] = Some(memory[addr..addr + len].to_vec());
                debug!(dest, addr, rows, cols, padded_cols, "LOAD_M");
            }
            Instruction::Store { src, addr, len } => {
                self.output_buffer = src;
                debug!(src, addr, len, "STORE");
            }
            Instruction::Gemv { dest, w, x, b, rows, cols } => {
                self.gemv(dest, w, x, b, rows as usize, cols as usize);
            }
            Instruction::Relu { dest, x, len } => {
                let input = self.buffers[x as usize].clone().unwrap_or_default();
                let len = (len as usize).min(input.len());
                let out: Vec<i8> = input[..len].iter().map(|&v| v.max(0)).collect();
                self.buffers[dest as usize] = Some(out);
                debug!(dest, x, len, "RELU");
            }
        }
        Ok(())
    }

    /// GEMV with int32 accumulation and hardware-exact requantization
    /// (§4.6). Rows may be computed in parallel (§5) when the `rayon`
    /// feature is enabled; the `max_abs` reduction and requantization pass
    /// are always a single barrier afterward, so the output is identical
    /// either way.
    fn gemv(&mut self, dest: u8, w: u8, x: u8, b: u8, rows: usize, cols: usize) {
        let stride = self.config.padded_cols(cols);
        let w_buf = self.buffers[w as usize].clone().unwrap_or_default();
        let x_buf = self.buffers[x as usize].clone().unwrap_or_default();
        let b_buf = self.buffers[b as usize].clone().unwrap_or_default();

        let compute_row = |i: usize| -> i32 {
            let mut acc: i32 = 0;
            for j in 0..cols {
                let w_val = i32::from(w_buf[i * stride + j]);
                let x_val = i32::from(x_buf[j]);
                acc = acc.wrapping_add(w_val.wrapping_mul(x_val));
            }
            acc.wrapping_add(i32::from(b_buf[i]))
        };

        #[cfg(feature = "rayon")]
        let acc: Vec<i32> = (0..rows).into_par_iter().map(compute_row).collect();
        #[cfg(not(feature = "rayon"))]
        let acc: Vec<i32> = (0..rows).map(compute_row).collect();

        let max_abs = acc.iter().map(|&v| i64::from(v).abs()).max().unwrap_or(0);
        let out = requantize_i32_to_i8_exact(&acc, max_abs);
        debug!(dest, w, x, b, rows, cols, max_abs, "GEMV");
        self.buffers[dest as usize] = Some(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::GraphBuilder;
    use crate::graph::NodeKind;
    use crate::isa::{pack_instructions, Instruction};

    fn small_config() -> Config {
        Config {
            data_width_bits: 8,
            tile_elems: 4,
            mem_size_bytes: 4096,
            instructions_base: 0,
            inputs_base: 64,
            biases_base: 128,
            outputs_base: 192,
            weights_base: 256,
            output_length: 4,
        }
    }

    #[test]
    fn nop_image_returns_zeros() {
        let config = small_config();
        let image = MemoryImage::new(config);
        let mut sim = Simulator::new(config);
        let out = sim.run(&image).unwrap();
        assert_eq!(out, vec![0i8; config.output_length]);
    }

    #[test]
    fn identity_gemv_produces_requantized_output() {
        let config = small_config();
        let mut image = MemoryImage::new(config);

        // W = I_4, int8 values 1 on the diagonal.
        let identity: Vec<i8> = {
            let mut m = vec![0i8; 16];
            for i in 0..4 {
                m[i * 4 + i] = 1;
            }
            m
        };
        image.write(config.weights_base, &identity);
        image.write(config.biases_base, &[10, 20, 30, 40]);
        image.write_input(&[1, 2, 3, 4]).unwrap();

        let instrs = vec![
            Instruction::LoadV { dest: 9, addr: config.inputs_base as u32, len: 4 },
            Instruction::LoadM { dest: 1, addr: config.weights_base as u32, rows: 4, cols: 4 },
            Instruction::LoadV { dest: 3, addr: config.biases_base as u32, len: 4 },
            Instruction::Gemv { dest: 5, w: 1, x: 9, b: 3, rows: 4, cols: 4 },
            Instruction::Store { src: 5, addr: config.outputs_base as u32, len: 4 },
        ];
        let words = pack_instructions(&instrs);
        image.write_instructions(&words).unwrap();

        let mut sim = Simulator::new(config);
        let out = sim.run(&image).unwrap();
        assert_eq!(out, vec![32, 64, 95, 127]);
    }

    #[test]
    fn relu_clips_negatives() {
        let config = small_config();
        let mut sim = Simulator::new(config);
        sim.buffers[2] = Some(vec![3, -5, 0, 127, -128, 42]);
        sim.dispatch(&Instruction::Relu { dest: 1, x: 2, len: 6 }, &[]).unwrap();
        assert_eq!(sim.buffers[1].clone().unwrap(), vec![3, 0, 0, 127, 0, 42]);
    }

    #[test]
    fn unknown_opcode_is_skipped_by_default() {
        let config = small_config();
        let mut image = MemoryImage::new(config);
        // opcode 0x1F is not defined; low 5 bits = 0x1F, rest arbitrary.
        let word: u64 = 0x1F;
        image.write_instructions(&word.to_be_bytes()).unwrap();
        let mut sim = Simulator::new(config);
        let out = sim.run(&image).unwrap();
        assert_eq!(out, vec![0i8; config.output_length]);
    }

    #[test]
    fn unknown_opcode_is_fatal_when_configured() {
        let config = small_config();
        let mut image = MemoryImage::new(config);
        let word: u64 = 0x1F;
        image.write_instructions(&word.to_be_bytes()).unwrap();
        let mut sim = Simulator::with_policy(config, UnknownOpcodePolicy::Fatal);
        assert!(sim.run(&image).is_err());
    }

    #[test]
    fn full_pipeline_is_deterministic() {
        let graph = GraphBuilder::new()
            .input("x")
            .output("y")
            .shape("x", &[4])
            .initializer("w1", vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0], vec![2, 4])
            .initializer("b1", vec![1.0, 2.0], vec![2])
            .node("gemm1", NodeKind::Gemm, &["x", "w1"], &["h1"])
            .node("bias1", NodeKind::Add, &["h1", "b1"], &["y"])
            .build();
        let config = Config::reference();

        let run_once = || {
            let mut compiled = crate::compiler::Compiler::compile(&graph, &config).unwrap();
            compiled.image.write_input(&[1, 1, 1, 1]).unwrap();
            let mut sim = Simulator::new(config);
            sim.run(&compiled.image).unwrap()
        };

        assert_eq!(run_once(), run_once());
    }
}
