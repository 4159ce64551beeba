use serde::{Deserialize, Serialize};

use crate::error::{AccelError, AccelResult};

/// Architectural constants for one accelerator instance.
///
/// A `Config` is immutable and `Copy`; every component in the crate
/// (quantizer excepted, which is pure) threads the same `Config` value
/// through compilation, image building and golden-model execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Bits per scratchpad/DRAM element. Always 8 for this ISA.
    pub data_width_bits: u32,
    /// Elements per tile; matrix rows are right-padded to a multiple of
    /// this width.
    pub tile_elems: usize,
    /// Total DRAM size in bytes. Must be a power of two.
    pub mem_size_bytes: usize,
    /// Base address of the instruction region (always 0).
    pub instructions_base: usize,
    /// Base address of the input activation region.
    pub inputs_base: usize,
    /// Base address of the concatenated bias region.
    pub biases_base: usize,
    /// Base address of the final STORE target region.
    pub outputs_base: usize,
    /// Base address of the row-padded weight region.
    pub weights_base: usize,
    /// Length, in bytes, of the final classification vector.
    pub output_length: usize,
}

impl Config {
    /// The canonical memory map used by this project's RTL testbench:
    /// `tile_elems = 8`, a 32 KiB DRAM and the `heavy_test_fpga` address
    /// layout (`inputs=0xC0, biases=0x4C0, outputs=0x8C0, weights=0x940`).
    pub fn reference() -> Self {
        Config {
            data_width_bits: 8,
            tile_elems: 8,
            mem_size_bytes: 32768,
            instructions_base: 0,
            inputs_base: 192,
            biases_base: 1216,
            outputs_base: 2240,
            weights_base: 2368,
            output_length: 10,
        }
    }

    /// Checks the region-ordering invariant from the data model: each
    /// base must strictly exceed the previous, and the final region must
    /// fit inside `mem_size_bytes`.
    pub fn validate(&self) -> AccelResult<()> {
        if self.data_width_bits != 8 {
            return Err(AccelError::InvalidConfig(format!(
                "data_width_bits must be 8, found {}",
                self.data_width_bits
            )));
        }
        if self.tile_elems == 0 {
            return Err(AccelError::InvalidConfig(
                "tile_elems must be non-zero".into(),
            ));
        }
        if !self.mem_size_bytes.is_power_of_two() {
            return Err(AccelError::InvalidConfig(format!(
                "mem_size_bytes must be a power of two, found {}",
                self.mem_size_bytes
            )));
        }
        let bases = [
            ("instructions", self.instructions_base),
            ("inputs", self.inputs_base),
            ("biases", self.biases_base),
            ("outputs", self.outputs_base),
            ("weights", self.weights_base),
        ];
        for pair in bases.windows(2) {
            let (prev_name, prev) = pair[0];
            let (name, base) = pair[1];
            if base <= prev {
                return Err(AccelError::InvalidConfig(format!(
                    "{name}_base ({base}) must be strictly greater than {prev_name}_base ({prev})"
                )));
            }
        }
        if self.weights_base >= self.mem_size_bytes {
            return Err(AccelError::InvalidConfig(format!(
                "weights_base ({}) must be less than mem_size_bytes ({})",
                self.weights_base, self.mem_size_bytes
            )));
        }
        Ok(())
    }

    /// Rounds `cols` up to the next multiple of `tile_elems`.
    pub fn padded_cols(&self, cols: usize) -> usize {
        let t = self.tile_elems;
        cols.div_ceil(t) * t
    }
}
