pub mod compiler;
pub mod config;
pub mod error;
pub mod graph;
pub mod isa;
pub mod memory_image;
pub mod quantize;
pub mod scheduler;
pub mod simulator;

pub use compiler::{CompiledProgram, Compiler};
pub use config::Config;
pub use error::{AccelError, AccelResult};
pub use graph::{ModelGraph, ModelSource};
pub use simulator::{Simulator, UnknownOpcodePolicy};
