//! Top-level orchestration: loads a graph, builds its memory image,
//! schedules instructions, assembles them into the image. This is "the
//! compiler" of §1 — a thin value that owns nothing but glues the other
//! components together in the documented order.

use tracing::instrument;

use crate::config::Config;
use crate::error::AccelResult;
use crate::graph::{topological_sort, ModelSource};
use crate::isa::pack_instructions;
use crate::memory_image::{MemoryBuilder, MemoryImage, PlacementMap};
use crate::scheduler::{Schedule, Scheduler};

/// The result of compiling one graph: the populated memory image (minus
/// the per-run input activation, which the driver patches in separately)
/// and the schedule that produced its instruction region.
pub struct CompiledProgram {
    pub image: MemoryImage,
    pub schedule: Schedule,
    pub placements: PlacementMap,
}

/// Compiles a [`ModelSource`] into a [`CompiledProgram`] under the given
/// [`Config`]. Stateless: every cursor/counter needed along the way lives
/// inside the `MemoryBuilder`/`Scheduler` calls this makes, not in any
/// field here.
pub struct Compiler;

impl Compiler {
    #[instrument(skip(graph, config))]
    pub fn compile(graph: &dyn ModelSource, config: &Config) -> AccelResult<CompiledProgram> {
        config.validate()?;
        let order = topological_sort(graph.nodes())?;
        let (mut image, placements) = MemoryBuilder::build(graph, &order, config)?;
        let schedule = Scheduler::schedule(graph, &order, &placements, config)?;
        let words = pack_instructions(&schedule.instructions);
        image.write_instructions(&words)?;

        Ok(CompiledProgram { image, schedule, placements })
    }
}
