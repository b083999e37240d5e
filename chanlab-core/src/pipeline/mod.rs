//! Per-level pipeline: bars in, structures and signals out.

pub mod context;
pub mod result;

pub use context::{analyze, LevelPipeline, Settled};
pub use result::{LevelResult, StructureView, Summary};
