//! Command buffers: compact, per-character instruction streams recorded on the main thread and
//! interpreted on a worker thread.

mod buffer;
mod encoding;
mod execute;
pub mod records;
mod state;

pub use buffer::*;
pub use encoding::*;
pub use execute::ExecutionStats;
pub use records::{PerJointBlendMode, SampleFlags};
pub use state::*;
