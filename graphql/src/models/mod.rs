mod batch;
mod chunk;
mod prover_task;
mod summary;
pub use batch::Batch;
pub use chunk::Chunk;
pub use prover_task::ProverTask;
pub use summary::{StatusCount, StatusSummary};
