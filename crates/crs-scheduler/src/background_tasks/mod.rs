pub mod corpus_merger;
pub mod pov_reproducer;
pub mod scratch_cleaner;

pub use corpus_merger::CorpusMergerTask;
pub use pov_reproducer::PovReproducerTask;
pub use scratch_cleaner::ScratchCleanerTask;
