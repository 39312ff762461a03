//! Build / Harness / Coverage Maps (C4): indexed lookup for build
//! artifacts, a weighted harness list, and per-function coverage, used
//! by the scheduler to steer work.

pub mod build_map;
pub mod coverage_map;
pub mod error;
pub mod harness_weights;
pub mod sarif_store;

pub use build_map::BuildMap;
pub use coverage_map::CoverageMap;
pub use error::{IndexError, IndexResult};
pub use harness_weights::HarnessWeights;
pub use sarif_store::SarifStore;
