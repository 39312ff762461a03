//! Submission Tracker + Bundles (C6): pairs confirmed vulnerabilities
//! with verified patches into bundles, preventing duplicate
//! submissions. Grounded on the original's
//! `orchestrator/scheduler/submission_tracker.py` and `bundles.py`.

pub mod bundles;
pub mod error;
pub mod external;
pub mod tracker;

pub use bundles::Bundles;
pub use error::{SubmissionError, SubmissionResult};
pub use external::{ApiSubmissionResponse, CompetitionApi};
pub use tracker::SubmissionTracker;
