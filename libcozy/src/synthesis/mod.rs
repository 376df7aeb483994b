//! The synthesis driver and its per-query improvement jobs.
//!
//! Grounded on `cozy/synthesis/high_level_interface.py`. See `driver`'s
//! and `jobs`'s module docs for the concurrency and logging details.

pub mod driver;
pub mod jobs;

pub use driver::improve_implementation;
pub use jobs::{ImproveQueryJob, QuerySolution};
