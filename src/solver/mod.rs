//! Test-and-measure solvers: given a profile and a probed VPC, each solver produces a
//! handful of short clips, scores them through C6, and reduces the results to a single
//! decision written back onto the VPC.

pub mod cq;
pub mod resolution;

pub use cq::CqSolver;
pub use resolution::ResolutionSolver;
