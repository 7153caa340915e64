mod graph;
mod models;
mod permission;
mod stats;

pub use graph::*;
pub use models::*;
pub use permission::*;
pub use stats::*;
