//! Bounded, cycle-safe fork graphs for display.

mod builder;
mod summary;

pub use builder::ForkGraphBuilder;
