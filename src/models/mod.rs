pub mod generation;
pub mod graph;

pub use generation::*;
pub use graph::*;
