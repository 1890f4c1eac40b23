//! Render Graph System
//!
//! Passes declare typed inputs and outputs, wires connect them, and the graph
//! orders the passes a root depends on and inserts the resource state
//! barriers between them.

pub mod diagnostics;
pub mod edge;
pub mod error;
pub mod executor;
pub mod graph;
pub mod pass;
pub mod resource;

pub use diagnostics::*;
pub use edge::*;
pub use error::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
