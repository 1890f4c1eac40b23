//! Backend abstraction layer
//!
//! Provides the context and command recorder traits native backends
//! implement, plus a headless dummy context.

pub mod dummy;
pub mod traits;
pub mod types;

pub use dummy::{DummyContext, DummyFence};
pub use traits::*;
pub use types::*;
