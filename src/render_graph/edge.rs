//! Typed edges between passes
//!
//! An [`Input`] names a resource a pass consumes and the state it expects it
//! in. An [`Output`] either produces a resource the pass owns or relays one
//! of the pass's own inputs onward so later passes can chain through it.

use crate::backend::types::ResourceState;
use crate::render_graph::pass::PassId;
use crate::render_graph::resource::ResourceId;

/// Identifier of an input edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputId(pub(crate) u32);

/// Identifier of an output edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub(crate) u32);

impl InputId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl OutputId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Input {
    pub(crate) name: String,
    pub(crate) pass: PassId,
    pub(crate) state: ResourceState,
}

impl Input {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pass(&self) -> PassId {
        self.pass
    }

    /// State the consumer expects the resource in
    pub fn state(&self) -> ResourceState {
        self.state
    }
}

/// Where an output's resource comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    /// Produced and owned by the declaring pass
    Source(ResourceId),
    /// Forwards whatever the given input resolves to
    Relay(InputId),
}

#[derive(Debug, Clone)]
pub struct Output {
    pub(crate) name: String,
    pub(crate) pass: PassId,
    pub(crate) state: ResourceState,
    pub(crate) source: OutputSource,
}

impl Output {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pass(&self) -> PassId {
        self.pass
    }

    /// State the resource is left in after the pass
    ///
    /// Advisory for relays: the tracked resource state is authoritative.
    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn source(&self) -> OutputSource {
        self.source
    }

    pub fn is_relay(&self) -> bool {
        matches!(self.source, OutputSource::Relay(_))
    }
}
