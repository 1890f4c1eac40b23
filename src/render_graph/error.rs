//! Error types for graph construction and execution

use crate::backend::{BackendError, ResourceState};
use thiserror::Error;

/// Errors raised while building, compiling or executing a render graph
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Pass `{pass}` declares `{edge}` twice")]
    DuplicateEdge { pass: String, edge: String },

    #[error("Pass name `{0}` is already taken")]
    DuplicatePass(String),

    #[error("Edge `{pass}.{edge}` declares the invalid state")]
    InvalidState { pass: String, edge: String },

    #[error("Unknown pass `{0}`")]
    UnknownPass(String),

    #[error("Pass `{pass}` has no edge named `{edge}`")]
    UnknownEdge { pass: String, edge: String },

    #[error("Id {0} does not belong to this graph")]
    InvalidId(String),

    #[error("Relay `{pass}.{edge}` must forward an input of the same pass")]
    InvalidRelay { pass: String, edge: String },

    #[error("Pass `{pass}` does not own resource `{resource}`")]
    NotOwner { pass: String, resource: String },

    #[error("Input `{pass}.{input}` is already wired")]
    InputAlreadyWired { pass: String, input: String },

    #[error("Pass `{0}` cannot consume its own output")]
    SelfWire(String),

    #[error("Consumers of `{output}` disagree on state: {existing} vs {requested}")]
    ConflictingConsumerStates {
        output: String,
        existing: ResourceState,
        requested: ResourceState,
    },

    #[error("Input `{pass}.{input}` is not wired")]
    UnwiredInput { pass: String, input: String },

    #[error("Cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Graph is finalized; passes and wires can no longer change")]
    Finalized,

    #[error("Pass `{0}` was not started")]
    PassNotStarted(String),

    #[error("Resource `{0}` has no native object bound")]
    Unbound(String),

    #[error("Pass `{pass}` failed: {source}")]
    Pass {
        pass: String,
        #[source]
        source: Box<GraphError>,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type GraphResult<T> = Result<T, GraphError>;
