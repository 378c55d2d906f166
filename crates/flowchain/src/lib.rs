//! Node chains for the flow engine
//!
//! A chain is a graph of [`ChainNode`]s joined by unconditional (`next`)
//! and conditional (`when`) edges. Running a chain follows a single active
//! path: after each node the first matching condition wins, then the first
//! unconditional successor, and the traversal ends at a node with neither.

mod builder;
mod chain;
mod error;
mod node;
mod value;

pub use builder::{chain, flow, when, ChainBuilder};
pub use chain::{ChainNode, Predicate, RunOptions};
pub use error::{ChainError, NodeError, Phase};
pub use node::{FnNode, Node, NodeContext, Params, RunId};
pub use value::Value;

/// Result type for chain traversals
pub type Result<T> = std::result::Result<T, ChainError>;
