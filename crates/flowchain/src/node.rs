use crate::{NodeError, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

/// Parameter bag attached to a node.
pub type Params = HashMap<String, Value>;

/// Identifies one traversal started by `ChainNode::run`.
pub type RunId = Uuid;

/// Behaviour of a single step in a chain.
///
/// Hooks run strictly in `prep` -> `exec` -> `post` order. Only the value
/// returned by `exec` is carried forward: it is handed to `post`, tested by
/// the conditional edges of the node, and becomes the result of the whole
/// traversal when the node has no successor.
#[async_trait]
pub trait Node: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str {
        "node"
    }

    /// Optional: side effects before `exec`
    async fn prep(&self, _ctx: &NodeContext) -> Result<(), NodeError> {
        Ok(())
    }

    /// The unit of work
    async fn exec(&self, ctx: &NodeContext) -> Result<Value, NodeError>;

    /// Optional: side effects after `exec`, receives its result
    async fn post(&self, _ctx: &NodeContext, _result: &Value) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Context handed to every hook of a node for one visit.
///
/// `params` is a snapshot of the node's bag taken when the traversal entered
/// the node, so `set_params` calls made by other callers during the visit are
/// not observed.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub run_id: RunId,
    /// Zero-based position of this visit in the traversal.
    pub hop: usize,
    pub params: Params,
}

impl NodeContext {
    pub fn new(run_id: RunId, hop: usize, params: Params) -> Self {
        Self { run_id, hop, params }
    }

    /// Get required param or return error
    pub fn require_param(&self, name: &str) -> Result<&Value, NodeError> {
        self.params
            .get(name)
            .ok_or_else(|| NodeError::MissingParam(name.to_string()))
    }

    /// Get required string param
    pub fn require_str(&self, name: &str) -> Result<&str, NodeError> {
        let value = self.require_param(name)?;
        value.as_str().ok_or_else(|| NodeError::InvalidParamType {
            field: name.to_string(),
            expected: "string".to_string(),
            actual: value.kind().to_string(),
        })
    }

    /// Get param with default
    pub fn param_or(&self, name: &str, default: Value) -> Value {
        self.params.get(name).cloned().unwrap_or(default)
    }
}

type ExecFn = dyn Fn(&NodeContext) -> Result<Value, NodeError> + Send + Sync;

/// Node whose `exec` is a plain closure.
pub struct FnNode {
    name: String,
    exec: Box<ExecFn>,
}

impl FnNode {
    pub fn new<F>(name: impl Into<String>, exec: F) -> Self
    where
        F: Fn(&NodeContext) -> Result<Value, NodeError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            exec: Box::new(exec),
        }
    }

    /// Node that always yields the same value.
    pub fn constant(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(name, move |_| Ok(value.clone()))
    }
}

#[async_trait]
impl Node for FnNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exec(&self, ctx: &NodeContext) -> Result<Value, NodeError> {
        (self.exec)(ctx)
    }
}
