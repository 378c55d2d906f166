use crate::builder::ChainBuilder;
use crate::node::{Node, NodeContext, Params, RunId};
use crate::{ChainError, NodeError, Phase, Value};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Predicate over the result of the node that hosts a conditional edge.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

#[derive(Clone)]
struct Condition {
    predicate: Predicate,
    node: ChainNode,
}

#[derive(Clone, Default)]
struct Edges {
    next: Vec<ChainNode>,
    conditions: Vec<Condition>,
}

struct Inner {
    node: Box<dyn Node>,
    params: RwLock<Params>,
    edges: RwLock<Edges>,
}

/// Shared handle to a node wired into a chain.
///
/// Clones refer to the same node: identity is the allocation, not a key, so
/// one node can sit at several positions of a graph or be its own successor.
/// Cycles keep their members alive until `clear_edges` is called on one of
/// them.
///
/// Running the same node from several traversals at once is unsupported for
/// any state the node keeps internally. The parameter bag is copied into each
/// visit's [`NodeContext`].
#[derive(Clone)]
pub struct ChainNode {
    inner: Arc<Inner>,
}

/// Limits applied to a single traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Maximum number of node visits; `None` runs until the chain ends.
    pub max_hops: Option<usize>,
}

impl RunOptions {
    pub fn with_max_hops(max_hops: usize) -> Self {
        Self {
            max_hops: Some(max_hops),
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl ChainNode {
    pub fn new(node: impl Node + 'static) -> Self {
        Self::from_boxed(Box::new(node))
    }

    pub fn from_boxed(node: Box<dyn Node>) -> Self {
        Self {
            inner: Arc::new(Inner {
                node,
                params: RwLock::new(Params::new()),
                edges: RwLock::new(Edges::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.node.name()
    }

    /// Merge entries into the parameter bag, overwriting existing keys.
    pub fn set_params<K, V>(&self, params: impl IntoIterator<Item = (K, V)>) -> &Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut bag = write(&self.inner.params);
        for (key, value) in params {
            bag.insert(key.into(), value.into());
        }
        self
    }

    /// Copy of the current parameter bag.
    pub fn params(&self) -> Params {
        read(&self.inner.params).clone()
    }

    /// Append an unconditional successor and return it, so manual wiring
    /// reads `a.next(&b).next(&c)`.
    pub fn next(&self, node: &ChainNode) -> ChainNode {
        write(&self.inner.edges).next.push(node.clone());
        node.clone()
    }

    /// Append several unconditional successors in order.
    pub fn next_many(&self, nodes: &[ChainNode]) -> &Self {
        write(&self.inner.edges).next.extend(nodes.iter().cloned());
        self
    }

    /// Append a conditional edge. Returns `self` so several conditions can be
    /// attached to the same node.
    pub fn when<F>(&self, predicate: F, node: &ChainNode) -> &Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.when_shared(Arc::new(predicate), node)
    }

    pub fn when_shared(&self, predicate: Predicate, node: &ChainNode) -> &Self {
        write(&self.inner.edges).conditions.push(Condition {
            predicate,
            node: node.clone(),
        });
        self
    }

    /// Start a fluent chain at this node: attach `node` as an unconditional
    /// successor and move the builder cursor onto it.
    pub fn then(&self, node: &ChainNode) -> ChainBuilder {
        ChainBuilder::new(self).then(node)
    }

    /// Unconditional successors in insertion order.
    pub fn successors(&self) -> Vec<ChainNode> {
        read(&self.inner.edges).next.clone()
    }

    /// Targets of the conditional edges in insertion order.
    pub fn conditional_successors(&self) -> Vec<ChainNode> {
        read(&self.inner.edges)
            .conditions
            .iter()
            .map(|c| c.node.clone())
            .collect()
    }

    /// Drop every outgoing edge of this node.
    pub fn clear_edges(&self) {
        *write(&self.inner.edges) = Edges::default();
    }

    pub fn ptr_eq(&self, other: &ChainNode) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Resolve where a traversal goes after this node produced `result`:
    /// the first conditional edge whose predicate holds, otherwise the first
    /// unconditional successor, otherwise nowhere.
    pub fn successor_for(&self, result: &Value) -> Option<ChainNode> {
        // Predicates run outside the lock so they may rewire the graph.
        let edges = read(&self.inner.edges).clone();
        edges
            .conditions
            .iter()
            .find(|c| (c.predicate)(result))
            .map(|c| c.node.clone())
            .or_else(|| edges.next.first().cloned())
    }

    /// Run the chain starting at this node until a node without a successor
    /// is reached, and return that node's `exec` result.
    pub async fn run(&self) -> Result<Value, ChainError> {
        self.run_with(RunOptions::default()).await
    }

    pub async fn run_with(&self, options: RunOptions) -> Result<Value, ChainError> {
        let run_id = Uuid::new_v4();
        let mut current = self.clone();
        let mut hop = 0;

        tracing::debug!("Starting chain run {} at node '{}'", run_id, self.name());

        loop {
            if let Some(limit) = options.max_hops {
                if hop >= limit {
                    tracing::warn!("Chain run {} stopped after {} hops", run_id, limit);
                    return Err(ChainError::HopLimitExceeded { limit });
                }
            }

            let result = current.visit(run_id, hop).await?;

            match current.successor_for(&result) {
                Some(next) => {
                    tracing::trace!("'{}' -> '{}'", current.name(), next.name());
                    current = next;
                    hop += 1;
                }
                None => {
                    tracing::debug!("Chain run {} finished after {} hops", run_id, hop + 1);
                    return Ok(result);
                }
            }
        }
    }

    async fn visit(&self, run_id: RunId, hop: usize) -> Result<Value, ChainError> {
        let ctx = NodeContext::new(run_id, hop, self.params());
        let node = &self.inner.node;

        node.prep(&ctx)
            .await
            .map_err(|e| self.failure(Phase::Prep, hop, e))?;

        let result = node
            .exec(&ctx)
            .await
            .map_err(|e| self.failure(Phase::Exec, hop, e))?;

        node.post(&ctx, &result)
            .await
            .map_err(|e| self.failure(Phase::Post, hop, e))?;

        Ok(result)
    }

    fn failure(&self, phase: Phase, hop: usize, source: NodeError) -> ChainError {
        tracing::error!("Node '{}' failed during {}: {}", self.name(), phase, source);
        ChainError::NodeFailed {
            node: self.name().to_string(),
            phase,
            hop,
            source,
        }
    }
}

impl fmt::Debug for ChainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edges = read(&self.inner.edges);
        f.debug_struct("ChainNode")
            .field("name", &self.name())
            .field("next", &edges.next.len())
            .field("conditions", &edges.conditions.len())
            .finish()
    }
}
