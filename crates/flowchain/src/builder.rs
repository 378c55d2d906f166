use crate::chain::{ChainNode, RunOptions};
use crate::{ChainError, Value};

/// Fluent wiring of a chain.
///
/// `then` attaches an unconditional successor to the cursor and moves the
/// cursor onto it. `when` attaches a conditional edge to the cursor and
/// leaves the cursor where it is, so a following `then` adds the fallback
/// for that same node:
///
/// ```
/// use flowchain::{ChainBuilder, ChainNode, FnNode};
///
/// let check = ChainNode::new(FnNode::constant("check", "ok"));
/// let happy = ChainNode::new(FnNode::constant("happy", "done"));
/// let fallback = ChainNode::new(FnNode::constant("fallback", "retry"));
///
/// let root = ChainBuilder::new(&check)
///     .when(|r| r.as_str() == Some("ok"), &happy)
///     .then(&fallback)
///     .build();
/// assert!(root.ptr_eq(&check));
/// ```
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    root: ChainNode,
    cursor: ChainNode,
}

impl ChainBuilder {
    pub fn new(root: &ChainNode) -> Self {
        Self {
            root: root.clone(),
            cursor: root.clone(),
        }
    }

    pub fn then(mut self, node: &ChainNode) -> Self {
        self.cursor = self.cursor.next(node);
        self
    }

    pub fn when<F>(self, predicate: F, node: &ChainNode) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.cursor.when(predicate, node);
        self
    }

    /// The node the next `then`/`when` attaches to.
    pub fn cursor(&self) -> &ChainNode {
        &self.cursor
    }

    /// The root of the wired graph. Always the node the builder started from.
    pub fn build(&self) -> ChainNode {
        self.root.clone()
    }

    pub async fn run(&self) -> Result<Value, ChainError> {
        self.root.run().await
    }

    pub async fn run_with(&self, options: RunOptions) -> Result<Value, ChainError> {
        self.root.run_with(options).await
    }
}

/// Start a fluent chain at `node`.
pub fn flow(node: &ChainNode) -> ChainBuilder {
    ChainBuilder::new(node)
}

/// Attach `b` as an unconditional successor of `a`; returns `a`.
pub fn chain(a: &ChainNode, b: &ChainNode) -> ChainNode {
    a.next(b);
    a.clone()
}

/// Attach a conditional edge from `node` to `target`; returns `node`.
pub fn when<F>(node: &ChainNode, predicate: F, target: &ChainNode) -> ChainNode
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    node.when(predicate, target);
    node.clone()
}
