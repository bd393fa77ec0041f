//! Chain: ordered, doubly linked sequence of stages
//!
//! Chains are assembled once at definition time and only read while
//! executing. Splicing two chains relinks their ends; stages are never copied.
use http::StatusCode;
use std::collections::LinkedList;

use crate::error::ChainError;
use crate::stage::{BoxError, Stage, StageError};

/// One occurrence of a stage inside a chain.
pub struct Link {
    stage: Box<dyn Stage>,
    catch: Option<(StatusCode, String)>,
}

impl Link {
    fn new(stage: Box<dyn Stage>) -> Self {
        Self { stage, catch: None }
    }

    pub fn stage(&self) -> &dyn Stage {
        self.stage.as_ref()
    }

    pub fn display(&self) -> String {
        self.stage.display()
    }

    /// The stage's own translation, unless [`Chain::catch`] replaced it.
    pub fn on_error(&self, err: BoxError) -> StageError {
        match &self.catch {
            Some((code, message)) => StageError::with_message(*code, message),
            None => self.stage.on_error(err),
        }
    }
}

/// A non-empty pipeline definition.
///
/// Pipelines read left to right:
///
/// ```ignore
/// let pipe = Chain::first(stage0).then(stage1).then(stage2);
/// ```
///
/// Every stage is moved into the chain, so a stage can belong to one chain only.
pub struct Chain {
    head: Link,
    tail: LinkedList<Link>,
}

impl Chain {
    /// Wraps a single stage as a one-element chain.
    pub fn first(stage: impl Stage + 'static) -> Self {
        Self::from_boxed(Box::new(stage))
    }

    pub fn from_boxed(stage: Box<dyn Stage>) -> Self {
        Self {
            head: Link::new(stage),
            tail: LinkedList::new(),
        }
    }

    /// Appends `stage` after the current last stage.
    pub fn then(mut self, stage: impl Stage + 'static) -> Self {
        self.push(Box::new(stage));
        self
    }

    pub fn push(&mut self, stage: Box<dyn Stage>) {
        self.tail.push_back(Link::new(stage));
    }

    /// Replaces the error translation of the current last stage with a fixed
    /// `(code, {"error": message})` response. Earlier stages are untouched.
    pub fn catch(mut self, code: StatusCode, message: impl Into<String>) -> Self {
        let last = match self.tail.back_mut() {
            Some(last) => last,
            None => &mut self.head,
        };
        last.catch = Some((code, message.into()));
        self
    }

    /// Moves every stage of `other` after this chain's last stage in O(1).
    pub fn append(&mut self, other: Chain) {
        let Chain { head, mut tail } = other;
        self.tail.push_back(head);
        self.tail.append(&mut tail);
    }

    pub fn first_link(&self) -> &Link {
        &self.head
    }

    pub fn last_link(&self) -> &Link {
        self.tail.back().unwrap_or(&self.head)
    }

    pub fn links(&self) -> impl DoubleEndedIterator<Item = &Link> + '_ {
        std::iter::once(&self.head).chain(self.tail.iter())
    }

    pub fn stage_count(&self) -> usize {
        1 + self.tail.len()
    }

    pub fn labels(&self) -> Vec<String> {
        self.links().map(Link::display).collect()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.labels()).finish()
    }
}

/// Builds a chain left to right from a list of stages.
pub fn make_chain(stages: Vec<Box<dyn Stage>>) -> Result<Chain, ChainError> {
    let mut stages = stages.into_iter();
    let mut chain = Chain::from_boxed(stages.next().ok_or(ChainError::Empty)?);
    for stage in stages {
        chain.push(stage);
    }
    Ok(chain)
}

/// Concatenates whole chains into the first one. Zero chains yield `None`.
pub fn in_sequence(chains: impl IntoIterator<Item = Chain>) -> Option<Chain> {
    let mut chains = chains.into_iter();
    let mut head = chains.next()?;
    for chain in chains {
        head.append(chain);
    }
    Some(head)
}

/// Builds a [`Chain`] from one or more stage expressions.
///
/// `chain![a, b, c]` is `Chain::first(a).then(b).then(c)`.
#[macro_export]
macro_rules! chain {
    ($first:expr $(, $rest:expr)* $(,)?) => {
        $crate::Chain::first($first)$(.then($rest))*
    };
}
