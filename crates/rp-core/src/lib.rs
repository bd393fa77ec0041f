//! rp core: Stage trait, Chain, Context and the execution engine
//!
//! A request pipeline is a [`Chain`] of [`Stage`]s. Each stage receives the
//! previous stage's output plus the per-request [`Context`], and the first
//! failure ends the run with that stage's [`StageError`].
//!
//! # Pipeline Flow
//!
//! ```text
//! null → Stage 1 → Stage 2 → IfElse ──┬─ then chain ─┐→ InParallel ─┬─ branch 0 ─┐→ Response
//!                                     └─ else chain ─┘              └─ branch 1 ─┘
//! ```

pub mod chain;
pub mod conditional;
pub mod context;
pub mod data_model;
pub mod error;
pub mod logger;
pub mod naming;
pub mod parallel;
pub mod runner;
pub mod stage;

pub use chain::{in_sequence, make_chain, Chain, Link};
pub use conditional::{if_else, IfElse};
pub use context::Context;
pub use data_model::{Response, RESPONSE_TAG};
pub use error::{ChainError, ContextError};
pub use logger::{DefaultLogger, Logger, MultiLogger, RecordingLogger};
pub use parallel::{in_parallel, InParallel};
pub use runner::{execute, execute_with};
pub use stage::{BoxError, NestedError, SharedLogger, Stage, StageError};

pub use http::StatusCode;
