//! # counsel-core
//!
//! Core types for the Counsel multi-agent advising engine.
//!
//! Every component of a turn communicates through a single shared record, the
//! [`Blackboard`]. Domain executors read snapshots of it, the conflict
//! detector inspects it, and only the orchestrator writes to it.
//!
//! ## Contents
//!
//! - Blackboard and the values accumulated on it (outputs, constraints,
//!   risks, plan options, conflicts)
//! - Unified error type and the per-executor failure record
//! - Repository-level configuration (`.counsel/config.toml`)
//! - Fail-open helpers for infrastructure work

mod blackboard;
pub mod config;
mod error;
pub mod fail_open;
mod types;

pub use blackboard::{Blackboard, FailureRecord, Profile};
pub use config::CounselConfig;
pub use error::{CounselError, ExecutorFailure, FailureCause, Result};
pub use types::*;
