//! Branch lifecycle engine.
//!
//! A branch is a named, isolated development workspace: a rendered copy of
//! the app template with its own host port, git branch and container group.
//! This crate owns the state model, the filesystem-backed registry, port
//! allocation, template rendering, credential validation, git plumbing and
//! the orchestration that ties them together.

pub mod branch;
pub mod credential;
pub mod engine;
pub mod git;
pub mod ports;
pub mod registry;
pub mod template;
pub mod terminal;
pub mod test_utils;

pub use branch::{Branch, BranchStatus, CreateBranchRequest, TerminalSession};
pub use credential::{CredentialValidator, GeminiValidator, TEST_API_KEY};
pub use engine::BranchEngine;
pub use git::{GitVcs, Vcs};
pub use ports::PortAllocator;
pub use registry::Registry;
pub use terminal::TerminalSessionManager;
