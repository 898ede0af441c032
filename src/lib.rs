//! Run a command-line tool inside a reusable container as if it were local.
//!
//! `runbox` finds a reachable container engine (Docker or Podman), makes sure
//! a container for the current project exists, and attaches an exec session
//! to the local terminal. The remote exit code is passed back unchanged.
//!
//! # Architecture
//!
//! Engine selection produces an [`engine::EngineSession`], a closed enum over
//! the two engine adapters. Everything else is written against the
//! [`engine::ContainerEngine`] trait it implements: the reconciler that
//! reuses, recreates or pulls, and the session manager that streams output,
//! forwards input and resizes, and restores the terminal on every exit path.
//! Registry credentials for pulls come from the [`registry`] module.
//!
//! # Modules
//!
//! - [`api`]: Orchestration of a full run, independent of the CLI
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`engine`]: Engine selection, adapters, reconciliation and exec sessions
//! - [`error`]: Semantic error types for the application
//! - [`registry`]: Registry credential resolution for image pulls

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
