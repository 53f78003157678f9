//! tpm - Terminus plugin manager
//!
//! Installs, updates, lists and removes Terminus plugins kept as Git
//! checkouts under a local plugin root, resolving plugin names through the
//! plugin registry.
//!
//! This library exposes the core functionality for both the CLI binary and
//! integration testing.

pub mod config;
pub mod paths;
pub mod plugins;
pub mod registry;
pub mod repositories;
pub mod validator;
pub mod vcs;
pub mod web;
