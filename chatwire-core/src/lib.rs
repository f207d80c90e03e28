//! # chatwire-core
//!
//! Shared building blocks for the chatwire workspace:
//!
//! - **Configuration**: [`ChatwireConfig`], loadable from TOML and
//!   overridable through `CHATWIRE__SECTION__KEY` environment variables.
//! - **Errors**: [`ChatwireError`], the error type for everything outside
//!   the provider client itself.
//! - **Persistence**: [`CounterStore`], a small SQLite-backed store for
//!   referral, bonus and per-day usage counters.
//!
//! The resilient provider client lives in `chatwire-llm`; this crate never
//! talks to the network.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod persistence;

pub use config::ChatwireConfig;
pub use error::{ChatwireError, Result};
pub use persistence::CounterStore;
