//! # chatwire-llm: resilient client for OpenAI-compatible chat completions
//!
//! One call goes through four stages:
//!
//! ```text
//! input + overrides ──► request::build ──► endpoint probe ──► retry::execute ──► normalize
//!   (no I/O)              (Config / InvalidRequest)  (Resolution)   (RetriesExhausted / Cancelled)
//! ```
//!
//! - **Endpoint resolution** turns a base URL into the full
//!   `/v1/chat/completions` URL and checks the host resolves before any
//!   request is sent.
//! - **Retry** re-sends on transport errors, timeouts and non-2xx statuses
//!   with exponential backoff (`base * 2^(n-1)`, no jitter).
//! - **Normalisation** maps the various response shapes providers return
//!   onto an ordered list of text choices.
//!
//! The HTTP layer and the DNS probe sit behind the [`Transport`] and
//! [`HostProbe`] traits so the whole flow runs against fakes in tests.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod endpoint;
pub mod error;
pub mod normalize;
pub mod request;
pub mod retry;
pub mod settings;
pub mod transport;
pub mod types;

pub use client::{ChatClient, complete, complete_with};
pub use endpoint::{DnsProbe, Endpoint, HostProbe};
pub use error::{LlmError, Result, TransportFailure};
pub use request::Overrides;
pub use retry::{RetryPolicy, Transport};
pub use settings::{ClientArgs, ClientConfig};
pub use transport::ReqwestTransport;
pub use types::{CompletionInput, CompletionResult, Message, NormalizedChoice};
