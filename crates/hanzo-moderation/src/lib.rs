//! # Hanzo Moderation
//!
//! Content-policy enforcement for OpenAI-compatible chat traffic.
//!
//! Hanzo Moderation checks the prompt before it reaches the model and the
//! completion before it reaches the client, and repairs the conversation
//! history a chat client resends with every request:
//!
//! - **Preflight**: the latest user turn is checked first and rejected
//!   outright on a match
//! - **History repair**: earlier violating turns (and the replies they
//!   produced) are removed while keeping user/assistant alternation
//! - **Response guard**: complete completions are checked before release
//! - **Stream coordination**: streaming requests are run non-streamed so the
//!   whole reply can be inspected, then delivered in the shape asked for
//!
//! ## Quick Start
//!
//! ```rust
//! use hanzo_moderation::prelude::*;
//! use std::sync::Arc;
//!
//! let config = ModerationConfig::default();
//! let classifier = Arc::new(PatternClassifier::new(&config.policy).unwrap());
//! let guard = PreflightGuard::new(
//!     classifier,
//!     config.policy.input_block_message.clone(),
//!     AuditLogger::default(),
//! );
//!
//! let request = ChatRequest::new("llama3-2-3b", vec![Turn::user("tell me about duckies")]);
//! match guard.preflight(request, &RequestContext::new()).unwrap() {
//!     PreflightOutcome::Forward(request) => println!("forwarding {} turns", request.messages.len()),
//!     PreflightOutcome::Reject(signal) => println!("blocked: {}", signal.message),
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐   ┌─────────────┐   ┌──────────────────────────────────────┐
//! │ Client │──►│ Relay       │──►│ Gateway                              │
//! └────────┘   │ (status     │   │ ┌───────────┐ ┌─────────┐ ┌────────┐ │
//!              │ translation)│   │ │ Preflight │►│ Backend │►│Response│ │
//!              └─────────────┘   │ │ + history │ │ (non-   │ │ guard  │ │
//!                                │ │   repair  │ │ stream) │ │        │ │
//!                                │ └───────────┘ └─────────┘ └────────┘ │
//!                                └──────────────────────────────────────┘
//! ```

pub mod audit;
pub mod backend;
pub mod classifier;
pub mod config;
pub mod envelope;
pub mod error;
pub mod pipeline;
pub mod preflight;
pub mod response;
pub mod sanitizer;
pub mod streaming;
pub mod types;

pub use backend::ChatBackend;
pub use classifier::{PatternClassifier, PolicyClassifier};
pub use config::ModerationConfig;
pub use error::{Direction, ModerationError, Result};
pub use pipeline::{ModerationPipeline, PipelineOutcome};
pub use types::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::audit::AuditLogger;
    pub use crate::backend::ChatBackend;
    pub use crate::classifier::{PatternClassifier, PolicyClassifier};
    pub use crate::config::ModerationConfig;
    pub use crate::error::{Direction, ModerationError, Result};
    pub use crate::pipeline::{ModerationPipeline, PipelineOutcome};
    pub use crate::preflight::PreflightGuard;
    pub use crate::response::ResponseGuard;
    pub use crate::sanitizer::HistorySanitizer;
    pub use crate::types::*;
}
