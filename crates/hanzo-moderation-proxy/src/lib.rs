//! HTTP surfaces for the moderation pipeline
//!
//! - [`gateway`]: an OpenAI-compatible chat endpoint that runs every request
//!   through [`hanzo_moderation::ModerationPipeline`] before and after the
//!   upstream model server
//! - [`relay`]: the [`StatusTranslator`](relay::StatusTranslator) reverse
//!   proxy that turns the gateway's policy blocks into ordinary assistant
//!   replies
//!
//! A typical deployment chains them: client → relay → gateway → model.

pub mod api;
pub mod gateway;
pub mod relay;
pub mod upstream;

pub use api::{ErrorDetail, ErrorResponse, HealthResponse};
pub use gateway::gateway_router;
pub use relay::{RelayConfig, StatusTranslator};
pub use upstream::HttpBackend;
