//! Streaming agent-step reader and HTTP client for the FlowState chat backend.
//!
//! The backend answers a chat turn with `data: <json>` lines, one per agent
//! step, ending with `data: [DONE]` or at stream close. `StreamingChunkReader`
//! turns that body into typed `StepEvent` callbacks; `FlowStateClient` opens the
//! authenticated request and feeds the body to the reader.
//!
//! ```no_run
//! use flowstate_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = FlowStateClient::from_env()?;
//! let mut session = ChatSession::new("access-token").user_id("user-1");
//! client.reset_thread(&mut session).await?;
//!
//! client
//!     .stream_chat(
//!         &session,
//!         "What is due this week?",
//!         |step| println!("{}: {}", step.agent(), step.message()),
//!         |_| println!("done"),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

/// Authenticated HTTP client for the chat backend.
pub mod client;
/// Client configuration and deployment defaults.
pub mod config;
/// Incremental line splitting over body chunks.
pub mod decoder;
/// Public error types.
pub mod errors;
/// Process-wide tracing setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Stream session and the callback-driven reader.
pub mod reader;
/// `data: ` line classification and wire records.
pub mod record;
/// Caller-owned chat context.
pub mod session;
/// Agent step events.
pub mod step;

pub use client::FlowStateClient;
pub use config::{ClientConfig, Deployment};
pub use decoder::LineDecoder;
pub use errors::{ClientError, StreamError};
pub use reader::{CompletionPolicy, ReaderEvent, StreamSession, StreamingChunkReader};
pub use record::{LineOutcome, WireRecord, parse_line};
pub use session::ChatSession;
pub use step::{StepBody, StepEvent, StepKind};
