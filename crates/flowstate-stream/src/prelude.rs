//! Common imports for typical FlowState client usage.
pub use crate::{
    ChatSession, ClientConfig, ClientError, CompletionPolicy, Deployment, FlowStateClient,
    ReaderEvent, StepEvent, StepKind, StreamError, StreamingChunkReader,
};
