//! Event model and incremental decoder for the agent's line-delimited stream.
//!
//! The remote coding agent emits one JSON object per line. This crate owns the
//! closed set of domain events those lines map to, plus the byte-level decoder
//! that turns arbitrarily chunked network reads into whole events. It contains
//! no transport or conversation state; those concerns live upstream.
//!
//! Forward-compatibility contract: lines that do not decode are dropped, and
//! recognized lines with an unrecognized `type` become [`AgentEvent::Unknown`]
//! rather than failing the stream.

pub mod decoder;
pub mod event;

pub use decoder::LineDecoder;
pub use event::{
    AgentContentBlock, AgentEvent, AssistantEvent, AssistantMessage, ResultEvent, SystemEvent,
    ToolResultBlock, ToolResultEvent, ToolResultMessage,
};
