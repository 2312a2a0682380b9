//! Output records and their NDJSON encoding
//!
//! Every record is one JSON object tagged by `type`, written on its own line.
//! The stream of records for a generation ends by closing, on every terminal
//! path; there is no explicit "done" record.

use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::RelayError;
use crate::session::{GenerationIds, SessionSummary};

/// Content type of the encoded stream
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Category of an outbound error record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The user message was rejected upstream
    UserInput,
    /// The agent failed
    Agent,
    /// The relay gave up waiting for upstream events
    Timeout,
    /// The upstream service could not be reached or broke the stream
    Upstream,
}

/// One record written to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundRecord {
    /// Identifiers of a newly started generation; always first when present
    #[serde(rename_all = "camelCase")]
    Ids {
        conversation_id: String,
        message_id: String,
    },

    /// Answer delta
    Text { text: String },

    /// Reasoning delta
    ChainOfThought { text: String },

    /// Authoritative final answer
    Success { message: String },

    /// Terminal failure
    Error {
        kind: ErrorKind,
        code: String,
        message: String,
    },

    /// Complete outcome, used by the non-streaming endpoint
    #[serde(rename_all = "camelCase")]
    Result {
        conversation_id: String,
        message_id: String,
        answer: String,
        thought: String,
    },
}

impl OutboundRecord {
    pub fn ids(ids: &GenerationIds) -> Self {
        OutboundRecord::Ids {
            conversation_id: ids.conversation_id.clone(),
            message_id: ids.message_id.clone(),
        }
    }

    /// Error record for `error`, or `None` for errors the client never sees
    pub fn from_error(error: &RelayError) -> Option<Self> {
        error.kind().map(|kind| OutboundRecord::Error {
            kind,
            code: error.code().to_string(),
            message: error.message(),
        })
    }

    /// Result record for a finished session
    pub fn result(summary: &SessionSummary) -> Self {
        OutboundRecord::Result {
            conversation_id: summary.ids.conversation_id.clone(),
            message_id: summary.ids.message_id.clone(),
            answer: summary.answer.clone(),
            thought: summary.thought.clone(),
        }
    }

    /// Wire name of this record
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundRecord::Ids { .. } => "ids",
            OutboundRecord::Text { .. } => "text",
            OutboundRecord::ChainOfThought { .. } => "chain_of_thought",
            OutboundRecord::Success { .. } => "success",
            OutboundRecord::Error { .. } => "error",
            OutboundRecord::Result { .. } => "result",
        }
    }
}

/// Encode one record as a newline-terminated JSON line
pub fn encode_record(record: &OutboundRecord) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}

/// Turn a relay's record channel into a stream of NDJSON lines
///
/// The stream ends when the relay closes the channel.
pub fn ndjson_stream(
    records: mpsc::Receiver<OutboundRecord>,
) -> impl Stream<Item = Result<String, serde_json::Error>> + Send + 'static {
    ReceiverStream::new(records).map(|record| encode_record(&record))
}

#[cfg(test)]
#[path = "encode_tests.rs"]
mod tests;
