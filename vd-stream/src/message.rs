//! Stream message types decoded from the server wire format.
//!
//! Every inbound frame is a JSON object with a string `type` and an
//! arbitrary `payload`. Known event types get a dedicated variant;
//! everything else is carried through as `Unknown` so events added on
//! the server side still reach subscribers.

use serde::{Deserialize, Serialize};

use vd_core::error::{VdError, VdResult};

/// Event types pushed by the Vidarr server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamEventType {
    /// A batch of download jobs finished (`downloadComplete`).
    DownloadComplete,
    /// A download job reported progress (`downloadProgress`).
    DownloadProgress,
    /// Unknown/unhandled event type.
    Unknown(String),
}

impl StreamEventType {
    /// Parse an event type string from the server.
    pub fn from_str(s: &str) -> Self {
        match s {
            "downloadComplete" => Self::DownloadComplete,
            "downloadProgress" => Self::DownloadProgress,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Convert to the server event string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::DownloadComplete => "downloadComplete",
            Self::DownloadProgress => "downloadProgress",
            Self::Unknown(s) => s.as_str(),
        }
    }
}

/// One video inside a completed download batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSummary {
    /// YouTube video identifier.
    #[serde(rename = "youtubeId")]
    pub youtube_id: String,

    /// Channel the video belongs to.
    #[serde(rename = "youTubeChannelName")]
    pub channel_name: String,

    /// Video title.
    #[serde(rename = "youTubeVideoName")]
    pub video_name: String,

    /// Duration in seconds, when the server knows it.
    #[serde(default)]
    pub duration: Option<i64>,
}

/// Typed payload for `downloadComplete` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadCompletePayload {
    /// The videos downloaded in this batch. Empty when every job in the
    /// batch was skipped or failed.
    #[serde(default)]
    pub videos: Vec<VideoSummary>,
}

/// A decoded message from the event stream.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    /// The type of event.
    pub event_type: StreamEventType,
    /// The raw event payload from the server.
    pub payload: serde_json::Value,
}

impl StreamMessage {
    /// Decode a raw text frame.
    ///
    /// Frames must be JSON objects with a string `type` field. A missing
    /// `payload` decodes as null; subscribers interpret the payload per
    /// event type.
    pub fn from_frame(frame: &str) -> VdResult<Self> {
        let value: serde_json::Value =
            serde_json::from_str(frame).map_err(|e| VdError::Frame(e.to_string()))?;

        let event_name = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| VdError::Frame("missing string `type` field".into()))?;

        let payload = value
            .get("payload")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        Ok(Self {
            event_type: StreamEventType::from_str(event_name),
            payload,
        })
    }

    /// Try to parse this message's payload as a download batch.
    /// Returns None for other event types or an unparsable payload.
    pub fn as_download_complete(&self) -> Option<DownloadCompletePayload> {
        if self.event_type == StreamEventType::DownloadComplete {
            serde_json::from_value(self.payload.clone()).ok()
        } else {
            None
        }
    }
}
