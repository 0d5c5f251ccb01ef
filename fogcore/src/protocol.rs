//! Message protocol between the sampler and the renderer.
//!
//! Messages are UTF-8 JSON objects tagged by a `"type"` field:
//!
//! | type              | direction          | payload                         |
//! |-------------------|--------------------|---------------------------------|
//! | `renderer-ready`  | renderer -> sampler | none                            |
//! | `record-start`    | renderer -> sampler | none                            |
//! | `record-stop`     | renderer -> sampler | none                            |
//! | `live-position`   | sampler -> renderer | `{lat, lng, accuracy?, ts}`     |
//! | `points-add`      | sampler -> renderer | `{points: [{lat, lng, ts}]}`    |
//! | `points-sync`     | sampler -> renderer | `{points: [...]}` (replace)     |
//! | `points-clear`    | sampler -> renderer | none                            |
//! | `record-status`   | sampler -> renderer | `{active}`                      |

use serde::{Deserialize, Serialize};

use crate::{GeoPoint, Result, TrackPoint};

/// Messages sent from the sampler to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SamplerMessage {
    /// Current device position, for display only
    LivePosition {
        lat: f64,
        lng: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accuracy: Option<f64>,
        ts: i64,
    },
    /// Newly admitted points, appended in order
    PointsAdd { points: Vec<TrackPoint> },
    /// Full history, replaces the renderer's point set
    PointsSync { points: Vec<TrackPoint> },
    /// Drop every persisted point on the renderer
    PointsClear,
    /// Authoritative recording state
    RecordStatus { active: bool },
}

impl SamplerMessage {
    /// Position carried by a `live-position` message.
    pub fn live_position(&self) -> Option<GeoPoint> {
        match self {
            SamplerMessage::LivePosition { lat, lng, .. } => Some(GeoPoint::new(*lat, *lng)),
            _ => None,
        }
    }

    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            SamplerMessage::LivePosition { .. } => "live-position",
            SamplerMessage::PointsAdd { .. } => "points-add",
            SamplerMessage::PointsSync { .. } => "points-sync",
            SamplerMessage::PointsClear => "points-clear",
            SamplerMessage::RecordStatus { .. } => "record-status",
        }
    }
}

/// Messages sent from the renderer to the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RendererMessage {
    /// Renderer is mounted and can receive messages
    RendererReady,
    /// User asked to start recording
    RecordStart,
    /// User asked to stop recording
    RecordStop,
}

/// Serialize a message to its wire form.
pub fn encode_message<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a sampler -> renderer payload.
pub fn decode_sampler_message(payload: &[u8]) -> Result<SamplerMessage> {
    Ok(serde_json::from_slice(payload)?)
}

/// Decode a renderer -> sampler payload.
pub fn decode_renderer_message(payload: &[u8]) -> Result<RendererMessage> {
    Ok(serde_json::from_slice(payload)?)
}
