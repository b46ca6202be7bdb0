use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reading::DropReason;

/// Debug channel message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Frame,
    Ocr,
}

/// Immutable envelope published on the debug channel. Observability only:
/// nothing in the pipeline reads these back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    RunStarted(RunStarted),
    FrameSampled(FrameSampled),
    FrameSkipped(FrameSkipped),
    OcrText(OcrText),
    OcrFailed(OcrFailed),
    RunFinished(RunFinished),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStarted {
    pub source: String,
    pub duration_seconds: f64,
    pub requested_slots: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSampled {
    pub sample_at: u64,
    pub frame_index: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSkipped {
    pub sample_at: u64,
    pub reason: DropReason,
    pub detail: String,
}

/// Raw text exactly as the engine returned it, one entry per region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrText {
    pub sample_at: u64,
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrFailed {
    pub sample_at: u64,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFinished {
    pub observations: usize,
    pub dropped: usize,
    pub cancelled: bool,
}

impl PipelineEvent {
    pub fn new(payload: EventPayload) -> Self {
        let kind = match &payload {
            EventPayload::RunStarted(_) | EventPayload::RunFinished(_) => EventKind::Lifecycle,
            EventPayload::FrameSampled(_) | EventPayload::FrameSkipped(_) => EventKind::Frame,
            EventPayload::OcrText(_) | EventPayload::OcrFailed(_) => EventKind::Ocr,
        };
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }
}
