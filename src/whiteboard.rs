//! Whiteboard operation log: sequenced draw operations, a global undo/redo
//! cursor, and snapshot replay for late joiners.
//!
//! The log is the canonical canvas state; clients reconstruct the picture by
//! replaying applied operations in `op_id` order. Undo is a shared stack:
//! it retracts the most recent applied operation regardless of author.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::CanvasConfig;
use crate::error::SessionError;

/// Operation type as carried on the wire and in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Stroke,
    Text,
    Shape,
    Clear,
    Undo,
    Redo,
}

/// A sequenced whiteboard operation. `op_id` is assigned by the room's
/// sequencer, never by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhiteboardOperation {
    pub op_id: u64,
    pub room_id: String,
    pub author_connection_id: String,
    pub op_type: OpType,
    pub data: Value,
    pub timestamp: u64,
}

/// A client draft that passed shape validation and is ready for sequencing.
#[derive(Debug, Clone)]
pub struct ValidatedDraft {
    pub op_type: OpType,
    pub data: Value,
}

/// Current unix time in milliseconds, used to stamp operations.
pub(crate) fn unix_ts_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct StrokeData {
    points: Vec<Point>,
    #[serde(default)]
    width: Option<f64>,
}

#[derive(Deserialize)]
struct TextData {
    x: f64,
    y: f64,
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(dead_code)]
enum ShapeKind {
    Rect,
    Ellipse,
    Line,
}

#[derive(Deserialize)]
struct ShapeData {
    #[allow(dead_code)]
    shape: ShapeKind,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

fn in_bounds(x: f64, y: f64, canvas: &CanvasConfig) -> bool {
    // NaN fails every comparison and is rejected with the rest.
    x >= 0.0 && x <= canvas.width && y >= 0.0 && y <= canvas.height
}

/// Validate a client-submitted draft against the canvas bounds.
///
/// The stored `data` stays the client's original JSON; validation only parses
/// a typed view of it. Undo/redo never arrive through this path.
pub fn validate_draft(
    op_type: OpType,
    data: Value,
    canvas: &CanvasConfig,
) -> Result<ValidatedDraft, SessionError> {
    match op_type {
        OpType::Stroke => {
            let stroke: StrokeData = serde_json::from_value(data.clone())
                .map_err(|_| SessionError::OperationRejected("malformed stroke data".into()))?;
            if stroke.points.is_empty() {
                return Err(SessionError::OperationRejected("stroke has no points".into()));
            }
            if let Some(w) = stroke.width {
                if !(w > 0.0) {
                    return Err(SessionError::OperationRejected(
                        "stroke width must be positive".into(),
                    ));
                }
            }
            if !stroke.points.iter().all(|p| in_bounds(p.x, p.y, canvas)) {
                return Err(SessionError::OperationRejected(
                    "stroke coordinates out of canvas bounds".into(),
                ));
            }
        }
        OpType::Text => {
            let text: TextData = serde_json::from_value(data.clone())
                .map_err(|_| SessionError::OperationRejected("malformed text data".into()))?;
            if text.content.trim().is_empty() {
                return Err(SessionError::OperationRejected("text content is empty".into()));
            }
            if !in_bounds(text.x, text.y, canvas) {
                return Err(SessionError::OperationRejected(
                    "text position out of canvas bounds".into(),
                ));
            }
        }
        OpType::Shape => {
            let shape: ShapeData = serde_json::from_value(data.clone())
                .map_err(|_| SessionError::OperationRejected("malformed shape data".into()))?;
            let far_x = shape.x + shape.width;
            let far_y = shape.y + shape.height;
            if !in_bounds(shape.x, shape.y, canvas) || !in_bounds(far_x, far_y, canvas) {
                return Err(SessionError::OperationRejected(
                    "shape extends beyond canvas bounds".into(),
                ));
            }
        }
        OpType::Clear => {}
        OpType::Undo | OpType::Redo => {
            return Err(SessionError::OperationRejected(
                "undo/redo are dedicated message types".into(),
            ));
        }
    }

    Ok(ValidatedDraft { op_type, data })
}

/// Per-room operation log with a replay cursor.
///
/// `journal` keeps every sequenced operation, undo/redo markers included.
/// `applied` indexes the draw operations in replay order; `cursor` marks how
/// many of them are currently applied. Snapshots are `applied[..cursor]`.
#[derive(Debug, Default)]
pub struct WhiteboardLog {
    journal: Vec<WhiteboardOperation>,
    applied: Vec<usize>,
    cursor: usize,
}

impl WhiteboardLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sequenced draw operation (stroke/text/shape/clear).
    ///
    /// Submitting after an undo discards the undone tail: the retracted
    /// operations stay in the journal but can no longer be redone.
    pub fn append_draw(&mut self, op: WhiteboardOperation) {
        self.applied.truncate(self.cursor);
        self.journal.push(op);
        self.applied.push(self.journal.len() - 1);
        self.cursor = self.applied.len();
    }

    /// Retract the most recent applied operation by any author.
    /// Returns the retracted `op_id`, or `None` when nothing is applied.
    pub fn undo(&mut self) -> Option<u64> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.journal[self.applied[self.cursor]].op_id)
    }

    /// Re-apply the most recently undone operation.
    /// Returns its `op_id`, or `None` when the cursor is at the tail.
    pub fn redo(&mut self) -> Option<u64> {
        if self.cursor == self.applied.len() {
            return None;
        }
        let op_id = self.journal[self.applied[self.cursor]].op_id;
        self.cursor += 1;
        Some(op_id)
    }

    /// Journal an undo/redo marker so the full history stays replayable.
    pub fn record_marker(&mut self, marker: WhiteboardOperation) {
        self.journal.push(marker);
    }

    /// Applied operations in replay order, as served to late joiners.
    pub fn snapshot(&self) -> Vec<WhiteboardOperation> {
        self.applied[..self.cursor]
            .iter()
            .map(|&i| self.journal[i].clone())
            .collect()
    }

    /// Number of currently applied operations.
    pub fn applied_len(&self) -> usize {
        self.cursor
    }

    /// Drop all state when the room is destroyed.
    pub fn clear_all(&mut self) {
        self.journal.clear();
        self.applied.clear();
        self.cursor = 0;
    }
}
