//! Analysis engine: configuration snapshots, sessions and result delivery

pub mod controller;
pub mod queue;
pub mod reorder;
mod session;
pub mod snapshot;

pub use controller::AnalysisEngine;
pub use queue::ResultQueue;
pub use reorder::ReorderBuffer;
pub use snapshot::{ConfigHandle, ConfigSnapshot};

use crate::analysis::AnalysisResult;
use crate::error::CaptureError;

/// Whether the engine is capturing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

/// What the consumer receives from [`AnalysisEngine::results`]
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    /// One analysed frame, in sequence order
    Frame(AnalysisResult),
    /// The session ended because capture failed; always its last event
    SessionFailed { session: u64, error: CaptureError },
}

impl AnalysisEvent {
    pub fn session(&self) -> u64 {
        match self {
            AnalysisEvent::Frame(result) => result.session,
            AnalysisEvent::SessionFailed { session, .. } => *session,
        }
    }

    pub fn as_frame(&self) -> Option<&AnalysisResult> {
        match self {
            AnalysisEvent::Frame(result) => Some(result),
            AnalysisEvent::SessionFailed { .. } => None,
        }
    }
}
