//! Pipeline State Machine
//!
//! `Created -> Running -> Stopping -> Stopped` is the happy path; `Failed`
//! is reachable from `Running` on an unrecoverable backend or worker fault.
//! Both `Stopped` and `Failed` are terminal.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`crate::pipeline::StreamingPipeline`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
    Failed = 4,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Created,
            1 => PipelineState::Running,
            2 => PipelineState::Stopping,
            3 => PipelineState::Stopped,
            _ => PipelineState::Failed,
        }
    }

    /// Terminal states never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Stopped | PipelineState::Failed)
    }
}

/// Atomic holder for [`PipelineState`], readable and writable from any thread
/// without blocking. Rust pattern: the enum is stored as a `u8` discriminant
/// since there's no `AtomicEnum` in the standard library.
pub struct AtomicPipelineState(AtomicU8);

impl AtomicPipelineState {
    pub fn new(state: PipelineState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn store(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Transition from `current` to `new`, failing (without writing) if the
    /// state has already moved on. Used to make concurrent `start`/`stop`
    /// calls resolve to a single winner.
    pub fn compare_exchange(
        &self,
        current: PipelineState,
        new: PipelineState,
    ) -> Result<PipelineState, PipelineState> {
        self.0
            .compare_exchange(
                current as u8,
                new as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(PipelineState::from_u8)
            .map_err(PipelineState::from_u8)
    }
}
