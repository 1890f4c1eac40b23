//! Per-frame execution statistics
//!
//! Every graph carries a [`Diagnostics`] instance that is passed in at
//! construction. It names the log target all graph messages go to and keeps
//! the statistics of the last executed frame.

use crate::backend::types::{Barrier, QueueKind};
use crate::render_graph::pass::PassId;

pub const DEFAULT_LOG_TARGET: &str = "render_graph";

/// What happened during one frame
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    pub frame: u64,
    /// Passes in execution order
    pub executed: Vec<PassId>,
    /// Barriers in recording order
    pub barriers: Vec<Barrier>,
    /// Queues in submission order
    pub submitted: Vec<QueueKind>,
}

impl FrameStats {
    pub fn barrier_count(&self) -> usize {
        self.barriers.len()
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostics {
    target: String,
    last_frame: Option<FrameStats>,
    frames: u64,
    barriers: u64,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_TARGET)
    }
}

impl Diagnostics {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            last_frame: None,
            frames: 0,
            barriers: 0,
        }
    }

    /// Log target for graph messages
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn last_frame(&self) -> Option<&FrameStats> {
        self.last_frame.as_ref()
    }

    pub fn frames_recorded(&self) -> u64 {
        self.frames
    }

    pub fn total_barriers(&self) -> u64 {
        self.barriers
    }

    pub(crate) fn record(&mut self, stats: FrameStats) -> &FrameStats {
        log::trace!(
            target: self.target.as_str(),
            "frame {}: {} passes, {} barriers, {} submissions",
            stats.frame,
            stats.executed.len(),
            stats.barriers.len(),
            stats.submitted.len()
        );
        self.frames += 1;
        self.barriers += stats.barriers.len() as u64;
        self.last_frame.insert(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_last_frame_and_totals() {
        let mut diagnostics = Diagnostics::new("test");
        assert!(diagnostics.last_frame().is_none());

        diagnostics.record(FrameStats {
            frame: 0,
            executed: vec![PassId(0), PassId(1)],
            ..Default::default()
        });
        let last = diagnostics.record(FrameStats {
            frame: 1,
            executed: vec![PassId(0)],
            ..Default::default()
        });
        assert_eq!(last.frame, 1);

        assert_eq!(diagnostics.frames_recorded(), 2);
        assert_eq!(diagnostics.last_frame().map(|f| f.executed.len()), Some(1));
        assert_eq!(diagnostics.target(), "test");
    }
}
