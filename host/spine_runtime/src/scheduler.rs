use serde_json::Value;
use tracing::trace;

/// Coalesces pushed spines into at most one render per display frame.
///
/// Only the latest spine survives: a push while a frame is already pending
/// replaces the pending spine without requesting another frame.
#[derive(Debug, Default)]
pub struct RenderScheduler {
    pending: Option<Value>,
    superseded: u64,
}

impl RenderScheduler {
    /// Stores `spine` and returns `true` when the caller must request a
    /// frame.
    pub fn push(&mut self, spine: Value) -> bool {
        let needs_frame = self.pending.is_none();
        if !needs_frame {
            self.superseded += 1;
            trace!(superseded = self.superseded, "replacing pending spine");
        }
        self.pending = Some(spine);
        needs_frame
    }

    pub fn take(&mut self) -> Option<Value> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Spines dropped because a newer one arrived before the frame.
    pub fn superseded(&self) -> u64 {
        self.superseded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pushes_between_frames_collapse_to_the_latest() {
        let mut scheduler = RenderScheduler::default();

        assert!(scheduler.push(json!("A")));
        assert!(!scheduler.push(json!("B")));
        assert!(!scheduler.push(json!("C")));

        assert_eq!(scheduler.take(), Some(json!("C")));
        assert_eq!(scheduler.take(), None);
        assert_eq!(scheduler.superseded(), 2);
    }

    #[test]
    fn a_push_after_a_frame_requests_a_new_frame() {
        let mut scheduler = RenderScheduler::default();
        assert!(scheduler.push(json!(null)));
        assert!(scheduler.is_pending());
        scheduler.take();
        assert!(!scheduler.is_pending());
        assert!(scheduler.push(json!("next")));
    }
}
