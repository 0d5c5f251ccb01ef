//! Draw coalescing.
//!
//! Any number of dirty signals between two frames collapse into one draw:
//! the first signal sets the pending flag and asks the host to schedule a
//! single frame callback; later signals only record their reason.

/// Why a redraw was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyReason {
    PointsChanged,
    ViewportChanged,
    InteractionChanged,
    SurfaceChanged,
}

impl DirtyReason {
    fn bit(self) -> u8 {
        match self {
            DirtyReason::PointsChanged => 1,
            DirtyReason::ViewportChanged => 1 << 1,
            DirtyReason::InteractionChanged => 1 << 2,
            DirtyReason::SurfaceChanged => 1 << 3,
        }
    }
}

/// Pending-flag frame scheduler.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    pending: bool,
    reasons: u8,
    requests: u64,
    frames: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the frame dirty.
    ///
    /// Returns true only for the signal that must schedule the frame
    /// callback; false while a frame is already outstanding.
    pub fn request(&mut self, reason: DirtyReason) -> bool {
        self.requests += 1;
        self.reasons |= reason.bit();
        if self.pending {
            return false;
        }
        self.pending = true;
        true
    }

    /// Consume the pending flag at frame time. Returns whether to draw.
    pub fn begin_frame(&mut self) -> bool {
        if !self.pending {
            return false;
        }
        self.pending = false;
        self.reasons = 0;
        self.frames += 1;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Whether `reason` contributed to the outstanding frame.
    pub fn is_dirty_for(&self, reason: DirtyReason) -> bool {
        self.reasons & reason.bit() != 0
    }

    /// Total dirty signals received.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Frames actually started.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
