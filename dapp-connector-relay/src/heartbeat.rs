//! Liveness tracking for protocols that need an explicit heartbeat.

/// What the relay has to do after a heartbeat tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HeartbeatAction {
    None,
    /// Tell the page the wallet disconnected.
    Disconnect,
    /// Fail every outstanding call.
    RejectAll,
}

/// Counts ticks since the last successful ping.
///
/// Each action fires once per outage: after a ping succeeds the counter and
/// both actions are re-armed.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    missed: u32,
    disconnect_threshold: u32,
    reject_threshold: u32,
    disconnected: bool,
    rejected: bool,
}

impl HeartbeatMonitor {
    pub fn new(disconnect_threshold: u32, reject_threshold: u32) -> Self {
        Self {
            missed: 0,
            disconnect_threshold,
            reject_threshold,
            disconnected: false,
            rejected: false,
        }
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn tick(&mut self) -> HeartbeatAction {
        self.missed = self.missed.saturating_add(1);

        if self.missed >= self.reject_threshold && !self.rejected {
            self.rejected = true;
            return HeartbeatAction::RejectAll;
        }
        if self.missed >= self.disconnect_threshold && !self.disconnected {
            self.disconnected = true;
            return HeartbeatAction::Disconnect;
        }
        HeartbeatAction::None
    }

    pub fn ping_succeeded(&mut self) {
        self.missed = 0;
        self.disconnected = false;
        self.rejected = false;
    }
}
