use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a [`crate::MessageChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ChannelStatus {
    /// Endpoint being validated and workers being started.
    Constructing = 0,
    /// Both workers running; messages flow.
    Running = 1,
    /// Stop requested or a worker failed; workers are winding down.
    Stopping = 2,
    /// Both workers have exited.
    Stopped = 3,
}

impl ChannelStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ChannelStatus::Constructing,
            1 => ChannelStatus::Running,
            2 => ChannelStatus::Stopping,
            _ => ChannelStatus::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelStatus::Constructing => "constructing",
            ChannelStatus::Running => "running",
            ChannelStatus::Stopping => "stopping",
            ChannelStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomically observed channel status shared by the owner and both workers.
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ChannelStatus::Constructing as u8))
    }

    pub(crate) fn load(&self) -> ChannelStatus {
        ChannelStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from` → `to`; false if the current status is not `from`.
    pub(crate) fn transition(&self, from: ChannelStatus, to: ChannelStatus) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Unconditional move, never backwards.
    pub(crate) fn advance_to(&self, to: ChannelStatus) {
        self.0.fetch_max(to as u8, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_lifecycle() {
        let cell = StatusCell::new();
        assert_eq!(cell.load(), ChannelStatus::Constructing);

        assert!(cell.transition(ChannelStatus::Constructing, ChannelStatus::Running));
        assert!(!cell.transition(ChannelStatus::Constructing, ChannelStatus::Running));
        assert!(cell.transition(ChannelStatus::Running, ChannelStatus::Stopping));
        assert!(!cell.transition(ChannelStatus::Running, ChannelStatus::Stopping));
        assert_eq!(cell.load(), ChannelStatus::Stopping);
    }

    #[test]
    fn advance_never_goes_backwards() {
        let cell = StatusCell::new();
        cell.advance_to(ChannelStatus::Stopped);
        cell.advance_to(ChannelStatus::Running);
        assert_eq!(cell.load(), ChannelStatus::Stopped);
    }

    #[test]
    fn display_names() {
        assert_eq!(ChannelStatus::Running.to_string(), "running");
        assert_eq!(ChannelStatus::Stopped.as_str(), "stopped");
    }
}
