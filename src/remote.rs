use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::automation::Action;
use crate::config::PollingConfig;

/// User-initiated commands from the tray.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    PlayPause,
    Next,
    Previous,
    Launch,
}

impl RemoteCommand {
    pub fn action(self) -> Action {
        match self {
            RemoteCommand::PlayPause => Action::PlayPause,
            RemoteCommand::Next => Action::NextTrack,
            RemoteCommand::Previous => Action::PreviousTrack,
            RemoteCommand::Launch => Action::Activate,
        }
    }

    /// How long the player needs before a re-read reflects the command.
    pub fn settle_delay(self, polling: &PollingConfig) -> Duration {
        match self {
            RemoteCommand::PlayPause => polling.play_pause_settle,
            RemoteCommand::Next | RemoteCommand::Previous => polling.track_change_settle,
            RemoteCommand::Launch => polling.launch_settle,
        }
    }

    /// Transport commands are dropped while the player is not running.
    pub fn requires_running(self) -> bool {
        !matches!(self, RemoteCommand::Launch)
    }
}

/// Fire-and-forget handle for sending commands to the poll loop.
#[derive(Clone)]
pub struct RemoteControl {
    tx: mpsc::UnboundedSender<RemoteCommand>,
}

impl RemoteControl {
    pub fn new(tx: mpsc::UnboundedSender<RemoteCommand>) -> Self {
        Self { tx }
    }

    pub fn play_pause(&self) {
        self.send(RemoteCommand::PlayPause);
    }

    pub fn next(&self) {
        self.send(RemoteCommand::Next);
    }

    pub fn previous(&self) {
        self.send(RemoteCommand::Previous);
    }

    pub fn launch(&self) {
        self.send(RemoteCommand::Launch);
    }

    pub fn send(&self, command: RemoteCommand) {
        if self.tx.send(command).is_err() {
            log::debug!("Poll loop has stopped, dropping {:?}", command);
        }
    }
}

/// At most one pending out-of-band poll.
#[derive(Debug, Default)]
pub struct RepollSchedule {
    deadline: Option<Instant>,
}

impl RepollSchedule {
    /// Request a poll at `at`. With one already pending, the later of the two wins.
    pub fn schedule(&mut self, at: Instant) {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.max(at),
            None => at,
        });
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consume the pending poll if it is due.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_delays() {
        let polling = PollingConfig::default();
        assert_eq!(RemoteCommand::PlayPause.settle_delay(&polling), Duration::from_millis(200));
        assert_eq!(RemoteCommand::Next.settle_delay(&polling), Duration::from_millis(500));
        assert_eq!(RemoteCommand::Previous.settle_delay(&polling), Duration::from_millis(500));
        assert!(
            RemoteCommand::PlayPause.settle_delay(&polling)
                < RemoteCommand::Next.settle_delay(&polling)
        );
    }

    #[test]
    fn test_only_launch_runs_without_player() {
        assert!(RemoteCommand::PlayPause.requires_running());
        assert!(RemoteCommand::Next.requires_running());
        assert!(RemoteCommand::Previous.requires_running());
        assert!(!RemoteCommand::Launch.requires_running());
        assert_eq!(RemoteCommand::Launch.action(), Action::Activate);
    }

    #[test]
    fn test_remote_control_sends_commands() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let remote = RemoteControl::new(tx);

        remote.play_pause();
        remote.next();
        remote.previous();
        remote.launch();

        let mut received = Vec::new();
        while let Ok(command) = rx.try_recv() {
            received.push(command);
        }
        assert_eq!(
            received,
            vec![
                RemoteCommand::PlayPause,
                RemoteCommand::Next,
                RemoteCommand::Previous,
                RemoteCommand::Launch
            ]
        );
    }

    #[test]
    fn test_send_after_shutdown_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        RemoteControl::new(tx).next();
    }

    #[test]
    fn test_schedule_keeps_later_deadline() {
        let now = Instant::now();
        let mut schedule = RepollSchedule::default();

        schedule.schedule(now + Duration::from_millis(500));
        schedule.schedule(now + Duration::from_millis(200));
        assert_eq!(schedule.deadline(), Some(now + Duration::from_millis(500)));

        schedule.schedule(now + Duration::from_millis(700));
        assert_eq!(schedule.deadline(), Some(now + Duration::from_millis(700)));
    }

    #[test]
    fn test_take_due() {
        let now = Instant::now();
        let mut schedule = RepollSchedule::default();
        assert!(!schedule.take_due(now));

        schedule.schedule(now + Duration::from_millis(200));
        assert!(!schedule.take_due(now));
        assert!(schedule.take_due(now + Duration::from_millis(200)));
        assert_eq!(schedule.deadline(), None);
    }
}
