//! The single loop that owns the snapshot and the artwork cache.
//!
//! Polls, remote commands and artwork completions are all serialised through
//! one `select!`, so nothing else ever writes player state.

use tokio::sync::mpsc;
use tokio::task;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::artwork::{ArtworkFetcher, ArtworkLoaded, ArtworkSource};
use crate::config::{Config, LayoutConfig, PollingConfig};
use crate::display::{self, TextMeasurer};
use crate::poller::StatusPoller;
use crate::remote::{RemoteCommand, RemoteControl, RepollSchedule};
use crate::state::SharedState;
use crate::types::{DisplayState, PlayerSnapshot, TARGET_APP};

/// Receives every freshly derived display state.
pub trait DisplaySink: Send {
    fn present(&mut self, snapshot: &PlayerSnapshot, display: &DisplayState);
}

pub struct Engine<S, M, D> {
    poller: StatusPoller,
    fetcher: ArtworkFetcher<S>,
    artwork: mpsc::UnboundedReceiver<ArtworkLoaded>,
    commands: mpsc::UnboundedReceiver<RemoteCommand>,
    measurer: M,
    sink: D,
    layout: LayoutConfig,
    polling: PollingConfig,
    state: SharedState,
    schedule: RepollSchedule,
    snapshot: PlayerSnapshot,
}

impl<S, M, D> Engine<S, M, D>
where
    S: ArtworkSource,
    M: TextMeasurer + Send,
    D: DisplaySink,
{
    /// Build the loop and the handle used to steer it. The loop stops once
    /// every [`RemoteControl`] clone has been dropped.
    pub fn new(
        poller: StatusPoller,
        source: S,
        measurer: M,
        sink: D,
        config: &Config,
        state: SharedState,
    ) -> (Self, RemoteControl) {
        let (fetcher, artwork) = ArtworkFetcher::new(source);
        let (tx, commands) = mpsc::unbounded_channel();

        let engine = Self {
            poller,
            fetcher,
            artwork,
            commands,
            measurer,
            sink,
            layout: config.layout.clone(),
            polling: config.polling.clone(),
            state,
            schedule: RepollSchedule::default(),
            snapshot: PlayerSnapshot::not_running(),
        };

        (engine, RemoteControl::new(tx))
    }

    pub async fn run(mut self) {
        log::info!("Polling {} every {:?}", TARGET_APP, self.polling.interval);

        // First tick fires immediately
        let mut interval = time::interval(self.polling.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let repoll_at = self.schedule.deadline();

            tokio::select! {
                _ = interval.tick() => {
                    self.schedule.take_due(Instant::now());
                    self.refresh().await;
                }
                _ = time::sleep_until(repoll_at.unwrap_or_else(Instant::now)), if repoll_at.is_some() => {
                    self.schedule.take_due(Instant::now());
                    self.refresh().await;
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(loaded) = self.artwork.recv() => {
                    if self.fetcher.complete(loaded) {
                        self.redisplay();
                    }
                }
            }
        }

        log::info!("Poll loop stopped");
    }

    /// Poll once and redraw.
    async fn refresh(&mut self) {
        let poller = self.poller.clone();
        let snapshot = match task::spawn_blocking(move || poller.tick()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Status poll did not complete: {}", e);
                return;
            }
        };

        if snapshot.is_running != self.snapshot.is_running {
            if snapshot.is_running {
                log::info!("{} is running", TARGET_APP);
            } else {
                log::info!("{} quit", TARGET_APP);
            }
        }

        self.fetcher.on_snapshot(&snapshot);
        self.snapshot = snapshot;
        self.redisplay();
    }

    /// Derive the display state from scratch and publish it.
    fn redisplay(&mut self) {
        let display = display::render(&self.snapshot, self.fetcher.cache(), &self.layout, &self.measurer);

        {
            let mut state_guard = self.state.write();
            state_guard.snapshot = self.snapshot.clone();
            state_guard.display = display.clone();
        }

        self.sink.present(&self.snapshot, &display);
    }

    async fn handle_command(&mut self, command: RemoteCommand) {
        if command.requires_running() && !self.snapshot.is_running {
            log::debug!("{} not running, ignoring {:?}", TARGET_APP, command);
            return;
        }

        let poller = self.poller.clone();
        let action = command.action();
        if let Err(e) = task::spawn_blocking(move || poller.perform(action)).await {
            log::warn!("{:?} did not complete: {}", command, e);
        }

        self.schedule
            .schedule(Instant::now() + command.settle_delay(&self.polling));
    }
}
