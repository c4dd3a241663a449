use std::sync::Arc;

use crate::automation::{Action, AutomationChannel, ProcessProbe, Query};
use crate::types::{PlaybackState, PlayerSnapshot, NO_TRACK_TITLE, TARGET_APP};

/// Reads the player's state through the automation channel.
///
/// Every call blocks on `osascript`; run it off the async executor.
#[derive(Clone)]
pub struct StatusPoller {
    channel: Arc<dyn AutomationChannel>,
    probe: Arc<dyn ProcessProbe>,
}

impl StatusPoller {
    pub fn new(channel: Arc<dyn AutomationChannel>, probe: Arc<dyn ProcessProbe>) -> Self {
        Self { channel, probe }
    }

    /// Take one snapshot of the player.
    ///
    /// When the process is absent no script is run at all. Individual query
    /// failures come back empty from the channel and fall to their field default.
    pub fn tick(&self) -> PlayerSnapshot {
        if !self.probe.is_running(TARGET_APP) {
            return PlayerSnapshot::not_running();
        }

        let state = PlaybackState::parse(&self.query(Query::PlayerState));

        let mut title = self.query(Query::TrackName);
        if title.is_empty() {
            title = NO_TRACK_TITLE.to_string();
        }

        let artist = self.query(Query::Artist);

        let artwork_ref = if state == PlaybackState::Stopped {
            String::new()
        } else {
            self.query(Query::ArtworkUrl)
        };

        let snapshot = PlayerSnapshot {
            is_running: true,
            is_playing: state.is_playing(),
            title,
            artist,
            artwork_ref,
        }
        .normalized();

        log::debug!(
            "Polled {}: {:?} '{}' by '{}'",
            TARGET_APP,
            state,
            snapshot.title,
            snapshot.artist
        );

        snapshot
    }

    /// Fire a command at the player. The reply, if any, is ignored.
    pub fn perform(&self, action: Action) {
        log::debug!("Sending {:?} to {}", action, TARGET_APP);
        let _ = self.channel.invoke(&action.script());
    }

    fn query(&self, query: Query) -> String {
        self.channel.invoke(&query.script()).trim().to_string()
    }
}
