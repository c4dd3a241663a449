use std::collections::HashMap;
use std::future::Future;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use tokio::time::{self, Instant};

use nowbar::artwork::{ArtworkError, ArtworkSource};
use nowbar::automation::{Action, AutomationChannel, ProcessProbe, Query};
use nowbar::compositor::AverageAdvance;
use nowbar::config::Config;
use nowbar::engine::{DisplaySink, Engine};
use nowbar::poller::StatusPoller;
use nowbar::remote::RemoteControl;
use nowbar::state::{self, SharedState};
use nowbar::types::{DisplayState, PlayerSnapshot, TARGET_APP};

/// A scripted stand-in for the player process.
#[derive(Default)]
struct FakePlayer {
    running: AtomicBool,
    replies: Mutex<HashMap<String, String>>,
    /// Reply changes applied when an action script arrives
    effects: Mutex<HashMap<String, (String, String)>>,
    calls: Mutex<Vec<String>>,
}

impl FakePlayer {
    fn playing(title: &str, artist: &str) -> Arc<Self> {
        let player = Arc::new(Self::default());
        player.running.store(true, Ordering::SeqCst);
        player.set(Query::PlayerState, "playing");
        player.set(Query::TrackName, title);
        player.set(Query::Artist, artist);
        player
    }

    fn absent() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set(&self, query: Query, value: &str) {
        self.replies.lock().insert(query.script(), value.to_string());
    }

    fn on_action(&self, action: Action, query: Query, value: &str) {
        self.effects
            .lock()
            .insert(action.script(), (query.script(), value.to_string()));
    }

    fn invoked(&self, action: Action) -> bool {
        self.calls.lock().contains(&action.script())
    }
}

impl AutomationChannel for FakePlayer {
    fn invoke(&self, script: &str) -> String {
        self.calls.lock().push(script.to_string());

        if let Some((query, value)) = self.effects.lock().get(script).cloned() {
            self.replies.lock().insert(query, value);
        }

        self.replies.lock().get(script).cloned().unwrap_or_default()
    }
}

impl ProcessProbe for FakePlayer {
    fn is_running(&self, name: &str) -> bool {
        name == TARGET_APP && self.running.load(Ordering::SeqCst)
    }
}

/// Serves a solid-colour PNG for every URL it knows about.
#[derive(Default)]
struct FakeArtwork {
    images: HashMap<String, Vec<u8>>,
}

impl FakeArtwork {
    fn with(url: &str, color: [u8; 4]) -> Self {
        let img = RgbaImage::from_pixel(8, 8, Rgba(color));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();

        let mut images = HashMap::new();
        images.insert(url.to_string(), out.into_inner());
        Self { images }
    }
}

impl ArtworkSource for FakeArtwork {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, ArtworkError>> + Send {
        let result = self
            .images
            .get(url)
            .cloned()
            .ok_or_else(|| ArtworkError::InvalidRef(url.to_string()));
        async move { result }
    }
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<DisplayState>>>);

impl Recorder {
    fn last(&self) -> Option<DisplayState> {
        self.0.lock().last().cloned()
    }

    fn count(&self) -> usize {
        self.0.lock().len()
    }
}

impl DisplaySink for Recorder {
    fn present(&mut self, _snapshot: &PlayerSnapshot, display: &DisplayState) {
        self.0.lock().push(display.clone());
    }
}

struct Harness {
    remote: RemoteControl,
    recorder: Recorder,
    state: SharedState,
    handle: tokio::task::JoinHandle<()>,
}

fn start(player: Arc<FakePlayer>, artwork: FakeArtwork) -> Harness {
    let recorder = Recorder::default();
    let state = state::create_state();
    let poller = StatusPoller::new(player.clone(), player);

    let (engine, remote) = Engine::new(
        poller,
        artwork,
        AverageAdvance::default(),
        recorder.clone(),
        &Config::default(),
        state.clone(),
    );
    let handle = tokio::spawn(engine.run());

    Harness {
        remote,
        recorder,
        state,
        handle,
    }
}

async fn settle(ms: u64) {
    time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_absent_player_stays_hidden() {
    let player = FakePlayer::absent();
    let harness = start(player.clone(), FakeArtwork::default());

    settle(50).await;

    let display = harness.recorder.last().expect("startup poll should render");
    assert!(!display.visible);
    assert!(!harness.state.read().snapshot.is_running);
    // Nothing is asked of a player that is not there
    assert!(player.calls.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_running_track_is_shown() {
    let harness = start(FakePlayer::playing("Midnight City", "M83"), FakeArtwork::default());

    settle(50).await;

    let display = harness.recorder.last().unwrap();
    assert!(display.visible);
    assert_eq!(display.artist_line, "M83");
    assert_eq!(display.track_line, "Midnight City");
    assert!(display.icon.is_none());
    assert!(display.total_width <= 180.0);

    let state = harness.state.read();
    assert_eq!(state.snapshot.title, "Midnight City");
    assert_eq!(state.display, display);
}

#[tokio::test(start_paused = true)]
async fn test_polls_once_per_interval() {
    let harness = start(FakePlayer::playing("Intro", "The xx"), FakeArtwork::default());

    settle(50).await;
    assert_eq!(harness.recorder.count(), 1);

    settle(1000).await;
    assert_eq!(harness.recorder.count(), 2);

    settle(2000).await;
    assert_eq!(harness.recorder.count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_next_triggers_early_repoll() {
    let player = FakePlayer::playing("A", "Artist");
    player.on_action(Action::NextTrack, Query::TrackName, "B");
    let harness = start(player.clone(), FakeArtwork::default());
    let started = Instant::now();

    settle(50).await;
    harness.remote.next();

    settle(100).await;
    assert!(player.invoked(Action::NextTrack));
    // Still waiting out the settle delay
    assert_eq!(harness.recorder.last().unwrap().track_line, "A");

    settle(500).await;
    assert_eq!(harness.recorder.last().unwrap().track_line, "B");
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_play_pause_settles_faster_than_track_change() {
    let player = FakePlayer::playing("A", "Artist");
    player.on_action(Action::PlayPause, Query::PlayerState, "paused");
    let harness = start(player.clone(), FakeArtwork::default());

    settle(50).await;
    assert!(harness.state.read().snapshot.is_playing);

    harness.remote.play_pause();
    settle(300).await;

    assert!(player.invoked(Action::PlayPause));
    assert!(!harness.state.read().snapshot.is_playing);
}

#[tokio::test(start_paused = true)]
async fn test_transport_commands_ignored_while_absent() {
    let player = FakePlayer::absent();
    let harness = start(player.clone(), FakeArtwork::default());

    settle(50).await;
    harness.remote.play_pause();
    harness.remote.next();
    harness.remote.previous();
    settle(700).await;

    assert!(player.calls.lock().is_empty());
    assert_eq!(harness.recorder.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_launch_works_while_absent() {
    let player = FakePlayer::absent();
    let harness = start(player.clone(), FakeArtwork::default());

    settle(50).await;
    harness.remote.launch();
    settle(50).await;

    assert!(player.invoked(Action::Activate));
}

#[tokio::test(start_paused = true)]
async fn test_artwork_arrives_on_later_redraw() {
    let player = FakePlayer::playing("Midnight City", "M83");
    player.set(Query::ArtworkUrl, "https://i.scdn.co/image/m83");
    let harness = start(player, FakeArtwork::with("https://i.scdn.co/image/m83", [200, 10, 10, 255]));

    settle(50).await;

    let display = harness.recorder.last().unwrap();
    let icon = display.icon.expect("artwork should be decoded");
    assert_eq!(icon.get_pixel(0, 0), &Rgba([200, 10, 10, 255]));
    // Startup tick first, then the redraw for the finished fetch
    assert_eq!(harness.recorder.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_player_quitting_hides_and_drops_artwork() {
    let player = FakePlayer::playing("Midnight City", "M83");
    player.set(Query::ArtworkUrl, "https://i.scdn.co/image/m83");
    let harness = start(
        player.clone(),
        FakeArtwork::with("https://i.scdn.co/image/m83", [1, 2, 3, 255]),
    );

    settle(50).await;
    assert!(harness.recorder.last().unwrap().icon.is_some());

    player.running.store(false, Ordering::SeqCst);
    settle(1000).await;

    let display = harness.recorder.last().unwrap();
    assert!(!display.visible);
    assert!(display.icon.is_none());
    assert_eq!(harness.state.read().snapshot, PlayerSnapshot::not_running());
}

#[tokio::test(start_paused = true)]
async fn test_loop_stops_when_remote_dropped() {
    let harness = start(FakePlayer::absent(), FakeArtwork::default());

    settle(50).await;
    drop(harness.remote);

    let result = time::timeout(Duration::from_secs(5), harness.handle).await;
    assert!(matches!(result, Ok(Ok(()))));
}
