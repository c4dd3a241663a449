//! The two ways we observe the player: AppleScript through `osascript`, and the
//! system process list.

use parking_lot::Mutex;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Command;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use thiserror::Error;

use crate::types::{NO_TRACK_TITLE, TARGET_APP};

/// Synchronous script execution against the player.
///
/// Implementations never fail: any error comes back as an empty string.
pub trait AutomationChannel: Send + Sync {
    fn invoke(&self, script: &str) -> String;
}

/// Exact, case-sensitive process name lookup.
pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, name: &str) -> bool;
}

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("failed to spawn osascript: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("osascript exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("osascript output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Player state queries, one script each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    PlayerState,
    TrackName,
    Artist,
    ArtworkUrl,
}

impl Query {
    pub fn script(self) -> String {
        match self {
            Query::PlayerState => guarded("return player state as string", "stopped"),
            Query::TrackName => guarded(&current_track("name"), NO_TRACK_TITLE),
            Query::Artist => guarded(&current_track("artist"), ""),
            Query::ArtworkUrl => guarded(&current_track("artwork url"), ""),
        }
    }
}

/// Wrap `body` so it only talks to the player when it is already running;
/// otherwise the script returns `fallback` without launching it.
fn guarded(body: &str, fallback: &str) -> String {
    format!(
        "if application \"{app}\" is running then\n\
         tell application \"{app}\"\n\
         {body}\n\
         end tell\n\
         end if\n\
         return \"{fallback}\"",
        app = TARGET_APP,
    )
}

fn current_track(property: &str) -> String {
    format!(
        "if player state is not stopped then\n\
         return {property} of current track\n\
         end if"
    )
}

/// Commands sent to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    PlayPause,
    NextTrack,
    PreviousTrack,
    Activate,
}

impl Action {
    pub fn script(self) -> String {
        let verb = match self {
            Action::PlayPause => "playpause",
            Action::NextTrack => "next track",
            Action::PreviousTrack => "previous track",
            Action::Activate => "activate",
        };
        format!("tell application \"{}\" to {}", TARGET_APP, verb)
    }
}

/// Runs scripts with `/usr/bin/osascript -e`.
pub struct OsaScript {
    program: PathBuf,
}

impl OsaScript {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("/usr/bin/osascript"),
        }
    }

    fn run(&self, script: &str) -> Result<String, AutomationError> {
        let output = Command::new(&self.program).arg("-e").arg(script).output()?;

        if output.status.success() {
            read_output(output.stdout)
        } else {
            Err(AutomationError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

fn read_output(stdout: Vec<u8>) -> Result<String, AutomationError> {
    Ok(String::from_utf8(stdout)?.trim().to_string())
}

impl Default for OsaScript {
    fn default() -> Self {
        Self::new()
    }
}

impl AutomationChannel for OsaScript {
    fn invoke(&self, script: &str) -> String {
        match self.run(script) {
            Ok(output) => output,
            Err(e) => {
                // Routine while the player is quitting
                log::debug!("AppleScript call failed: {}", e);
                String::new()
            }
        }
    }
}

/// Process presence backed by `sysinfo`.
pub struct SystemProcesses {
    system: Mutex<System>,
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SystemProcesses {
    fn is_running(&self, name: &str) -> bool {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );
        let found = system.processes_by_exact_name(OsStr::new(name)).next().is_some();
        found
    }
}
