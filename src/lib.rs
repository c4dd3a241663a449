//! Menu bar mirror of the Spotify desktop player.
//!
//! [`engine::Engine`] polls the player once a second, keeps the artwork cache
//! current and hands a freshly derived [`types::DisplayState`] to a
//! [`engine::DisplaySink`] after every change. The `tray` feature adds the
//! Tauri menu bar front end.

pub mod artwork;
pub mod automation;
pub mod autostart;
pub mod compositor;
pub mod config;
pub mod display;
pub mod engine;
pub mod poller;
pub mod remote;
pub mod state;
#[cfg(feature = "tray")]
pub mod tray;
pub mod types;
