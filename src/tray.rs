use anyhow::{Context, Result};
use std::sync::Arc;
use tauri::{
    image::Image,
    menu::{CheckMenuItem, Menu, MenuItem, PredefinedMenuItem},
    tray::{MouseButton, MouseButtonState, TrayIcon, TrayIconBuilder, TrayIconEvent},
    AppHandle, Manager, Runtime,
};

use crate::autostart;
use crate::compositor::{self, Compositor, FrameTracker};
use crate::engine::DisplaySink;
use crate::remote::RemoteControl;
use crate::state::SharedState;
use crate::types::{DisplayState, PlayerSnapshot};

const TRAY_ID: &str = "nowbar";

pub struct TrayManager;

impl TrayManager {
    /// Create the (initially hidden) tray icon and its context menu.
    pub fn setup<R: Runtime>(
        app: &AppHandle<R>,
        state: SharedState,
        compositor: &Compositor,
        remote: RemoteControl,
    ) -> Result<()> {
        let menu = Self::build_menu(app, &state)?;

        let placeholder = compositor.compose(&DisplayState::hidden())?;
        let initial_icon =
            Image::from_bytes(&placeholder).context("Failed to create placeholder icon")?;

        let state_for_menu = state.clone();
        let remote_for_menu = remote.clone();

        let tray = TrayIconBuilder::with_id(TRAY_ID)
            .icon(initial_icon)
            .menu(&menu)
            // Left click opens the player; the menu is for right click
            .menu_on_left_click(false)
            .on_menu_event(move |app, event| {
                Self::handle_menu_event(app, event, &state_for_menu, &remote_for_menu);
            })
            .on_tray_icon_event(move |_tray, event| {
                if let TrayIconEvent::Click {
                    button: MouseButton::Left,
                    button_state: MouseButtonState::Up,
                    ..
                } = event
                {
                    remote.launch();
                }
            })
            .build(app)?;

        // Nothing to show until the first poll finds a track
        tray.set_visible(false)?;

        app.manage(tray);
        app.manage(state);

        Ok(())
    }

    /// Transport items appear only while the player is running
    fn build_menu<R: Runtime>(app: &AppHandle<R>, state: &SharedState) -> Result<Menu<R>> {
        let snapshot = state.read().snapshot.clone();
        let menu = Menu::new(app)?;

        if snapshot.is_running {
            let play_pause_title = if snapshot.is_playing { "Pause" } else { "Play" };
            let play_pause = MenuItem::with_id(app, "play_pause", play_pause_title, true, None::<&str>)?;
            menu.append(&play_pause)?;

            let next = MenuItem::with_id(app, "next", "Next Track", true, None::<&str>)?;
            menu.append(&next)?;

            let previous = MenuItem::with_id(app, "previous", "Previous Track", true, None::<&str>)?;
            menu.append(&previous)?;

            let separator = PredefinedMenuItem::separator(app)?;
            menu.append(&separator)?;
        }

        // Launch at Login checkbox
        let launch_at_login = CheckMenuItem::with_id(
            app,
            "launch_at_login",
            "Launch at Login",
            true,
            autostart::is_enabled(),
            None::<&str>,
        )?;
        menu.append(&launch_at_login)?;

        let separator = PredefinedMenuItem::separator(app)?;
        menu.append(&separator)?;

        let quit_item = MenuItem::with_id(app, "quit", "Quit", true, Some("CmdOrCtrl+Q"))?;
        menu.append(&quit_item)?;

        Ok(menu)
    }

    fn handle_menu_event<R: Runtime>(
        app: &AppHandle<R>,
        event: tauri::menu::MenuEvent,
        state: &SharedState,
        remote: &RemoteControl,
    ) {
        match event.id().as_ref() {
            "play_pause" => remote.play_pause(),
            "next" => remote.next(),
            "previous" => remote.previous(),
            "launch_at_login" => {
                match autostart::toggle() {
                    Ok(new_state) => {
                        log::info!("Launch at login toggled to: {}", new_state);
                    }
                    Err(e) => {
                        log::error!("Failed to toggle launch at login: {:#}", e);
                    }
                }
                // Rebuild either way so the checkbox matches reality
                if let Err(e) = Self::rebuild_menu(app, state) {
                    log::error!("Failed to rebuild menu after toggle: {}", e);
                }
            }
            "quit" => {
                app.exit(0);
            }
            other => {
                log::debug!("Unhandled menu item: {}", other);
            }
        }
    }

    pub fn rebuild_menu<R: Runtime>(app: &AppHandle<R>, state: &SharedState) -> Result<()> {
        let new_menu = Self::build_menu(app, state)?;

        if let Some(tray) = app.try_state::<TrayIcon<R>>() {
            tray.set_menu(Some(new_menu))?;
        }

        Ok(())
    }

    /// Push a rendered frame to the tray. Must run on the main thread.
    fn apply<R: Runtime>(
        app: &AppHandle<R>,
        state: &SharedState,
        visible: Option<bool>,
        icon: Option<Vec<u8>>,
        rebuild_menu: bool,
    ) -> Result<()> {
        let tray = app
            .try_state::<TrayIcon<R>>()
            .context("Tray icon not found in app state")?;

        if let Some(icon_bytes) = icon {
            let image =
                Image::from_bytes(&icon_bytes).context("Failed to create image from bytes")?;
            tray.set_icon(Some(image))?;
        }
        if let Some(visible) = visible {
            tray.set_visible(visible)?;
        }

        if rebuild_menu {
            Self::rebuild_menu(app, state)?;
        }

        Ok(())
    }
}

/// Renders display states into the tray icon.
pub struct TraySink<R: Runtime> {
    app: AppHandle<R>,
    compositor: Arc<Compositor>,
    state: SharedState,
    frames: FrameTracker,
}

impl<R: Runtime> TraySink<R> {
    pub fn new(app: AppHandle<R>, compositor: Arc<Compositor>, state: SharedState) -> Self {
        Self {
            app,
            compositor,
            state,
            frames: FrameTracker::default(),
        }
    }
}

impl<R: Runtime> DisplaySink for TraySink<R> {
    fn present(&mut self, snapshot: &PlayerSnapshot, display: &DisplayState) {
        let dark_mode = compositor::is_dark_mode();
        let menu_key = (snapshot.is_running, snapshot.is_playing);
        let plan = self.frames.plan(display, dark_mode, menu_key);

        if plan.appearance_changed {
            log::info!(
                "System appearance changed to {} mode",
                if dark_mode { "dark" } else { "light" }
            );
        }

        if !plan.redraw && !plan.rebuild_menu {
            return;
        }

        // A frame that failed to render leaves the tray as it was and is
        // retried on the next update
        let mut icon = None;
        let mut visible = Some(display.visible);
        if plan.redraw {
            if display.visible {
                match self
                    .compositor
                    .compose_with_color(display, compositor::text_color(dark_mode))
                {
                    Ok(bytes) => {
                        icon = Some(bytes);
                        self.frames.drawn(display, dark_mode);
                    }
                    Err(e) => {
                        log::error!("Failed to render status image: {}", e);
                        visible = None;
                    }
                }
            } else {
                self.frames.drawn(display, dark_mode);
            }
        }
        self.frames.menu_built(menu_key);

        // Must run on main thread for macOS compatibility
        let app = self.app.clone();
        let state = self.state.clone();
        let _ = self.app.run_on_main_thread(move || {
            if let Err(e) = TrayManager::apply(&app, &state, visible, icon, plan.rebuild_menu) {
                log::error!("Failed to update tray: {}", e);
            }
        });
    }
}
