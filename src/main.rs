// Prevents additional console window on Windows in release
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::sync::Arc;

use nowbar::artwork::HttpArtwork;
use nowbar::automation::{OsaScript, SystemProcesses};
use nowbar::compositor::Compositor;
use nowbar::config::Config;
use nowbar::engine::Engine;
use nowbar::poller::StatusPoller;
use nowbar::state;
use nowbar::tray::{TrayManager, TraySink};

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting NowBar menu bar app");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{:#}; using default config", e);
            Config::default()
        }
    };

    // Hide from Dock and Cmd+Tab (macOS only)
    #[cfg(target_os = "macos")]
    {
        use tauri::ActivationPolicy;
        tauri::Builder::default()
            .setup(move |app| {
                // Set as accessory app (menu bar only, no dock icon)
                app.set_activation_policy(ActivationPolicy::Accessory);
                setup_app(app, &config)
            })
            .build(tauri::generate_context!())
            .expect("error while building tauri application")
            .run(run_handler);
        return;
    }

    #[cfg(not(target_os = "macos"))]
    tauri::Builder::default()
        .setup(move |app| setup_app(app, &config))
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(run_handler);
}

fn setup_app(app: &mut tauri::App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    log::info!("Setting up application");

    let state = state::create_state();
    let compositor = Arc::new(Compositor::new(config));

    let poller = StatusPoller::new(Arc::new(OsaScript::new()), Arc::new(SystemProcesses::new()));
    let sink = TraySink::new(app.handle().clone(), compositor.clone(), state.clone());
    let (engine, remote) = Engine::new(
        poller,
        HttpArtwork::new()?,
        compositor.clone(),
        sink,
        config,
        state.clone(),
    );

    TrayManager::setup(app.handle(), state, &compositor, remote)?;
    log::info!("System tray initialized");

    // First poll runs immediately
    tauri::async_runtime::spawn(engine.run());

    let app_handle = app.handle().clone();
    ctrlc::set_handler(move || {
        log::info!("Received interrupt signal (Ctrl+C), exiting...");
        app_handle.exit(0);
    })?;

    Ok(())
}

fn run_handler(_app_handle: &tauri::AppHandle, event: tauri::RunEvent) {
    match event {
        tauri::RunEvent::ExitRequested { .. } => {
            log::info!("App exit requested");
        }
        tauri::RunEvent::Exit => {
            log::info!("App exiting");
        }
        _ => {}
    }
}
