use anyhow::{Context, Result};
use auto_launch::AutoLaunchBuilder;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "NowBar";

/// The path registered as the login item.
///
/// Inside a macOS bundle the binary lives at `NowBar.app/Contents/MacOS/nowbar`;
/// the login item must point at `NowBar.app` itself.
fn launch_path(exe: &Path) -> PathBuf {
    let path_str = exe.to_string_lossy();
    match path_str.find(".app/Contents/MacOS") {
        Some(idx) => PathBuf::from(&path_str[..idx + ".app".len()]),
        None => exe.to_path_buf(),
    }
}

fn get_auto_launch() -> Result<auto_launch::AutoLaunch> {
    let current_exe = std::env::current_exe().context("Failed to get current executable path")?;
    let app_path = launch_path(&current_exe);
    let app_path_str = app_path.to_string_lossy().to_string();

    let mut builder = AutoLaunchBuilder::new();
    builder.set_app_name(APP_NAME).set_app_path(&app_path_str);

    #[cfg(target_os = "macos")]
    builder.set_macos_launch_mode(auto_launch::MacOSLaunchMode::LaunchAgent);

    builder.build().context("Failed to create AutoLaunch instance")
}

/// Whether the app is registered to launch at login. Unknown counts as no.
pub fn is_enabled() -> bool {
    match get_auto_launch() {
        Ok(auto_launch) => auto_launch.is_enabled().unwrap_or(false),
        Err(e) => {
            log::warn!("Failed to check auto-launch status: {}", e);
            false
        }
    }
}

pub fn set_enabled(enabled: bool) -> Result<()> {
    let auto_launch = get_auto_launch()?;

    if enabled {
        auto_launch.enable().context("Failed to enable auto-launch")?;
        log::info!("Auto-launch enabled");
    } else {
        auto_launch.disable().context("Failed to disable auto-launch")?;
        log::info!("Auto-launch disabled");
    }

    Ok(())
}

/// Flip the login item and return the new state
pub fn toggle() -> Result<bool> {
    let new_state = !is_enabled();
    set_enabled(new_state)?;
    Ok(new_state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_path_uses_bundle() {
        let exe = Path::new("/Applications/NowBar.app/Contents/MacOS/nowbar");
        assert_eq!(launch_path(exe), PathBuf::from("/Applications/NowBar.app"));
    }

    #[test]
    fn test_launch_path_plain_binary() {
        let exe = Path::new("/usr/local/bin/nowbar");
        assert_eq!(launch_path(exe), exe.to_path_buf());
    }
}
