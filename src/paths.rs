// ~/Sentinel/sentinel-addons/rotator/src/paths.rs

use std::path::PathBuf;

use crate::{warn, ADDON_NAME};

pub fn user_home_dir() -> Option<PathBuf> {
    // Primary (most reliable on Windows)
    if let Ok(profile) = std::env::var("USERPROFILE") {
        return Some(PathBuf::from(profile));
    }

    // Unix targets
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home));
    }

    // Fallback (older / edge cases)
    let drive = std::env::var("HOMEDRIVE").ok();
    let path = std::env::var("HOMEPATH").ok();

    match (drive, path) {
        (Some(d), Some(p)) => Some(PathBuf::from(format!("{}{}", d, p))),
        _ => None,
    }
}

/// The canonical Sentinel root is always `~/.Sentinel/`.
/// All config, addons, and assets live here.
pub fn sentinel_root_dir() -> PathBuf {
    if let Some(home) = user_home_dir() {
        home.join(".Sentinel")
    } else {
        warn!("Could not resolve home directory, falling back to exe parent");
        match std::env::current_exe() {
            Ok(path) => path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))),
            Err(e) => {
                warn!("Failed to get current executable path: {e}");
                std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
            }
        }
    }
}

/// `~/.Sentinel/Addons/rotator/`: config and the delivery ledger live here.
pub fn addon_root_dir() -> PathBuf {
    sentinel_root_dir().join("Addons").join(ADDON_NAME)
}

pub fn addon_config_path() -> PathBuf {
    addon_root_dir().join("config.yaml")
}

pub fn ledger_path() -> PathBuf {
    addon_root_dir().join("history.txt")
}

/// Default destination for delivered wallpapers when the config leaves
/// `destination_dir` empty.
pub fn default_destination_dir() -> PathBuf {
    sentinel_root_dir().join("Assets").join("gallery")
}
