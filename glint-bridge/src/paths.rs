//! Files kept in the glint home directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// `$GLINT_HOME`, or `~/.glint`. Created if missing.
pub fn glint_home() -> io::Result<PathBuf> {
    let home = match std::env::var_os("GLINT_HOME") {
        Some(home) => PathBuf::from(home),
        None => dirs::home_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no home directory"))?
            .join(".glint"),
    };

    if !home.exists() {
        fs::create_dir_all(&home)?;
    }

    Ok(home)
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.json")
}

pub fn notifications_path(home: &Path) -> PathBuf {
    home.join("notifications.json")
}

pub fn signatures_path(home: &Path) -> PathBuf {
    home.join("signatures.json")
}
