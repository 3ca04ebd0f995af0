use std::path::PathBuf;

const APP_DIR: &str = "vibe";

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/vibe/ (XDG standard)
    // instead of macOS Application Support for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(temp_dir)
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    // On macOS and Linux, always use ~/.config/vibe/
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir()
}

/// File the binary writes its tracing output to.
pub fn log_file() -> PathBuf {
    data_dir().join("vibe.log")
}
