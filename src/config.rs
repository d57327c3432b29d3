use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "PinkCycle";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the encrypted vault inside the data directory.
pub const VAULT_FILE_NAME: &str = "data.pinkcycle";

/// Per-user data directory, e.g. `~/.local/share/pinkcycle` on Linux.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("pinkcycle"))
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "pinkcycle=info"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_is_app_specific() {
        if let Some(dir) = data_dir() {
            assert!(dir.ends_with("pinkcycle"));
        }
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn default_filter_targets_crate() {
        assert!(default_log_filter().starts_with("pinkcycle"));
    }
}
