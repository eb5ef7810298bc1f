//! # mirrorcast-settings
//!
//! Configuration for the mirrorcast server and client, loaded in layers
//! (lowest to highest priority):
//! 1. **Compiled defaults**: [`Settings::default()`]
//! 2. **Settings file**: `~/.mirrorcast/settings.json` or an explicit path
//! 3. **Environment variables**: `MIRRORCAST_*`
//!
//! There is no global instance; callers load once at startup and pass the
//! relevant section to whatever they construct.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{ClientSettings, LoggingSettings, ServerSettings, Settings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = Settings::default();
        let path = settings_path();
        assert!(path.ends_with(".mirrorcast/settings.json"));
    }
}
