//! # Platform Capability
//!
//! Reports which platform the host runs on and the application version. Pure
//! queries; adapters hold no mutable state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default version reported when the host does not supply one.
pub const DEFAULT_APP_VERSION: &str = "1.0.0";

/// Platform identifiers understood by the ingest endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Apple mobile.
    Ios,
    /// Android mobile.
    Android,
    /// Browser.
    Web,
    /// Windows desktop.
    Windows,
    /// macOS desktop.
    Mac,
    /// Linux desktop or server.
    Linux,
}

impl Platform {
    /// Wire name of the platform.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Web => "web",
            Platform::Windows => "windows",
            Platform::Mac => "mac",
            Platform::Linux => "linux",
        }
    }

    /// Maps a Rust target OS name (`std::env::consts::OS`) to a platform.
    /// Anything unrecognised is reported as Linux.
    pub fn from_target_os(os: &str) -> Self {
        match os {
            "windows" => Platform::Windows,
            "macos" => Platform::Mac,
            "ios" => Platform::Ios,
            "android" => Platform::Android,
            _ => Platform::Linux,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform capability consumed by the delivery engine.
pub trait PlatformAdapter: Send + Sync {
    /// The running platform.
    fn platform(&self) -> Platform;

    /// The application version string.
    fn app_version(&self) -> String;
}

/// Reports the platform this binary was compiled for.
#[derive(Debug, Clone)]
pub struct NativePlatformAdapter {
    app_version: String,
}

impl NativePlatformAdapter {
    /// Creates an adapter reporting `app_version`.
    pub fn new(app_version: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
        }
    }
}

impl Default for NativePlatformAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_APP_VERSION)
    }
}

impl PlatformAdapter for NativePlatformAdapter {
    fn platform(&self) -> Platform {
        Platform::from_target_os(std::env::consts::OS)
    }

    fn app_version(&self) -> String {
        self.app_version.clone()
    }
}

/// Reports fixed values. For hosts that know their platform up front (a web
/// or mobile shell embedding the engine) and for tests.
#[derive(Debug, Clone)]
pub struct StaticPlatformAdapter {
    platform: Platform,
    app_version: String,
}

impl StaticPlatformAdapter {
    /// Creates an adapter that always reports `platform` and `app_version`.
    pub fn new(platform: Platform, app_version: impl Into<String>) -> Self {
        Self {
            platform,
            app_version: app_version.into(),
        }
    }
}

impl PlatformAdapter for StaticPlatformAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn app_version(&self) -> String {
        self.app_version.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_os_mapping() {
        assert_eq!(Platform::from_target_os("windows"), Platform::Windows);
        assert_eq!(Platform::from_target_os("macos"), Platform::Mac);
        assert_eq!(Platform::from_target_os("android"), Platform::Android);
        assert_eq!(Platform::from_target_os("freebsd"), Platform::Linux);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Platform::Mac).unwrap(), "\"mac\"");
        assert_eq!(Platform::Ios.to_string(), "ios");
    }

    #[test]
    fn static_adapter_reports_fixed_values() {
        let adapter = StaticPlatformAdapter::new(Platform::Web, "2.3.4");
        assert_eq!(adapter.platform(), Platform::Web);
        assert_eq!(adapter.app_version(), "2.3.4");
        assert_eq!(NativePlatformAdapter::default().app_version(), DEFAULT_APP_VERSION);
    }
}
