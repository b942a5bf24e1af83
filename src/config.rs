//! Launch configuration: compiled-in defaults, an optional JSON launch
//! profile, then environment overrides. Resolved once at startup.

use serde::Deserialize;
use std::env;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "EnviroAnalyzer Pro";
pub const DEFAULT_BASE_PORT: u16 = 3838;
pub const LAUNCHER_SCRIPT: &str = "shiny_launcher.R";

const PROFILE_ENV: &str = "ENVIROANALYZER_PROFILE";
const PORT_ENV: &str = "ENVIROANALYZER_PORT";
const RSCRIPT_ENV: &str = "ENVIROANALYZER_RSCRIPT";
const APP_DIR_ENV: &str = "ENVIROANALYZER_APP_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRequest {
    Auto,
    Fixed(u16),
}

impl PortRequest {
    /// `0` means "pick one for me".
    pub fn from_raw(port: u16) -> Self {
        if port == 0 {
            Self::Auto
        } else {
            Self::Fixed(port)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowConfig {
    pub width: f64,
    pub height: f64,
    pub min_width: f64,
    pub min_height: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1400.0,
            height: 900.0,
            min_width: 1000.0,
            min_height: 700.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Substrings on the child's stderr that mean the server is listening.
    pub markers: Vec<String>,
}

impl ReadinessConfig {
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_attempts: 60,
            markers: vec!["Listening on".to_string(), "127.0.0.1".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub app_name: String,
    pub version: String,
    pub host: IpAddr,
    pub port: PortRequest,
    pub base_port: u16,
    pub window: WindowConfig,
    /// Explicit interpreter path; skips the install-location search.
    pub interpreter: Option<PathBuf>,
    pub interpreter_flags: Vec<String>,
    pub launcher_script: PathBuf,
    pub app_dir: PathBuf,
    /// Directories searched for an `R-Portable` copy.
    pub portable_roots: Vec<PathBuf>,
    pub readiness: ReadinessConfig,
    pub loading_close_delay: Duration,
    pub diagnostics_path: Option<PathBuf>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        let dev_root = dev_root();
        Self {
            app_name: APP_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: PortRequest::Auto,
            base_port: DEFAULT_BASE_PORT,
            window: WindowConfig::default(),
            interpreter: None,
            interpreter_flags: vec!["--vanilla".to_string()],
            launcher_script: dev_root.join("resources").join(LAUNCHER_SCRIPT),
            app_dir: dev_root.join(".."),
            portable_roots: Vec::new(),
            readiness: ReadinessConfig::default(),
            loading_close_delay: Duration::from_millis(500),
            diagnostics_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
struct LaunchProfile {
    port: Option<u16>,
    rscript: Option<String>,
    app_dir: Option<String>,
    probe_interval_ms: Option<u64>,
    probe_max_attempts: Option<u32>,
}

/// Directories the running shell knows about, used to resolve bundled files.
#[derive(Debug, Clone, Default)]
pub struct HostPaths {
    pub resource_dir: Option<PathBuf>,
    pub exe_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl LaunchConfig {
    /// Builds the configuration for this launch: defaults, then the launch
    /// profile, then environment variables.
    pub fn resolve(paths: &HostPaths) -> Self {
        let profile_path = env::var(PROFILE_ENV).ok();
        let profile = load_launch_profile(profile_path.as_deref());
        let mut config = Self::default().with_host_paths(paths).with_profile(&profile);

        if let Some(port) = env::var(PORT_ENV).ok().and_then(|raw| raw.trim().parse::<u16>().ok()) {
            config.port = PortRequest::from_raw(port);
        }
        if let Some(path) = env::var(RSCRIPT_ENV).ok().as_deref().and_then(normalize_path) {
            config.interpreter = Some(path);
        }
        if let Some(path) = env::var(APP_DIR_ENV).ok().as_deref().and_then(normalize_path) {
            config.app_dir = path;
        }
        config
    }

    fn with_host_paths(mut self, paths: &HostPaths) -> Self {
        if let Some(resource_dir) = paths.resource_dir.as_ref() {
            let bundled_script = resource_dir.join(LAUNCHER_SCRIPT);
            if bundled_script.exists() {
                self.launcher_script = bundled_script;
            }
            let bundled_app = resource_dir.join("app");
            if bundled_app.is_dir() {
                self.app_dir = bundled_app;
            }
        }

        let mut roots = Vec::new();
        if let Some(exe_dir) = paths.exe_dir.as_ref() {
            roots.push(exe_dir.clone());
            if let Some(parent) = exe_dir.parent() {
                roots.push(parent.to_path_buf());
            }
        }
        if let Some(resource_dir) = paths.resource_dir.as_ref() {
            roots.push(resource_dir.clone());
        }
        self.portable_roots = roots;
        self.diagnostics_path = paths
            .log_dir
            .as_ref()
            .map(|dir| dir.join("runtime-events.json"));
        self
    }

    fn with_profile(mut self, profile: &LaunchProfile) -> Self {
        if let Some(port) = profile.port {
            self.port = PortRequest::from_raw(port);
        }
        if let Some(path) = profile.rscript.as_deref().and_then(normalize_path) {
            self.interpreter = Some(path);
        }
        if let Some(path) = profile.app_dir.as_deref().and_then(normalize_path) {
            self.app_dir = path;
        }
        if let Some(ms) = profile.probe_interval_ms.filter(|ms| *ms > 0) {
            self.readiness.interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = profile.probe_max_attempts.filter(|n| *n > 0) {
            self.readiness.max_attempts = attempts;
        }
        self
    }
}

fn dev_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn normalize_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn load_launch_profile(profile_path: Option<&str>) -> LaunchProfile {
    let Some(path) = profile_path.and_then(normalize_path) else {
        return LaunchProfile::default();
    };
    read_launch_profile(&path)
}

fn read_launch_profile(path: &Path) -> LaunchProfile {
    match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<LaunchProfile>(&raw).unwrap_or_else(|err| {
            log::warn!("Ignoring invalid launch profile {}: {err}", path.display());
            LaunchProfile::default()
        }),
        Err(_) => LaunchProfile::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_shipped_launcher() {
        let config = LaunchConfig::default();
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.port, PortRequest::Auto);
        assert_eq!(config.base_port, 3838);
        assert_eq!(config.window.width, 1400.0);
        assert_eq!(config.window.min_height, 700.0);
        assert_eq!(config.interpreter_flags, vec!["--vanilla".to_string()]);
        assert!(config.launcher_script.ends_with("resources/shiny_launcher.R"));
    }

    #[test]
    fn default_readiness_budget_is_thirty_seconds() {
        let readiness = ReadinessConfig::default();
        assert_eq!(readiness.interval, Duration::from_millis(500));
        assert_eq!(readiness.max_attempts, 60);
        assert_eq!(readiness.budget(), Duration::from_secs(30));
    }

    #[test]
    fn zero_port_means_auto() {
        assert_eq!(PortRequest::from_raw(0), PortRequest::Auto);
        assert_eq!(PortRequest::from_raw(4000), PortRequest::Fixed(4000));
    }

    #[test]
    fn profile_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        fs::write(
            &path,
            r#"{"port": 4100, "rscript": " /opt/R/bin/Rscript ", "probe_interval_ms": 250, "probe_max_attempts": 0}"#,
        )
        .unwrap();

        let profile = read_launch_profile(&path);
        let config = LaunchConfig::default().with_profile(&profile);
        assert_eq!(config.port, PortRequest::Fixed(4100));
        assert_eq!(config.interpreter, Some(PathBuf::from("/opt/R/bin/Rscript")));
        assert_eq!(config.readiness.interval, Duration::from_millis(250));
        assert_eq!(config.readiness.max_attempts, 60);
    }

    #[test]
    fn unreadable_or_invalid_profile_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(read_launch_profile(&path).port.is_none());
        assert!(read_launch_profile(&dir.path().join("missing.json")).port.is_none());
        assert!(load_launch_profile(Some("   ")).port.is_none());
    }

    #[test]
    fn host_paths_prefer_bundled_resources() {
        let dir = tempfile::tempdir().unwrap();
        let resources = dir.path().join("resources");
        fs::create_dir_all(resources.join("app")).unwrap();
        fs::write(resources.join(LAUNCHER_SCRIPT), "# launcher").unwrap();
        let exe_dir = dir.path().join("bin");

        let paths = HostPaths {
            resource_dir: Some(resources.clone()),
            exe_dir: Some(exe_dir.clone()),
            log_dir: Some(dir.path().join("logs")),
        };
        let config = LaunchConfig::default().with_host_paths(&paths);

        assert_eq!(config.launcher_script, resources.join(LAUNCHER_SCRIPT));
        assert_eq!(config.app_dir, resources.join("app"));
        assert_eq!(
            config.portable_roots,
            vec![exe_dir, dir.path().to_path_buf(), resources]
        );
        assert_eq!(
            config.diagnostics_path,
            Some(dir.path().join("logs").join("runtime-events.json"))
        );
    }
}
