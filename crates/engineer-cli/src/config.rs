//! Configuration file – reads/writes `~/.engineer/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engineer_runtime::telemetry::LogFormat;
use engineer_runtime::{Binding, EngineerSettings, default_bindings};
use engineer_types::{CalibrationStep, ManualError};
use serde::{Deserialize, Serialize};

/// A step queue known to the simulated executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimStepQueue {
    pub name: String,
    pub steps: Vec<String>,
}

/// Settings of the in-process simulated robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Status queries after which a calibration step reports homed.
    #[serde(default = "default_calibrate_after_queries")]
    pub calibrate_after_queries: u32,

    /// Duration of every simulated step.
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,

    #[serde(default = "default_step_queues")]
    pub step_queues: Vec<SimStepQueue>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            calibrate_after_queries: default_calibrate_after_queries(),
            step_ms: default_step_ms(),
            step_queues: default_step_queues(),
        }
    }
}

/// Persisted configuration stored in `~/.engineer/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Control loop rate.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,

    /// Remote frames older than this mean the link is lost.
    #[serde(default = "default_link_timeout_ms")]
    pub link_timeout_ms: u64,

    /// Minimum spacing of calibration status queries.
    #[serde(default = "default_calibration_query_ms")]
    pub calibration_query_ms: u64,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_max_linear_vel")]
    pub max_linear_vel: f32,

    #[serde(default = "default_max_angular_vel")]
    pub max_angular_vel: f32,

    #[serde(default = "default_power_on_calibration")]
    pub power_on_calibration: Vec<CalibrationStep>,

    #[serde(default = "default_mast_calibration")]
    pub mast_calibration: Vec<CalibrationStep>,

    #[serde(default = "default_arm_calibration")]
    pub arm_calibration: Vec<CalibrationStep>,

    #[serde(default = "default_bindings")]
    pub bindings: Vec<Binding>,

    #[serde(default)]
    pub sim: SimConfig,
}

fn default_tick_hz() -> u32 {
    100
}
fn default_link_timeout_ms() -> u64 {
    200
}
fn default_calibration_query_ms() -> u64 {
    200
}
fn default_max_linear_vel() -> f32 {
    1.5
}
fn default_max_angular_vel() -> f32 {
    3.0
}
fn default_calibrate_after_queries() -> u32 {
    3
}
fn default_step_ms() -> u64 {
    500
}

fn homing_step(name: &str) -> CalibrationStep {
    CalibrationStep {
        name: name.to_string(),
        start_controllers: vec![format!("{name}_calibration_controller")],
        stop_controllers: vec![format!("{name}_controller")],
    }
}

fn default_power_on_calibration() -> Vec<CalibrationStep> {
    vec![homing_step("gimbal")]
}
fn default_mast_calibration() -> Vec<CalibrationStep> {
    vec![homing_step("mast_lift"), homing_step("mast_extend")]
}
fn default_arm_calibration() -> Vec<CalibrationStep> {
    vec![homing_step("arm_joint1"), homing_step("arm_joint2")]
}

fn default_step_queues() -> Vec<SimStepQueue> {
    let queue = |name: &str, steps: &[&str]| SimStepQueue {
        name: name.to_string(),
        steps: steps.iter().map(|s| s.to_string()).collect(),
    };
    vec![
        queue("install_module", &["raise_mast", "extend_arm", "release", "retract"]),
        queue("pick_ore", &["reach", "grab", "lift", "store"]),
        queue("store_ore", &["lift", "rotate", "release"]),
        queue("card_grab", &["open_card", "close_card"]),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            link_timeout_ms: default_link_timeout_ms(),
            calibration_query_ms: default_calibration_query_ms(),
            log_format: LogFormat::default(),
            max_linear_vel: default_max_linear_vel(),
            max_angular_vel: default_max_angular_vel(),
            power_on_calibration: default_power_on_calibration(),
            mast_calibration: default_mast_calibration(),
            arm_calibration: default_arm_calibration(),
            bindings: default_bindings(),
            sim: SimConfig::default(),
        }
    }
}

impl Config {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }

    /// Controller settings described by this config.
    pub fn engineer_settings(&self) -> EngineerSettings {
        EngineerSettings {
            link_timeout: Duration::from_millis(self.link_timeout_ms),
            calibration_query_interval: Duration::from_millis(self.calibration_query_ms),
            power_on_calibration: self.power_on_calibration.clone(),
            mast_calibration: self.mast_calibration.clone(),
            arm_calibration: self.arm_calibration.clone(),
            bindings: self.bindings.clone(),
            max_linear_vel: self.max_linear_vel,
            max_angular_vel: self.max_angular_vel,
        }
    }
}

/// Return the config path: `ENGINEER_CONFIG` if set, else
/// `~/.engineer/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("ENGINEER_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".engineer").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, ManualError> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ManualError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        ManualError::Config(format!("Failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| ManualError::Config(format!("Failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `ENGINEER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ENGINEER_TICK_HZ` | `tick_hz` |
/// | `ENGINEER_LINK_TIMEOUT_MS` | `link_timeout_ms` |
/// | `ENGINEER_LOG_FORMAT` | `log_format` |
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |name| std::env::var(name).ok());
}

/// Apply overrides looked up through `var`.  Unparsable values are ignored.
pub(crate) fn apply_overrides(cfg: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("ENGINEER_TICK_HZ")
        && let Ok(hz) = v.trim().parse::<u32>()
        && hz > 0
    {
        cfg.tick_hz = hz;
    }
    if let Some(v) = var("ENGINEER_LINK_TIMEOUT_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.link_timeout_ms = ms;
    }
    if let Some(v) = var("ENGINEER_LOG_FORMAT")
        && let Ok(format) = v.parse::<LogFormat>()
    {
        cfg.log_format = format;
    }
}

/// Save the config to the default path.
pub fn save(cfg: &Config) -> Result<(), ManualError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path, creating its directory if necessary.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ManualError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            ManualError::Config(format!("Failed to create config directory: {e}"))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                ManualError::Config(format!("Failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| ManualError::Config(format!("Failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| ManualError::Config(format!("Failed to write config at {}: {e}", path.display()));
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let raw = std::fs::read_to_string(&path).expect("read back");
        let loaded: Config = toml::from_str(&raw).expect("parse");
        assert_eq!(loaded.bindings, default_bindings());
        assert_eq!(loaded.mast_calibration, cfg.mast_calibration);
        assert_eq!(loaded.sim, cfg.sim);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: Config = toml::from_str("tick_hz = 50\n").expect("parse");
        assert_eq!(cfg.tick_hz, 50);
        assert_eq!(cfg.link_timeout_ms, 200);
        assert_eq!(cfg.calibration_query_ms, 200);
        assert_eq!(cfg.log_format, LogFormat::Compact);
        assert_eq!(cfg.bindings, default_bindings());
        assert_eq!(cfg.sim.step_queues.len(), 4);
    }

    #[test]
    fn custom_steps_and_bindings_parse() {
        let text = r#"
            mast_calibration = [
                { name = "mast_lift", start_controllers = ["lift_cal"], stop_controllers = ["lift_pos"] },
            ]

            [[bindings]]
            trigger = { chord = "shift+x" }
            edge = "rising"
            reaction = { run_step_queue = { name = "pick_ore" } }

            [sim]
            step_ms = 50
        "#;
        let cfg: Config = toml::from_str(text).expect("parse");
        assert_eq!(cfg.mast_calibration.len(), 1);
        assert_eq!(cfg.mast_calibration[0].start_controllers, ["lift_cal"]);
        assert_eq!(cfg.bindings.len(), 1);
        assert_eq!(cfg.sim.step_ms, 50);
        assert_eq!(cfg.sim.calibrate_after_queries, 3);

        let settings = cfg.engineer_settings();
        assert_eq!(settings.bindings.len(), 1);
        assert_eq!(settings.link_timeout, Duration::from_millis(200));
    }

    #[test]
    fn config_path_points_to_engineer_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".engineer"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tick_hz = \"fast\"").expect("write");
        assert!(matches!(load_from(&path), Err(ManualError::Config(_))));
    }

    #[test]
    fn overrides_apply() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            vars(&[
                ("ENGINEER_TICK_HZ", "250"),
                ("ENGINEER_LINK_TIMEOUT_MS", "500"),
                ("ENGINEER_LOG_FORMAT", "json"),
            ]),
        );
        assert_eq!(cfg.tick_hz, 250);
        assert_eq!(cfg.link_timeout_ms, 500);
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            vars(&[
                ("ENGINEER_TICK_HZ", "0"),
                ("ENGINEER_LINK_TIMEOUT_MS", "soon"),
                ("ENGINEER_LOG_FORMAT", "xml"),
            ]),
        );
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn tick_period_from_rate() {
        let cfg = Config {
            tick_hz: 100,
            ..Config::default()
        };
        assert_eq!(cfg.tick_period(), Duration::from_millis(10));
    }
}
