// THEORY:
// The `config` module is the single source of tunable behavior for the engine.
// It is read once at startup, validated, and then handed to every component by
// reference. Nothing mutates it afterwards and there is no process-wide copy, so
// two pipelines with different settings can live side by side (tests rely on this).
//
// The document is YAML with five groups: `capture`, `threshold`, `morph`,
// `transform` and `output`. Every group and every key is optional; anything
// missing falls back to the defaults below. Validation rejects values that the
// downstream stages would otherwise have to second-guess (inverted bands, an
// even median kernel, a zero erosion kernel, a non-positive interval).

use crate::error::ConfigError;
use log::{debug, info};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File names tried in every search directory, in order.
const CONFIG_FILE_NAMES: [&str; 2] = ["config.yaml", "config.yml"];

pub const MAX_HUE: f64 = 180.0;
pub const MAX_CHANNEL: f64 = 255.0;
/// Largest erosion element side.
pub const MAX_KERNEL: u32 = 255;

/// Top-level configuration for the whole engine.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub threshold: ThresholdConfig,
    pub morph: MorphConfig,
    pub transform: TransformConfig,
    pub output: OutputConfig,
}

/// Where frames come from and how often they are pulled.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera device (`/dev/video0`, a numeric index) or an image file/directory to replay.
    pub device: String,
    pub height: u32,
    pub width: u32,
    /// Wall-clock time between two ticks.
    #[serde(deserialize_with = "deserialize_interval")]
    pub interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: String::from("/dev/video0"),
            height: 240,
            width: 320,
            interval: Duration::from_millis(100),
        }
    }
}

/// Inclusive HSV bands. Hue uses the half-range convention (0..=180).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub min_hue: f64,
    pub max_hue: f64,
    #[serde(rename = "min_sat")]
    pub min_saturation: f64,
    #[serde(rename = "max_sat")]
    pub max_saturation: f64,
    #[serde(rename = "min_val")]
    pub min_value: f64,
    #[serde(rename = "max_val")]
    pub max_value: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_hue: 0.0,
            max_hue: MAX_HUE,
            min_saturation: 0.0,
            max_saturation: MAX_CHANNEL,
            min_value: 0.0,
            max_value: MAX_CHANNEL,
        }
    }
}

/// Noise suppression applied around the color classification.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MorphConfig {
    /// Median blur aperture applied to the raw frame. `0` disables the blur.
    pub blur: u32,
    /// Side of the square erosion element applied to the mask.
    pub erosion: u32,
}

impl Default for MorphConfig {
    fn default() -> Self {
        Self { blur: 0, erosion: 5 }
    }
}

/// Parameters of the gradient Hough circle transform.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Inverse accumulator resolution. `1.0` votes at full image resolution.
    pub dp: f64,
    /// Minimum distance between two detected centers, in pixels.
    pub min_dist: f64,
    /// Upper Canny threshold; the lower one is half of it.
    #[serde(rename = "param_1")]
    pub param1: f64,
    /// Accumulator vote threshold.
    #[serde(rename = "param_2")]
    pub param2: f64,
    pub min_radius: f64,
    /// `0` lifts the upper bound.
    pub max_radius: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            dp: 1.0,
            min_dist: 1.0,
            param1: 1.0,
            param2: 1.0,
            min_radius: 0.0,
            max_radius: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// `[x y radius]`, one vector per line.
    Text,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Write a record with an absent circle on ticks without a detection.
    pub emit_empty: bool,
}

impl Config {
    /// Loads the configuration from `explicit`, or from the first config file
    /// found in the default search locations. Finding no file is an error.
    /// The result is always validated.
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        Self::load_from(explicit, &search_dirs())
    }

    /// Like `load`, searching `dirs` in order when no explicit path is given.
    pub fn load_from(explicit: Option<&Path>, dirs: &[PathBuf]) -> Result<Config, ConfigError> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::discover_in(dirs).ok_or_else(|| ConfigError::NotFound {
                    searched: dirs.to_vec(),
                })?;
                Self::from_file(&path)?
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        info!("loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses a YAML document without validating it.
    pub fn parse(text: &str) -> Result<Config, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(text)
    }

    /// First existing config file in `dirs`, trying every file name in one
    /// directory before moving to the next.
    pub fn discover_in(dirs: &[PathBuf]) -> Option<PathBuf> {
        dirs.iter()
            .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
            .inspect(|candidate| debug!("looking for {}", candidate.display()))
            .find(|candidate| candidate.is_file())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        if capture.device.trim().is_empty() {
            return Err(ConfigError::invalid("capture.device", "must not be empty"));
        }
        if capture.width == 0 {
            return Err(ConfigError::invalid("capture.width", "must be positive"));
        }
        if capture.height == 0 {
            return Err(ConfigError::invalid("capture.height", "must be positive"));
        }
        if capture.interval.is_zero() {
            return Err(ConfigError::invalid("capture.interval", "must be positive"));
        }

        let t = &self.threshold;
        check_band("threshold.min_hue", "threshold.max_hue", t.min_hue, t.max_hue, MAX_HUE)?;
        check_band(
            "threshold.min_sat",
            "threshold.max_sat",
            t.min_saturation,
            t.max_saturation,
            MAX_CHANNEL,
        )?;
        check_band("threshold.min_val", "threshold.max_val", t.min_value, t.max_value, MAX_CHANNEL)?;

        if self.morph.blur != 0 && self.morph.blur % 2 == 0 {
            return Err(ConfigError::invalid(
                "morph.blur",
                format!("median aperture must be 0 or odd, got {}", self.morph.blur),
            ));
        }
        if self.morph.erosion < 1 {
            return Err(ConfigError::invalid("morph.erosion", "must be at least 1"));
        }
        if self.morph.erosion > MAX_KERNEL {
            return Err(ConfigError::invalid(
                "morph.erosion",
                format!("must be at most {MAX_KERNEL}, got {}", self.morph.erosion),
            ));
        }

        let tr = &self.transform;
        if !(tr.dp >= 1.0) {
            return Err(ConfigError::invalid("transform.dp", format!("must be at least 1, got {}", tr.dp)));
        }
        for (key, value) in [
            ("transform.min_dist", tr.min_dist),
            ("transform.param_1", tr.param1),
            ("transform.param_2", tr.param2),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::invalid(key, format!("must be positive, got {value}")));
            }
        }
        for (key, value) in [
            ("transform.min_radius", tr.min_radius),
            ("transform.max_radius", tr.max_radius),
        ] {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(ConfigError::invalid(key, format!("must be non-negative, got {value}")));
            }
        }
        if tr.max_radius > 0.0 && tr.min_radius > tr.max_radius {
            return Err(ConfigError::invalid(
                "transform.min_radius",
                format!("{} exceeds max_radius {}", tr.min_radius, tr.max_radius),
            ));
        }
        Ok(())
    }
}

/// `/etc/cyclops`, `$HOME/.cyclops`, then the working directory.
pub fn search_dirs() -> Vec<PathBuf> {
    search_dirs_with_home(std::env::var_os("HOME").map(PathBuf::from))
}

fn search_dirs_with_home(home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from("/etc/cyclops")];
    if let Some(home) = home {
        dirs.push(home.join(".cyclops"));
    }
    dirs.push(PathBuf::from("."));
    dirs
}

fn check_band(
    min_key: &'static str,
    max_key: &'static str,
    min: f64,
    max: f64,
    limit: f64,
) -> Result<(), ConfigError> {
    for (key, value) in [(min_key, min), (max_key, max)] {
        if !(0.0..=limit).contains(&value) {
            return Err(ConfigError::invalid(key, format!("{value} is outside 0..={limit}")));
        }
    }
    if min > max {
        return Err(ConfigError::invalid(min_key, format!("{min} exceeds {max_key} {max}")));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawInterval {
    Millis(u64),
    Text(String),
}

fn deserialize_interval<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawInterval::deserialize(deserializer)? {
        RawInterval::Millis(ms) => Ok(Duration::from_millis(ms)),
        RawInterval::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

/// Parses `250ms`, `1.5s`, `2m`, `500us`, `40ns`; a bare number is milliseconds.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration `{text}`"))?;
    let seconds = match unit.trim() {
        "" | "ms" => value / 1_000.0,
        "ns" => value / 1_000_000_000.0,
        "us" | "µs" => value / 1_000_000.0,
        "s" => value,
        "m" => value * 60.0,
        other => return Err(format!("unknown duration unit `{other}` in `{text}`")),
    };
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid duration `{text}`: {e}"))
}
