use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gif_converter::{EncoderKind, FfmpegTools, HwAccelPolicy};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
    #[serde(default)]
    pub gif: GifConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FfmpegConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

impl FfmpegConfig {
    pub fn tools(&self) -> FfmpegTools {
        FfmpegTools {
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GifConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_resize")]
    pub resize: f64,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    pub encoder: EncoderKind,
    /// native エンコーダー専用。1 (高画質) から 30 (高速) まで。
    #[serde(default = "default_speed")]
    pub speed: i32,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    pub hwaccel: HwAccelPolicy,
}

impl Default for GifConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            resize: default_resize(),
            encoder: EncoderKind::default(),
            speed: default_speed(),
            hwaccel: HwAccelPolicy::default(),
        }
    }
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_fps() -> u32 {
    10
}

fn default_resize() -> f64 {
    1.0
}

fn default_speed() -> i32 {
    10
}

pub fn open_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
    let config: Config = toml::from_str(&content).context("Failed to parse configuration file")?;
    Ok(config)
}

/// `path` が指定されていれば読み込み、なければデフォルト値を返す。
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => open_config(path),
        None => Ok(Config::default()),
    }
}

pub fn write_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let content =
        toml::to_string_pretty(&Config::default()).context("Failed to serialize configuration")?;
    fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
    Ok(())
}
