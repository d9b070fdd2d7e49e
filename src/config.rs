use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::{
    encoder::EncoderTuning,
    error::{ConfigError, Result},
    video::{CodecKind, ContainerKind, FitOptions, FitPolicy, ResizeFilter},
};

/// Main configuration for the movie generator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults for the produced movie
    pub output: OutputConfig,

    /// Which encoder does the work
    pub backend: BackendConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.output.validate()?;
        self.backend.validate()?;
        Ok(())
    }

    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            policy: self.output.fit,
            filter: self.output.filter,
            background: self.output.background,
        }
    }

    pub fn tuning(&self) -> EncoderTuning {
        EncoderTuning {
            quality: self.output.quality,
            threads: self.backend.threads,
        }
    }
}

/// Movie defaults, used wherever a request leaves a field unspecified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Frames per second
    pub fps: u32,

    pub codec: CodecKind,

    /// Used when the destination has no recognised extension
    pub container: ContainerKind,

    pub fit: FitPolicy,

    pub filter: ResizeFilter,

    /// RGB fill for letterbox bars and transparency
    pub background: [u8; 3],

    /// Quality setting (0-100, higher is better)
    pub quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            fps: 24,
            codec: CodecKind::default(),
            container: ContainerKind::default(),
            fit: FitPolicy::default(),
            filter: ResizeFilter::default(),
            background: [0, 0, 0],
            quality: 85,
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "output.fps".to_string(),
                value: self.fps.to_string()
            }.into());
        }

        if self.quality > 100 {
            return Err(ConfigError::InvalidValue {
                key: "output.quality".to_string(),
                value: self.quality.to_string()
            }.into());
        }

        if !self.container.supports(self.codec) {
            return Err(ConfigError::InvalidValue {
                key: "output.codec".to_string(),
                value: format!("{} in {}", self.codec.name(), self.container.name())
            }.into());
        }

        Ok(())
    }
}

/// Encoder implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// External `ffmpeg` executable fed through a pipe
    #[default]
    Process,
    /// Linked libav* libraries (requires the `ffmpeg` feature)
    Native,
}

impl BackendKind {
    pub fn is_compiled_in(&self) -> bool {
        match self {
            Self::Process => true,
            Self::Native => cfg!(feature = "ffmpeg"),
        }
    }
}

/// Encoder backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// Executable used by the process backend
    pub ffmpeg_path: PathBuf,

    /// Number of encoder threads
    pub threads: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            threads: num_cpus::get(),
        }
    }
}

impl BackendConfig {
    fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "backend.threads".to_string(),
                value: self.threads.to_string()
            }.into());
        }

        if self.ffmpeg_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "backend.ffmpeg_path".to_string(),
                value: String::new()
            }.into());
        }

        if !self.kind.is_compiled_in() {
            return Err(ConfigError::InvalidValue {
                key: "backend.kind".to_string(),
                value: "native (built without the ffmpeg feature)".to_string()
            }.into());
        }

        Ok(())
    }
}
