use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{EqualizeError, Result};
use crate::profiler::ProfilingResolution;

/// Which compute device a pipeline runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSelection {
    /// Best adapter for the configured power preference, or the host device
    /// when the machine has no adapter.
    #[default]
    Auto,
    /// The rayon-backed host device.
    Host,
    /// An entry of the platform/device report.
    Indexed { platform_id: usize, device_id: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    #[default]
    HighPerformance,
    LowPower,
    None,
}

impl PowerPreference {
    pub fn to_wgpu(self) -> wgpu::PowerPreference {
        match self {
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::None => wgpu::PowerPreference::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device: DeviceSelection,
    pub power_preference: PowerPreference,
    /// Request device timestamp queries when the adapter supports them.
    pub profiling: bool,
    pub resolution: ProfilingResolution,
    /// Directory holding `<kernel name>.wgsl` files that replace the built-in kernels.
    pub kernel_dir: Option<PathBuf>,
    /// Worker threads of the host device. `None` uses one per logical core.
    pub host_threads: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: DeviceSelection::Auto,
            power_preference: PowerPreference::HighPerformance,
            profiling: true,
            resolution: ProfilingResolution::Us,
            kernel_dir: None,
            host_threads: None,
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "histeq", "HistEq")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Settings from the user config directory. Defaults only when no file exists;
    /// a file that fails to parse or validate is an error.
    pub fn load() -> Result<Self> {
        Self::load_or_default(Self::config_path().as_deref())
    }

    fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load_from(path),
            _ => Ok(Self::default()),
        }
    }

    /// Settings from an explicit file. Errors propagate.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path().ok_or_else(|| EqualizeError::InvalidConfiguration {
            message: "no configuration directory on this system".to_string(),
        })?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.host_threads == Some(0) {
            return Err(EqualizeError::InvalidConfiguration {
                message: "host_threads must be at least 1".to_string(),
            });
        }
        if let Some(dir) = &self.kernel_dir {
            if !dir.is_dir() {
                return Err(EqualizeError::InvalidConfiguration {
                    message: format!("kernel_dir '{}' is not a directory", dir.display()),
                });
            }
        }
        Ok(())
    }
}
