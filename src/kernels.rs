use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::errors::{EqualizeError, Result};
use crate::stage::Stage;

const HISTOGRAM_SHADER: &str = include_str!("shaders/histogram.wgsl");
const CUM_HIST_SHADER: &str = include_str!("shaders/cum_hist.wgsl");
const LUT_SHADER: &str = include_str!("shaders/LUT.wgsl");
const RE_PROJECT_SHADER: &str = include_str!("shaders/re_project.wgsl");

/// Supplies WGSL source for each stage by its logical kernel name.
#[derive(Debug, Clone, Default)]
pub struct KernelLibrary {
    dir: Option<PathBuf>,
}

impl KernelLibrary {
    /// Kernels compiled into the binary.
    pub fn builtin() -> Self {
        Self { dir: None }
    }

    /// Kernels read from `<dir>/<kernel name>.wgsl`.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn builtin_source(stage: Stage) -> &'static str {
        match stage {
            Stage::Histogram => HISTOGRAM_SHADER,
            Stage::CumulativeHistogram => CUM_HIST_SHADER,
            Stage::Lut => LUT_SHADER,
            Stage::ReProject => RE_PROJECT_SHADER,
        }
    }

    pub fn path_for(dir: &Path, stage: Stage) -> PathBuf {
        dir.join(format!("{}.wgsl", stage.kernel_name()))
    }

    pub fn source(&self, stage: Stage) -> Result<Cow<'static, str>> {
        let Some(dir) = &self.dir else {
            return Ok(Cow::Borrowed(Self::builtin_source(stage)));
        };
        let path = Self::path_for(dir, stage);
        tracing::debug!(kernel = stage.kernel_name(), path = %path.display(), "loading kernel source");
        std::fs::read_to_string(&path)
            .map(Cow::Owned)
            .map_err(|e| EqualizeError::KernelLoad {
                kernel: stage.kernel_name().to_string(),
                path,
                message: e.to_string(),
            })
    }
}
