use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

use crate::stage::Stage;

/// Where a stage's timestamps came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingSource {
    /// GPU timestamp queries written at the start and end of the pass.
    Device,
    /// Host wall clock around submission and the completion wait.
    Host,
}

/// Start/end timestamp pair of one stage, in nanoseconds.
///
/// Device timestamps are in the device's own time base; host timestamps are
/// relative to the start of the run. Only the difference is comparable
/// across sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    pub stage: Stage,
    pub start_ns: u64,
    pub end_ns: u64,
    pub source: TimingSource,
}

impl StageTiming {
    pub fn elapsed_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns())
    }
}

/// Unit used when printing timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProfilingResolution {
    Ns,
    #[default]
    Us,
    Ms,
    S,
}

impl ProfilingResolution {
    pub fn divisor(self) -> u64 {
        match self {
            ProfilingResolution::Ns => 1,
            ProfilingResolution::Us => 1_000,
            ProfilingResolution::Ms => 1_000_000,
            ProfilingResolution::S => 1_000_000_000,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            ProfilingResolution::Ns => "[ns]",
            ProfilingResolution::Us => "[us]",
            ProfilingResolution::Ms => "[ms]",
            ProfilingResolution::S => "[s]",
        }
    }

    pub fn format_ns(self, ns: u64) -> String {
        format!("{} {}", ns / self.divisor(), self.suffix())
    }
}

/// Timings collected over a single pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineProfile {
    pub device: String,
    pub stages: Vec<StageTiming>,
    pub upload: Duration,
    pub download: Duration,
}

impl PipelineProfile {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, timing: StageTiming) {
        tracing::debug!(
            stage = timing.stage.kernel_name(),
            elapsed_ns = timing.elapsed_ns(),
            source = ?timing.source,
            "stage complete"
        );
        self.stages.push(timing);
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageTiming> {
        self.stages.iter().find(|t| t.stage == stage)
    }

    pub fn total_stage_ns(&self) -> u64 {
        self.stages.iter().map(StageTiming::elapsed_ns).sum()
    }

    /// One line per stage plus transfer times.
    pub fn report(&self, resolution: ProfilingResolution) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Device: {}", self.device);
        for timing in &self.stages {
            let _ = writeln!(
                out,
                "{} kernel execution time: {} ({:?} timestamps)",
                timing.stage.display_name(),
                resolution.format_ns(timing.elapsed_ns()),
                timing.source
            );
        }
        let _ = writeln!(
            out,
            "Upload {}, Download {}, Kernels total {}",
            resolution.format_ns(self.upload.as_nanos() as u64),
            resolution.format_ns(self.download.as_nanos() as u64),
            resolution.format_ns(self.total_stage_ns())
        );
        out
    }
}
