use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{EqualizeError, Result};

/// One of the four device-side passes of the equalization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Histogram,
    CumulativeHistogram,
    Lut,
    ReProject,
}

impl Stage {
    /// Dependency order. Each stage consumes the previous stage's output.
    pub const ORDER: [Stage; 4] = [
        Stage::Histogram,
        Stage::CumulativeHistogram,
        Stage::Lut,
        Stage::ReProject,
    ];

    /// Logical kernel name, also the file stem of the kernel source.
    pub fn kernel_name(self) -> &'static str {
        match self {
            Stage::Histogram => "histogram",
            Stage::CumulativeHistogram => "cum_hist",
            Stage::Lut => "LUT",
            Stage::ReProject => "re_project",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Stage::Histogram => "Histogram",
            Stage::CumulativeHistogram => "Cumulative Histogram",
            Stage::Lut => "LUT",
            Stage::ReProject => "Re-projection",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Stage::Histogram => 0,
            Stage::CumulativeHistogram => 1,
            Stage::Lut => 2,
            Stage::ReProject => 3,
        }
    }

    /// Whether the stage writes one of the 256-entry bin buffers.
    pub fn produces_bins(self) -> bool {
        !matches!(self, Stage::ReProject)
    }

    pub fn from_kernel_name(name: &str) -> Option<Stage> {
        Stage::ORDER.into_iter().find(|s| s.kernel_name() == name)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kernel_name())
    }
}

/// Tracks how far a run has progressed through [`Stage::ORDER`].
///
/// Devices hold one per run so a stage can only start once its predecessor
/// has signalled completion, and a result can only be read once materialized.
#[derive(Debug, Default, Clone)]
pub struct StageCursor {
    completed: usize,
}

impl StageCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, stage: Stage) -> Result<()> {
        if stage.index() != self.completed {
            let expected = Stage::ORDER
                .get(self.completed)
                .map(|s| s.kernel_name())
                .unwrap_or("none");
            return Err(EqualizeError::InvalidOperation {
                message: format!(
                    "stage '{}' issued out of order (next runnable stage: {})",
                    stage, expected
                ),
            });
        }
        Ok(())
    }

    pub fn complete(&mut self, stage: Stage) {
        debug_assert_eq!(stage.index(), self.completed);
        self.completed = stage.index() + 1;
    }

    pub fn is_materialized(&self, stage: Stage) -> bool {
        stage.index() < self.completed
    }

    pub fn ensure_materialized(&self, stage: Stage) -> Result<()> {
        if self.is_materialized(stage) {
            Ok(())
        } else {
            Err(EqualizeError::InvalidOperation {
                message: format!("result of stage '{}' read before it completed", stage),
            })
        }
    }

    pub fn finished(&self) -> bool {
        self.completed == Stage::ORDER.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_names_round_trip() {
        for stage in Stage::ORDER {
            assert_eq!(Stage::from_kernel_name(stage.kernel_name()), Some(stage));
        }
        assert_eq!(Stage::from_kernel_name("lut"), None);
    }

    #[test]
    fn cursor_enforces_order() {
        let mut cursor = StageCursor::new();
        assert!(cursor.begin(Stage::CumulativeHistogram).is_err());
        cursor.begin(Stage::Histogram).unwrap();
        cursor.complete(Stage::Histogram);

        assert!(cursor.ensure_materialized(Stage::Histogram).is_ok());
        assert!(cursor.ensure_materialized(Stage::Lut).is_err());
        assert!(cursor.begin(Stage::Histogram).is_err());

        for stage in &Stage::ORDER[1..] {
            cursor.begin(*stage).unwrap();
            cursor.complete(*stage);
        }
        assert!(cursor.finished());
    }
}
