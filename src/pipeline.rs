use std::time::Instant;

use crate::device::ComputeDevice;
use crate::errors::{EqualizeError, Result};
use crate::profiler::PipelineProfile;
use crate::stage::Stage;
use crate::types::{Bins, Equalization, PixelBuffer, INTENSITY_LEVELS, MAX_PIXEL_COUNT};

/// Runs the four stages in order on one device.
///
/// A stage is only issued after the previous one has signalled completion,
/// and any stage failure aborts the run without retrying.
pub struct EqualizationPipeline<'d> {
    device: &'d dyn ComputeDevice,
}

impl<'d> EqualizationPipeline<'d> {
    pub fn new(device: &'d dyn ComputeDevice) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &'d dyn ComputeDevice {
        self.device
    }

    pub fn run(&self, input: &PixelBuffer) -> Result<Equalization> {
        if input.pixel_count() > MAX_PIXEL_COUNT {
            return Err(EqualizeError::ImageTooLarge {
                pixels: input.pixel_count(),
                max: MAX_PIXEL_COUNT,
            });
        }

        let info = self.device.info();
        let span = tracing::info_span!(
            "equalize",
            device = %info.name,
            width = input.width(),
            height = input.height()
        );
        let _enter = span.enter();

        let mut profile = PipelineProfile::new(info.name.clone());

        let upload_start = Instant::now();
        let mut run = self.device.allocate(input)?;
        profile.upload = upload_start.elapsed();

        let mut bins: [Bins; 3] = [[0; INTENSITY_LEVELS]; 3];
        for stage in Stage::ORDER {
            let timing = run.execute(stage)?;
            profile.record(timing);
            if stage.produces_bins() {
                bins[stage.index()] = run.read_bins(stage)?;
            }
        }

        let download_start = Instant::now();
        let output = run.read_output()?;
        profile.download = download_start.elapsed();

        let [histogram, cumulative_histogram, lut] = bins;
        debug_assert_eq!(
            histogram.iter().map(|&c| c as u64).sum::<u64>(),
            input.pixel_count() as u64
        );
        debug_assert_eq!(cumulative_histogram[INTENSITY_LEVELS - 1] as usize, input.pixel_count());

        tracing::info!(
            pixels = input.pixel_count(),
            kernels_ns = profile.total_stage_ns(),
            "equalization complete"
        );

        Ok(Equalization {
            histogram,
            cumulative_histogram,
            lut,
            output: PixelBuffer::new(input.width(), input.height(), output)?,
            profile,
        })
    }
}
