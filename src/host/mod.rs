pub mod kernels;

use std::time::Instant;

use rayon::ThreadPoolBuilder;

use crate::device::{ComputeDevice, DeviceInfo, DeviceRun};
use crate::errors::{EqualizeError, Result};
use crate::profiler::{StageTiming, TimingSource};
use crate::stage::{Stage, StageCursor};
use crate::types::{Bins, PixelBuffer, INTENSITY_LEVELS, MAX_PIXEL_COUNT};

use kernels::AtomicBins;

/// CPU compute device running the kernels on a dedicated rayon pool.
pub struct HostDevice {
    pool: rayon::ThreadPool,
    info: DeviceInfo,
}

impl HostDevice {
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let info = Self::describe(threads);
        let num_threads = info.compute_units.unwrap_or(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("histeq-host-{}", i))
            .build()
            .map_err(|e| EqualizeError::ThreadPool {
                message: e.to_string(),
            })?;

        log::info!("Host device initialized with {} thread(s)", num_threads);
        Ok(Self { pool, info })
    }

    pub fn describe(threads: Option<usize>) -> DeviceInfo {
        let threads = threads.unwrap_or_else(num_cpus::get).max(1);
        DeviceInfo {
            name: format!("Host CPU ({} threads)", threads),
            vendor: "host".to_string(),
            backend: "rayon".to_string(),
            device_type: "CPU".to_string(),
            compute_units: Some(threads),
            max_buffer_size: MAX_PIXEL_COUNT as u64,
            supports_timestamps: false,
        }
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ComputeDevice for HostDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn allocate<'a>(&'a self, input: &PixelBuffer) -> Result<Box<dyn DeviceRun + 'a>> {
        Ok(Box::new(HostRun::new(self, input)?))
    }
}

/// Buffers of one run on the host device.
pub struct HostRun<'a> {
    device: &'a HostDevice,
    cursor: StageCursor,
    image_input: Vec<u8>,
    histogram: AtomicBins,
    cumulative: AtomicBins,
    lut: Bins,
    image_output: Vec<u8>,
    epoch: Instant,
}

impl<'a> HostRun<'a> {
    pub fn new(device: &'a HostDevice, input: &PixelBuffer) -> Result<Self> {
        if input.pixel_count() > MAX_PIXEL_COUNT {
            return Err(EqualizeError::ImageTooLarge {
                pixels: input.pixel_count(),
                max: MAX_PIXEL_COUNT,
            });
        }

        let mut image_input = Vec::new();
        image_input
            .try_reserve_exact(input.pixel_count())
            .map_err(|e| EqualizeError::Allocation {
                buffer: "image_input".to_string(),
                message: e.to_string(),
            })?;
        image_input.extend_from_slice(input.as_slice());

        let mut image_output = Vec::new();
        image_output
            .try_reserve_exact(input.pixel_count())
            .map_err(|e| EqualizeError::Allocation {
                buffer: "image_output".to_string(),
                message: e.to_string(),
            })?;
        image_output.resize(input.pixel_count(), 0);

        tracing::debug!(pixel_count = input.pixel_count(), "host buffers allocated");

        Ok(Self {
            device,
            cursor: StageCursor::new(),
            image_input,
            histogram: kernels::zeroed_bins(),
            cumulative: kernels::zeroed_bins(),
            lut: [0; INTENSITY_LEVELS],
            image_output,
            epoch: Instant::now(),
        })
    }
}

impl DeviceRun for HostRun<'_> {
    fn execute(&mut self, stage: Stage) -> Result<StageTiming> {
        self.cursor.begin(stage)?;

        let start = self.epoch.elapsed();
        let Self {
            device,
            image_input,
            histogram,
            cumulative,
            lut,
            image_output,
            ..
        } = self;
        // `install` returns once every task of the stage has finished.
        device.pool.install(|| match stage {
            Stage::Histogram => {
                kernels::clear(histogram);
                kernels::histogram(image_input, histogram);
            }
            Stage::CumulativeHistogram => {
                kernels::clear(cumulative);
                kernels::cumulative(histogram, cumulative);
            }
            Stage::Lut => kernels::lut(cumulative, lut),
            Stage::ReProject => kernels::re_project(image_input, lut, image_output),
        });
        let end = self.epoch.elapsed();

        self.cursor.complete(stage);
        Ok(StageTiming {
            stage,
            start_ns: start.as_nanos() as u64,
            end_ns: end.as_nanos() as u64,
            source: TimingSource::Host,
        })
    }

    fn read_bins(&mut self, stage: Stage) -> Result<Bins> {
        self.cursor.ensure_materialized(stage)?;
        match stage {
            Stage::Histogram => Ok(kernels::snapshot(&self.histogram)),
            Stage::CumulativeHistogram => Ok(kernels::snapshot(&self.cumulative)),
            Stage::Lut => Ok(self.lut),
            Stage::ReProject => Err(EqualizeError::InvalidOperation {
                message: format!("stage '{}' does not produce bins", stage),
            }),
        }
    }

    fn read_output(&mut self) -> Result<Vec<u8>> {
        self.cursor.ensure_materialized(Stage::ReProject)?;
        Ok(self.image_output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_reports_thread_count() {
        let info = HostDevice::describe(Some(4));
        assert_eq!(info.compute_units, Some(4));
        assert_eq!(info.backend, "rayon");
        assert_eq!(HostDevice::describe(Some(0)).compute_units, Some(1));
    }

    #[test]
    fn pool_uses_requested_threads() {
        let device = HostDevice::new(Some(2)).unwrap();
        assert_eq!(device.threads(), 2);
        assert_eq!(device.info().compute_units, Some(2));
    }

    #[test]
    fn bins_of_re_project_are_rejected() {
        let device = HostDevice::new(Some(1)).unwrap();
        let input = PixelBuffer::from_row(vec![3, 3, 9]).unwrap();
        let mut run = device.allocate(&input).unwrap();
        for stage in Stage::ORDER {
            run.execute(stage).unwrap();
        }
        let err = run.read_bins(Stage::ReProject).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OPERATION");
        assert_eq!(run.read_output().unwrap(), vec![170, 170, 255]);
    }
}
