use std::time::Instant;

use wgpu::util::DeviceExt;

use super::types::{GpuDevice, StageParams};
use crate::device::{ComputeDevice, DeviceInfo, DeviceRun};
use crate::errors::{EqualizeError, Result};
use crate::profiler::{StageTiming, TimingSource};
use crate::stage::{Stage, StageCursor};
use crate::types::{Bins, PixelBuffer, INTENSITY_LEVELS};

const WORKGROUP_SIZE: u32 = 256;
const BINS_SIZE: u64 = (INTENSITY_LEVELS * std::mem::size_of::<u32>()) as u64;

/// Pixel bytes padded to a whole number of `u32` words (at least one), the
/// layout the kernels read as `array<u32>` with little-endian lanes.
pub fn padded_pixel_bytes(pixels: &[u8]) -> Vec<u8> {
    let padded_len = pixels.len().div_ceil(4).max(1) * 4;
    let mut padded = Vec::with_capacity(padded_len);
    padded.extend_from_slice(pixels);
    padded.resize(padded_len, 0);
    padded
}

/// Splits a 1-D workgroup count into a 2-D grid when it exceeds the
/// per-dimension limit. Kernels linearize with `gid.y * groups.x * 256 + gid.x`.
pub fn tile_workgroups(workgroups: u32, max_per_dim: u32) -> Option<(u32, u32)> {
    let workgroups = workgroups.max(1);
    if workgroups <= max_per_dim {
        return Some((workgroups, 1));
    }
    let rows = workgroups.div_ceil(max_per_dim);
    (rows <= max_per_dim).then_some((max_per_dim, rows))
}

struct TimestampQueries {
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    staging: wgpu::Buffer,
    period_ns: f32,
}

impl TimestampQueries {
    fn new(device: &wgpu::Device, period_ns: f32) -> Self {
        let size = 2 * std::mem::size_of::<u64>() as u64;
        Self {
            query_set: device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some("stage_timestamps"),
                ty: wgpu::QueryType::Timestamp,
                count: 2,
            }),
            resolve: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("stage_timestamps_resolve"),
                size,
                usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
            staging: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("stage_timestamps_staging"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            period_ns,
        }
    }
}

/// Device buffers of one run. All of them live exactly as long as the run.
pub struct GpuRun<'a> {
    gpu: &'a GpuDevice,
    cursor: StageCursor,
    params: StageParams,
    #[allow(dead_code)]
    image_input: wgpu::Buffer,
    histogram: wgpu::Buffer,
    cumulative: wgpu::Buffer,
    lut: wgpu::Buffer,
    image_output: wgpu::Buffer,
    bind_groups: Vec<wgpu::BindGroup>,
    timestamps: Option<TimestampQueries>,
    epoch: Instant,
}

impl ComputeDevice for GpuDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn allocate<'a>(&'a self, input: &PixelBuffer) -> Result<Box<dyn DeviceRun + 'a>> {
        Ok(Box::new(GpuRun::new(self, input)?))
    }
}

impl<'a> GpuRun<'a> {
    pub fn new(gpu: &'a GpuDevice, input: &PixelBuffer) -> Result<Self> {
        let pixel_count = u32::try_from(input.pixel_count()).map_err(|_| {
            EqualizeError::ImageTooLarge {
                pixels: input.pixel_count(),
                max: crate::types::MAX_PIXEL_COUNT,
            }
        })?;
        let params = StageParams::new(pixel_count);
        let padded = padded_pixel_bytes(input.as_slice());
        let image_size = padded.len() as u64;

        if image_size > gpu.max_storage_buffer_binding_size {
            return Err(EqualizeError::Allocation {
                buffer: "image_input".to_string(),
                message: format!(
                    "{} bytes exceeds the device binding limit of {} bytes",
                    image_size, gpu.max_storage_buffer_binding_size
                ),
            });
        }

        let device = &gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let bins_buffer = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: BINS_SIZE,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        let image_input = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("image_input"),
            contents: &padded,
            usage: wgpu::BufferUsages::STORAGE,
        });
        let histogram = bins_buffer("histogram_output");
        let cumulative = bins_buffer("cumulative_histogram_output");
        let lut = bins_buffer("lut_output");
        let image_output = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("image_output"),
            size: image_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("stage_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = |stage: Stage, buffers: &[&wgpu::Buffer]| {
            let entries: Vec<wgpu::BindGroupEntry> = buffers
                .iter()
                .enumerate()
                .map(|(binding, buffer)| wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: buffer.as_entire_binding(),
                })
                .collect();
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{}_bind_group", stage.kernel_name())),
                layout: &gpu.pipelines.get(stage).bind_group_layout,
                entries: &entries,
            })
        };

        let bind_groups = vec![
            bind_group(Stage::Histogram, &[&image_input, &histogram, &params_buffer]),
            bind_group(Stage::CumulativeHistogram, &[&histogram, &cumulative]),
            bind_group(Stage::Lut, &[&cumulative, &lut]),
            bind_group(
                Stage::ReProject,
                &[&image_input, &lut, &image_output, &params_buffer],
            ),
        ];

        let timestamps = gpu
            .timestamp_period
            .map(|period| TimestampQueries::new(device, period));

        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(error) = out_of_memory.or(validation) {
            return Err(EqualizeError::Allocation {
                buffer: "pipeline buffers".to_string(),
                message: error.to_string(),
            });
        }

        tracing::debug!(pixel_count, image_bytes = image_size, "device buffers allocated");

        Ok(Self {
            gpu,
            cursor: StageCursor::new(),
            params,
            image_input,
            histogram,
            cumulative,
            lut,
            image_output,
            bind_groups,
            timestamps,
            epoch: Instant::now(),
        })
    }

    fn stage_output(&self, stage: Stage) -> &wgpu::Buffer {
        match stage {
            Stage::Histogram => &self.histogram,
            Stage::CumulativeHistogram => &self.cumulative,
            Stage::Lut => &self.lut,
            Stage::ReProject => &self.image_output,
        }
    }

    fn workgroups(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Histogram => self.params.pixel_count.div_ceil(WORKGROUP_SIZE),
            Stage::CumulativeHistogram | Stage::Lut => 1,
            Stage::ReProject => self.params.word_count.div_ceil(WORKGROUP_SIZE),
        }
    }

    fn read_buffer(&self, buffer: &wgpu::Buffer, size: u64, label: &str) -> Result<Vec<u8>> {
        let device = &self.gpu.device;
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(label),
        });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.gpu.queue.submit(Some(encoder.finish()));

        let data = map_and_copy(device, &staging).map_err(|message| EqualizeError::Transfer {
            buffer: label.to_string(),
            message,
        })?;
        Ok(data)
    }

    fn read_timestamps(&self, stage: Stage, queries: &TimestampQueries) -> Result<StageTiming> {
        let data = map_and_copy(&self.gpu.device, &queries.staging).map_err(|message| {
            EqualizeError::Transfer {
                buffer: "stage_timestamps".to_string(),
                message,
            }
        })?;
        let ticks: Vec<u64> = data
            .chunks_exact(8)
            .map(bytemuck::pod_read_unaligned::<u64>)
            .collect();
        let to_ns = |t: u64| (t as f64 * queries.period_ns as f64) as u64;
        Ok(StageTiming {
            stage,
            start_ns: to_ns(ticks[0]),
            end_ns: to_ns(ticks[1]),
            source: TimingSource::Device,
        })
    }
}

/// Maps a `MAP_READ` buffer, waits for the device, and copies its contents out.
fn map_and_copy(device: &wgpu::Device, staging: &wgpu::Buffer) -> std::result::Result<Vec<u8>, String> {
    let buffer_slice = staging.slice(..);
    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    device.poll(wgpu::Maintain::Wait);
    match pollster::block_on(rx.receive()) {
        Some(Ok(())) => {}
        Some(Err(e)) => return Err(e.to_string()),
        None => return Err("map callback dropped".to_string()),
    }

    let data = buffer_slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(data)
}

impl DeviceRun for GpuRun<'_> {
    fn execute(&mut self, stage: Stage) -> Result<StageTiming> {
        self.cursor.begin(stage)?;

        let device = &self.gpu.device;
        let (wx, wy) = tile_workgroups(self.workgroups(stage), self.gpu.max_workgroups_per_dim)
            .ok_or_else(|| EqualizeError::StageFailed {
                stage,
                message: "dispatch exceeds the device workgroup grid".to_string(),
            })?;

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(stage.kernel_name()),
        });
        // Every stage output starts from zero.
        encoder.clear_buffer(self.stage_output(stage), 0, None);

        {
            let timestamp_writes =
                self.timestamps
                    .as_ref()
                    .map(|q| wgpu::ComputePassTimestampWrites {
                        query_set: &q.query_set,
                        beginning_of_pass_write_index: Some(0),
                        end_of_pass_write_index: Some(1),
                    });
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(stage.kernel_name()),
                timestamp_writes,
            });
            cpass.set_pipeline(&self.gpu.pipelines.get(stage).pipeline);
            cpass.set_bind_group(0, &self.bind_groups[stage.index()], &[]);
            cpass.dispatch_workgroups(wx, wy, 1);
        }

        if let Some(q) = &self.timestamps {
            encoder.resolve_query_set(&q.query_set, 0..2, &q.resolve, 0);
            encoder.copy_buffer_to_buffer(&q.resolve, 0, &q.staging, 0, q.staging.size());
        }

        let start = self.epoch.elapsed();
        let submission = self.gpu.queue.submit(Some(encoder.finish()));
        // Completion signal: block until this submission has finished on the device.
        device.poll(wgpu::Maintain::wait_for(submission));
        let end = self.epoch.elapsed();

        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(error) = out_of_memory.or(validation) {
            return Err(EqualizeError::StageFailed {
                stage,
                message: error.to_string(),
            });
        }

        let timing = match &self.timestamps {
            Some(q) => self.read_timestamps(stage, q)?,
            None => StageTiming {
                stage,
                start_ns: start.as_nanos() as u64,
                end_ns: end.as_nanos() as u64,
                source: TimingSource::Host,
            },
        };

        self.cursor.complete(stage);
        Ok(timing)
    }

    fn read_bins(&mut self, stage: Stage) -> Result<Bins> {
        if !stage.produces_bins() {
            return Err(EqualizeError::InvalidOperation {
                message: format!("stage '{}' does not produce bins", stage),
            });
        }
        self.cursor.ensure_materialized(stage)?;

        let label = format!("{}_readback", stage.kernel_name());
        let data = self.read_buffer(self.stage_output(stage), BINS_SIZE, &label)?;
        let mut bins = [0u32; INTENSITY_LEVELS];
        for (bin, chunk) in bins.iter_mut().zip(data.chunks_exact(4)) {
            *bin = bytemuck::pod_read_unaligned(chunk);
        }
        Ok(bins)
    }

    fn read_output(&mut self) -> Result<Vec<u8>> {
        self.cursor.ensure_materialized(Stage::ReProject)?;
        let mut data = self.read_buffer(
            &self.image_output,
            self.image_output.size(),
            "image_output_readback",
        )?;
        data.truncate(self.params.pixel_count as usize);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_rounds_up_to_whole_words() {
        assert_eq!(padded_pixel_bytes(&[]), vec![0, 0, 0, 0]);
        assert_eq!(padded_pixel_bytes(&[1, 2, 3, 4]), vec![1, 2, 3, 4]);
        assert_eq!(padded_pixel_bytes(&[9; 5]), vec![9, 9, 9, 9, 9, 0, 0, 0]);
    }

    #[test]
    fn workgroup_tiling() {
        assert_eq!(tile_workgroups(0, 65_535), Some((1, 1)));
        assert_eq!(tile_workgroups(1_000, 65_535), Some((1_000, 1)));
        assert_eq!(tile_workgroups(70_000, 65_535), Some((65_535, 2)));
        assert_eq!(tile_workgroups(10, 4), Some((4, 3)));
        assert_eq!(tile_workgroups(10, 3), None);
    }
}
