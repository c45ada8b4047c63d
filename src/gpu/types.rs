use crate::device::DeviceInfo;
use crate::stage::Stage;

/// Compiled compute pipeline of one stage plus the layout its bind groups use.
#[derive(Debug)]
pub struct StagePipeline {
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub pipeline: wgpu::ComputePipeline,
}

/// The four stage pipelines, indexed by [`Stage::index`].
#[derive(Debug)]
pub struct StagePipelines {
    pub(crate) stages: Vec<StagePipeline>,
}

impl StagePipelines {
    pub fn get(&self, stage: Stage) -> &StagePipeline {
        &self.stages[stage.index()]
    }
}

/// wgpu-backed compute device with the equalization kernels built.
///
/// The device is passed explicitly to every pipeline; nothing about the
/// adapter choice lives in global state.
#[derive(Debug)]
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub pipelines: StagePipelines,
    pub adapter_info: wgpu::AdapterInfo,
    pub info: DeviceInfo,
    /// Nanoseconds per timestamp tick, present when timestamp queries are enabled.
    pub timestamp_period: Option<f32>,
    pub max_workgroups_per_dim: u32,
    pub max_storage_buffer_binding_size: u64,
}

/// Uniform block shared by the histogram and re-projection kernels.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StageParams {
    pub pixel_count: u32,
    pub word_count: u32,
    pub _pad: [u32; 2],
}

impl StageParams {
    pub fn new(pixel_count: u32) -> Self {
        Self {
            pixel_count,
            word_count: pixel_count.div_ceil(4).max(1),
            _pad: [0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_match_uniform_layout() {
        assert_eq!(std::mem::size_of::<StageParams>(), 16);
        assert_eq!(StageParams::new(0).word_count, 1);
        assert_eq!(StageParams::new(4).word_count, 1);
        assert_eq!(StageParams::new(5).word_count, 2);
    }
}
