use super::info::adapter_device_info;
use super::types::{GpuDevice, StagePipelines};
use crate::errors::{EqualizeError, Result};
use crate::kernels::KernelLibrary;
use crate::settings::PowerPreference;

pub fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor::default())
}

impl GpuDevice {
    /// Picks the adapter wgpu ranks best for `preference`.
    pub async fn request(
        preference: PowerPreference,
        kernels: &KernelLibrary,
        profiling: bool,
    ) -> Result<Self> {
        let instance = create_instance();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: preference.to_wgpu(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| EqualizeError::NoDevice {
                message: "No suitable GPU adapter found".to_string(),
            })?;

        Self::from_adapter(adapter, kernels, profiling).await
    }

    pub async fn from_adapter(
        adapter: wgpu::Adapter,
        kernels: &KernelLibrary,
        profiling: bool,
    ) -> Result<Self> {
        let adapter_info = adapter.get_info();
        let adapter_limits = adapter.limits();

        let use_timestamps =
            profiling && adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY);
        let required_features = if use_timestamps {
            wgpu::Features::TIMESTAMP_QUERY
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("histeq_gpu_device"),
                    required_features,
                    required_limits: wgpu::Limits {
                        max_storage_buffer_binding_size: adapter_limits
                            .max_storage_buffer_binding_size,
                        max_buffer_size: adapter_limits.max_buffer_size,
                        max_compute_workgroups_per_dimension: adapter_limits
                            .max_compute_workgroups_per_dimension,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| EqualizeError::NoDevice {
                message: format!("{}: {}", adapter_info.name, e),
            })?;

        device.on_uncaptured_error(Box::new(|e| {
            tracing::error!("uncaptured GPU error: {}", e);
        }));

        log::info!(
            "GPU initialized: {} ({})",
            adapter_info.name,
            adapter_info.backend.to_str()
        );

        let pipelines = StagePipelines::build(&device, kernels)?;
        let limits = device.limits();
        let mut info = adapter_device_info(&adapter);
        info.supports_timestamps = use_timestamps;

        Ok(Self {
            timestamp_period: use_timestamps.then(|| queue.get_timestamp_period()),
            max_workgroups_per_dim: limits.max_compute_workgroups_per_dimension,
            max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size as u64,
            device,
            queue,
            pipelines,
            adapter_info,
            info,
        })
    }
}
