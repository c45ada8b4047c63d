use super::types::GpuDevice;
use crate::device::DeviceInfo;

/// Adapters grouped by backend, keeping the order wgpu enumerates them in.
pub fn adapters_by_backend(instance: &wgpu::Instance) -> Vec<(wgpu::Backend, Vec<wgpu::Adapter>)> {
    let mut groups: Vec<(wgpu::Backend, Vec<wgpu::Adapter>)> = Vec::new();
    for adapter in instance.enumerate_adapters(wgpu::Backends::all()) {
        let backend = adapter.get_info().backend;
        match groups.iter_mut().find(|(b, _)| *b == backend) {
            Some((_, adapters)) => adapters.push(adapter),
            None => groups.push((backend, vec![adapter])),
        }
    }
    groups
}

pub fn adapter_device_info(adapter: &wgpu::Adapter) -> DeviceInfo {
    let info = adapter.get_info();
    let limits = adapter.limits();
    DeviceInfo {
        name: info.name.clone(),
        vendor: format!("{:#06x}", info.vendor),
        backend: info.backend.to_str().to_string(),
        device_type: device_type_name(info.device_type).to_string(),
        compute_units: None,
        max_buffer_size: limits
            .max_buffer_size
            .min(limits.max_storage_buffer_binding_size as u64),
        supports_timestamps: adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY),
    }
}

pub fn platform_version(adapters: &[wgpu::Adapter]) -> String {
    adapters
        .first()
        .map(|a| {
            let info = a.get_info();
            if info.driver_info.is_empty() {
                info.driver
            } else {
                format!("{} {}", info.driver, info.driver_info)
            }
        })
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn device_type_name(device_type: wgpu::DeviceType) -> &'static str {
    match device_type {
        wgpu::DeviceType::DiscreteGpu => "Discrete GPU",
        wgpu::DeviceType::IntegratedGpu => "Integrated GPU",
        wgpu::DeviceType::VirtualGpu => "Virtual GPU",
        wgpu::DeviceType::Cpu => "CPU",
        _ => "Unknown",
    }
}

impl GpuDevice {
    /// Get GPU information
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn supports_timestamps(&self) -> bool {
        self.timestamp_period.is_some()
    }
}
