use std::fmt::Write as _;

use crate::errors::{EqualizeError, Result};
use crate::gpu::{self, GpuDevice};
use crate::host::HostDevice;
use crate::kernels::KernelLibrary;
use crate::profiler::StageTiming;
use crate::settings::{DeviceSelection, Settings};
use crate::stage::Stage;
use crate::types::{Bins, PixelBuffer};

/// Capability summary of a compute device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor: String,
    pub backend: String,
    pub device_type: String,
    pub compute_units: Option<usize>,
    pub max_buffer_size: u64,
    pub supports_timestamps: bool,
}

/// Buffers and state of one pipeline run on a device.
///
/// `execute` returns only once the stage's output is fully materialized.
pub trait DeviceRun {
    fn execute(&mut self, stage: Stage) -> Result<StageTiming>;

    /// Reads back the 256-entry buffer a completed stage wrote.
    fn read_bins(&mut self, stage: Stage) -> Result<Bins>;

    /// Reads back the re-projected pixels, exactly `pixel_count` bytes.
    fn read_output(&mut self) -> Result<Vec<u8>>;
}

pub trait ComputeDevice {
    fn info(&self) -> &DeviceInfo;

    /// Allocates every buffer of a run and transfers `input` to the device.
    fn allocate<'a>(&'a self, input: &PixelBuffer) -> Result<Box<dyn DeviceRun + 'a>>;
}

/// A group of devices behind one driver API.
#[derive(Debug, Clone)]
pub struct PlatformInfo {
    pub name: String,
    pub version: String,
    pub devices: Vec<DeviceInfo>,
}

/// wgpu backends that expose adapters, in enumeration order, then the host platform.
pub fn enumerate_platforms(settings: &Settings) -> Vec<PlatformInfo> {
    let instance = gpu::create_instance();
    let mut platforms: Vec<PlatformInfo> = gpu::adapters_by_backend(&instance)
        .into_iter()
        .map(|(backend, adapters)| PlatformInfo {
            name: format!("wgpu {}", backend.to_str()),
            version: gpu::platform_version(&adapters),
            devices: adapters.iter().map(gpu::adapter_device_info).collect(),
        })
        .collect();
    platforms.push(PlatformInfo {
        name: "Host".to_string(),
        version: format!("histeq {}", env!("CARGO_PKG_VERSION")),
        devices: vec![HostDevice::describe(settings.host_threads)],
    });
    platforms
}

pub fn list_platforms_devices(settings: &Settings) -> String {
    let platforms = enumerate_platforms(settings);
    let mut out = String::new();
    let _ = writeln!(out, "Found {} platform(s):\n", platforms.len());
    for (platform_id, platform) in platforms.iter().enumerate() {
        let _ = writeln!(
            out,
            "Platform {}, {}, version: {}",
            platform_id, platform.name, platform.version
        );
        let _ = writeln!(out, "\tFound {} device(s):", platform.devices.len());
        for (device_id, device) in platform.devices.iter().enumerate() {
            let compute_units = device
                .compute_units
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let _ = writeln!(
                out,
                "\t\tDevice {}, {}, vendor: {}, backend: {}, type: {}, compute units: {}, max buffer size [B]: {}, timestamps: {}",
                device_id,
                device.name,
                device.vendor,
                device.backend,
                device.device_type,
                compute_units,
                device.max_buffer_size,
                device.supports_timestamps
            );
        }
        out.push('\n');
    }
    out
}

/// Resolves the configured selection into a ready device. Fails before any
/// stage runs when the selection is out of range.
pub fn select_device(settings: &Settings) -> Result<Box<dyn ComputeDevice>> {
    settings.validate()?;
    let kernels = settings
        .kernel_dir
        .as_ref()
        .map(KernelLibrary::from_dir)
        .unwrap_or_else(KernelLibrary::builtin);

    match settings.device {
        DeviceSelection::Host => Ok(Box::new(HostDevice::new(settings.host_threads)?)),
        DeviceSelection::Auto => {
            match pollster::block_on(GpuDevice::request(
                settings.power_preference,
                &kernels,
                settings.profiling,
            )) {
                Ok(device) => Ok(Box::new(device)),
                Err(EqualizeError::NoDevice { message }) => {
                    tracing::warn!("{}; using the host device", message);
                    Ok(Box::new(HostDevice::new(settings.host_threads)?))
                }
                Err(e) => Err(e),
            }
        }
        DeviceSelection::Indexed {
            platform_id,
            device_id,
        } => {
            let instance = gpu::create_instance();
            let mut platforms = gpu::adapters_by_backend(&instance);
            let platform_count = platforms.len() + 1;

            if platform_id == platforms.len() {
                if device_id != 0 {
                    return Err(invalid_device(platform_id, device_id, 1));
                }
                return Ok(Box::new(HostDevice::new(settings.host_threads)?));
            }
            if platform_id > platforms.len() {
                return Err(EqualizeError::InvalidConfiguration {
                    message: format!(
                        "Invalid platform ID {} ({} platform(s) available)",
                        platform_id, platform_count
                    ),
                });
            }

            let (_, adapters) = platforms.swap_remove(platform_id);
            let device_count = adapters.len();
            let adapter = adapters
                .into_iter()
                .nth(device_id)
                .ok_or_else(|| invalid_device(platform_id, device_id, device_count))?;
            let device = pollster::block_on(GpuDevice::from_adapter(
                adapter,
                &kernels,
                settings.profiling,
            ))?;
            Ok(Box::new(device))
        }
    }
}

fn invalid_device(platform_id: usize, device_id: usize, available: usize) -> EqualizeError {
    EqualizeError::InvalidConfiguration {
        message: format!(
            "Invalid device ID {} on platform {} ({} device(s) available)",
            device_id, platform_id, available
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_platform_is_always_listed_last() {
        let settings = Settings {
            host_threads: Some(3),
            ..Settings::default()
        };
        let platforms = enumerate_platforms(&settings);
        let host = platforms.last().unwrap();
        assert_eq!(host.name, "Host");
        assert_eq!(host.devices.len(), 1);
        assert_eq!(host.devices[0].compute_units, Some(3));

        let report = list_platforms_devices(&settings);
        assert!(report.contains(&format!("Found {} platform(s)", platforms.len())));
    }

    #[test]
    fn out_of_range_selection_fails_at_startup() {
        let settings = Settings::default();
        let host_platform = enumerate_platforms(&settings).len() - 1;

        let bad_platform = Settings {
            device: DeviceSelection::Indexed {
                platform_id: host_platform + 1,
                device_id: 0,
            },
            ..Settings::default()
        };
        let err = select_device(&bad_platform).err().unwrap();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
        assert!(err.is_startup_error());

        let bad_device = Settings {
            device: DeviceSelection::Indexed {
                platform_id: host_platform,
                device_id: 1,
            },
            ..Settings::default()
        };
        assert!(select_device(&bad_device).is_err());
    }

    #[test]
    fn indexed_host_selection() {
        let settings = Settings::default();
        let host_platform = enumerate_platforms(&settings).len() - 1;
        let settings = Settings {
            device: DeviceSelection::Indexed {
                platform_id: host_platform,
                device_id: 0,
            },
            host_threads: Some(2),
            ..Settings::default()
        };
        let device = select_device(&settings).unwrap();
        assert_eq!(device.info().backend, "rayon");
    }
}
