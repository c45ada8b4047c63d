pub mod cli;
pub mod device;
pub mod errors;
pub mod gpu;
pub mod host;
pub mod kernels;
pub mod logging;
pub mod pipeline;
pub mod profiler;
pub mod scan;
pub mod settings;
pub mod stage;
pub mod types;

pub use device::{select_device, ComputeDevice, DeviceInfo, DeviceRun};
pub use errors::{EqualizeError, Result};
pub use pipeline::EqualizationPipeline;
pub use settings::{DeviceSelection, Settings};
pub use stage::Stage;
pub use types::{Bins, Equalization, PixelBuffer};
