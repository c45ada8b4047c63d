use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::errors::{EqualizeError, Result};
use crate::profiler::ProfilingResolution;
use crate::settings::{DeviceSelection, Settings};

#[derive(Parser, Debug)]
#[command(name = "histeq")]
#[command(version, about = "Histogram equalization of grayscale images on a compute device", long_about = None)]
pub struct Cli {
    /// Settings file to use instead of the per-user one
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Equalize an image and write the result as PNG
    Equalize(EqualizeArgs),

    /// List compute platforms and their devices
    Devices,
}

#[derive(clap::Args, Debug, Default)]
pub struct EqualizeArgs {
    /// Input image, converted to 8-bit grayscale on load
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file (default: <INPUT stem>_equalized.png next to the input)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Platform index as listed by `histeq devices`
    #[arg(long, value_name = "N", requires = "device", conflicts_with = "host")]
    pub platform: Option<usize>,

    /// Device index within the platform
    #[arg(long, value_name = "N", requires = "platform", conflicts_with = "host")]
    pub device: Option<usize>,

    /// Run on the host CPU device
    #[arg(long)]
    pub host: bool,

    /// Print per-stage execution times (overrides a settings file that disables them)
    #[arg(long)]
    pub profile: bool,

    /// Skip timestamp queries and the timing report
    #[arg(long, conflicts_with = "profile")]
    pub no_profile: bool,

    /// Unit of the printed times
    #[arg(long, value_enum, value_name = "UNIT")]
    pub resolution: Option<ProfilingResolution>,

    /// Print the histogram, cumulative histogram and LUT
    #[arg(long)]
    pub print_bins: bool,

    /// Directory with histogram.wgsl, cum_hist.wgsl, LUT.wgsl and re_project.wgsl
    #[arg(long, value_name = "DIR")]
    pub kernel_dir: Option<PathBuf>,

    /// Worker threads of the host device
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,
}

impl EqualizeArgs {
    /// Layers command-line flags over the loaded settings.
    pub fn apply_to(&self, settings: &mut Settings) -> Result<()> {
        match (self.platform, self.device) {
            (Some(platform_id), Some(device_id)) => {
                settings.device = DeviceSelection::Indexed {
                    platform_id,
                    device_id,
                };
            }
            (None, None) => {}
            _ => {
                return Err(EqualizeError::InvalidConfiguration {
                    message: "--platform and --device must be given together".to_string(),
                })
            }
        }
        if self.host {
            settings.device = DeviceSelection::Host;
        }
        if self.profile {
            settings.profiling = true;
        }
        if self.no_profile {
            settings.profiling = false;
        }
        if let Some(resolution) = self.resolution {
            settings.resolution = resolution;
        }
        if let Some(dir) = &self.kernel_dir {
            settings.kernel_dir = Some(dir.clone());
        }
        if let Some(threads) = self.threads {
            settings.host_threads = Some(threads);
        }
        settings.validate()
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.input))
    }
}

pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{}_equalized.png", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("/data/scan.tif")),
            PathBuf::from("/data/scan_equalized.png")
        );
    }

    #[test]
    fn parses_indexed_device() {
        let cli = Cli::parse_from([
            "histeq", "equalize", "in.png", "--platform", "1", "--device", "0", "--resolution", "ms",
        ]);
        let Commands::Equalize(args) = cli.command else {
            panic!("expected equalize");
        };
        let mut settings = Settings::default();
        args.apply_to(&mut settings).unwrap();
        assert_eq!(
            settings.device,
            DeviceSelection::Indexed {
                platform_id: 1,
                device_id: 0
            }
        );
        assert_eq!(settings.resolution, ProfilingResolution::Ms);
    }

    #[test]
    fn platform_without_device_is_rejected() {
        assert!(Cli::try_parse_from(["histeq", "equalize", "in.png", "--platform", "1"]).is_err());

        let args = EqualizeArgs {
            input: PathBuf::from("in.png"),
            platform: Some(0),
            ..Default::default()
        };
        let err = args.apply_to(&mut Settings::default()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
    }

    #[test]
    fn profiling_can_be_switched_either_way() {
        let cli = Cli::parse_from(["histeq", "equalize", "in.png", "--no-profile"]);
        let Commands::Equalize(args) = cli.command else {
            panic!("expected equalize");
        };
        let mut settings = Settings::default();
        assert!(settings.profiling);
        args.apply_to(&mut settings).unwrap();
        assert!(!settings.profiling);

        let cli = Cli::parse_from(["histeq", "equalize", "in.png", "--profile"]);
        let Commands::Equalize(args) = cli.command else {
            panic!("expected equalize");
        };
        let mut settings = Settings {
            profiling: false,
            ..Settings::default()
        };
        args.apply_to(&mut settings).unwrap();
        assert!(settings.profiling);

        assert!(Cli::try_parse_from(["histeq", "equalize", "in.png", "--profile", "--no-profile"]).is_err());
    }

    #[test]
    fn host_flag_and_threads() {
        let cli = Cli::parse_from(["histeq", "--debug", "equalize", "in.png", "--host", "-j", "3"]);
        assert!(cli.debug);
        let Commands::Equalize(args) = cli.command else {
            panic!("expected equalize");
        };
        let mut settings = Settings::default();
        args.apply_to(&mut settings).unwrap();
        assert_eq!(settings.device, DeviceSelection::Host);
        assert_eq!(settings.host_threads, Some(3));
    }
}
