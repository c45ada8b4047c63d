use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;

use histeq::cli::{Cli, Commands, EqualizeArgs};
use histeq::device::list_platforms_devices;
use histeq::logging::init_tracing;
use histeq::{select_device, EqualizationPipeline, EqualizeError, PixelBuffer, Settings};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            match error.downcast_ref::<EqualizeError>() {
                Some(e) => {
                    e.log_and_report();
                    eprintln!("{}", e.user_message());
                }
                None => eprintln!("Error: {:#}", error),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    match cli.command {
        Commands::Devices => {
            print!("{}", list_platforms_devices(&settings));
            Ok(())
        }
        Commands::Equalize(args) => equalize(args, settings),
    }
}

fn equalize(args: EqualizeArgs, mut settings: Settings) -> anyhow::Result<()> {
    args.apply_to(&mut settings)?;

    let image = image::open(&args.input)
        .with_context(|| format!("Failed to open '{}'", args.input.display()))?
        .into_luma8();
    let input = PixelBuffer::from(image);
    log::info!(
        "Loaded {} ({}x{})",
        args.input.display(),
        input.width(),
        input.height()
    );

    let device = select_device(&settings)?;
    println!("Running on: {}", device.info().name);

    let pipeline = EqualizationPipeline::new(device.as_ref());
    let result = pipeline.run(&input)?;

    if args.print_bins {
        print_bins("Histogram", &result.histogram);
        print_bins("Cumulative histogram", &result.cumulative_histogram);
        print_bins("LUT", &result.lut);
    }
    if settings.profiling {
        print!("{}", result.profile.report(settings.resolution));
    }

    let output_path = args.output_path();
    result
        .output
        .into_gray_image()?
        .save(&output_path)
        .map_err(EqualizeError::from)
        .with_context(|| format!("Failed to write '{}'", output_path.display()))?;
    println!("Saved {}", output_path.display());
    Ok(())
}

fn print_bins(label: &str, bins: &histeq::Bins) {
    let values: Vec<String> = bins.iter().map(u32::to_string).collect();
    println!("{}: {}", label, values.join(" "));
}
