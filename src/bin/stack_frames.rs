use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use drive_zoo::frames::FrameStacker;
use drive_zoo::telemetry;

/// Stack consecutive recorded frames into single images for encoder training.
#[derive(Parser)]
#[command(name = "stack_frames", about = "Stack recorded frames vertically")]
struct Cli {
    /// Directory of recorded frames
    #[arg(long)]
    from: PathBuf,

    /// Output directory for stacked images
    #[arg(long)]
    to: PathBuf,

    /// Number of frames per stacked image
    #[arg(long, default_value_t = 4)]
    n_stack: usize,

    /// Image file extension to read and write
    #[arg(long, default_value = "jpg")]
    extension: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init()?;

    let report = FrameStacker::new(cli.n_stack, cli.extension)
        .run(&cli.from, &cli.to)
        .with_context(|| {
            format!(
                "stacking frames from {} into {}",
                cli.from.display(),
                cli.to.display()
            )
        })?;

    println!(
        "{} frames read, {} stacked images written to {}",
        report.frames_read,
        report.windows_written,
        cli.to.display()
    );
    Ok(())
}
