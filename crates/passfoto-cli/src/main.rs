use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use passfoto_core::{is_image_filename, ModelBundle, Thresholds, ValidationReport};

#[derive(Parser)]
#[command(name = "passfoto", about = "Passport-style portrait validation CLI")]
struct Cli {
    /// Directory containing the ONNX model files.
    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a single image and print the verdict
    Check {
        /// Image file to validate
        image: PathBuf,
        /// Print the full JSON report instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Validate every image in a directory and copy each into valid/ or invalid/
    Sort {
        /// Directory of images to sort
        dir: PathBuf,
        /// Output directory receiving valid/ and invalid/
        #[arg(long, default_value = "sorted")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let thresholds = Thresholds::default();
    let mut models = ModelBundle::load_from_dir(&cli.model_dir)
        .with_context(|| format!("loading models from {}", cli.model_dir.display()))?;

    match cli.command {
        Commands::Check { image, json } => {
            let report = validate_file(&mut models, &thresholds, &image)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&image, &report);
            }
        }
        Commands::Sort { dir, out } => {
            let (valid, invalid) = sort_directory(&mut models, &thresholds, &dir, &out)?;
            println!(
                "sorted {} images into {}: {valid} valid, {invalid} invalid",
                valid + invalid,
                out.display()
            );
        }
    }

    Ok(())
}

fn validate_file(
    models: &mut ModelBundle,
    thresholds: &Thresholds,
    path: &Path,
) -> Result<ValidationReport> {
    let image = image::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .to_rgb8();
    let report = passfoto_core::validate(models, &image, thresholds)?;
    Ok(report)
}

fn print_summary(path: &Path, report: &ValidationReport) {
    let verdict = if report.is_valid { "VALID" } else { "INVALID" };
    println!("{}: {verdict}", path.display());
    println!("  face:       {}", report.face_status);
    println!("  head:       {}", report.head_validation);
    println!("  margin:     {}", report.head_margin);
    println!("  background: {}", report.is_background_accepted);
    println!("  blur:       {}", report.blur_status);
    println!("  contrast:   {}", report.contrast_status);
    println!("  shadows:    {}", report.shadow_status);
    println!("  coverage:   {:.1}%", report.mask_coverage * 100.0);
}

/// Run every image in `dir` through the pipeline and copy it into
/// `out/valid` or `out/invalid`. Returns (valid, invalid) counts.
fn sort_directory(
    models: &mut ModelBundle,
    thresholds: &Thresholds,
    dir: &Path,
    out: &Path,
) -> Result<(usize, usize)> {
    let mut valid = 0usize;
    let mut invalid = 0usize;

    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if !path.is_file() || !is_image_filename(&name) {
            continue;
        }

        // A file that cannot be decoded or validated sorts as invalid rather
        // than aborting the run.
        let is_valid = match validate_file(models, thresholds, &path) {
            Ok(report) => report.is_valid,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "validation failed");
                false
            }
        };

        let bucket = out.join(if is_valid { "valid" } else { "invalid" });
        std::fs::create_dir_all(&bucket)?;
        std::fs::copy(&path, bucket.join(&name))?;

        if is_valid {
            valid += 1;
        } else {
            invalid += 1;
        }
    }

    Ok((valid, invalid))
}
