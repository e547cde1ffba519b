//! pill-imprint-ocr - read imprint text from pill photos

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pill_imprint_ocr::config::{self, AppConfig};
use pill_imprint_ocr::storage;
use pill_imprint_ocr::vision::ModelManager;
use pill_imprint_ocr::{ImprintReader, OcrEngine};

/// Read imprint text from pill photos
#[derive(Parser, Debug)]
#[command(name = "pill-imprint-ocr")]
#[command(about = "Extract imprint text from pill images, one line per image permutation")]
struct Args {
    /// Images to read
    #[arg(required_unless_present = "list_models")]
    images: Vec<PathBuf>,

    /// Write the report to this file (overwritten)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also read the image rotated by 90, 180 and 270 degrees
    #[arg(short, long)]
    rotate: bool,

    /// Separator between texts read from one permutation
    #[arg(short, long)]
    delimiter: Option<String>,

    /// Directory holding the OCR models
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Run inference on the GPU
    #[arg(long)]
    gpu: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show model availability and exit
    #[arg(long)]
    list_models: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout only carries the report
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = apply_overrides(load_or_default_config(args.config.as_deref())?, &args);

    if args.list_models {
        return list_models(&config);
    }

    let mut reader = ImprintReader::<OcrEngine>::from_config(&config)?;
    let batch = args.images.len() > 1;
    let mut stdout = std::io::stdout().lock();

    for (index, image) in args.images.iter().enumerate() {
        let output_file = args
            .output
            .as_deref()
            .map(|out| output_path_for(out, image, batch.then_some(index)));

        if batch {
            writeln!(stdout, "# {}", image.display())?;
        }
        reader.predict_to(image, output_file, &mut stdout)?;
    }

    Ok(())
}

/// Load the configuration file, falling back to defaults when the
/// default location has none. An explicitly named file must exist.
fn load_or_default_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return config::load_config(path)
            .with_context(|| format!("Failed to load configuration {:?}", path));
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            let config = config::load_config(&config_path)?;
            info!("Loaded configuration from {:?}", config_path);
            return Ok(config);
        }
    }

    Ok(AppConfig::default())
}

fn apply_overrides(mut config: AppConfig, args: &Args) -> AppConfig {
    if let Some(dir) = &args.model_dir {
        config.ocr.model_dir = Some(dir.clone());
    }
    if let Some(delimiter) = &args.delimiter {
        config.prediction.delimiter = delimiter.clone();
    }
    config.ocr.use_gpu |= args.gpu;
    config.prediction.rotate |= args.rotate;
    config
}

/// With several images each report gets its own file next to `output`,
/// keyed by batch position: `out.txt` + image 2 `pill.jpg` -> `out.2.pill.txt`
fn output_path_for(output: &Path, image: &Path, batch_index: Option<usize>) -> PathBuf {
    let Some(index) = batch_index else {
        return output.to_path_buf();
    };

    let out_stem = output.file_stem().unwrap_or_default().to_string_lossy();
    let image_stem = image.file_stem().unwrap_or_default().to_string_lossy();
    let extension = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "txt".to_string());

    output.with_file_name(format!("{out_stem}.{index}.{image_stem}.{extension}"))
}

fn list_models(config: &AppConfig) -> Result<()> {
    let dir = storage::resolve_model_dir(config.ocr.model_dir.as_deref())?;
    let manager = ModelManager::with_dir(dir)?;

    println!("Models in {}:", manager.models_dir().display());
    for status in manager.get_model_status() {
        println!(
            "  {:<22} {:<10} {}",
            status.model_type.display_name(),
            if status.available { "ready" } else { "missing" },
            status
                .size_bytes
                .map(|b| format!("{b} bytes"))
                .unwrap_or_default()
        );
    }

    Ok(())
}
