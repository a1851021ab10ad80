use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::io::Write;
use std::path::Path;

use protoview::cli::Args;
use protoview::config::{self, PathConfig, Settings};
use protoview::{ImageViewer, Tensor, encode};

fn main() -> Result<()> {
    // Parse command-line arguments first (needed for log setup)
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    init_logging(&args, &path_config)?;

    info!("protoview {} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let settings_path = config::config_file(config::SETTINGS_FILE, &path_config);
    info!("Config path: {}", settings_path.display());
    let settings = Settings::load(&settings_path)?;
    let options = args.encode_options(&settings.encode);
    debug!("Encode options: {:?}", options);

    let image = load_tensor(&args.file_path)?;
    let reference = args.reference.as_deref().map(load_tensor).transpose()?;

    let output = if args.state {
        let mut viewer = ImageViewer::with_options(options);
        match &reference {
            Some(r) => viewer.set_image_with_reference(&image, r),
            None => viewer.set_image(&image),
        }
        .with_context(|| format!("Failed to encode {}", args.file_path.display()))?;
        serde_json::to_string_pretty(&viewer.state())?
    } else {
        encode(&image, reference.as_ref(), &options)
            .with_context(|| format!("Failed to encode {}", args.file_path.display()))?
            .as_str()
            .to_string()
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} bytes to {}", output.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", output)?;
        }
    }
    Ok(())
}

/// Initialize env_logger from `-v` count and `--log`.
fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        if log_path_opt.is_none() {
            config::ensure_dirs(path_config)?;
        }
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn load_tensor(path: &Path) -> Result<Tensor> {
    let img = image::open(path).with_context(|| format!("Failed to open image: {}", path.display()))?;
    debug!("Loaded {} ({}x{}, {:?})", path.display(), img.width(), img.height(), img.color());
    Ok(Tensor::from_dynamic_image(&img))
}
