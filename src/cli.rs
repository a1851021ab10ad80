use clap::Parser;
use std::path::PathBuf;

use crate::encode::EncodeOptions;

/// Encode an image file as a viewer payload (data URL)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Image file to encode (PNG, JPEG, TIFF, TGA, BMP)
    #[arg(value_name = "FILE")]
    pub file_path: PathBuf,

    /// Write the result to a file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Stretch values to the full 0..255 range using the reference min/max
    #[arg(short = 'n', long = "normalize")]
    pub normalize: bool,

    /// Image whose value range drives the conversion (default: FILE itself)
    #[arg(short = 'r', long = "reference", value_name = "FILE")]
    pub reference: Option<PathBuf>,

    /// Downscale into a WIDTH x HEIGHT box
    #[arg(short = 't', long = "thumbnail", value_names = ["WIDTH", "HEIGHT"], num_args = 2)]
    pub thumbnail: Option<Vec<u32>>,

    /// Resize to exactly the thumbnail box instead of keeping the aspect ratio
    #[arg(long = "stretch")]
    pub stretch: bool,

    /// Output codec (png, jpeg, tiff, tga, bmp)
    #[arg(long = "format", value_name = "FMT")]
    pub format: Option<String>,

    /// Print the full viewer state as JSON instead of the bare data URL
    #[arg(short = 's', long = "state")]
    pub state: bool,

    /// Enable debug logging to file (default: protoview.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl Args {
    /// Apply command-line overrides on top of the persisted defaults.
    pub fn encode_options(&self, defaults: &EncodeOptions) -> EncodeOptions {
        let mut options = defaults.clone();
        if self.normalize {
            options.normalize = true;
        }
        if let Some([w, h]) = self.thumbnail.as_deref() {
            options.thumbnail = Some((*w, *h));
        }
        if self.stretch {
            options.keep_aspect_ratio = false;
        }
        if let Some(format) = &self.format {
            options.format = format.to_lowercase();
        }
        options
    }
}
