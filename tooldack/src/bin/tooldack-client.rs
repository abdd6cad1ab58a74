//! Command-line client for a running tooldack server.
//!
//!   tooldack-client compress photo.jpg --quality 60 -o small.jpg
//!   tooldack-client image-to-pdf page1.png page2.jpg -o pages.pdf
//!   tooldack-client upload photo.png
//!   tooldack-client merge-background cutout.png --color '#ffffff' -o merged.png
//!
//! Binary results are written to `--output` (or a generated name); JSON results are printed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use tooldack::{
    client::{ClientError, ClientFile, ToolClient, ToolResponse},
    imaging::{
        DEFAULT_QUALITY, DEFAULT_WATERMARK_OPACITY, DEFAULT_WATERMARK_TEXT, TargetFormat,
        compose::{Background, merge_background},
    },
    tools::ToolRequest,
};
use url::Url;

#[derive(Parser)]
#[command(name = "tooldack-client")]
#[command(about = "Command-line client for the tooldack image tools", long_about = None)]
struct Cli {
    /// Server base URL
    #[arg(short, long, env = "TOOLDACK_SERVER", default_value = "http://127.0.0.1:3000")]
    server: Url,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an image and print its public link
    Upload { input: PathBuf },

    /// Combine images into a PDF, one page per image
    ImageToPdf {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove the background through the server's removal API
    RemoveBg {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-encode at a lower quality
    Compress {
        input: PathBuf,
        /// 1-100
        #[arg(short, long, default_value_t = DEFAULT_QUALITY)]
        quality: u8,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert to PNG or JPEG
    Convert {
        input: PathBuf,
        /// `png` or `jpeg`
        #[arg(short, long, default_value = "png")]
        format: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert to WebP
    Webp {
        input: PathBuf,
        #[arg(short, long, default_value_t = DEFAULT_QUALITY)]
        quality: u8,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Shrink to fit inside a box, keeping the aspect ratio
    Resize {
        input: PathBuf,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Stamp centred text over the image
    Watermark {
        input: PathBuf,
        #[arg(short, long, default_value = DEFAULT_WATERMARK_TEXT)]
        text: String,
        #[arg(long, default_value_t = DEFAULT_WATERMARK_OPACITY)]
        opacity: f32,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rotate clockwise and optionally mirror
    Rotate {
        input: PathBuf,
        #[arg(short, long, default_value_t = 90, allow_hyphen_values = true)]
        angle: i32,
        /// Mirror vertically
        #[arg(long)]
        flip: bool,
        /// Mirror horizontally
        #[arg(long)]
        flop: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Put a colour or image behind a cut-out, locally
    MergeBackground {
        input: PathBuf,
        /// `#rrggbb`
        #[arg(long, conflicts_with = "background")]
        color: Option<String>,
        /// Image scaled to cover the canvas
        #[arg(long)]
        background: Option<PathBuf>,
        #[arg(long, default_value_t = 1.0)]
        opacity: f32,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that the server is up
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = ToolClient::new(cli.server.clone())?;

    let (request, inputs, output) = match cli.command {
        Commands::Health => {
            let health = client.health().await.map_err(|e| explain(&client, e))?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            return Ok(());
        }
        Commands::MergeBackground {
            input,
            color,
            background,
            opacity,
            output,
        } => return merge_locally(&input, color, background, opacity, output).await,
        Commands::Upload { input } => (ToolRequest::Upload, vec![input], None),
        Commands::ImageToPdf { inputs, output } => (ToolRequest::ImageToPdf, inputs, output),
        Commands::RemoveBg { input, output } => (ToolRequest::RemoveBackground, vec![input], output),
        Commands::Compress { input, quality, output } => (ToolRequest::Compress { quality }, vec![input], output),
        Commands::Convert { input, format, output } => (
            ToolRequest::ConvertFormat {
                format: TargetFormat::parse_lenient(&format),
            },
            vec![input],
            output,
        ),
        Commands::Webp { input, quality, output } => (ToolRequest::WebpConvert { quality }, vec![input], output),
        Commands::Resize {
            input,
            width,
            height,
            output,
        } => (ToolRequest::Resize { width, height }, vec![input], output),
        Commands::Watermark {
            input,
            text,
            opacity,
            output,
        } => (ToolRequest::Watermark { text, opacity }, vec![input], output),
        Commands::Rotate {
            input,
            angle,
            flip,
            flop,
            output,
        } => (ToolRequest::Rotate { angle, flip, flop }, vec![input], output),
    };

    let mut files = Vec::with_capacity(inputs.len());
    for path in &inputs {
        files.push(
            ClientFile::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }

    match client.invoke(&request, files).await.map_err(|e| explain(&client, e))? {
        ToolResponse::Stored(stored) => {
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }
        ToolResponse::Binary { content_type, bytes } => {
            let path = output.unwrap_or_else(|| default_output(&content_type));
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_written(&path, &content_type, bytes.len())?;
        }
    }

    Ok(())
}

async fn merge_locally(
    input: &Path,
    color: Option<String>,
    background: Option<PathBuf>,
    opacity: f32,
    output: Option<PathBuf>,
) -> Result<()> {
    let foreground = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let background = match (color, background) {
        (Some(color), _) => Background::parse_color(&color)?,
        (None, Some(path)) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Background::from_image_bytes(&bytes)?
        }
        (None, None) => bail!("Pass --color or --background"),
    };

    let merged = tokio::task::spawn_blocking(move || merge_background(&foreground, &background, opacity)).await??;

    let path = output.unwrap_or_else(|| default_output("image/png"));
    tokio::fs::write(&path, &merged)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    print_written(&path, "image/png", merged.len())
}

/// `converted.pdf` for PDFs, `processed-{millis}.{ext}` for everything else.
fn default_output(content_type: &str) -> PathBuf {
    let essence = content_type.split(';').next().unwrap_or(content_type).trim();
    if essence == "application/pdf" {
        return PathBuf::from("converted.pdf");
    }
    let extension = match essence {
        "image/jpeg" => "jpg",
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|extensions| extensions.first().copied())
            .unwrap_or("bin"),
    };
    PathBuf::from(format!("processed-{}.{}", chrono::Utc::now().timestamp_millis(), extension))
}

fn print_written(path: &Path, content_type: &str, size: usize) -> Result<()> {
    let summary = json!({
        "output": path.display().to_string(),
        "content_type": content_type,
        "size": size,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn explain(client: &ToolClient, err: ClientError) -> anyhow::Error {
    match (&err, client.auth_check_url()) {
        (ClientError::VerificationRequired, Ok(url)) => {
            anyhow::anyhow!("Connection verification required. Open {url} in a browser, then retry.")
        }
        _ => err.into(),
    }
}
