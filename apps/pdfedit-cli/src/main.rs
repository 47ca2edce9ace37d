//! pdfedit - command-line front end for the markup-overlay editor
//!
//! Every subcommand uploads its inputs into a working directory, runs one
//! workspace operation and prints the JSON status report on stdout. `--out`
//! copies the produced file out of the working directory.

use anyhow::{bail, Context, Result};
use base64::Engine;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pdfedit_core::overlay::{OverlayPayload, OverlaySpec};
use pdfedit_core::{
    CompressionLevel, DirStorage, EditorConfig, ExtractOptions, OperationReport, PageTarget, Rect,
    Storage, Workspace,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pdfedit")]
#[command(version, about = "Edit PDFs through positioned HTML markup")]
struct Cli {
    /// Directory holding uploaded and produced files
    #[arg(long, global = true, default_value = "pdfedit-work")]
    workdir: PathBuf,

    /// TOML editor configuration
    #[arg(long, global = true, env = "PDFEDIT_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Output {
    /// Copy the produced file here
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract pages as HTML markup
    Extract {
        input: PathBuf,
        /// Only this page (1-based)
        #[arg(long)]
        page: Option<u32>,
        /// Canvas width pages are fitted to
        #[arg(long)]
        canvas_width: Option<f64>,
        /// Write the combined markup here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Apply a JSON batch of text/image edit records
    Edit {
        input: PathBuf,
        edits: PathBuf,
        #[command(flatten)]
        output: Output,
    },
    /// Build a PDF from saved markup
    Rebuild {
        markup: PathBuf,
        #[command(flatten)]
        output: Output,
    },
    /// Stamp a signature image on one page
    Sign {
        input: PathBuf,
        image: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// x,y,width,height in points from the top-left corner
        #[arg(long, value_parser = parse_rect)]
        rect: Rect,
        #[command(flatten)]
        output: Output,
    },
    /// Overlay text or an image on one or all pages
    Watermark {
        input: PathBuf,
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        text: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
        /// Target page; every page when omitted
        #[arg(long)]
        page: Option<u32>,
        #[arg(long, value_parser = parse_rect)]
        rect: Rect,
        /// Degrees, counter-clockwise
        #[arg(long, default_value_t = 0.0)]
        rotation: f64,
        #[arg(long, default_value_t = 0.5)]
        opacity: f64,
        #[command(flatten)]
        output: Output,
    },
    /// Merge PDFs in the given order
    Merge {
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        #[command(flatten)]
        output: Output,
    },
    /// Write every page as its own PDF
    Split {
        input: PathBuf,
        /// Copy the pages into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Lossless size reduction
    Compress {
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = Level::Medium)]
        level: Level,
        #[command(flatten)]
        output: Output,
    },
    /// Plain text of every page
    Text { input: PathBuf },
    /// Images of every page as base64 PNG
    Images { input: PathBuf },
    /// Page count and page sizes
    Info { input: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Level {
    Low,
    Medium,
    High,
}

impl From<Level> for CompressionLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => CompressionLevel::Low,
            Level::Medium => CompressionLevel::Medium,
            Level::High => CompressionLevel::High,
        }
    }
}

fn parse_rect(s: &str) -> std::result::Result<Rect, String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("{}: {}", v.trim(), e)))
        .collect::<std::result::Result<_, _>>()?;
    match values[..] {
        [x, y, w, h] if w > 0.0 && h > 0.0 => Ok(Rect::from_xywh(x, y, w, h)),
        [_, _, _, _] => Err("width and height must be positive".to_string()),
        _ => Err("expected x,y,width,height".to_string()),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string())
}

fn upload<S: Storage>(ws: &Workspace<S>, path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let id = ws.upload(&file_name(path), &bytes)?;
    debug!(path = %path.display(), id = %id, "uploaded");
    Ok(id)
}

/// Print the report; on success copy `field` (a storage id) to `out`
fn finish<T: Serialize>(
    storage: &DirStorage,
    report: &OperationReport<T>,
    field: &str,
    out: Option<&Path>,
) -> Result<bool> {
    let value = serde_json::to_value(report)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    if !report.is_success() {
        return Ok(false);
    }
    if let (Some(out), Some(id)) = (out, value.get(field).and_then(|v| v.as_str())) {
        fs::copy(storage.path_of(id)?, out)
            .with_context(|| format!("Failed to write {}", out.display()))?;
        info!(path = %out.display(), "wrote output");
    }
    Ok(true)
}

fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => EditorConfig::from_file(path)?,
        None => EditorConfig::default(),
    };
    let storage = DirStorage::new(&cli.workdir)?;
    let ws = Workspace::new(storage.clone(), config);

    match cli.command {
        Command::Extract {
            input,
            page,
            canvas_width,
            out,
        } => {
            let id = upload(&ws, &input)?;
            let report = ws.extract(&id, page, &ExtractOptions { canvas_width });
            if let (Some(out), Some(details)) = (&out, &report.details) {
                fs::write(out, &details.html)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
            }
            finish(&storage, &report, "", None)
        }
        Command::Edit {
            input,
            edits,
            output,
        } => {
            let id = upload(&ws, &input)?;
            let json = fs::read_to_string(&edits)
                .with_context(|| format!("Failed to read {}", edits.display()))?;
            finish(&storage, &ws.apply_edits(&id, &json), "output_id", output.out.as_deref())
        }
        Command::Rebuild { markup, output } => {
            let html = fs::read_to_string(&markup)
                .with_context(|| format!("Failed to read {}", markup.display()))?;
            let saved = ws.save_markup(&html, &file_name(&markup));
            let markup_id = match &saved.details {
                Some(details) => details.markup_id.clone(),
                None => return finish(&storage, &saved, "", None),
            };
            let report = ws.rebuild_from_markup(&markup_id);
            finish(&storage, &report, "output_id", output.out.as_deref())
        }
        Command::Sign {
            input,
            image,
            page,
            rect,
            output,
        } => {
            let id = upload(&ws, &input)?;
            let bytes =
                fs::read(&image).with_context(|| format!("Failed to read {}", image.display()))?;
            let data = base64::engine::general_purpose::STANDARD.encode(bytes);
            let report = ws.add_signature(&id, page, rect, &data);
            finish(&storage, &report, "output_id", output.out.as_deref())
        }
        Command::Watermark {
            input,
            text,
            image,
            page,
            rect,
            rotation,
            opacity,
            output,
        } => {
            let id = upload(&ws, &input)?;
            let spec = match (text, image) {
                (Some(text), _) => OverlaySpec::text(rect, &text, rotation)?,
                (None, Some(path)) => OverlaySpec {
                    rect,
                    rotation,
                    opacity,
                    payload: OverlayPayload::Image(
                        fs::read(&path)
                            .with_context(|| format!("Failed to read {}", path.display()))?,
                    ),
                },
                (None, None) => bail!("either --text or --image is required"),
            };
            let target = page.map(PageTarget::Page).unwrap_or(PageTarget::All);
            finish(&storage, &ws.add_watermark(&id, target, &spec), "output_id", output.out.as_deref())
        }
        Command::Merge { inputs, output } => {
            let ids = inputs
                .iter()
                .map(|path| upload(&ws, path))
                .collect::<Result<Vec<_>>>()?;
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            finish(&storage, &ws.merge(&ids), "output_id", output.out.as_deref())
        }
        Command::Split { input, out_dir } => {
            let id = upload(&ws, &input)?;
            let report = ws.split(&id);
            if let (Some(dir), Some(details)) = (&out_dir, &report.details) {
                fs::create_dir_all(dir)?;
                for file in &details.split_files {
                    fs::copy(storage.path_of(&file.id)?, dir.join(&file.filename))?;
                }
                info!(dir = %dir.display(), files = details.split_files.len(), "wrote pages");
            }
            finish(&storage, &report, "", None)
        }
        Command::Compress {
            input,
            level,
            output,
        } => {
            let id = upload(&ws, &input)?;
            let report = ws.compress(&id, level.into());
            finish(&storage, &report, "output_id", output.out.as_deref())
        }
        Command::Text { input } => {
            let id = upload(&ws, &input)?;
            finish(&storage, &ws.extract_text(&id), "", None)
        }
        Command::Images { input } => {
            let id = upload(&ws, &input)?;
            finish(&storage, &ws.extract_images(&id), "", None)
        }
        Command::Info { input } => {
            let id = upload(&ws, &input)?;
            finish(&storage, &ws.page_count(&id), "", None)
        }
    }
}

fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "pdfedit=debug,pdfedit_core=debug"
    } else {
        "pdfedit=info,pdfedit_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_rect() {
        assert_eq!(
            parse_rect("10, 20, 100, 50").unwrap(),
            Rect::from_xywh(10.0, 20.0, 100.0, 50.0)
        );
        assert!(parse_rect("10,20,0,50").is_err());
        assert!(parse_rect("10,20,30").is_err());
        assert!(parse_rect("a,b,c,d").is_err());
    }

    #[test]
    fn test_cli_parses_watermark() {
        let cli = Cli::try_parse_from([
            "pdfedit",
            "watermark",
            "in.pdf",
            "--text",
            "DRAFT",
            "--rect",
            "50,50,200,40",
            "--rotation",
            "45",
        ])
        .unwrap();
        match cli.command {
            Command::Watermark {
                text, page, rotation, ..
            } => {
                assert_eq!(text.as_deref(), Some("DRAFT"));
                assert_eq!(page, None);
                assert_eq!(rotation, 45.0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_merge_needs_two_inputs() {
        assert!(Cli::try_parse_from(["pdfedit", "merge", "a.pdf"]).is_err());
    }
}
