use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::Parser;
use odata_writer::{Mode, WriterSettings};
use odata_writer_cli::{render, Document, Format};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the JSON description of the feed or entry to write
    #[arg(short, long)]
    input: PathBuf,

    /// Path to write the payload to; standard output when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Wire format of the payload
    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Write a request or a response payload
    #[arg(short, long)]
    mode: Option<Mode>,

    /// Maximum nesting depth of feeds, entries and values
    #[arg(long)]
    max_nesting_depth: Option<usize>,

    /// Base URI written as xml:base by the ATOM format
    #[arg(long)]
    base_uri: Option<String>,

    /// Path to a JSON file holding writer settings; flags take precedence
    #[arg(short, long)]
    settings: Option<PathBuf>,
}

fn load_settings(path: &Path) -> anyhow::Result<WriterSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid settings in {}", path.display()))
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut settings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => WriterSettings::default(),
    };
    if let Some(mode) = args.mode {
        settings.mode = mode;
    }
    if let Some(max_nesting_depth) = args.max_nesting_depth {
        settings.max_nesting_depth = max_nesting_depth;
    }
    if let Some(base_uri) = args.base_uri {
        settings.base_uri = Some(base_uri);
    }
    log::debug!("writing {:?} with {settings:?}", args.format);

    let input = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read input {}", args.input.display()))?;
    let document: Document = serde_json::from_str(&input)
        .with_context(|| format!("invalid input document {}", args.input.display()))?;
    let payload = render(&document, args.format, settings).context("failed to write payload")?;

    match &args.output {
        Some(path) => fs::write(path, payload)
            .with_context(|| format!("failed to write output {}", path.display()))?,
        None => io::stdout().write_all(&payload)?,
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if let Err(err) = run(args) {
        eprintln!("Error: {err:?}");
        process::exit(1);
    }
    Ok(())
}
