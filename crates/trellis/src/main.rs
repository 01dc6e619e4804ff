//! `trellis` command line: render and inspect templates.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use trellis::{RenderOutcome, RenderPipeline, RenderRequest, RequestSignals, Settings};

#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(about = "Render templates the way a trellis site does", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Paths {
    /// Template search directory (repeatable, earlier wins)
    #[arg(short, long = "path", value_name = "DIR", default_value = ".")]
    paths: Vec<PathBuf>,

    /// Settings file (YAML)
    #[arg(short, long, value_name = "FILE")]
    settings: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a template to stdout
    Render {
        /// Template identifier
        template: String,

        /// JSON file with the data tree
        #[arg(short, long, value_name = "FILE")]
        data: Option<PathBuf>,

        /// Output format (html, json, yaml)
        #[arg(short, long)]
        format: Option<String>,

        #[command(flatten)]
        paths: Paths,
    },
    /// List the helpers a template uses, through its includes
    Scan {
        /// Template identifier
        template: String,

        #[command(flatten)]
        paths: Paths,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing();

    match cli.command {
        Command::Render {
            template,
            data,
            format,
            paths,
        } => render(&template, data, format, &paths),
        Command::Scan { template, paths } => {
            let pipeline = pipeline(&paths)?;
            let mut stdout = std::io::stdout().lock();
            for helper in pipeline.scanner().scan(&template) {
                writeln!(stdout, "{}", helper)?;
            }
            Ok(())
        }
    }
}

fn render(template: &str, data: Option<PathBuf>, format: Option<String>, paths: &Paths) -> Result<()> {
    let pipeline = pipeline(paths)?;

    let data: Value = match data {
        Some(file) => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading data file {}", file.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing data file {}", file.display()))?
        }
        None => Value::Object(Default::default()),
    };

    let mut request = RenderRequest::builder().template(template).data(data);
    if let Some(format) = format {
        request = request.format(format);
    }
    let request = request.build()?;

    let mut stdout = std::io::stdout().lock();
    let outcome = pipeline.render(&request, || Value::Null, &RequestSignals::default(), &mut stdout)?;
    if outcome == (RenderOutcome::Written { ok: false }) {
        anyhow::bail!("template '{}' rendered no output", template);
    }
    writeln!(stdout)?;
    Ok(())
}

fn pipeline(paths: &Paths) -> Result<RenderPipeline> {
    let settings = match &paths.settings {
        Some(file) => Settings::from_file(file)
            .with_context(|| format!("loading settings from {}", file.display()))?,
        None => Settings::default(),
    };

    Ok(RenderPipeline::builder()
        .template_paths(paths.paths.iter().cloned())
        .settings(Arc::new(settings))
        .build())
}

fn setup_tracing() {
    let filter = EnvFilter::try_from_env("TRELLIS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
