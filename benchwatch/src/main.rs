//! Entry point for the benchwatch TUI. Parses args and runs the App.

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use benchwatch::app::App;
use benchwatch::metric::Metric;
use benchwatch::sources::{self, load_sources, save_sources, SourcesFile};
use benchwatch::stream::stream_url;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct ParsedArgs {
    sources: Option<PathBuf>,
    metric: Metric,
    paused: bool,
    init_sources: bool,
    dry_run: bool,
}

fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--sources PATH|-s PATH] [--metric NAME|-m NAME] [--paused] [--init-sources] [--dry-run]\n\
         \n\
         Metrics: latency, memory, throughput, cpu\n\
         Keys: s start/stop, ←/→ metric, 1-9 toggle source, r reset, q quit"
    )
}

enum Parse {
    Run(ParsedArgs),
    Help(String),
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Parse, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "benchwatch".into());
    let mut out = ParsedArgs::default();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Parse::Help(usage(&prog))),
            "--sources" | "-s" => {
                let v = it.next().ok_or_else(|| format!("{arg} needs a path\n{}", usage(&prog)))?;
                out.sources = Some(PathBuf::from(v));
            }
            "--metric" | "-m" => {
                let v = it.next().ok_or_else(|| format!("{arg} needs a name\n{}", usage(&prog)))?;
                out.metric = v.parse()?;
            }
            "--paused" => out.paused = true,
            "--init-sources" => out.init_sources = true,
            "--dry-run" => out.dry_run = true,
            _ if arg.starts_with("--sources=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    out.sources = Some(PathBuf::from(v));
                }
            }
            _ if arg.starts_with("--metric=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    out.metric = v.parse()?;
                }
            }
            _ => return Err(format!("Unexpected argument '{arg}'\n{}", usage(&prog))),
        }
    }
    Ok(Parse::Run(out))
}

/// The TUI owns the terminal, so logs only go to a file and only when asked for.
fn init_logging() -> anyhow::Result<()> {
    let Ok(filter) = EnvFilter::try_from_default_env() else {
        return Ok(());
    };
    let dir = sources::config_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join("benchwatch.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(Parse::Run(p)) => p,
        Ok(Parse::Help(text)) => {
            println!("{text}");
            return Ok(());
        }
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    if parsed.init_sources {
        let path = save_sources(parsed.sources.as_deref(), &SourcesFile::defaults())?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let file = load_sources(parsed.sources.as_deref())?;
    let configs = file.to_configs();

    if parsed.dry_run {
        for s in &configs {
            let url = stream_url(&s.endpoint_url)?;
            let state = if s.enabled { "on" } else { "off" };
            println!("{}\t{}\t{}\t{url}", s.id, s.display_name, state);
        }
        return Ok(());
    }

    init_logging()?;
    tracing::info!(sources = configs.len(), metric = %parsed.metric, "starting");

    let mut app = App::new(configs, parsed.metric);
    if !parsed.paused {
        app.start_streaming();
    }
    app.run().await
}
