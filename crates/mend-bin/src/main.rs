//! mend entrypoint: replay a replacement scenario against an in-memory host.
use anyhow::{Context, Result};
use clap::Parser;
use core_config::{Config, load_from};
use core_events::SessionEvent;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

mod runner;
mod scenario;

const LOG_FILE: &str = "mend.log";

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "mend", version, about = "Replay suggestion replacements against a scripted host")]
struct Args {
    /// Scenario file (TOML): text, annotations, accepted suggestions, host faults.
    #[arg(long = "scenario")]
    pub scenario: PathBuf,
    /// Optional configuration file path (overrides discovery of `mend.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Also print every session notification.
    #[arg(long = "events")]
    pub events: bool,
}

struct AppStartup {
    log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn new() -> Self {
        Self { log_guard: None }
    }

    fn run(&mut self, args: &Args) -> Result<Config> {
        self.configure_logging()?;
        Self::install_panic_hook();

        info!(target: "runtime", "startup");
        let config = load_from(args.config.clone())?;
        info!(
            target: "runtime.startup",
            config_override = args.config.is_some(),
            config_path = ?config.path,
            "bootstrap_complete"
        );
        Ok(config)
    }

    fn configure_logging(&mut self) -> Result<()> {
        let log_dir = Path::new(".");
        let log_path = log_dir.join(LOG_FILE);
        if log_path.exists() {
            let _ = std::fs::remove_file(&log_path);
        }

        let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        if tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(nb_writer)
            .try_init()
            .is_ok()
        {
            self.log_guard = Some(guard);
        }
        // Otherwise a subscriber is already installed and the guard drops here.
        Ok(())
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }
}

fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::AnnotationsChanged { annotations, .. } => {
            format!("annotations changed ({})", annotations.len())
        }
        SessionEvent::ReplacementApplied {
            annotation,
            applied_text,
            ..
        } => format!("applied {annotation}: {applied_text:?}"),
        SessionEvent::ReplacementSettled(s) => format!("settled {}: {}", s.annotation, s.status),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut startup = AppStartup::new();
    let config = startup.run(&args)?;

    let scenario = scenario::load(&args.scenario)?;
    let report = runner::run(&scenario, &config)
        .await
        .with_context(|| format!("scenario {}", args.scenario.display()))?;

    if args.events {
        for event in &report.events {
            println!("event: {}", describe(event));
        }
    }
    println!("{report}");
    info!(target: "runtime", "shutdown");
    Ok(())
}
