use shakeout_core::config::ShakeoutConfig;
use shakeout_core::process::SystemRunner;
use shakeout_core::session::{FAILURE_EXIT_CODE, Session, SessionOutcome};

use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Corpus directory to triage.
    corpus: PathBuf,
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Subject command override (whitespace-split argv).
    #[clap(long)]
    subject_command: Option<String>,
    /// Stop at the first failing entry instead of sweeping the whole corpus.
    #[clap(long)]
    fast: bool,
    /// Fuzz the corpus for this many seconds before classifying.
    #[clap(long)]
    refresh_secs: Option<u64>,
    /// Run the legacy fuzzer smoke check instead of triage.
    #[clap(long)]
    smoke: bool,
}

fn main() {
    env_logger::init();
    let code = match run() {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("shakeout: {e:#}");
            FAILURE_EXIT_CODE
        }
    };
    std::process::exit(code);
}

fn run() -> Result<SessionOutcome, anyhow::Error> {
    let cli = Cli::parse();

    let mut config = match &cli.config_file {
        Some(config_path) => {
            println!("Loading configuration from specified path: {config_path:?}");
            ShakeoutConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("shakeout.toml");
            if default_config_path.exists() {
                println!(
                    "No config file specified via CLI, loading default: {default_config_path:?}",
                );
                ShakeoutConfig::load_from_file(&default_config_path)?
            } else {
                let command = cli.subject_command.clone().ok_or_else(|| {
                    anyhow::anyhow!(
                        "No config file specified, no 'shakeout.toml' found, and no --subject-command given"
                    )
                })?;
                ShakeoutConfig::for_subject(split_command(&command))
            }
        }
    };

    if let Some(subject_cmd) = &cli.subject_command {
        config.subject.command = split_command(subject_cmd);
    }
    if config.subject.command.is_empty() {
        anyhow::bail!("Subject command is empty");
    }
    log::debug!("effective configuration: {config:#?}");

    let refresh_budget = cli.refresh_secs.map(Duration::from_secs);
    let session = Session::new(config, cli.corpus.clone(), cli.fast, refresh_budget);
    let mut runner = SystemRunner::new();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let result = if cli.smoke {
        session.run_smoke(&mut runner, &mut out)
    } else {
        session.run(&mut runner, &mut out)
    };
    let _ = out.flush();
    Ok(result?)
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}
