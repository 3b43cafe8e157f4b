pub mod cli;
pub mod config;
pub mod config_store;
pub mod diagnostics;
pub mod error;
pub mod history;
pub mod logging;
pub mod model;
pub mod providers;
pub mod signal;
pub mod spinner;

use anyhow::{Context, Result};
use reqwest::Client;
use std::env;
use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info};

use cli::{Cli, Invocation, compose_prompt, read_piped_input};
use config::{Config, TerminalState};
use config_store::ConfigStore;
use diagnostics::Diagnostics;
use history::HistoryLog;
use model::CompletionRequest;
use providers::openai::ChatCompletions;
use signal::Shutdown;

pub use error::{Error, ErrorKind};

pub async fn run() -> ExitCode {
    dotenvy::dotenv().ok();

    let cfg = Config::from_env(TerminalState::detect());
    logging::init(&cfg.config_dir, cfg.diagnostics);
    info!(
        config_dir = %cfg.config_dir.display(),
        api_url = %cfg.api_url,
        request_timeout_secs = cfg.request_timeout_secs,
        diagnostics = cfg.diagnostics.as_str(),
        spinner_enabled = cfg.spinner_enabled,
        api_key_set = cfg.api_key.is_some(),
        "loaded runtime configuration"
    );

    let diagnostics = Diagnostics::new(cfg.diagnostics);
    let code = match run_with(&cfg, &diagnostics, env::args_os()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&diagnostics, &err);
            ExitCode::FAILURE
        }
    };

    logging::shutdown();
    code
}

/// One invocation: intake, config, exchange, answer, history.
pub async fn run_with(
    cfg: &Config,
    diagnostics: &Diagnostics,
    args: impl IntoIterator<Item = OsString>,
) -> Result<()> {
    let cli = match Cli::parse_from_args(args)? {
        Invocation::Run(cli) => cli,
        Invocation::Informational(text) => {
            io::stdout()
                .lock()
                .write_all(text.as_bytes())
                .context("could not write to stdout")?;
            return Ok(());
        }
    };
    let prompt = cli.prompt()?;

    let store = ConfigStore::new(&cfg.config_dir, cfg.config_file_path());
    store.ensure_exists(diagnostics)?;
    let defaults = store.load()?;

    let piped = read_piped_input(cfg.terminal.stdin, io::stdin().lock())
        .context("could not read from STDIN")?;
    let request = CompletionRequest {
        model: cli.model_or(&defaults).to_string(),
        prompt: compose_prompt(prompt, &piped),
        temperature: cli.temperature_or(&defaults),
    };
    let api_key = cfg.api_key()?;

    let client = Client::builder()
        .timeout(Duration::from_secs(cfg.request_timeout_secs))
        .build()
        .context("failed to initialize HTTP client")?;
    let shutdown = Shutdown::new();
    let listener = shutdown.listen();
    let result = exchange(cfg, diagnostics, &client, &shutdown, api_key, &request).await;
    listener.abort();
    result
}

/// Query, answer, history. A signal anywhere in here ends the run before the
/// next visible effect.
async fn exchange(
    cfg: &Config,
    diagnostics: &Diagnostics,
    client: &Client,
    shutdown: &Shutdown,
    api_key: &str,
    request: &CompletionRequest,
) -> Result<()> {
    let completion = ChatCompletions::new(client, cfg, diagnostics, shutdown)
        .complete(api_key, request)
        .await
        .context("error querying")?;

    shutdown.check()?;
    {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", completion.answer).context("could not write answer to stdout")?;
        stdout.flush().context("could not write answer to stdout")?;
    }

    shutdown.check()?;
    HistoryLog::new(cfg.history_file_path()).append(&request.prompt, &completion.answer)?;
    Ok(())
}

fn report(diagnostics: &Diagnostics, err: &anyhow::Error) {
    debug!(error = %format!("{err:#}"), "invocation failed");
    match err.downcast_ref::<Error>() {
        Some(Error::Usage(message)) => diagnostics.emit(message),
        _ => diagnostics.emit(format!("{err:#}")),
    }
}
