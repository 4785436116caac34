use std::io::{self, Write};

use clap::{Args, Parser, Subcommand};
use promptstream::accumulate::{Notice, ReplyAccumulator, consume};
use promptstream::{ChatMessage, ClientConfig, ClientError, HistoryQuery, InvocationRequest, PromptClient, SessionState};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Client(#[from] ClientError),
    #[error("server rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("stream failed: {0}")]
    StreamFailed(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "promptstream", about = "Stream provider invocations from the prompt API")]
struct Cli {
    #[arg(long, env = "PROMPT_API_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Invoke a provider and print the reply as it streams.
    Stream(StreamArgs),
    /// Print recent quick-test invocations.
    History {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },
}

#[derive(Args, Debug)]
struct StreamArgs {
    #[arg(long)]
    provider_id: i64,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    model_id: Option<i64>,

    #[arg(long, default_value_t = promptstream::types::DEFAULT_TEMPERATURE)]
    temperature: f64,

    #[arg(long, help = "System message sent before the user message")]
    system: Option<String>,

    #[arg(long = "param", value_name = "KEY=JSON", value_parser = parse_param)]
    params: Vec<(String, Value)>,

    #[arg(long)]
    prompt_id: Option<i64>,

    #[arg(long, requires = "prompt_id")]
    prompt_version_id: Option<i64>,

    #[arg(long, default_value_t = false, help = "Print each protocol message as JSON")]
    raw: bool,

    #[arg(required = true, num_args = 1..)]
    message: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url.as_deref() {
        config = config.with_base_url(base_url)?;
    }
    let client = PromptClient::new(&config)?;

    match cli.command {
        Command::Stream(args) => run_stream(&client, args).await,
        Command::History { limit, offset } => run_history(&client, HistoryQuery { limit, offset }).await,
    }
}

async fn run_stream(client: &PromptClient, args: StreamArgs) -> Result<(), CliError> {
    let request = build_request(&args)?;

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; cancelling stream");
            ctrl_c.cancel();
        }
    });

    let mut session = client.stream_invocation(request, token);
    let outcome = if args.raw {
        let mut result = Ok(SessionState::Completed);
        while let Some(item) = session.next().await {
            match item {
                Ok(message) => println!("{}", serde_json::to_string(&message)?),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        result.map(|_| session.state())
    } else {
        let mut accumulator = ReplyAccumulator::new();
        let mut stdout_open = true;
        let outcome = consume(session, &mut accumulator, |delta| {
            if !stdout_open {
                return;
            }
            if let Err(e) = write_delta(&mut io::stdout().lock(), delta) {
                debug!(error = %e, "stdout closed; dropping further output");
                stdout_open = false;
            }
        })
        .await;
        if !accumulator.text().is_empty() {
            println!();
        }
        if let Some(usage) = accumulator.usage() {
            info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "usage"
            );
        }
        outcome
    };

    if let Ok(state) = &outcome {
        info!(?state, "stream ended");
    }
    match Notice::from_outcome(&outcome) {
        Notice::Silent => Ok(()),
        Notice::Rejected { status, message } => Err(CliError::Rejected { status, message }),
        Notice::Failed { message } => Err(CliError::StreamFailed(message)),
    }
}

async fn run_history(client: &PromptClient, query: HistoryQuery) -> Result<(), CliError> {
    let items = client.fetch_history(query).await?;
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}

fn build_request(args: &StreamArgs) -> Result<InvocationRequest, CliError> {
    let mut messages = Vec::new();
    if let Some(system) = args.system.as_deref().filter(|s| !s.trim().is_empty()) {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(args.message.join(" ")));

    let mut request = InvocationRequest::new(args.provider_id, messages).with_temperature(args.temperature);
    if let Some(model) = &args.model {
        request = request.with_model(model.clone());
    }
    if let Some(model_id) = args.model_id {
        request = request.with_model_id(model_id);
    }
    if let Some(prompt_id) = args.prompt_id {
        request = request.with_prompt(prompt_id, args.prompt_version_id);
    }
    for (key, value) in &args.params {
        request = request.with_parameter(key.clone(), value.clone());
    }
    request.validate()?;
    Ok(request)
}

fn write_delta(out: &mut impl Write, delta: &str) -> io::Result<()> {
    out.write_all(delta.as_bytes())?;
    out.flush()
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(format!("expected KEY=JSON, got '{raw}'"));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err("parameter key is empty".to_owned());
    }
    let value = serde_json::from_str::<Value>(value.trim()).map_err(|e| format!("invalid JSON for '{key}': {e}"))?;
    Ok((key.to_owned(), value))
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
