//! `flowstate`: terminal front-end for the FlowState chat backend.

mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, bail};
use clap::{Args, Parser, Subcommand};
use flowstate_stream::observability::init_observability;
use flowstate_stream::prelude::*;
use futures::stream;

use crate::render::{format_step, local_time};

#[derive(Parser)]
#[command(name = "flowstate", version, about = "Chat with the FlowState agents from a terminal")]
struct Cli {
    /// Backend base URL; overrides FLOWSTATE_API_URL and the deployment default.
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Bearer token for the chat backend.
    #[arg(long, env = "FLOWSTATE_ACCESS_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,
    /// User id sent with chat requests.
    #[arg(long, env = "FLOWSTATE_USER_ID", global = true)]
    user_id: Option<String>,
    /// Use the production backend instead of the local one.
    #[arg(long, global = true)]
    production: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether the backend is reachable.
    Health,
    /// Create a conversation thread and print its id.
    NewThread,
    /// Send a message and stream the agents' progress.
    Chat(ChatArgs),
    /// Feed a captured stream file through the reader.
    Replay(ReplayArgs),
}

#[derive(Args)]
struct ChatArgs {
    /// Message to send.
    #[arg(long, short)]
    message: String,
    /// Existing thread id to continue.
    #[arg(long)]
    thread: Option<String>,
    /// Print streamed answer text on completion.
    #[arg(long)]
    accumulate: bool,
    /// Abort the turn after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Args)]
struct ReplayArgs {
    /// File holding raw `data: ` lines.
    file: PathBuf,
    /// Bytes per simulated network chunk.
    #[arg(long, default_value_t = 64)]
    chunk_size: usize,
    /// Print streamed answer text on completion.
    #[arg(long)]
    accumulate: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_observability();

    match &cli.command {
        Command::Health => health(&cli).await,
        Command::NewThread => new_thread(&cli).await,
        Command::Chat(args) => chat(&cli, args).await,
        Command::Replay(args) => replay(args).await,
    }
}

fn build_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = if cli.production {
        ClientConfig::for_deployment(Deployment::Production)
    } else {
        ClientConfig::from_env().context("reading client config from environment")?
    };
    if let Some(url) = &cli.api_url {
        config = config.api_url(url.clone());
    }
    tracing::debug!(api_url = %config.api_url, "using chat backend");
    Ok(config)
}

fn build_session(cli: &Cli) -> anyhow::Result<ChatSession> {
    let Some(token) = cli.token.as_deref().filter(|t| !t.trim().is_empty()) else {
        bail!("an access token is required (--token or FLOWSTATE_ACCESS_TOKEN)");
    };
    let mut session = ChatSession::new(token);
    if let Some(user_id) = &cli.user_id {
        session = session.user_id(user_id.clone());
    }
    Ok(session)
}

fn reader_for(accumulate: bool) -> StreamingChunkReader {
    let policy = if accumulate {
        CompletionPolicy::Accumulated
    } else {
        CompletionPolicy::Empty
    };
    StreamingChunkReader::new().completion_policy(policy)
}

fn print_step(step: StepEvent) {
    println!("{}", format_step(&step, &local_time()));
}

fn print_completion(text: String) {
    if !text.is_empty() {
        println!("\n{text}");
    }
    println!("-- done");
}

async fn health(cli: &Cli) -> anyhow::Result<()> {
    let client = FlowStateClient::new(build_config(cli)?)?;
    if client.health_check().await {
        println!("backend reachable at {}", client.config().api_url);
        Ok(())
    } else {
        bail!("backend unreachable at {}", client.config().api_url)
    }
}

async fn new_thread(cli: &Cli) -> anyhow::Result<()> {
    let client = FlowStateClient::new(build_config(cli)?)?;
    let mut session = build_session(cli)?;
    let thread_id = client
        .reset_thread(&mut session)
        .await
        .context("creating thread")?;
    println!("{thread_id}");
    Ok(())
}

async fn chat(cli: &Cli, args: &ChatArgs) -> anyhow::Result<()> {
    let mut config = build_config(cli)?;
    if let Some(secs) = args.timeout_secs {
        config = config.stream_timeout(Duration::from_secs(secs));
    }
    let client = FlowStateClient::new(config)?.with_reader(reader_for(args.accumulate));
    let mut session = build_session(cli)?;
    if let Some(thread) = &args.thread {
        session.set_thread_id(thread.clone());
    }

    client
        .stream_chat(&session, &args.message, print_step, print_completion)
        .await
        .context("chat stream failed")?;
    Ok(())
}

async fn replay(args: &ReplayArgs) -> anyhow::Result<()> {
    if args.chunk_size == 0 {
        bail!("--chunk-size must be greater than 0");
    }
    let raw = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> = raw
        .chunks(args.chunk_size)
        .map(|chunk| Ok(chunk.to_vec()))
        .collect();

    reader_for(args.accumulate)
        .consume(Some(stream::iter(chunks)), print_step, print_completion)
        .await
        .context("replayed stream failed")?;
    Ok(())
}
