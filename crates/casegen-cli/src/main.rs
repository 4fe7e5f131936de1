//! casegen binary entrypoint
//!
//! Drives an ACP agent (OpenCode by default) from the terminal:
//! - `chat` runs the handshake, optional model/mode selection and one prompt
//! - `generate` builds the augmented test-case prompt from a reference
//!   selection and runs it as one turn

use anyhow::{bail, Context, Result};
use casegen_core::rag::{build_test_case_prompt, parse_selection, ReferenceCatalog, ReferenceSelection};
use casegen_core::types::{ClientCapabilities, ModelId, SessionModeId};
use casegen_core::{
    AcpConnection, AgentConnection, ClientConfig, PromptMessage, SessionEvent, TurnOutcome,
};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod client;
mod render;

use client::ConsoleClient;

const HEARTBEAT: Duration = Duration::from_secs(10);

const DEFAULT_PROMPT: &str = "Say hello in one sentence.";
const DEFAULT_ATTACK: &str = "create test case for xss";
const DEFAULT_GENERATE_MODEL: &str = "lmstudio/qwen3-4b-mlx";
const DEFAULT_GENERATE_MODE: &str = "testcase-generator";
const DEFAULT_PRIMARY_ID: &str = "WSTG-INPV-01";
const DEFAULT_SECONDARY_IDS: [&str; 2] = ["WSTG-CLNT-01", "WSTG-CLNT-03"];

#[derive(Parser, Debug)]
#[command(name = "casegen", about = "Drive an ACP agent from the terminal", version)]
struct Cli {
    /// Verbose logging, including every frame
    #[arg(long, global = true)]
    debug: bool,

    /// Config file (defaults to <config dir>/casegen/config.json)
    #[arg(long, global = true, env = "CASEGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Working directory for the session (defaults to the current directory)
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize, open a session and run a single prompt
    Chat(ChatArgs),
    /// Generate security test cases for an attack vector
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// Model to select after session/new
    #[arg(long)]
    model: Option<String>,

    /// Mode to select after session/new
    #[arg(long)]
    mode: Option<String>,

    #[arg(long, default_value = DEFAULT_PROMPT)]
    prompt: String,

    /// Prompt timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Attack vector text
    #[arg(long, default_value = DEFAULT_ATTACK)]
    attack: String,

    #[arg(long, default_value = DEFAULT_GENERATE_MODEL)]
    model: String,

    #[arg(long, default_value = DEFAULT_GENERATE_MODE)]
    mode: String,

    /// JSON file mapping reference ids to their content
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Raw reply of the selection model; defaults to the XSS references
    #[arg(long)]
    selection: Option<String>,

    /// Prompt timeout in seconds
    #[arg(long, default_value_t = 120)]
    timeout: u64,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// `--timeout` seconds as the millisecond value the config stores
fn timeout_ms(secs: u64) -> u64 {
    secs.saturating_mul(1000)
}

fn banner(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("{}", title);
    println!("{}", "=".repeat(60));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    info!("CaseGen v{}", env!("CARGO_PKG_VERSION"));

    let cwd = match &cli.cwd {
        Some(cwd) => cwd.clone(),
        None => std::env::current_dir().context("reading current directory")?,
    };
    let mut config =
        ClientConfig::resolve(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Chat(args) => {
            config.prompt_timeout_ms = Some(timeout_ms(args.timeout));
            let model = args.model.or_else(|| config.default_model.clone());
            let mode = args.mode.or_else(|| config.default_mode.clone());
            let conn = connect(&mut config, &cwd).await?;

            let result = chat(&conn, &cwd, model, mode, &args.prompt).await;
            shutdown(&conn).await;
            result
        }
        Command::Generate(args) => {
            config.prompt_timeout_ms = Some(timeout_ms(args.timeout));
            let prompt = generation_prompt(&args)?;
            let conn = connect(&mut config, &cwd).await?;

            let result = generate(&conn, &cwd, &args, prompt).await;
            shutdown(&conn).await;
            result
        }
    }
}

/// Resolve the agent executable and start it.
async fn connect(config: &mut ClientConfig, cwd: &Path) -> Result<AcpConnection> {
    let agent = config.agent.resolved().with_context(|| {
        format!(
            "{} not found in PATH or ~/.opencode/bin (install: curl -fsSL https://opencode.ai/install | bash)",
            config.agent.command
        )
    })?;
    println!("Working directory: {}", cwd.display());
    println!("Agent binary:      {}", agent.command);

    config.agent = agent;
    if config.agent.cwd.is_none() {
        config.agent.cwd = Some(cwd.to_path_buf());
    }

    AcpConnection::spawn("opencode", config, Arc::new(ConsoleClient))
        .await
        .context("starting agent")
}

async fn shutdown(conn: &AcpConnection) {
    if let Err(e) = conn.disconnect().await {
        warn!("Failed to stop agent: {}", e);
    }
    println!("\nDone.");
}

/// initialize + session/new + optional model/mode selection. Returns the session id.
async fn open_session(
    conn: &AcpConnection,
    cwd: &Path,
    model: Option<String>,
    mode: Option<String>,
) -> Result<String> {
    banner("STEP 1: Initialize");
    let started = Instant::now();
    let init = conn
        .initialize(ClientCapabilities::default())
        .await
        .context("initialize failed (check `opencode --version` and API keys)")?;
    println!("  (took {:.1}s)", started.elapsed().as_secs_f64());
    match &init.agent_info {
        Some(agent) => println!("  Agent: {} v{}", agent.name, agent.version),
        None => println!("  Agent: ?"),
    }
    println!("  Protocol: {}", init.protocol_version);
    println!(
        "  Agent capabilities: {}",
        serde_json::to_string(&init.agent_capabilities)?
    );

    banner("STEP 2: session/new");
    let started = Instant::now();
    let session = conn
        .new_session(cwd, Vec::new())
        .await
        .context("session/new failed")?;
    println!("  (took {:.1}s)", started.elapsed().as_secs_f64());
    println!("{}", render::session_summary(&session));

    if let Some(model) = model {
        banner(&format!("STEP 3: session/set_model -> {}", model));
        match conn.set_model(&session.id, ModelId::new(model)).await {
            Ok(updated) => println!(
                "  Model set to: {}",
                updated.current_model().map(|m| m.as_str()).unwrap_or("?")
            ),
            Err(e) => println!("  ERROR: {}", e),
        }
    }

    if let Some(mode) = mode {
        banner(&format!("STEP 4: session/set_mode -> {}", mode));
        match conn.set_mode(&session.id, SessionModeId::new(mode)).await {
            Ok(updated) => println!(
                "  Mode set to: {}",
                updated.current_mode().map(|m| m.as_str()).unwrap_or("?")
            ),
            Err(e) => println!("  ERROR: {}", e),
        }
    }

    Ok(session.id)
}

/// Outcome of one streamed turn
struct TurnReport {
    outcome: TurnOutcome,
    response_chars: usize,
    elapsed: Duration,
}

/// Send one prompt, streaming events to stdout with a heartbeat while the
/// agent works. Ctrl-C cancels the turn.
async fn run_turn(conn: &AcpConnection, session_id: &str, text: String) -> Result<TurnReport> {
    let mut events = conn.subscribe_events();
    let watched = session_id.to_string();
    let printer = tokio::spawn(async move {
        let mut response_chars = 0;
        loop {
            match events.recv().await {
                Ok(event) if event.session_id() != watched => {}
                Ok(event) => {
                    if let SessionEvent::TextDelta { text, .. } = &event {
                        response_chars += text.chars().count();
                    }
                    if let Some(rendered) = render::render_event(&event) {
                        print!("{}", rendered);
                        let _ = std::io::stdout().flush();
                    }
                    if matches!(
                        event,
                        SessionEvent::TurnComplete { .. } | SessionEvent::SessionClosed { .. }
                    ) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
        response_chars
    });

    println!("\n--- Response ---");
    let started = Instant::now();
    let turn = conn.prompt(session_id, PromptMessage::text(text));
    tokio::pin!(turn);
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + HEARTBEAT, HEARTBEAT);
    let mut cancelled = false;

    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            _ = heartbeat.tick() => {
                println!("\n  [waiting... {}s]", started.elapsed().as_secs());
            }
            _ = tokio::signal::ctrl_c(), if !cancelled => {
                cancelled = true;
                println!("\n  [cancelling]");
                if let Err(e) = conn.cancel(session_id).await {
                    warn!("Failed to cancel: {}", e);
                }
            }
        }
    };
    let elapsed = started.elapsed();

    match result {
        Ok(result) => {
            let response_chars = printer.await.unwrap_or_default();
            Ok(TurnReport {
                outcome: result.outcome,
                response_chars,
                elapsed,
            })
        }
        Err(e) => {
            printer.abort();
            Err(e).context("session/prompt failed")
        }
    }
}

fn describe_outcome(outcome: &TurnOutcome) -> String {
    match outcome {
        TurnOutcome::Completed { stop_reason } => render::wire_name(stop_reason),
        TurnOutcome::Cancelled => "cancelled".to_string(),
        TurnOutcome::Failed(failure) => format!("error {}: {}", failure.code, failure.message),
    }
}

async fn chat(
    conn: &AcpConnection,
    cwd: &Path,
    model: Option<String>,
    mode: Option<String>,
    prompt: &str,
) -> Result<()> {
    let session_id = open_session(conn, cwd, model, mode).await?;

    banner("STEP 5: session/prompt");
    println!("  Prompt: {}", prompt);
    let report = run_turn(conn, &session_id, prompt.to_string()).await?;

    println!(
        "\n\n--- DONE (reason={}) ---",
        describe_outcome(&report.outcome)
    );
    println!("  (prompt took {:.1}s)", report.elapsed.as_secs_f64());
    Ok(())
}

fn generation_prompt(args: &GenerateArgs) -> Result<String> {
    let selection = match &args.selection {
        Some(reply) => {
            parse_selection(reply).context("no reference ids found in --selection")?
        }
        None => ReferenceSelection::new(
            DEFAULT_PRIMARY_ID,
            DEFAULT_SECONDARY_IDS.iter().map(|id| id.to_string()),
        ),
    };
    let catalog = match &args.catalog {
        Some(path) => ReferenceCatalog::load(path)
            .with_context(|| format!("loading reference catalog {}", path.display()))?,
        None => {
            warn!("No --catalog given; the primary reference will be a placeholder");
            ReferenceCatalog::default()
        }
    };
    if catalog.get(&selection.primary).is_none() && !catalog.is_empty() {
        bail!("{} is not in the reference catalog", selection.primary);
    }
    debug!("Selection: {:?}", selection);

    println!("  Primary WSTG:   {}", selection.primary);
    println!("  Secondary WSTG: {}", selection.secondary.join(", "));
    Ok(build_test_case_prompt(&args.attack, &selection, &catalog))
}

async fn generate(
    conn: &AcpConnection,
    cwd: &Path,
    args: &GenerateArgs,
    prompt: String,
) -> Result<()> {
    banner("Test Case Generation");
    println!("  Attack vector:  {}", args.attack);
    println!("  Model:          {}", args.model);
    println!("  Mode:           {}", args.mode);

    let session_id = open_session(
        conn,
        cwd,
        Some(args.model.clone()),
        Some(args.mode.clone()),
    )
    .await?;

    let chars = prompt.chars().count();
    banner(&format!(
        "STEP 5: session/prompt ({} chars, ~{} tokens)",
        chars,
        chars / 4
    ));
    let report = run_turn(conn, &session_id, prompt).await?;

    banner("RESULT");
    println!("  Outcome:        {}", describe_outcome(&report.outcome));
    println!("  Response chars: {}", report.response_chars);
    println!("  Time:           {:.1}s", report.elapsed.as_secs_f64());
    if report.response_chars == 0 {
        println!("  EMPTY RESPONSE: model returned no text");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_timeout_ms_saturates() {
        assert_eq!(timeout_ms(60), 60_000);
        assert_eq!(timeout_ms(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_huge_timeout_flag_parses() {
        let cli = Cli::try_parse_from(["casegen", "chat", "--timeout", "18446744073709551615"])
            .unwrap();
        match cli.command {
            Command::Chat(args) => assert_eq!(timeout_ms(args.timeout), u64::MAX),
            _ => panic!("expected chat"),
        }
    }
}
