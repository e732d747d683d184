//! Counsel CLI - multi-agent academic advising
//!
//! Usage:
//!   counsel init                     Write .counsel/config.toml
//!   counsel agents                   List the registered executors
//!   counsel ask <query>              Answer one question
//!   counsel chat                     Interactive advising session
//!   counsel history                  Show the turns of a conversation

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use counsel_agent::{
    capability, get_auth_token, AnthropicClient, ExecutorRegistry, PromptedExecutor, TextGenerator,
};
use counsel_core::{CounselConfig, Profile, TurnResult};
use counsel_orchestrator::{
    JsonFileStore, LlmSynthesizer, Orchestrator, SessionStore, TurnOutcome, TurnRequest,
};
use counsel_planning::LlmPlanner;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_CONVERSATION: &str = "default";

#[derive(Parser)]
#[command(name = "counsel")]
#[command(author, version, about = "Multi-agent academic advising")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding .counsel/ (defaults to current directory)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration
    Init,

    /// List the advising executors
    Agents,

    /// Answer a single question
    Ask {
        /// The student's question
        query: String,

        /// JSON file with the student profile
        #[arg(long, value_name = "FILE")]
        profile: Option<PathBuf>,

        /// Conversation to continue
        #[arg(short, long, default_value = DEFAULT_CONVERSATION)]
        conversation: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive advising session
    Chat {
        /// JSON file with the student profile
        #[arg(long, value_name = "FILE")]
        profile: Option<PathBuf>,

        /// Conversation to continue
        #[arg(short, long, default_value = DEFAULT_CONVERSATION)]
        conversation: String,
    },

    /// Show the stored turns of a conversation
    History {
        #[arg(short, long, default_value = DEFAULT_CONVERSATION)]
        conversation: String,

        /// Include the activity log of each turn
        #[arg(long)]
        activity: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init => cmd_init(&cli.root),
        Commands::Agents => cmd_agents(),
        Commands::Ask {
            query,
            profile,
            conversation,
            json,
        } => cmd_ask(&cli.root, query, profile, conversation, json).await,
        Commands::Chat {
            profile,
            conversation,
        } => cmd_chat(&cli.root, profile, conversation).await,
        Commands::History {
            conversation,
            activity,
        } => cmd_history(&cli.root, conversation, activity).await,
    }
}

fn cmd_init(root: &Path) -> Result<()> {
    let path = CounselConfig::write_default(root).context("Failed to write configuration")?;
    println!("Initialized Counsel in {}", root.display());
    println!("Created:");
    println!("  {}", path.display());
    println!();
    println!("Set ANTHROPIC_API_KEY (or CLAUDE_CODE_OAUTH_TOKEN) and run `counsel ask`.");
    Ok(())
}

fn cmd_agents() -> Result<()> {
    for entry in capability::catalog() {
        let role = if entry.id == capability::CRITIC {
            " [critic]"
        } else if capability::PROPOSERS.contains(&entry.id) {
            " [proposer]"
        } else {
            ""
        };
        println!("{} - {}{}", entry.id, entry.name, role);
        println!("  {}", entry.role);
        for item in entry.capabilities {
            println!("    + {}", item);
        }
        for item in entry.limitations {
            println!("    - {}", item);
        }
        println!();
    }
    Ok(())
}

async fn cmd_ask(
    root: &Path,
    query: String,
    profile: Option<PathBuf>,
    conversation: String,
    json: bool,
) -> Result<()> {
    let config = load_config(root)?;
    let orchestrator = build_orchestrator(&config, root)?;
    let profile = load_profile(profile.as_deref()).await?;
    let cancel = cancel_on_ctrl_c();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let request = TurnRequest::new(conversation, query).with_profile(profile);
    let result = run_interactive(&orchestrator, request, &cancel, &mut input).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

async fn cmd_chat(root: &Path, profile: Option<PathBuf>, conversation: String) -> Result<()> {
    let config = load_config(root)?;
    let orchestrator = build_orchestrator(&config, root)?;
    let mut profile = Some(load_profile(profile.as_deref()).await?);
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!("Counsel advising session '{}'. Empty line or Ctrl-D to quit.", conversation);
    loop {
        let Some(query) = prompt(&mut input, "\nyou> ").await? else {
            break;
        };
        if query.is_empty() {
            break;
        }

        // Profile is stored with the first turn and reused afterwards
        let request = TurnRequest::new(conversation.clone(), query)
            .with_profile(profile.take().unwrap_or_default());
        let cancel = cancel_on_ctrl_c();
        let outcome = run_interactive(&orchestrator, request, &cancel, &mut input).await;
        // Stops this turn's Ctrl-C listener
        cancel.cancel();
        match outcome {
            Ok(result) => print_result(&result),
            Err(e) => eprintln!("error: {:#}", e),
        }
    }
    Ok(())
}

async fn cmd_history(root: &Path, conversation: String, activity: bool) -> Result<()> {
    let config = load_config(root)?;
    let store = JsonFileStore::new(root.join(&config.session.dir));
    let stored = store
        .load(&conversation)
        .await
        .with_context(|| format!("Failed to load conversation '{}'", conversation))?;

    if stored.turns.is_empty() {
        println!("No turns recorded for '{}'", conversation);
        return Ok(());
    }

    for (i, turn) in stored.turns.iter().enumerate() {
        println!(
            "## Turn {} ({}) [{}]",
            i + 1,
            turn.recorded_at.format("%Y-%m-%d %H:%M:%S UTC"),
            turn.result.step
        );
        println!("Q: {}", turn.query);
        println!("A: {}", turn.result.answer);
        if activity && !turn.trace.activity.is_empty() {
            println!();
            print!("{}", turn.trace.activity.to_markdown());
        }
        println!();
    }
    Ok(())
}

fn load_config(root: &Path) -> Result<CounselConfig> {
    CounselConfig::load_or_default(root).context("Failed to load .counsel/config.toml")
}

fn build_orchestrator(config: &CounselConfig, root: &Path) -> Result<Orchestrator> {
    get_auth_token(&config.models.api_key_env).context("No model credentials configured")?;

    let coordinator: Arc<dyn TextGenerator> = Arc::new(AnthropicClient::from_settings(
        &config.models,
        config.models.coordinator.clone(),
    ));
    let agent: Arc<dyn TextGenerator> = Arc::new(AnthropicClient::from_settings(
        &config.models,
        config.models.agent.clone(),
    ));

    let registry = capability::catalog()
        .iter()
        .fold(ExecutorRegistry::new(), |registry, entry| {
            registry.register(Arc::new(PromptedExecutor::new(entry, agent.clone())))
        });

    let window = config.session.history_window;
    let planner = LlmPlanner::new(coordinator.clone(), registry.ids()).with_history_window(window);
    let synthesizer = LlmSynthesizer::new(coordinator).with_history_window(window);
    let store = JsonFileStore::new(root.join(&config.session.dir));

    info!("Loaded {} executors", registry.len());
    Ok(
        Orchestrator::new(config, registry, Arc::new(planner), Arc::new(synthesizer))
            .with_session_store(Arc::new(store)),
    )
}

async fn load_profile(path: Option<&Path>) -> Result<Profile> {
    let Some(path) = path else {
        return Ok(Profile::new());
    };
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read profile {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Profile {} is not valid JSON", path.display()))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("Profile {} must be a JSON object", path.display()),
    }
}

/// Cancel the current turn on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = trigger.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                warn!("Cancelling turn");
                trigger.cancel();
            }
        }
    });
    cancel
}

/// Run a turn, asking the user for clarification answers when needed
async fn run_interactive(
    orchestrator: &Orchestrator,
    request: TurnRequest,
    cancel: &CancellationToken,
    input: &mut Lines<BufReader<Stdin>>,
) -> Result<TurnResult> {
    let mut outcome = orchestrator.run_turn(request, cancel).await?;
    loop {
        match outcome {
            TurnOutcome::Complete(result) | TurnOutcome::Escalated(result) => return Ok(result),
            TurnOutcome::NeedsClarification(pending) => {
                println!("Before answering, a few questions:");
                let mut answers = Vec::new();
                for question in pending.questions() {
                    if !question.why.is_empty() {
                        println!("  ({})", question.why);
                    }
                    if !question.options.is_empty() {
                        println!("  options: {}", question.options.join(", "));
                    }
                    let answer = prompt(input, &format!("{} ", question.question))
                        .await?
                        .unwrap_or_default();
                    answers.push(answer);
                }
                let answers = pending.answer(answers);
                outcome = orchestrator.resume_turn(pending, answers, cancel).await?;
            }
        }
    }
}

async fn prompt(input: &mut Lines<BufReader<Stdin>>, text: &str) -> Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(input.next_line().await?.map(|line| line.trim().to_string()))
}

fn print_result(result: &TurnResult) {
    println!();
    println!("{}", result.answer);

    if result.is_escalated() {
        // The notice already lists the open questions
        return;
    }

    let consulted: Vec<&str> = result.executors_used.iter().map(|id| id.as_str()).collect();
    if !consulted.is_empty() {
        println!();
        println!("Consulted: {}", consulted.join(", "));
    }
    if !result.failed_executors.is_empty() {
        let failed: Vec<&str> = result.failed_executors.iter().map(|id| id.as_str()).collect();
        println!("Unavailable: {}", failed.join(", "));
    }
    for conflict in &result.conflicts {
        println!("{}: {}", conflict.conflict_type, conflict.description);
        for option in &conflict.options {
            println!("  {}: {}", option.label, option.summary);
        }
    }
}
