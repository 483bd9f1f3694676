//! volley - streaming chat with token-budgeted sessions

mod commands;
mod config;
mod store;
mod utils;

use anyhow::Context;
use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use volley_ai::providers::openai::OpenAIClient;
use volley_chat::{
    ChatCompletionConfig, ChatCompletionInput, ChatCompletionOutput, CompletionOrchestrator,
    ExecuteError, InMemorySessionStore, SessionStore,
};

use crate::store::FileSessionStore;

/// volley - streaming chat in the terminal
#[derive(Parser, Debug)]
#[command(name = "volley")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to use (default: gpt-4o-mini)
    #[arg(short, long)]
    model: Option<String>,

    /// System message for new chats
    #[arg(short, long)]
    system: Option<String>,

    /// Sampling temperature (0.0 - 2.0)
    #[arg(long)]
    temperature: Option<f32>,

    /// Tokens reserved for each answer
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Continue a chat by ID
    #[arg(long, value_name = "ID")]
    chat: Option<String>,

    /// List saved chats
    #[arg(long)]
    sessions: bool,

    /// End a chat so it accepts no more messages
    #[arg(long, value_name = "ID")]
    end: Option<String>,

    /// Keep chats in memory instead of on disk
    #[arg(long)]
    ephemeral: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// The chat the next prompt goes to
struct Chat {
    id: String,
    user_id: String,
    config: ChatCompletionConfig,
}

impl Chat {
    fn new(id: Option<String>, user_id: String, config: ChatCompletionConfig) -> Self {
        Self {
            // Pick the id up front so a failed first turn can be retried in place
            id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            user_id,
            config,
        }
    }

    fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("volley=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        let path = config::Config::init().context("failed to create config file")?;
        println!("Config file created at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    // Load config file; CLI flags take precedence
    let mut cfg = config::Config::load();
    if args.model.is_some() {
        cfg.model = args.model;
    }
    if args.system.is_some() {
        cfg.system_prompt = args.system;
    }
    if args.temperature.is_some() {
        cfg.temperature = args.temperature;
    }
    if args.max_tokens.is_some() {
        cfg.max_tokens = args.max_tokens;
    }

    let file_store = Arc::new(FileSessionStore::new(cfg.sessions_dir()));
    let store: Arc<dyn SessionStore> = if args.ephemeral {
        Arc::new(InMemorySessionStore::new())
    } else {
        file_store.clone()
    };

    // List sessions and exit
    if args.sessions {
        return list_sessions(&file_store).await;
    }

    if let Some(ref id) = args.end {
        return end_chat(store.as_ref(), id).await;
    }

    let Some(api_key) = cfg.api_key() else {
        eprintln!("Error: No API key found");
        eprintln!();
        eprintln!("Set your API key with: export OPENAI_API_KEY=your-key");
        eprintln!("Or add it to config file: volley --init-config");
        std::process::exit(1);
    };

    let mut client = OpenAIClient::new(api_key);
    if let Some(ref base_url) = cfg.base_url {
        client = client.with_base_url(base_url.as_str());
    }

    let completion = cfg.completion_config()?;
    let orchestrator = CompletionOrchestrator::new(store.clone(), Arc::new(client));
    let mut chat = Chat::new(args.chat, cfg.user_id(), completion);

    // Non-interactive mode
    if let Some(command) = args.command {
        if run_turn(&orchestrator, &chat, &command).await.is_err() {
            std::process::exit(1);
        }
        return Ok(());
    }

    run_interactive(&orchestrator, store.as_ref(), &mut chat).await
}

/// Send one prompt, printing the answer as it streams in. Ctrl-C cancels.
async fn run_turn(
    orchestrator: &CompletionOrchestrator,
    chat: &Chat,
    prompt: &str,
) -> Result<(), ExecuteError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ChatCompletionOutput>();

    // Each emission carries the whole answer so far; print only what's new
    let printer = tokio::spawn(async move {
        let mut printed = 0;
        while let Some(output) = rx.recv().await {
            if let Some(new_text) = utils::unprinted_suffix(&output.content, printed) {
                print!("{}", new_text);
                io::stdout().flush().ok();
                printed = output.content.chars().count();
            }
        }
        printed
    });

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let input = ChatCompletionInput {
        chat_id: chat.id.clone(),
        user_id: chat.user_id.clone(),
        user_message: prompt.to_string(),
        config: chat.config.clone(),
    };
    let result = orchestrator.execute(&cancel, input, &tx).await;

    ctrl_c.abort();
    drop(tx);
    if printer.await.unwrap_or(0) > 0 {
        println!();
    }

    if let Err(ref e) = result {
        report_failure(e);
    }
    result.map(|_| ())
}

fn report_failure(err: &ExecuteError) {
    if err.source.is_cancelled() {
        eprintln!("[cancelled]");
    } else {
        eprintln!("Error: {}", err);
    }
    if err.user_turn_accepted() {
        eprintln!("The answer was not saved; the chat is unchanged. Send the message again to retry.");
    }
    if let volley_chat::Error::Stream(ref e) = err.source {
        if e.is_retryable() {
            eprintln!("The endpoint reported a temporary failure.");
        }
    }
}

async fn run_interactive(
    orchestrator: &CompletionOrchestrator,
    store: &dyn SessionStore,
    chat: &mut Chat,
) -> anyhow::Result<()> {
    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("volley ({}) chat: {}", chat.config.model.name(), chat.short_id());
        eprintln!("Ctrl-C cancels an answer; /help lists commands, /exit or Ctrl-D quits.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        // Handle slash commands
        if input.starts_with('/') {
            let current = match store.find_by_id(&chat.id).await {
                Ok(session) => Some(session),
                Err(e) if e.is_not_found() => None,
                Err(e) => {
                    tracing::warn!("Failed to load chat {}: {}", chat.id, e);
                    None
                }
            };

            if let Some(result) = commands::execute_command(input, current.as_ref()) {
                match result {
                    commands::CommandResult::Message(msg) => {
                        println!("{}", msg);
                    }
                    commands::CommandResult::NewChat => {
                        *chat = Chat::new(None, chat.user_id.clone(), chat.config.clone());
                        println!("Started chat {}.", chat.short_id());
                    }
                    commands::CommandResult::EndChat => {
                        if current.is_some() {
                            if let Err(e) = end_chat(store, &chat.id).await {
                                println!("Failed to end chat: {:#}", e);
                            }
                        }
                        *chat = Chat::new(None, chat.user_id.clone(), chat.config.clone());
                        println!("Started chat {}.", chat.short_id());
                    }
                    commands::CommandResult::Exit => {
                        break;
                    }
                    commands::CommandResult::Unknown(cmd) => {
                        println!("Unknown command: /{}", cmd);
                        println!("Type /help for available commands.");
                    }
                }
                println!();
                continue;
            }
        }

        println!();
        // Failures are reported by run_turn; the loop carries on
        let _ = run_turn(orchestrator, chat, input).await;
        println!();
    }

    Ok(())
}

async fn end_chat(store: &dyn SessionStore, id: &str) -> anyhow::Result<()> {
    let mut session = store
        .find_by_id(id)
        .await
        .with_context(|| format!("failed to load chat {}", id))?;

    if session.is_ended() {
        println!("Chat {} was already ended.", id);
        return Ok(());
    }

    session.end();
    store
        .save(&session)
        .await
        .with_context(|| format!("failed to save chat {}", id))?;
    tracing::info!(session_id = %id, "chat ended");
    println!("Ended chat {}.", id);
    Ok(())
}

async fn list_sessions(store: &FileSessionStore) -> anyhow::Result<()> {
    let sessions = store
        .list_sessions()
        .await
        .with_context(|| format!("failed to list chats in {}", store.dir().display()))?;

    if sessions.is_empty() {
        println!("No saved chats found.");
        println!("Chats are stored in: {}", store.dir().display());
        return Ok(());
    }

    println!("Saved chats:\n");
    println!("{:<38} {:<18} {:<6} {:<8} Model", "ID", "Created", "Msgs", "Status");
    println!("{}", "-".repeat(90));
    for s in sessions {
        println!(
            "{:<38} {:<18} {:<6} {:<8} {}",
            utils::truncate_chars(&s.id, 35),
            s.created_at_display(),
            s.message_count,
            if s.ended { "ended" } else { "active" },
            s.model
        );
    }
    println!("\nContinue with: volley --chat <id>");
    Ok(())
}
