use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;

use convoy_agent::init::RuntimeFactory;
use convoy_agent::scripted::EchoRuntime;
use convoy_agent::AgentRuntime;
use convoy_core::config::Config;
use convoy_core::history::Decision;
use convoy_core::store::FileStateStore;
use convoy_gateway::GatewayState;
use convoy_protocol::reassembler::{DisplayState, StreamEvent};
use convoy_protocol::wire::parse_sse_stream;

#[derive(Parser)]
#[command(
    name = "convoy",
    about = "Agent conversation gateway — streams agent runs over SSE",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on (default: 8787)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Send a message to a running gateway and stream the reply
    Chat {
        /// Message to send (omit when only submitting decisions)
        message: Option<String>,

        /// Gateway base URL
        #[arg(long)]
        url: Option<String>,

        /// Resume an existing conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Approve a pending tool call by call id (repeatable)
        #[arg(long)]
        approve: Vec<String>,

        /// Reject a pending tool call by call id (repeatable)
        #[arg(long)]
        reject: Vec<String>,
    },

    /// Warm the agent and its tool connections on a running gateway
    Init {
        /// Gateway base URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::config_path);

    let config = Config::load(&config_path)?;

    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config
            .logging
            .as_ref()
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| "info".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .init();

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| config.gateway_port());
            let store = Arc::new(FileStateStore::new(config.store_path()));
            let agent_name = config.agent_name();
            let factory: RuntimeFactory = Arc::new(move |_tools| {
                Arc::new(EchoRuntime::new(agent_name.clone())) as Arc<dyn AgentRuntime>
            });
            let state = Arc::new(GatewayState::new(
                Arc::new(config),
                store,
                Vec::new(),
                factory,
            ));
            tracing::info!("Starting Convoy gateway on port {port}");
            convoy_gateway::start_gateway(state, port).await?;
        }
        Commands::Chat {
            message,
            url,
            conversation,
            approve,
            reject,
        } => {
            let url = url.unwrap_or_else(|| gateway_url(&config));
            let mut decisions: HashMap<String, Decision> = HashMap::new();
            for call_id in approve {
                decisions.insert(call_id, Decision::Approved);
            }
            for call_id in reject {
                decisions.insert(call_id, Decision::Rejected);
            }
            if !decisions.is_empty() && conversation.is_none() {
                anyhow::bail!("--approve/--reject require --conversation");
            }
            if message.is_none() && decisions.is_empty() {
                anyhow::bail!("nothing to send: give a message or decisions");
            }
            chat(&url, message, conversation, decisions).await?;
        }
        Commands::Init { url } => {
            let url = url.unwrap_or_else(|| gateway_url(&config));
            let body: serde_json::Value = reqwest::get(format!("{url}/api/agent/init"))
                .await?
                .error_for_status()?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
        },
        Commands::Status => {
            println!("Convoy v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Store: {}", config.store_path().display());
            println!("Gateway: {}", gateway_url(&config));
        }
    }

    Ok(())
}

fn gateway_url(config: &Config) -> String {
    format!("http://127.0.0.1:{}", config.gateway_port())
}

/// One streaming round against `/api/basic`, folded through the
/// display-state reducer and rendered as it arrives.
async fn chat(
    url: &str,
    message: Option<String>,
    conversation: Option<String>,
    decisions: HashMap<String, Decision>,
) -> anyhow::Result<()> {
    let messages = match &message {
        Some(text) => vec![convoy_core::history::HistoryItem::user_text(text.clone())],
        None => Vec::new(),
    };

    let response = reqwest::Client::new()
        .post(format!("{url}/api/basic"))
        .json(&serde_json::json!({
            "messages": messages,
            "conversationId": conversation,
            "decisions": decisions,
            "stream": true,
        }))
        .send()
        .await?
        .error_for_status()?;

    let mut state = DisplayState::new();
    state.begin_request();

    let mut frames = std::pin::pin!(parse_sse_stream(response.bytes_stream()));
    let mut stdout = std::io::stdout();
    while let Some(frame) = frames.next().await {
        let frame = frame?;
        let Some(name) = frame.event.as_deref() else {
            continue;
        };
        let data: serde_json::Value = match serde_json::from_str(&frame.data) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(%e, frame = name, "skipping unparseable frame");
                continue;
            }
        };
        let Some(event) = StreamEvent::parse(name, &data) else {
            continue;
        };

        match &event {
            StreamEvent::TextDelta { delta } => {
                print!("{delta}");
                stdout.flush()?;
            }
            StreamEvent::ReasoningDelta { delta } => {
                tracing::debug!(%delta, "reasoning");
            }
            StreamEvent::ToolCall { name, call_id, .. } => {
                println!("[tool] {name} ({call_id})");
            }
            StreamEvent::ToolOutput { call_id, output } => {
                println!("[tool done] {call_id}: {output}");
            }
            StreamEvent::AgentUpdate { agent } => {
                println!("[agent] {agent}");
            }
            StreamEvent::Error { message } => {
                eprintln!("error: {message}");
            }
            _ => {}
        }
        state.apply(event);
    }
    println!();

    if let Some(id) = &state.conversation_id {
        println!("conversation: {id}");
    }
    for approval in &state.approvals {
        println!(
            "approval needed: {} (call {}); rerun with --conversation {} --approve {} or --reject {}",
            approval.tool_name.as_deref().unwrap_or("tool"),
            approval.call_id,
            state.conversation_id.as_deref().unwrap_or("<id>"),
            approval.call_id,
            approval.call_id,
        );
    }

    Ok(())
}
