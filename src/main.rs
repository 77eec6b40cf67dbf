use groundchat::cli::{Cli, Commands, ConfigAction};
use groundchat::config::{Config, ConfigValidator};
use groundchat::corpus::CorpusIndexer;
use groundchat::daemon::{Daemon, IpcClient, IpcMessage, IpcResponse};
use groundchat::delivery::DeliveryOutcome;
use groundchat::embedding::provider_from_config;
use groundchat::error::{GroundchatError, Result};
use groundchat::llm::ChatMessage;
use groundchat::orchestrator::TurnReply;
use groundchat::profile::SessionSummary;
use std::io::{BufRead, Write};
use std::path::PathBuf;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve => cmd_serve(cli.config, cli.profile)?,
        Commands::Chat { message, session } => cmd_chat(cli.config, message, session)?,
        Commands::Session { id, json } => cmd_session(cli.config, id, json)?,
        Commands::Deliver { id } => cmd_deliver(cli.config, id)?,
        Commands::Status => cmd_status(cli.config)?,
        Commands::Index => cmd_index(cli.config, cli.profile)?,
        Commands::Config { action } => cmd_config(cli.config, action)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "groundchat=debug"
    } else {
        "groundchat=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| GroundchatError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

fn cmd_serve(config_path: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = load_config(config_path, profile)?;
    tracing::info!("Configuration loaded successfully");

    runtime()?.block_on(async {
        let daemon = Daemon::new(config)?;
        daemon.run_foreground().await
    })
}

fn client(config_path: Option<PathBuf>) -> Result<IpcClient> {
    let config = load_config(config_path, None)?;
    Ok(IpcClient::new(groundchat::config::expand_tilde(
        &config.daemon.socket_path,
    )))
}

/// Send one request and turn a failure response into an error
fn request(client: &IpcClient, message: &IpcMessage) -> Result<IpcResponse> {
    let response = runtime()?.block_on(client.send(message))?;
    if !response.success {
        return Err(GroundchatError::Daemon(
            response
                .message
                .unwrap_or_else(|| "request failed".to_string()),
        ));
    }
    Ok(response)
}

fn cmd_chat(
    config_path: Option<PathBuf>,
    message: Option<String>,
    session: Option<String>,
) -> Result<()> {
    let client = client(config_path)?;

    if let Some(message) = message {
        let reply = send_turn(&client, vec![ChatMessage::user(message)], session)?;
        println!("{}", reply.reply.content);
        eprintln!("(session {})", reply.session_id);
        return Ok(());
    }

    let mut transcript: Vec<ChatMessage> = Vec::new();
    let mut session_id = session;
    let stdin = std::io::stdin();

    println!("Type a message, or 'exit' to quit.");
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        let read = stdin.lock().read_line(&mut line).map_err(|e| GroundchatError::Io {
            source: e,
            context: "Failed to read from stdin".to_string(),
        })?;
        let line = line.trim();
        if read == 0 || line == "exit" || line == "quit" {
            break;
        }
        if line.is_empty() {
            continue;
        }

        transcript.push(ChatMessage::user(line));
        match send_turn(&client, transcript.clone(), session_id.clone()) {
            Ok(reply) => {
                println!("{}\n", reply.reply.content);
                session_id = Some(reply.session_id);
                transcript.push(reply.reply);
            }
            Err(e) => {
                // keep the transcript consistent so the user can retry
                transcript.pop();
                eprintln!("Error: {}", e);
            }
        }
    }

    if let Some(id) = session_id {
        println!("Session: {}", id);
    }
    Ok(())
}

fn send_turn(
    client: &IpcClient,
    messages: Vec<ChatMessage>,
    session_id: Option<String>,
) -> Result<TurnReply> {
    let response = request(
        client,
        &IpcMessage::Chat {
            messages,
            session_id,
        },
    )?;
    response.data_as()
}

fn cmd_session(config_path: Option<PathBuf>, id: String, json: bool) -> Result<()> {
    let response = request(&client(config_path)?, &IpcMessage::Session { id })?;

    if json {
        let data = response.data.unwrap_or_default();
        println!(
            "{}",
            serde_json::to_string_pretty(&data).map_err(|e| GroundchatError::Json {
                source: e,
                context: "Failed to format session".to_string(),
            })?
        );
        return Ok(());
    }

    let summary: SessionSummary = response.data_as()?;
    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "(unknown)".to_string());
    println!("Session: {}", summary.id);
    println!("Created: {}", summary.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Name:    {}", show(&summary.name));
    println!("Email:   {}", show(&summary.email));
    println!("Income:  {}", show(&summary.income));
    Ok(())
}

fn cmd_deliver(config_path: Option<PathBuf>, id: String) -> Result<()> {
    let response = request(&client(config_path)?, &IpcMessage::Deliver { session_id: id })?;
    let outcome: DeliveryOutcome = response.data_as()?;

    let mark = if outcome.ok { "✓" } else { "✗" };
    println!("{} {}", mark, outcome.destination);
    if let Some(note) = outcome.note {
        println!("  {}", note);
    }
    if let Some(id) = outcome.id {
        println!("  id: {}", id);
    }
    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let client = client(config_path)?;

    println!("Groundchat Status");
    println!("=================");

    let response = match runtime()?.block_on(client.send(&IpcMessage::Status)) {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("Status request failed: {}", e);
            println!("\nDaemon: not running");
            return Ok(());
        }
    };

    let data = response.data.unwrap_or_default();
    println!("\nDaemon: running (v{})", data["version"].as_str().unwrap_or("?"));
    println!("Sessions: {}", data["sessions"]);
    if data["index_built"].as_bool().unwrap_or(false) {
        println!("Index: {} chunks", data["chunks"]);
    } else {
        println!("Index: not built yet");
    }
    Ok(())
}

fn cmd_index(config_path: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = load_config(config_path, profile)?;

    runtime()?.block_on(async {
        let provider = provider_from_config(&config.embedding)?;
        let indexer = CorpusIndexer::from_config(&config.knowledge, &config.embedding, provider);
        let index = indexer.ensure_index().await?;

        println!("✓ Indexed {}", indexer.source().display());
        println!("  Chunks:    {}", index.len());
        println!("  Dimension: {}", index.dimension());
        println!("  Digest:    {}", index.source_digest().unwrap_or("-"));
        Ok(())
    })
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, None)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| GroundchatError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'groundchat config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        return Ok(config);
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
}
