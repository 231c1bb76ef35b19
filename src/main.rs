// PromptGate - Main Entry Point
//
// - CLI interface
// - HTTP API server
// - Interactive chat against one rate-limited session

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use promptgate::config::Config;
use promptgate::error::ServiceError;
use promptgate::rate_limit::{humanize_wait, Decision, SessionId};
use promptgate::server;
use promptgate::service::{GenerateRequest, GenerationService};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// PromptGate: rate-limited text generation gateway
#[derive(Parser, Debug)]
#[command(name = "promptgate")]
#[command(version)]
#[command(about = "Rate-limited gateway for hosted text generation", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Port to listen on (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Start interactive chat mode
    Chat {
        /// Reuse a session id instead of generating one
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config, args.verbose)?;

    match args.command {
        Some(Commands::Serve { port }) => {
            let mut server_config = config.server.clone();
            if let Some(port) = port {
                server_config.port = port;
            }
            let service = GenerationService::from_config(&config)?;
            info!(
                backend = service.generator_name(),
                policy = %config.rate_limit.policy,
                max_requests = config.rate_limit.max_requests,
                window_secs = config.rate_limit.window_secs,
                "PromptGate v{} starting",
                env!("CARGO_PKG_VERSION")
            );
            server::serve(&server_config, service, config.metrics.enabled).await?;
        }
        Some(Commands::Chat { session_id }) => {
            let service = GenerationService::from_config(&config)?;
            let session = session_id.map(SessionId::new).unwrap_or_else(SessionId::generate);
            chat_mode(service, session).await?;
        }
        Some(Commands::Config) => {
            let text =
                toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
            println!("{}", text);
        }
        None => {
            info!("No command specified. Use \"promptgate --help\" for usage.");
        }
    }

    Ok(())
}

fn init_tracing(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
    Ok(())
}

/// Interactive chat against one session
async fn chat_mode(service: GenerationService, session: SessionId) -> Result<()> {
    use std::io::{self, Write};

    let config = service.limiter().get_config().await;

    println!("\n==========================================");
    println!("PromptGate Interactive Chat");
    println!("==========================================");
    println!("Session: {}", session);
    println!(
        "Limit: {} responses per {} ({})",
        config.max_requests,
        humanize_wait(config.window_secs),
        config.policy
    );
    println!("Type 'help' for available commands.");
    println!("==========================================");

    let mut message_count = 0;

    print!("\n> ");
    io::stdout().flush()?;

    loop {
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            println!("\nGoodbye!");
            break;
        }
        let input = input.trim();

        match input.to_lowercase().as_str() {
            "" => {}
            "quit" | "exit" | "bye" => {
                println!("Goodbye!");
                break;
            }
            "help" => {
                println!("\nAvailable commands:");
                println!("  help     - Show this help message");
                println!("  status   - Show remaining quota");
                println!("  clear    - Clear the screen");
                println!("  quit     - Exit chat mode (also: exit, bye)");
                println!("Anything else is sent as a prompt.");
            }
            "clear" => {
                print!("\x1B[2J\x1B[H");
                println!("PromptGate Interactive Chat - Session: {}", session);
            }
            "status" => {
                let quota = service.quota(&session).await;
                println!("\nSession Status:");
                println!("  Session ID: {}", session);
                println!("  Messages: {}", message_count);
                if let Some(usage) = &quota.usage {
                    println!("  Used: {}/{}", usage.used, usage.limit);
                }
                match quota.decision {
                    Decision::Allowed => println!("  Next request: allowed"),
                    Decision::Denied { seconds_remaining } => println!(
                        "  Next request: in {}",
                        humanize_wait(seconds_remaining)
                    ),
                }
            }
            _ => match service.generate(&session, GenerateRequest::new(input)).await {
                Ok(response) => {
                    message_count += 1;
                    println!("\n{}", response.text);
                    for hit in &response.sources {
                        println!("  - {} ({})", hit.title, hit.url);
                    }
                }
                Err(ServiceError::RateLimited { message, .. }) => {
                    println!("\n{}", message);
                }
                Err(e) => {
                    eprintln!("\nError: {}", e);
                }
            },
        }

        print!("\n> ");
        io::stdout().flush()?;
    }

    Ok(())
}
