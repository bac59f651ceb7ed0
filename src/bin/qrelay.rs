//! qrelay CLI - relay queue messages to an HTTP endpoint
//!
//! Runs the JetStream consume loop, validates configuration, or explains how a
//! given status code would be handled.

use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use qrelay::{
    consume, BreakerTarget, DispositionEngine, JetStreamControlChannel, NatsClient, RelayConfig,
    RelayOutcome, Relay,
};

#[derive(Parser)]
#[command(name = "qrelay")]
#[command(version, about = "Relay queue messages to an HTTP endpoint with a self-pausing circuit breaker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume messages and relay them until interrupted
    Run {
        /// Optional YAML config file (environment variables take precedence)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Load and validate configuration without connecting to anything
    Validate {
        /// Optional YAML config file (environment variables take precedence)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show the disposition for an HTTP status (0 = transport error)
    Classify {
        /// HTTP status code returned by the downstream endpoint
        status: u16,

        /// Cooldown to put in the circuit-break request
        #[arg(short, long, default_value_t = qrelay::disposition::DEFAULT_DISABLE_PERIOD_MINUTES)]
        minutes: u32,
    },
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config } => run(config).await,
        Commands::Validate { config } => validate(config),
        Commands::Classify { status, minutes } => {
            classify(status, minutes);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Run the relay until Ctrl-C
async fn run(config: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let config = RelayConfig::load(config.as_deref())?;

    let nats = NatsClient::connect(config.nats.clone()).await?;

    // The control channel may live on a different NATS deployment
    let control_jetstream = if config.control.url == config.nats.url {
        nats.jetstream().clone()
    } else {
        let client = async_nats::connect(&config.control.url).await?;
        tracing::info!("Connected to control NATS at {}", config.control.url);
        async_nats::jetstream::new(client)
    };
    let channel = Arc::new(JetStreamControlChannel::new(
        control_jetstream,
        config.control.stream_name.clone(),
        config.control.subject.clone(),
    ));

    let relay = Relay::from_config(&config, channel)?;

    if let Some(port) = config.health_port {
        let connection = nats.clone();
        tokio::spawn(async move {
            let ready = Arc::new(move || connection.is_connected());
            if let Err(e) = qrelay::health::serve(port, ready).await {
                tracing::error!("Health server failed: {}", e);
            }
        });
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    consume(&relay, &nats, shutdown).await?;
    Ok(())
}

/// Validate configuration and print a summary
fn validate(config: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let config = RelayConfig::load(config.as_deref())?;

    println!("✓ Configuration is valid");
    println!("  Endpoint:        {} (timeout {:?})", config.http_endpoint, config.http_timeout);
    println!(
        "  Inbound:         {} / {} on stream {} ({})",
        config.nats.url, config.nats.subject, config.nats.stream_name, config.nats.consumer_name
    );
    println!("  Dead letters:    {}", config.nats.dead_letter_subject);
    println!(
        "  Control channel: {} / {} on stream {}",
        config.control.url, config.control.subject, config.control.stream_name
    );
    println!(
        "  Pause target:    {}/{} in {} for {} minutes",
        config.target.function_app_name,
        config.target.function_name,
        config.target.resource_group_name,
        config.disable_period_minutes
    );

    Ok(())
}

/// Print how `status` would be handled
fn classify(status: u16, minutes: u32) {
    let engine = DispositionEngine::new(
        BreakerTarget {
            function_app_name: "<app>".to_string(),
            function_name: "<function>".to_string(),
            resource_group_name: "<resource-group>".to_string(),
        },
        minutes,
    );

    let decision = engine.decide(RelayOutcome::from_status(status));

    println!("Outcome:       {}", decision.outcome);
    println!("Rule:          {}", decision.rule);
    println!("Disposition:   {}", decision.disposition);
    match decision.circuit_break {
        Some(request) => println!(
            "Circuit break: pause for {} minutes",
            request.disable_period_minutes
        ),
        None => println!("Circuit break: no"),
    }
}
