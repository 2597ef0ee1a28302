/// CLI argument parsing and command execution.
use crate::error::AppError;
use crate::http::providers::openai::OpenAICompatClient;
use crate::http::ChatClient;
use crate::shutdown::Shutdown;
use crate::simulator::{LoadTestConfig, Orchestrator, PartialConfig};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Chatload - concurrent streaming load generator for chat-completion servers.
#[derive(Parser, Debug)]
#[command(name = "chatload")]
#[command(about = "Generate concurrent streaming load against an OpenAI-compatible chat endpoint")]
#[command(
    long_about = r#"Chatload - concurrent streaming load generator for chat-completion servers

Each simulated user opens its own streaming chat request, drains the
server-sent events, records latency and token counts, and writes every
exchange to a per-user transcript. Statistics are printed periodically
and once more at the end of the run.

EXAMPLES:
  # 12 users for 5 minutes against the default server
  chatload run

  # Node 2 of a distributed run, 20 users each
  chatload run --node-id 2 --users 20 --server 10.0.0.5 --port 8000

  # 10 messages per user, fixed seed, JSON summary
  chatload run --messages 10 --seed 42 --output-format json

  # Check that the server is reachable
  chatload probe --base-url http://localhost:8000"#
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a load test
    Run(RunArgs),

    /// Check that the server answers /v1/models and list its models
    Probe(ProbeArgs),
}

/// Where the target server lives.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Server host or IP
    #[arg(long)]
    pub server: Option<String>,

    /// Server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Full base URL (overrides --server and --port)
    #[arg(long)]
    pub base_url: Option<String>,

    /// TOML config file; command-line flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Node id in a distributed run (0 = single node)
    #[arg(long)]
    pub node_id: Option<u32>,

    /// Number of concurrent users
    #[arg(short, long)]
    pub users: Option<usize>,

    /// Test duration in seconds
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Per-user message limit
    #[arg(short, long)]
    pub messages: Option<u64>,

    /// Count failed attempts toward --messages
    #[arg(long)]
    pub count_failures: bool,

    /// Model id sent with every request
    #[arg(long)]
    pub model: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Maximum tokens per response
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Pause between messages (e.g., "3-8s", "500ms" or "250-750ms")
    #[arg(long)]
    pub delay: Option<String>,

    /// Minimum pause after a transport error, in seconds
    #[arg(long)]
    pub error_backoff: Option<f64>,

    /// Delay between session starts, in milliseconds
    #[arg(long)]
    pub stagger_ms: Option<u64>,

    /// Seconds between periodic reports
    #[arg(long)]
    pub report_interval: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub request_timeout: Option<u64>,

    /// Directory for per-user transcripts
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Prompt file, one prompt per line
    #[arg(short, long)]
    pub prompt_file: Option<PathBuf>,

    /// Seed for prompt choice and pauses
    #[arg(long)]
    pub seed: Option<u64>,

    /// Final report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Probe timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Final report format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for scripting
    Json,
}

impl TargetArgs {
    fn layer(&self) -> PartialConfig {
        PartialConfig {
            server: self.server.clone(),
            port: self.port,
            base_url: self.base_url.clone(),
            ..Default::default()
        }
    }

    fn file_layer(&self) -> Result<PartialConfig, AppError> {
        match &self.config {
            Some(path) => PartialConfig::from_file(path),
            None => Ok(PartialConfig::default()),
        }
    }
}

impl RunArgs {
    /// Settings given on the command line, as a config layer.
    pub fn layer(&self) -> PartialConfig {
        PartialConfig {
            node_id: self.node_id,
            users: self.users,
            duration: self.duration,
            messages: self.messages,
            count_failures: self.count_failures.then_some(true),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            delay: self.delay.clone(),
            error_backoff: self.error_backoff,
            stagger_ms: self.stagger_ms,
            report_interval: self.report_interval,
            request_timeout: self.request_timeout,
            log_dir: self.log_dir.clone(),
            prompt_file: self.prompt_file.clone(),
            seed: self.seed,
            ..self.target.layer()
        }
    }

    /// Resolve flags over the config file over defaults.
    pub fn resolve(&self) -> Result<LoadTestConfig, AppError> {
        self.layer().over(self.target.file_layer()?).resolve()
    }
}

impl Cli {
    /// Execute the CLI command.
    pub fn run(self) -> Result<(), AppError> {
        match self.command {
            Command::Run(args) => Self::run_load_test(args),
            Command::Probe(args) => Self::run_probe(args),
        }
    }

    fn runtime() -> Result<tokio::runtime::Runtime, AppError> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create async runtime: {}", e)))
    }

    /// Run load test command.
    fn run_load_test(args: RunArgs) -> Result<(), AppError> {
        let config = args.resolve()?;
        print_banner(&config);

        let orchestrator = Orchestrator::new(config);
        let client = Arc::new(OpenAICompatClient::new(orchestrator.client_config())?);

        let rt = Self::runtime()?;
        let report = rt.block_on(async {
            let shutdown = Shutdown::new();
            let listener = shutdown.listener();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, letting running sessions finish");
                    shutdown.trigger();
                }
            });

            match args.output_format {
                // Keep stdout clean for the JSON document.
                OutputFormat::Json => orchestrator.run(client, std::io::stderr(), listener).await,
                OutputFormat::Text => orchestrator.run(client, std::io::stdout(), listener).await,
            }
        })?;

        match args.output_format {
            OutputFormat::Text => println!("{}", report.to_text()),
            OutputFormat::Json => println!("{}", report.to_json()?),
        }

        Ok(())
    }

    /// Run probe command.
    fn run_probe(args: ProbeArgs) -> Result<(), AppError> {
        let layer = PartialConfig {
            probe_timeout: args.timeout,
            ..args.target.layer()
        };
        let config = layer.over(args.target.file_layer()?).resolve()?;

        let orchestrator = Orchestrator::new(config);
        let client = OpenAICompatClient::new(orchestrator.client_config())?;

        let rt = Self::runtime()?;
        let models = rt.block_on(orchestrator.probe(&client))?;

        println!("Server is reachable at {}", client.base_url());
        if models.is_empty() {
            println!("No models listed");
        } else {
            println!("Available models:");
            for model in models {
                println!("  {}", model);
            }
        }
        Ok(())
    }
}

fn print_banner(config: &LoadTestConfig) {
    let rule = "=".repeat(70);
    eprintln!("\n{}", rule);
    if config.node_id > 0 {
        eprintln!("DISTRIBUTED LOAD TEST - NODE {}", config.node_id);
    } else {
        eprintln!("CHAT COMPLETION LOAD TEST");
    }
    eprintln!("{}", rule);
    eprintln!("Target Server: {}", config.base_url);
    eprintln!("Model:         {}", config.model);
    eprintln!("Users:         {}", config.users);
    if let Some(duration) = config.stop.duration {
        eprintln!("Duration:      {}s", duration.as_secs());
    }
    if let Some(limit) = config.stop.max_messages {
        eprintln!("Msgs/User:     {}", limit);
    }
    eprintln!("Log Directory: {}", config.log_dir.display());
    eprintln!("{}\n", rule);
}
