/// Chatload - concurrent streaming load generator for chat-completion servers.
///
/// Simulates many users holding long streaming conversations with an
/// OpenAI-compatible endpoint and reports latency and throughput.
use chatload::cli::Cli;
use clap::Parser;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = cli.run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
