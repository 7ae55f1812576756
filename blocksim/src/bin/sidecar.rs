//! Simulation sidecar: JSON requests on stdin, JSON responses on stdout.
//!
//! Each non-blank input line is one request; each produces exactly one
//! response line, flushed immediately. Diagnostics go to stderr.
//!
//! ```bash
//! echo '{"project_json":{"nodes":[{"id":"a","kind":"block"}]},"scenario":{"duration_ms":1000}}' \
//!     | cargo run --bin blocksim-sidecar -- --seed 7
//! ```

use blocksim::{Engine, EngineConfig, EngineMode, protocol};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "blocksim-sidecar")]
#[command(about = "Deterministic block pipeline simulation over stdin/stdout", long_about = None)]
struct Args {
    /// Seed for requests that do not carry one
    #[arg(long, env = "BLOCKSIM_SEED", default_value_t = 0)]
    seed: u64,

    /// Answer with the closed-form approximation instead of simulating
    #[arg(long, env = "BLOCKSIM_APPROXIMATE")]
    approximate: bool,

    /// Wake-up budget per run
    #[arg(long, env = "BLOCKSIM_MAX_EVENTS", default_value_t = EngineConfig::DEFAULT_MAX_EVENTS)]
    max_events: u64,

    /// Duration used when a scenario omits duration_ms
    #[arg(
        long,
        env = "BLOCKSIM_DEFAULT_DURATION_MS",
        default_value_t = EngineConfig::DEFAULT_DURATION_MS
    )]
    default_duration_ms: f64,

    /// Log filter directives, e.g. "info" or "blocksim=trace"
    #[arg(long, env = "BLOCKSIM_LOG", default_value = "info")]
    log_filter: String,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        let mode = if self.approximate {
            EngineMode::Approximate
        } else {
            EngineMode::Full
        };
        EngineConfig::default()
            .with_mode(mode)
            .with_seed(self.seed)
            .with_max_events(self.max_events)
            .with_default_duration_ms(self.default_duration_ms)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // stdout carries responses only
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_new(&args.log_filter)?)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = args.engine_config();
    tracing::info!(?config, "Simulation sidecar ready");
    let engine = Engine::new(config);

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let Some(response) = protocol::handle_line(&engine, &line) else {
            continue;
        };
        let mut encoded = protocol::encode_response(&response);
        encoded.push('\n');
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.flush().await?;
    }

    tracing::info!("Input closed, exiting");
    Ok(())
}
