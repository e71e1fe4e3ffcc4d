use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use log::{debug, info};
use speed_gauge::client::{Client, ClientConfig};
use speed_gauge::display::{render_live_line, render_results, DisplayMode};
use speed_gauge::engine::{MeasurementState, SpeedTest, TestConfig, MIB};
use speed_gauge::errors::{exit_codes, format_error_for_display, SpeedTestError};
use speed_gauge::results::SpeedTestResults;
use std::io::{IsTerminal, Write};

/// Longest accepted phase duration: one hour.
const MAX_PHASE_SECS: u64 = 3600;

/// Measure latency, jitter, download and upload speed against a speed test
/// server.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the speed test server
    #[arg(long, default_value = "http://localhost:3000")]
    server: String,

    /// Number of pings
    #[arg(long, default_value_t = 10)]
    ping_count: usize,

    /// Duration of the download phase in seconds
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(0..=MAX_PHASE_SECS))]
    download_secs: u64,

    /// Duration of the upload phase in seconds
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(0..=MAX_PHASE_SECS))]
    upload_secs: u64,

    /// Size of each download and upload chunk in MiB
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=100))]
    chunk_mib: u32,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

impl Cli {
    fn test_config(&self) -> TestConfig {
        TestConfig {
            ping_count: self.ping_count,
            download_duration_ms: self.download_secs.saturating_mul(1000),
            upload_duration_ms: self.upload_secs.saturating_mul(1000),
            download_chunk_mib: self.chunk_mib,
            upload_chunk_bytes: self.chunk_mib as usize * MIB,
            ..TestConfig::default()
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    debug!(
        "speed-gauge {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("SPEED_GAUGE_BUILD_GIT_HASH").unwrap_or("unknown revision")
    );

    let code = match run(&cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) if e.is_cancelled() => {
            eprintln!("Speed test cancelled");
            e.exit_code()
        }
        Err(e) => {
            eprintln!("{}", format_error_for_display(&e));
            e.exit_code()
        }
    };

    std::process::exit(code);
}

async fn run(cli: &Cli) -> Result<(), SpeedTestError> {
    let mode = DisplayMode::detect(cli.json, std::io::stdout().is_terminal());

    let client = Client::new(ClientConfig {
        base_url: cli.server.clone(),
        ..ClientConfig::default()
    })?;
    let server = client.base_url().to_string();

    let engine = SpeedTest::new(client, cli.test_config());
    engine.start()?;
    info!("Measuring against {}", server);

    let mut updates = engine.subscribe();
    let mut stopping = false;

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(state) = update else { break };
                if mode.shows_progress() {
                    draw_live_line(&state);
                }
                if !state.is_running {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c(), if !stopping => {
                info!("Received interrupt, stopping speed test");
                stopping = true;
                engine.stop();
            }
        }
    }

    if mode.shows_progress() {
        clear_live_line();
    }
    engine.wait().await;

    if let Some(error) = engine.last_error() {
        return Err(error);
    }

    let state = engine.state();
    let Some(results) = SpeedTestResults::from_run(server, &state, &engine.summary())
    else {
        return Err(SpeedTestError::cancelled());
    };

    match mode {
        DisplayMode::Json => {
            let json = serde_json::to_string_pretty(&results).map_err(|e| {
                SpeedTestError::measurement("failed to serialize results")
                    .with_source(e)
            })?;
            println!("{}", json);
        }
        DisplayMode::Live | DisplayMode::Silent => {
            println!("{}", render_results(&results));
        }
    }

    Ok(())
}

fn draw_live_line(state: &MeasurementState) {
    let line = render_live_line(state);
    if line.is_empty() {
        return;
    }

    let mut stderr = std::io::stderr().lock();
    let _ = write!(stderr, "\r\x1b[2K{}", line);
    let _ = stderr.flush();
}

fn clear_live_line() {
    let mut stderr = std::io::stderr().lock();
    let _ = write!(stderr, "\r\x1b[2K");
    let _ = stderr.flush();
}
