//! Relay Simulator CLI
//!
//! Replay catalog scenarios deterministically, inspect relay timeline logs and
//! preview the pipeline dashboard feed.

use clap::{Args, Parser, Subcommand};
use relay_core::log::{agent_colors, parse_file};
use relay_core::pipeline::PipelineFeed;
use relay_core::{Event, PlayerHandle, PlayerState, RelayConfig, RelayError, ScenarioId};
use relay_env::TokioContext;
use relay_sim::{PlaybackExport, ScenarioResult, ScenarioRunner};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Relay scenario playback simulator
#[derive(Parser, Debug)]
#[command(name = "relay-sim")]
#[command(about = "Replay and inspect relay visualization scenarios", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file (player, stores, pipeline sections)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay scenarios and check the playback
    Play(PlayArgs),

    /// Print the messages of a JSONL relay log
    Timeline(TimelineArgs),

    /// Run the pipeline dashboard feed and print its metrics
    Pipeline(PipelineArgs),
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Scenario to run (relay_demo, spawn_sequence, message_flurry, broadcast,
    /// channel_chat, pty_activity, error_recovery, release_sequence, all)
    #[arg(short = 'S', long, default_value = "relay_demo")]
    scenario: String,

    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Speed multiplier (defaults to the configured speed)
    #[arg(long)]
    speed: Option<f64>,

    /// Spacing between catalog steps in milliseconds
    #[arg(long, default_value = "200")]
    cadence_ms: u64,

    /// Pause after this many events have been emitted
    #[arg(long)]
    pause_at: Option<usize>,

    /// How long the pause lasts
    #[arg(long, default_value = "1000")]
    pause_ms: u64,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the playback to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Play on the wall clock and print events as they arrive
    #[arg(long)]
    realtime: bool,
}

#[derive(Args, Debug)]
struct TimelineArgs {
    /// JSONL log file
    file: PathBuf,

    /// JSON output
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Number of feed ticks to run
    #[arg(long, default_value = "24")]
    ticks: usize,

    /// Feed seed
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// JSON output
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let outcome = load_config(cli.config.as_ref()).and_then(|config| match &cli.command {
        Command::Play(args) => play(args, &config),
        Command::Timeline(args) => timeline(args),
        Command::Pipeline(args) => pipeline(args, &config),
    });

    // Exit with proper code for CI
    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RelayConfig, RelayError> {
    match path {
        Some(path) => {
            let config = RelayConfig::from_json_file(path)?;
            debug!("Loaded config from {}", path.display());
            Ok(config)
        }
        None => Ok(RelayConfig::default()),
    }
}

fn parse_scenarios(name: &str) -> Result<Vec<ScenarioId>, RelayError> {
    if name == "all" {
        return Ok(ScenarioId::all());
    }
    name.parse::<ScenarioId>()
        .map(|id| vec![id])
        .map_err(|_| RelayError::UnknownScenario(name.to_string()))
}

/// Playback speed must be a positive, finite multiplier.
fn check_speed(speed: f64) -> Result<f64, RelayError> {
    if speed.is_finite() && speed > 0.0 {
        Ok(speed)
    } else {
        Err(RelayError::config(format!("--speed must be positive, got {}", speed)))
    }
}

fn event_line(event: &Event) -> String {
    format!(
        "{}/{} {} -> {}",
        event.kind(),
        event.subtype(),
        event.source,
        event.target.as_deref().or(event.channel.as_deref()).unwrap_or("*")
    )
}

// =============================================================================
// PLAY
// =============================================================================

fn play(args: &PlayArgs, config: &RelayConfig) -> Result<bool, RelayError> {
    let scenarios = parse_scenarios(&args.scenario).map_err(|e| {
        let names: Vec<_> = ScenarioId::all().iter().map(|s| s.name()).collect();
        eprintln!("Available scenarios: {}, all", names.join(", "));
        e
    })?;

    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };
    let speed = check_speed(args.speed.unwrap_or(config.player.default_speed))?;

    if args.export.is_some() && scenarios.len() > 1 {
        return Err(RelayError::config("--export only supports a single scenario, not 'all'"));
    }

    if !args.json {
        info!("Relay Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    if args.realtime {
        return play_realtime(&scenarios, args, config, seed, speed);
    }

    let mut runner = ScenarioRunner::new(seed)
        .with_speed(speed)
        .with_cadence(args.cadence_ms)
        .with_config(config.clone());
    if let Some(at) = args.pause_at {
        runner = runner.with_pause(at, args.pause_ms);
    }

    let results: Vec<ScenarioResult> = scenarios.iter().map(|s| runner.run(*s)).collect();

    if let Some(path) = &args.export {
        if let Some(result) = results.first() {
            PlaybackExport::from_result(result).write_to_file(path)?;
            info!("Exported {} events to {}", result.events.len(), path.display());
        }
    }

    let failed = results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": results.len(),
            "passed": results.len() - failed,
            "failed": failed,
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "speed": r.speed,
                    "passed": r.passed,
                    "events": r.events.len(),
                    "duration_ms": r.final_time_ms(),
                    "io_bytes": r.session.as_ref().map(|s| s.stats.io_bytes),
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(failed == 0);
    }

    for result in &results {
        for (event, at) in result.events.iter().zip(&result.emitted_at) {
            debug!("  [{:>8.1}ms] {}", at.as_secs_f64() * 1000.0, event_line(event));
        }
        if result.passed {
            info!(
                "✓ {} (seed={}) PASSED: {} events in {}ms",
                result.scenario.name(),
                result.seed,
                result.events.len(),
                result.final_time_ms()
            );
        } else {
            error!(
                "✗ {} (seed={}) FAILED: {}",
                result.scenario.name(),
                result.seed,
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
    }

    info!("");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if failed == 0 {
        info!("✅ All {} scenario runs passed!", results.len());
    } else {
        error!("❌ {}/{} scenario runs failed!", failed, results.len());
    }

    Ok(failed == 0)
}

fn play_realtime(
    scenarios: &[ScenarioId],
    args: &PlayArgs,
    config: &RelayConfig,
    seed: u64,
    speed: f64,
) -> Result<bool, RelayError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let handle = PlayerHandle::spawn(TokioContext::shared(), config.player.clone());
        let mut all_done = true;

        for scenario in scenarios {
            let script = scenario.build(seed, args.cadence_ms);
            let expected = script.len();
            let mut events = handle.subscribe();
            let mut state = handle.watch_state();
            let mut received = 0;

            info!("▶ {} ({} events, speed={}x)", scenario.name(), expected, speed);
            handle.start(Some(script), Some(speed));

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => {
                            received += 1;
                            info!("  {} {}", event.ts.format("%H:%M:%S%.3f"), event_line(&event));
                            if args.pause_at == Some(received) {
                                handle.pause();
                                info!("  ⏸ paused for {}ms", args.pause_ms);
                                tokio::time::sleep(Duration::from_millis(args.pause_ms)).await;
                                handle.resume();
                            }
                        }
                        Err(RecvError::Lagged(n)) => warn!("missed {} events", n),
                        Err(RecvError::Closed) => break,
                    },
                    changed = state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *state.borrow_and_update() == PlayerState::Done {
                            while let Ok(event) = events.try_recv() {
                                received += 1;
                                info!("  {} {}", event.ts.format("%H:%M:%S%.3f"), event_line(&event));
                            }
                            break;
                        }
                    }
                }
            }

            if received == expected {
                info!("✓ {} finished ({} events)", scenario.name(), received);
            } else {
                error!("✗ {} emitted {} of {} events", scenario.name(), received, expected);
                all_done = false;
            }
        }

        handle.shutdown();
        Ok(all_done)
    })
}

// =============================================================================
// TIMELINE
// =============================================================================

fn timeline(args: &TimelineArgs) -> Result<bool, RelayError> {
    let messages = parse_file(&args.file)?;
    let colors = agent_colors(&messages);

    if args.json {
        let doc = serde_json::json!({
            "messages": messages,
            "colors": colors,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(true);
    }

    info!("{} messages from {}", messages.len(), args.file.display());
    for msg in &messages {
        let urgent = if msg.is_urgent { " !" } else { "" };
        info!("  [{}] {} -> {}{}: {}", msg.ts, msg.from, msg.to, urgent, msg.body);
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (agent, color) in &colors {
        info!("  {:<16} {}", agent, color);
    }

    Ok(true)
}

// =============================================================================
// PIPELINE
// =============================================================================

fn pipeline(args: &PipelineArgs, config: &RelayConfig) -> Result<bool, RelayError> {
    let mut feed = PipelineFeed::new(config.pipeline.clone(), args.seed);
    feed.run(Duration::ZERO, args.ticks);

    if args.json {
        let doc = serde_json::json!({
            "activeStage": feed.active_stage(),
            "metrics": feed.metrics(),
            "labels": feed.labels(),
            "events": feed.events(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(true);
    }

    for event in feed.events().iter().rev() {
        info!(
            "  {:>6}ms {:<12} {:<10} {:<4} {:>3}ms {}",
            event.ts,
            event.stage,
            event.actor,
            format!("{:?}", event.status).to_lowercase(),
            event.latency,
            event.message
        );
    }

    let labels = feed.labels();
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("Active stage: {}", feed.active_stage());
    info!(
        "Throughput: {} | Success: {} | Latency: {}",
        labels.throughput, labels.success_rate, labels.latency
    );

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_speed_rejects_non_positive() {
        assert_eq!(check_speed(2.0).unwrap(), 2.0);
        for speed in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(check_speed(speed), Err(RelayError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_play_rejects_zero_speed_before_running() {
        let cli = Cli::parse_from(["relay-sim", "play", "--speed", "0", "--realtime"]);
        let Command::Play(args) = &cli.command else {
            panic!("expected play subcommand");
        };
        let result = play(args, &RelayConfig::default());
        assert!(matches!(result, Err(RelayError::InvalidConfig(_))));
    }
}
