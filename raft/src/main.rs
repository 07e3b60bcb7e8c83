// raft/src/main.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// Infrastructure (Guards & Hatches)
use raft_core::infrastructure::escape::{install_signal_handlers, spawn_watchdog};

// Application (Use Cases)
use raft_core::application::governor::{Runtime, RuntimeBuilder};
use raft_core::application::operator::{operator_router, OPERATOR_TOKEN_ENV};
use raft_core::domain::plan::Plan;

#[derive(Parser)]
#[command(name = "raft")]
#[command(about = "Self-modifying agent governor: proof gate, stability guards, operator control plane", long_about = None)]
#[command(version)]
struct Cli {
    /// Charter document (immutable policy clauses)
    #[arg(long, global = true, default_value = "charter.md")]
    charter: PathBuf,

    /// Event log path (line-delimited JSON)
    #[arg(long, global = true, default_value = "logs/event_log.jsonl")]
    events: PathBuf,

    /// Proof cache directory
    #[arg(long, global = true, default_value = ".raft-cache")]
    cache: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// ⚙️ Run exactly one governor cycle and print a JSON status line
    OneCycle {
        /// Unified diff of the proposed self-mod (defaults to empty)
        #[arg(long)]
        diff_file: Option<PathBuf>,
    },

    /// 🔁 Run governor cycles continuously
    Run {
        /// Seconds between cycles
        #[arg(long, default_value_t = 1.0)]
        interval: f64,

        /// Optional number of cycles before exit
        #[arg(short = 'n', long)]
        cycles: Option<u64>,

        /// Unified diff of the proposed self-mod (defaults to empty)
        #[arg(long)]
        diff_file: Option<PathBuf>,
    },

    /// 🛰️ Host the operator API alongside the governor loop
    Serve {
        /// Bind address for the operator API
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: String,

        /// Seconds between cycles
        #[arg(long, default_value_t = 1.0)]
        interval: f64,
    },

    /// 🔍 Prove a plan file safe (or print its counterexample)
    Prove {
        /// Plan JSON file
        plan_file: PathBuf,
    },
}

fn build_runtime(cli: &Cli) -> anyhow::Result<Runtime> {
    let runtime = RuntimeBuilder {
        charter_path: cli.charter.clone(),
        event_log_path: cli.events.clone(),
        cache_path: cli.cache.clone(),
        ..Default::default()
    }
    .build()?;
    Ok(runtime)
}

fn read_diff(diff_file: &Option<PathBuf>) -> anyhow::Result<String> {
    match diff_file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => Ok(String::new()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG=debug raft run ... for the details
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        // --- USE CASE: SINGLE CYCLE ---
        Commands::OneCycle { diff_file } => {
            let runtime = build_runtime(&cli)?;
            let diff = read_diff(diff_file)?;

            let report = runtime.one_cycle(&diff).await?;
            let status = if report.committed { "ok" } else { "rollback" };
            let energy = report
                .rho
                .map(|rho| runtime.config().get().energy_multiplier * rho);
            println!(
                "{}",
                serde_json::json!({ "status": status, "rho": report.rho, "energy": energy })
            );

            if !report.committed {
                std::process::exit(1);
            }
        }

        // --- USE CASE: GOVERNOR LOOP ---
        Commands::Run {
            interval,
            cycles,
            diff_file,
        } => {
            let runtime = Arc::new(build_runtime(&cli)?);
            let diff = read_diff(diff_file)?;

            install_signal_handlers(Arc::clone(runtime.hatches()));
            spawn_watchdog(Arc::clone(runtime.hatches()), Duration::from_secs(1));

            let completed = runtime
                .run(&diff, Duration::from_secs_f64(*interval), *cycles)
                .await?;
            println!("✨ {completed} cycles committed");
        }

        // --- USE CASE: OPERATOR API + LOOP ---
        Commands::Serve { addr, interval } => {
            let runtime = Arc::new(build_runtime(&cli)?);

            install_signal_handlers(Arc::clone(runtime.hatches()));
            spawn_watchdog(Arc::clone(runtime.hatches()), Duration::from_secs(1));

            let token =
                std::env::var(OPERATOR_TOKEN_ENV).unwrap_or_else(|_| "devtoken".to_string());
            let app = operator_router(Arc::clone(&runtime), &token);

            let loop_runtime = Arc::clone(&runtime);
            let loop_interval = Duration::from_secs_f64(*interval);
            tokio::spawn(async move {
                if let Err(e) = loop_runtime.run("", loop_interval, None).await {
                    eprintln!("💥 governor loop stopped: {e}");
                }
            });

            println!("🛰️  Operator API listening on {addr}");
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }

        // --- USE CASE: PLAN PROOF ---
        Commands::Prove { plan_file } => {
            let runtime = build_runtime(&cli)?;
            let text = std::fs::read_to_string(plan_file)?;
            let plan: Plan = serde_json::from_str(&text)?;

            match runtime.prove_plan(plan).await {
                Ok((passed, counterexample)) => {
                    println!(
                        "{}",
                        serde_json::json!({ "passed": passed, "counterexample": counterexample })
                    );
                    if !passed {
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("❌ Plan rejected: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
