use std::env;
use std::process;

use avisos_service::config::{self, ServiceConfig};
use avisos_service::logging::{self, DataSource, LogLevel};
use avisos_service::provinces;
use avisos_service::sync::SyncOrchestrator;
use avisos_service::verify::{self, VerificationStatus};

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let mode = args.first().map(String::as_str).unwrap_or("");

    if mode == "--help" || mode == "-h" {
        print_usage();
        return;
    }

    let config = match config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {}", err);
            process::exit(2);
        }
    };

    let min_level = if env::var("ALERTAS_DEBUG").is_ok() {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    logging::init_logger(min_level, config.log_file.as_deref(), true);

    match mode {
        "" => run_service(config),
        "--once" => run_once(config),
        "--verify" => run_verify(config),
        "--status" => run_status(config),
        other => {
            eprintln!("unknown option: {}", other);
            print_usage();
            process::exit(2);
        }
    }
}

fn build_orchestrator(config: ServiceConfig) -> SyncOrchestrator {
    match SyncOrchestrator::new(config) {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            eprintln!("failed to build HTTP client: {}", err);
            process::exit(2);
        }
    }
}

/// Default mode: adopt or build a snapshot, then sync on the interval
/// forever.
fn run_service(config: ServiceConfig) -> ! {
    logging::info(
        DataSource::System,
        None,
        &format!(
            "avisos service starting ({} feed, data dir {})",
            config.feed_format,
            config.data_dir.display()
        ),
    );
    let orchestrator = build_orchestrator(config);
    orchestrator.initialize();
    orchestrator.run_scheduler()
}

fn run_once(config: ServiceConfig) {
    let orchestrator = build_orchestrator(config);
    match orchestrator.sync() {
        Ok(summary) => {
            println!(
                "✓ sync OK: {} bulletins, {} provinces with warnings, snapshot {}",
                summary.stats.bulletins, summary.provinces_with_alerts, summary.snapshot_file
            );
        }
        Err(err) => {
            eprintln!("✗ sync failed: {}", err);
            process::exit(1);
        }
    }
}

fn run_verify(config: ServiceConfig) {
    let result = verify::run_verification(&config);
    if result.status == VerificationStatus::Failed {
        process::exit(1);
    }
}

/// Reads the snapshot on disk without touching the network.
fn run_status(config: ServiceConfig) {
    let orchestrator = build_orchestrator(config);
    if orchestrator.store().latest_timestamp().is_none() {
        println!("no snapshot on disk");
        return;
    }
    // A snapshot exists, so initialize() adopts it instead of fetching.
    orchestrator.initialize();
    match serde_json::to_string_pretty(&orchestrator.status()) {
        Ok(json) => println!("{}", json),
        Err(err) => eprintln!("could not render status: {}", err),
    }

    let views = orchestrator.alert_views();
    let active: Vec<_> = views.iter().filter(|(_, view)| view.nivel != "verde").collect();
    if active.is_empty() {
        println!("all {} provinces green", views.len());
        return;
    }
    for (code, view) in active {
        println!(
            "  {} {:8} {} ({})",
            code,
            view.nivel,
            provinces::province_name(code),
            view.fenomeno.as_deref().unwrap_or("-")
        );
    }
}

fn print_usage() {
    println!("avisos_service [MODE]");
    println!();
    println!("Modes:");
    println!("  (none)     run the service: startup sync plus periodic scheduler");
    println!("  --once     run a single sync and exit");
    println!("  --verify   check the configured feed against the live API");
    println!("  --status   print the snapshot state without fetching");
    println!();
    println!("Configuration comes from avisos.toml and the environment;");
    println!("AEMET_API_KEY is required (see .env support via dotenv).");
}
