use chainbench::archiver::Archiver;
use chainbench::config::{validate, ConfigLoader};
use chainbench::models::{BenchmarkMode, QpsSchedule, RpcMode};
use chainbench::{logging, platform, run::Run, AppError};
use clap::Parser;
use std::path::PathBuf;

/// Blockchain-node benchmark harness: ramps request load against a local
/// node, samples system and chain-health metrics every tick, and stops at
/// the first sustained bottleneck.
#[derive(Parser, Debug)]
#[command(name = "chainbench", version, about)]
struct Cli {
    /// Short fixed schedule, good for smoke-testing a configuration.
    #[arg(long, conflicts_with_all = ["standard", "intensive"])]
    quick: bool,

    /// Moderate schedule with warmup/cooldown between levels.
    #[arg(long, conflicts_with_all = ["quick", "intensive"])]
    standard: bool,

    /// Long schedule that arms Detector-driven auto-stop on a confirmed bottleneck.
    #[arg(long, conflicts_with_all = ["quick", "standard"])]
    intensive: bool,

    /// Single RPC endpoint per tick (default).
    #[arg(long, conflicts_with = "mixed")]
    single: bool,

    /// Round-robin across configured RPC endpoints.
    #[arg(long, conflicts_with = "single")]
    mixed: bool,

    #[arg(long)]
    initial_qps: Option<u32>,

    #[arg(long)]
    max_qps: Option<u32>,

    #[arg(long)]
    step_qps: Option<u32>,

    /// Seconds per ramp level.
    #[arg(long)]
    duration: Option<u32>,

    /// Path to a TOML configuration file, overlaid on top of defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the live qps_status.json of the most recent run and exit.
    #[arg(long)]
    status: bool,

    /// Seal the current (or most recently finished) run into an archive and exit.
    #[arg(long)]
    archive: bool,

    /// Compare two archived runs' summaries side-by-side and exit.
    #[arg(long, num_args = 2, value_names = ["RUN_A", "RUN_B"])]
    compare: Option<Vec<String>>,

    /// Delete archives beyond the most recent `--keep` and rebuild the history index.
    #[arg(long)]
    cleanup: bool,

    #[arg(long, default_value_t = 10)]
    keep: usize,
}

impl Cli {
    fn mode(&self) -> BenchmarkMode {
        if self.intensive {
            BenchmarkMode::Intensive
        } else if self.standard {
            BenchmarkMode::Standard
        } else {
            BenchmarkMode::Quick
        }
    }

    fn rpc_mode(&self) -> RpcMode {
        if self.mixed {
            RpcMode::Mixed
        } else {
            RpcMode::Single
        }
    }

    fn schedule_overrides(&self, base: QpsSchedule) -> QpsSchedule {
        QpsSchedule {
            initial_qps: self.initial_qps.unwrap_or(base.initial_qps),
            max_qps: self.max_qps.unwrap_or(base.max_qps),
            step_qps: self.step_qps.unwrap_or(base.step_qps),
            duration_per_level_secs: self.duration.unwrap_or(base.duration_per_level_secs),
            ..base
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}", e.user_message());
            e.exit_code()
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = ConfigLoader::load(cli.config.as_deref()).map_err(AppError::Config)?;
    validate(&config).map_err(AppError::Config)?;

    if cli.cleanup {
        let archiver = Archiver::new(config);
        let deleted = archiver.cleanup(cli.keep).map_err(AppError::Archiver)?;
        println!("cleanup: removed {deleted} archive(s), kept most recent {}", cli.keep);
        return Ok(());
    }

    if let Some(runs) = cli.compare {
        let archiver = Archiver::new(config);
        let (a, b) = archiver.compare(&runs[0], &runs[1]).map_err(AppError::Archiver)?;
        print_comparison(&a, &b);
        return Ok(());
    }

    if cli.status {
        let snapshot_path = config.paths.snapshot_dir.join("metrics_latest.json");
        match std::fs::read_to_string(&snapshot_path) {
            Ok(contents) => println!("{contents}"),
            Err(e) => return Err(AppError::PreCheck(format!("no live snapshot available: {e}"))),
        }
        return Ok(());
    }

    let rpc_mode = cli.rpc_mode();
    log::debug!("rpc mode: {rpc_mode:?}");
    let mode = cli.mode();
    match mode {
        BenchmarkMode::Quick => config.quick = to_mode_defaults(cli.schedule_overrides(config.schedule_for(mode))),
        BenchmarkMode::Standard => config.standard = to_mode_defaults(cli.schedule_overrides(config.schedule_for(mode))),
        BenchmarkMode::Intensive => config.intensive = to_mode_defaults(cli.schedule_overrides(config.schedule_for(mode))),
    }

    precheck(&config).await?;

    let platform_info = platform::PlatformProbe::run(&config);
    log::info!("platform detected: {:?}", platform_info.platform);

    let run_id_for_logging = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let logging_handle = logging::init(&config, &run_id_for_logging)?;

    let (stop_tx, stop_rx) = chainbench::clock::new_stop_channel();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(AppError::Io)?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::warn!("received SIGINT, stopping run");
            }
            _ = sigterm.recv() => {
                log::warn!("received SIGTERM, stopping run");
            }
        }
        let _ = stop_tx.send(true);
    });

    let harness_run = Run::new(config, mode, platform_info);
    let outcome = harness_run.run(stop_rx).await;

    logging_handle.flush_and_join();

    match outcome {
        chainbench::RunOutcome::CompletedSuccessfully { max_successful_qps } => {
            println!("completed successfully, max sustained QPS: {max_successful_qps}");
            Ok(())
        }
        chainbench::RunOutcome::BottleneckDetected(verdict) => {
            println!(
                "bottleneck detected at {} qps: {} ({:?})",
                verdict.bottleneck_qps, verdict.classification, verdict.reasons
            );
            Ok(())
        }
        chainbench::RunOutcome::Aborted { message } => Err(AppError::PreCheck(message)),
    }
}

fn to_mode_defaults(schedule: QpsSchedule) -> chainbench::config::ModeDefaults {
    chainbench::config::ModeDefaults {
        initial_qps: schedule.initial_qps,
        max_qps: schedule.max_qps,
        step_qps: schedule.step_qps,
        duration_per_level_secs: schedule.duration_per_level_secs,
        warmup_secs: schedule.warmup_secs,
        cooldown_secs: schedule.cooldown_secs,
    }
}

/// Fails fast (exit code 3) on conditions the spec requires checked before
/// any sampler starts: targets file, load-generator binary, reachable local RPC.
async fn precheck(config: &chainbench::config::Config) -> Result<(), AppError> {
    if !config.paths.targets_file.exists() {
        return Err(AppError::PreCheck(format!(
            "targets file not found: {}",
            config.paths.targets_file.display()
        )));
    }

    if !load_gen_binary_resolves(&config.load_gen_binary) {
        return Err(AppError::PreCheck(format!(
            "load generator binary not found or not executable: {}",
            config.load_gen_binary.display()
        )));
    }

    let client = chainbench::rpc::JsonRpcClient::new(
        config.local_rpc.url.clone(),
        config.local_rpc.health_method.clone(),
        config.local_rpc.height_method.clone(),
        std::time::Duration::from_secs(5),
    );
    match client.health().await {
        Ok(true) => Ok(()),
        Ok(false) => Err(AppError::PreCheck("local node reports unhealthy".to_string())),
        Err(e) => Err(AppError::PreCheck(format!("local RPC unreachable: {e}"))),
    }
}

/// True if `binary` names an executable: either a path that exists and
/// carries an execute bit, or a bare command name resolvable on `$PATH`
/// (the default `load_gen_binary` is a bare name like `vegeta`).
fn load_gen_binary_resolves(binary: &std::path::Path) -> bool {
    if binary.components().count() > 1 {
        return is_executable_file(binary);
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| is_executable_file(&dir.join(binary))))
        .unwrap_or(false)
}

fn is_executable_file(path: &std::path::Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else { return false };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn print_comparison(a: &chainbench::archiver::TestSummary, b: &chainbench::archiver::TestSummary) {
    println!("{:<28} {:<20} {:<20}", "field", a.run_id, b.run_id);
    println!("{:<28} {:<20?} {:<20?}", "mode", a.mode, b.mode);
    println!("{:<28} {:<20} {:<20}", "max_successful_qps", a.max_successful_qps, b.max_successful_qps);
    println!("{:<28} {:<20?} {:<20?}", "status", a.status, b.status);
    println!("{:<28} {:<20} {:<20}", "bottleneck_detected", a.bottleneck_detected, b.bottleneck_detected);
    println!("{:<28} {:<20} {:<20}", "bottleneck_summary", a.bottleneck_summary, b.bottleneck_summary);
}
