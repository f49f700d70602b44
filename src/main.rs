use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use procsnap::config::{Config, OutputFormat, SortKey, load_config, load_config_from_path};
use procsnap::report;
use procsnap::system::collector::Collector;
use procsnap::system::host::HostInfo;
use procsnap::system::kernel::Kernel;
use procsnap::system::platform;
use procsnap::system::sampler::{CpuHistory, SystemSampler};
use procsnap::system::snapshot::{SystemSnapshot, SystemUsage};
use procsnap::telemetry;

#[derive(Parser)]
#[command(
    name = "procsnap",
    about = "Periodic process inventory and host resource sampling"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sampling interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Stop after this many cycles (0 runs until interrupted)
    #[arg(long)]
    cycles: Option<u64>,

    /// Output format: text, json
    #[arg(long)]
    format: Option<String>,

    /// Number of processes listed in text output
    #[arg(long)]
    top: Option<usize>,

    /// Sort key for text output: memory, cpu, pid
    #[arg(long)]
    sort: Option<String>,

    /// Log filter, e.g. `debug` or `procsnap=trace`
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config_for_cli(&cli)?;
    telemetry::init_tracing(&config.logging)?;

    let kernel = platform::native()?;
    let host = HostInfo::probe(&kernel)?;
    info!(
        cores = host.cpu_core_count,
        hz = host.clock_ticks_per_second,
        memory_kib = host.total_memory_kib,
        restricted = host.security_restricted,
        "host probed"
    );

    run(&kernel, host, &config).await
}

async fn run<K: Kernel>(kernel: &K, host: HostInfo, config: &Config) -> Result<()> {
    let collector = Collector::new(kernel, host);
    let sampler = SystemSampler::new(kernel, host);
    let mut history = CpuHistory::default();
    let mut usage = SystemUsage::new(&host);

    let period = Duration::from_millis(config.sampling.interval_ms.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut completed = 0u64;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!(cycles = completed, "interrupted");
                return Ok(());
            }
        }

        let snapshot = sample_cycle(&collector, &sampler, &mut history, &mut usage, host);
        emit(&snapshot, config)?;

        completed += 1;
        if config.sampling.cycles > 0 && completed >= config.sampling.cycles {
            return Ok(());
        }
    }
}

fn sample_cycle<K: Kernel>(
    collector: &Collector<'_, K>,
    sampler: &SystemSampler<'_, K>,
    history: &mut CpuHistory,
    usage: &mut SystemUsage,
    host: HostInfo,
) -> SystemSnapshot {
    let process_tree = collector.build_snapshot().unwrap_or_else(|err| {
        warn!(error = %err, "snapshot skipped for this cycle");
        Default::default()
    });
    if let Err(err) = sampler.sample_memory(usage) {
        warn!(error = %err, "memory sample failed");
    }
    if let Err(err) = sampler.sample_cpu(history, usage) {
        warn!(error = %err, "cpu sample failed");
    }
    if let Err(err) = sampler.sample_load(usage) {
        warn!(error = %err, "load sample failed");
    }

    SystemSnapshot {
        host,
        usage: usage.clone(),
        process_tree,
    }
}

fn emit(snapshot: &SystemSnapshot, config: &Config) -> Result<()> {
    match config.output.format {
        OutputFormat::Text => println!("{}", report::render_text(snapshot, &config.output)),
        OutputFormat::Json => println!("{}", report::render_json(snapshot)?),
    }
    Ok(())
}

fn load_config_for_cli(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };

    if let Some(interval) = cli.interval_ms {
        config.sampling.interval_ms = interval;
    }
    if let Some(cycles) = cli.cycles {
        config.sampling.cycles = cycles;
    }
    if let Some(ref format) = cli.format {
        config.output.format = match format.as_str() {
            "text" => OutputFormat::Text,
            "json" => OutputFormat::Json,
            other => return Err(eyre!("unknown output format `{other}`")),
        };
    }
    if let Some(top) = cli.top {
        config.output.top = top;
    }
    if let Some(ref sort) = cli.sort {
        config.output.sort = match sort.as_str() {
            "memory" => SortKey::Memory,
            "cpu" => SortKey::Cpu,
            "pid" => SortKey::Pid,
            other => return Err(eyre!("unknown sort key `{other}`")),
        };
    }
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }

    Ok(config)
}
