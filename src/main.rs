use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use s3sync_lib::config::{self, StoreConfig, StoreOverrides, SyncSettings};
use s3sync_lib::core::Analysis;
use s3sync_lib::logging::{self, LogConfig, SizeRotatingWriter};
use s3sync_lib::storage::{OsFs, S3Storage};
use s3sync_lib::{Direction, RemoteLocation, SyncConfig, SyncEngine, SyncReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "s3sync",
    version,
    about = "Sync a local folder with an S3 prefix using a manifest of modification times"
)]
struct Cli {
    /// 配置目录（包含 config.json 与日志）
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// 输出 debug 日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    #[arg(long, global = true, env = "S3_ENDPOINT")]
    endpoint: Option<String>,

    #[arg(long, global = true, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    access_key: Option<String>,

    #[arg(long, global = true, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// 两行格式的密钥文件（access key / secret key）
    #[arg(long, global = true)]
    keys_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct SyncArgs {
    /// 远程位置: <bucket>/<prefix>
    remote: String,
    /// 本地目录
    local: PathBuf,
    /// 每成功上传多少个文件保存一次远程清单（0 = 只在结束时保存）
    #[arg(long)]
    checkpoint_interval: Option<usize>,
    /// 以 JSON 输出同步报告
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 本地 -> 远程
    #[command(visible_alias = "backup")]
    Push(SyncArgs),
    /// 远程 -> 本地
    #[command(visible_alias = "restore")]
    Pull(SyncArgs),
    /// 只计算差异，不做任何修改
    Plan {
        direction: DirectionArg,
        remote: String,
        local: PathBuf,
    },
    /// 根据对象列表重新生成远程清单
    #[command(visible_alias = "update-s3-manifest")]
    RebuildManifest { remote: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DirectionArg {
    Push,
    Pull,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Push => Direction::Push,
            DirectionArg::Pull => Direction::Pull,
        }
    }
}

/// 初始化日志系统
fn init_logging(config_dir: &Path, verbose: bool) {
    let config = LogConfig::load(config_dir);
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config.tracing_level()
    };

    let env_filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("opendal=warn".parse().expect("valid directive"))
        .add_directive("hyper=warn".parse().expect("valid directive"))
        .add_directive("reqwest=warn".parse().expect("valid directive"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = if config.enabled {
        SizeRotatingWriter::new(&logging::log_dir(config_dir), config.max_size_mb)
            .ok()
            .map(|writer| {
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false)
            })
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

fn store_config(cli: &Cli, config_dir: &Path) -> anyhow::Result<StoreConfig> {
    let mut store = StoreConfig::load(config_dir);
    store.merge_overrides(StoreOverrides {
        region: cli.region.clone(),
        endpoint: cli.endpoint.clone(),
        access_key: cli.access_key.clone(),
        secret_key: cli.secret_key.clone(),
        keys_file: cli.keys_file.clone(),
    })?;
    store.validate()?;
    Ok(store)
}

fn build_engine(
    cli: &Cli,
    config_dir: &Path,
    location: &RemoteLocation,
    sync_config: SyncConfig,
) -> anyhow::Result<SyncEngine> {
    let store_config = store_config(cli, config_dir)?;
    let store = S3Storage::new(&location.bucket, &store_config)
        .context("failed to initialise S3 client")?;
    Ok(SyncEngine::with_config(
        Arc::new(store),
        Arc::new(OsFs),
        sync_config,
    ))
}

fn print_report(report: &SyncReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!(
            "{} {}: {} transferred, {} deleted, {} skipped, {} unchanged ({} checkpoints, {} ms)",
            report.direction,
            report.remote,
            report.stats.transferred,
            report.stats.deleted,
            report.stats.skipped,
            report.unchanged,
            report.stats.checkpoints,
            report.duration_ms
        );
    }
    Ok(())
}

fn print_plan(direction: Direction, analysis: &Analysis) {
    let verb = match direction {
        Direction::Push => "upload",
        Direction::Pull => "download",
    };
    for path in &analysis.plan.to_transfer {
        println!("{}\t{}", verb, path);
    }
    for path in &analysis.plan.to_delete {
        println!("delete\t{}", path);
    }
    println!(
        "{} to {}, {} to delete, {} unchanged",
        analysis.plan.to_transfer.len(),
        verb,
        analysis.plan.to_delete.len(),
        analysis.plan.unchanged
    );
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_dir = cli.config_dir.clone().unwrap_or_else(config::config_dir);
    init_logging(&config_dir, cli.verbose);

    match &cli.command {
        Command::Push(args) | Command::Pull(args) => {
            let direction = if matches!(cli.command, Command::Push(_)) {
                Direction::Push
            } else {
                Direction::Pull
            };
            let location = RemoteLocation::parse(&args.remote)?;

            let mut sync_config: SyncConfig = SyncSettings::load(&config_dir).into();
            if let Some(interval) = args.checkpoint_interval {
                sync_config.checkpoint_interval = interval;
            }

            let engine = build_engine(&cli, &config_dir, &location, sync_config)?;
            let report = engine.reconcile(direction, &args.local, &location).await?;
            print_report(&report, args.json)?;
        }
        Command::Plan {
            direction,
            remote,
            local,
        } => {
            let direction = Direction::from(*direction);
            let location = RemoteLocation::parse(remote)?;
            let engine = build_engine(&cli, &config_dir, &location, SyncConfig::default())?;
            let analysis = engine.analyze(direction, local, &location).await?;
            print_plan(direction, &analysis);
        }
        Command::RebuildManifest { remote } => {
            let location = RemoteLocation::parse(remote)?;
            let engine = build_engine(&cli, &config_dir, &location, SyncConfig::default())?;
            let inventory = engine.rebuild_remote_inventory(&location).await?;
            println!("rebuilt {} with {} entries", location.manifest_key(), inventory.len());
        }
    }

    tracing::info!("Completed.");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
