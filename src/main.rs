//! Salvage - recover misnamed and deleted files
//!
//! Carve mode scans an accessible directory tree by content signature;
//! filesystem mode walks a device or image (deleted entries included) and
//! extracts entries with bounded random-access reads; trash mode copies a
//! recycle bin out as is.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use salvage::cli::{CarveArgs, Cli, Commands, ConfigArgs, FsArgs, OutputFormat, TrashArgs};
use salvage::config::{generate_sample_config, Config};
use salvage::source::devices::format_device_table;
use salvage::source::{platform_enumerator, LayoutProvider, RawDecoder};
use salvage::{RecoveryJob, RecoveryReport, SignatureCatalog};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let settings = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    init_logging(&cli, &settings)?;

    match cli.command {
        Commands::Carve(args) => run_carve(args, &settings).await,
        Commands::Fs(args) => run_fs(args, &settings).await,
        Commands::Trash(args) => run_trash(args, &settings).await,
        Commands::Devices => {
            let devices = platform_enumerator()
                .list()
                .context("Failed to enumerate devices")?;
            if devices.is_empty() {
                println!("No devices found");
            } else {
                print!("{}", format_device_table(&devices));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Catalog(args) => {
            let path = args.catalog.or_else(|| settings.recovery.catalog.clone());
            let catalog = load_catalog(path.as_deref())?;
            println!("{:<10} {:<34} FOOTER", "TYPE", "HEADER");
            for def in catalog.iter() {
                println!(
                    "{:<10} {:<34} {}",
                    def.type_name(),
                    hex::encode_upper(def.header()),
                    def.footer().map(hex::encode_upper).unwrap_or_else(|| "-".into())
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config(args) => run_config(args, cli.config.as_deref(), &settings),
    }
}

fn init_logging(cli: &Cli, settings: &Config) -> Result<()> {
    let level = if cli.verbose {
        "debug"
    } else {
        settings.general.log_level.as_str()
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn").add_directive(format!("salvage={}", level).parse()?),
    };

    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).compact())
            .with(filter)
            .init();
    }
    Ok(())
}

fn load_catalog(path: Option<&std::path::Path>) -> Result<SignatureCatalog> {
    match path {
        Some(path) => Ok(SignatureCatalog::load(path)?),
        None => Ok(SignatureCatalog::builtin()),
    }
}

async fn run_carve(args: CarveArgs, settings: &Config) -> Result<ExitCode> {
    let catalog = load_catalog(args.catalog_path(settings).as_deref())?;
    let config = args.to_config(settings)?;
    let job = RecoveryJob::new(config).with_catalog(catalog);
    execute(job, args.common.output_format).await
}

async fn run_fs(args: FsArgs, settings: &Config) -> Result<ExitCode> {
    let config = args.to_config(settings)?;
    let job = RecoveryJob::new(config)
        .with_decoder(Arc::new(RawDecoder))
        .with_provider(Arc::new(LayoutProvider::new(&args.layout)));
    execute(job, args.common.output_format).await
}

async fn run_trash(args: TrashArgs, settings: &Config) -> Result<ExitCode> {
    let config = args.to_config(settings)?;
    execute(RecoveryJob::new(config), args.common.output_format).await
}

/// Run a job on the blocking pool; Ctrl-C trips its cancel token
async fn execute(job: RecoveryJob, format: OutputFormat) -> Result<ExitCode> {
    let cancel = job.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping recovery");
            cancel.cancel();
        }
    });

    let result = tokio::task::spawn_blocking(move || job.run())
        .await
        .context("Recovery task failed")?;
    interrupt.abort();

    let report = result?;
    print_report(&report, format)?;

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn print_report(report: &RecoveryReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => print!("{}", report.summary()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

fn run_config(
    args: ConfigArgs,
    explicit: Option<&std::path::Path>,
    settings: &Config,
) -> Result<ExitCode> {
    let path = explicit
        .map(|p| p.to_path_buf())
        .unwrap_or_else(Config::default_path);

    if args.init {
        if Config::init_at(&path)? {
            println!("Created {}", path.display());
        } else {
            println!("Config already exists at {}", path.display());
        }
    } else if args.show {
        println!("# {}", path.display());
        print!("{}", toml::to_string_pretty(settings)?);
    } else {
        println!("Config path: {}", path.display());
        if !path.exists() {
            println!("\nNo config file yet. Sample:\n");
            print!("{}", generate_sample_config());
        }
    }
    Ok(ExitCode::SUCCESS)
}
