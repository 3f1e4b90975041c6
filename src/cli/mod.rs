//! CLI module - Command line interface definitions and handlers

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::Config;
use crate::job::{RecoveryConfig, SourceKind};
use crate::source::platform_trash_dir;

/// Salvage - recover misnamed and deleted files
///
/// Carve mode finds files on a mounted tree by content signature.
/// Filesystem mode walks a device or image through an extent map and
/// brings back deleted entries. Trash mode copies a recycle bin out as is.
/// Sources are only ever read.
#[derive(Parser, Debug)]
#[command(name = "salvage")]
#[command(version)]
#[command(about = "Recover misnamed and deleted files", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Recover misnamed files from a directory tree by signature
    Carve(CarveArgs),

    /// Recover deleted files from a device or image
    Fs(FsArgs),

    /// Quick scan: copy everything out of the trash or recycle bin
    Trash(TrashArgs),

    /// List attached devices and volumes
    Devices,

    /// Show the signature catalog
    Catalog(CatalogArgs),

    /// Show or create the config file
    Config(ConfigArgs),
}

/// Options shared by both recovery modes
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Recover one path instead of scanning everything
    #[arg(long, short)]
    pub path: Option<String>,

    /// Number of parallel copy workers
    #[arg(long, short)]
    pub workers: Option<usize>,

    /// Bytes per read (default: 1 MiB)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Do not write the JSON manifest
    #[arg(long)]
    pub no_manifest: bool,

    /// Report format
    #[arg(long, value_enum, default_value = "human")]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Parser)]
pub struct CarveArgs {
    /// Directory tree to scan
    #[arg(required = true)]
    pub source: PathBuf,

    /// Destination directory (created if missing)
    pub dest: Option<PathBuf>,

    /// Only look for these catalog types (e.g. jpg,png,pdf)
    #[arg(long, short = 't', value_delimiter = ',')]
    pub types: Vec<String>,

    /// Signature catalog file (JSON)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, Parser)]
pub struct FsArgs {
    /// Device node or image file
    #[arg(required = true)]
    pub source: PathBuf,

    /// Destination directory (created if missing)
    pub dest: Option<PathBuf>,

    /// Extent-map layout exported by a metadata tool (JSON)
    #[arg(long, short = 'l', required = true)]
    pub layout: PathBuf,

    /// Source kind
    #[arg(long, value_enum, default_value = "image")]
    pub kind: SourceKindArg,

    /// Recover allocated files too, not only deleted ones
    #[arg(long, short = 'a')]
    pub include_unallocated: bool,

    /// Recover deleted files only, overriding the config file
    #[arg(long, conflicts_with = "include_unallocated")]
    pub deleted_only: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, Parser)]
pub struct TrashArgs {
    /// Trash folder (default: this user's trash or recycle bin)
    #[arg(long)]
    pub from: Option<PathBuf>,

    /// Destination directory (created if missing)
    pub dest: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, Parser)]
pub struct CatalogArgs {
    /// Signature catalog file (JSON)
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Clone, Parser)]
pub struct ConfigArgs {
    /// Write a commented sample config if none exists
    #[arg(long, conflicts_with = "show")]
    pub init: bool,

    /// Print the effective settings
    #[arg(long)]
    pub show: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human readable (default)
    Human,
    /// JSON output
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKindArg {
    /// Live block device
    Device,
    /// Raw image file
    Image,
}

impl From<SourceKindArg> for SourceKind {
    fn from(kind: SourceKindArg) -> Self {
        match kind {
            SourceKindArg::Device => SourceKind::Device,
            SourceKindArg::Image => SourceKind::Image,
        }
    }
}

fn destination(dest: &Option<PathBuf>, settings: &Config) -> Result<PathBuf> {
    dest.clone()
        .or_else(|| settings.output.default_dest.clone())
        .context("No destination given and no output.default_dest in config")
}

fn apply_common(
    mut config: RecoveryConfig,
    common: &CommonArgs,
    settings: &Config,
) -> RecoveryConfig {
    config.workers = common.workers.unwrap_or(settings.recovery.workers);
    config.chunk_size = common.chunk_size.unwrap_or(settings.recovery.chunk_size);
    config.write_manifest = settings.output.write_manifest && !common.no_manifest;
    config.manifest_name = settings.output.manifest_name.clone();
    config.target_path = common.path.clone();
    config
}

impl CarveArgs {
    /// Job settings from flags, falling back to the config file
    pub fn to_config(&self, settings: &Config) -> Result<RecoveryConfig> {
        let config = RecoveryConfig::carve(&self.source, destination(&self.dest, settings)?)
            .with_types(self.types.iter().map(|t| t.trim().to_string()));
        Ok(apply_common(config, &self.common, settings))
    }

    /// Catalog file from the flag, else from the config file
    pub fn catalog_path(&self, settings: &Config) -> Option<PathBuf> {
        self.catalog.clone().or_else(|| settings.recovery.catalog.clone())
    }
}

impl FsArgs {
    pub fn to_config(&self, settings: &Config) -> Result<RecoveryConfig> {
        let config = RecoveryConfig::filesystem(
            &self.source,
            self.kind.into(),
            destination(&self.dest, settings)?,
        )
        .with_include_unallocated(self.include_unallocated(settings));
        Ok(apply_common(config, &self.common, settings))
    }

    /// An explicit flag wins over the config file
    fn include_unallocated(&self, settings: &Config) -> bool {
        if self.include_unallocated {
            true
        } else if self.deleted_only {
            false
        } else {
            settings.recovery.include_unallocated
        }
    }
}

impl TrashArgs {
    pub fn to_config(&self, settings: &Config) -> Result<RecoveryConfig> {
        let source = self
            .from
            .clone()
            .or_else(platform_trash_dir)
            .context("No trash folder known for this platform; pass --from")?;
        let config = RecoveryConfig::trash(source, destination(&self.dest, settings)?);
        Ok(apply_common(config, &self.common, settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_carve_flags_override_settings() {
        let cli = Cli::parse_from([
            "salvage", "carve", "/mnt/usb", "/tmp/out", "-t", "JPG,png", "-w", "8",
        ]);
        let Commands::Carve(args) = cli.command else {
            panic!("expected carve");
        };
        let config = args.to_config(&Config::default()).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.chunk_size, crate::extract::DEFAULT_CHUNK_SIZE);
        assert!(config.selected_types.contains("JPG"));
        assert!(config.selected_types.contains("png"));
        assert!(config.write_manifest);
    }

    #[test]
    fn test_fs_requires_layout() {
        assert!(Cli::try_parse_from(["salvage", "fs", "disk.img", "out"]).is_err());
        let cli = Cli::try_parse_from([
            "salvage", "fs", "/dev/sdb", "out", "--layout", "map.json", "--kind", "device", "-a",
            "--no-manifest",
        ])
        .unwrap();
        let Commands::Fs(args) = cli.command else {
            panic!("expected fs");
        };
        let config = args.to_config(&Config::default()).unwrap();
        assert_eq!(config.source_kind, SourceKind::Device);
        assert!(config.include_unallocated);
        assert!(!config.write_manifest);
    }

    #[test]
    fn test_types_keep_their_case() {
        // Catalog keys are case-sensitive; matching is left to the catalog
        let cli = Cli::parse_from(["salvage", "carve", "/src", "/out", "-t", " MP4 ,jpg"]);
        let Commands::Carve(args) = cli.command else {
            panic!("expected carve");
        };
        let config = args.to_config(&Config::default()).unwrap();
        let types: Vec<_> = config.selected_types.iter().map(String::as_str).collect();
        assert_eq!(types, vec!["MP4", "jpg"]);

        let catalog = crate::SignatureCatalog::from_json(r#"{"MP4": {"header": "00"}}"#).unwrap();
        let selected: std::collections::BTreeSet<String> =
            ["MP4".to_string()].into_iter().collect();
        assert_eq!(catalog.restrict(&selected).unwrap().len(), 1);
    }

    #[test]
    fn test_deleted_only_overrides_settings() {
        let mut settings = Config::default();
        settings.recovery.include_unallocated = true;

        let parse = |extra: &[&str]| {
            let mut argv = vec!["salvage", "fs", "disk.img", "out", "-l", "map.json"];
            argv.extend_from_slice(extra);
            let Commands::Fs(args) = Cli::parse_from(argv).command else {
                panic!("expected fs");
            };
            args.to_config(&settings).unwrap().include_unallocated
        };
        assert!(parse(&[]));
        assert!(!parse(&["--deleted-only"]));
        assert!(parse(&["-a"]));

        assert!(Cli::try_parse_from([
            "salvage", "fs", "disk.img", "out", "-l", "map.json", "-a", "--deleted-only",
        ])
        .is_err());
    }

    #[test]
    fn test_trash_from_flag() {
        let cli = Cli::parse_from(["salvage", "trash", "--from", "/bin-folder", "/out", "-w", "2"]);
        let Commands::Trash(args) = cli.command else {
            panic!("expected trash");
        };
        let config = args.to_config(&Config::default()).unwrap();
        assert_eq!(config.mode, crate::RecoveryMode::Trash);
        assert_eq!(config.source, PathBuf::from("/bin-folder"));
        assert_eq!(config.source_kind, SourceKind::Directory);
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn test_destination_falls_back_to_settings() {
        let cli = Cli::parse_from(["salvage", "carve", "/src"]);
        let Commands::Carve(args) = cli.command else {
            panic!("expected carve");
        };
        assert!(args.to_config(&Config::default()).is_err());

        let mut settings = Config::default();
        settings.output.default_dest = Some(PathBuf::from("/recovered"));
        let config = args.to_config(&settings).unwrap();
        assert_eq!(config.destination_dir, PathBuf::from("/recovered"));
    }
}
