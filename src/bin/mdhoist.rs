//! CLI binary for mdhoist.
//!
//! A thin shim over the library crate: flags and a TOML config file map onto
//! `HoistConfig`, documents are loaded from disk, and results are printed.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mdhoist::{
    CloudKind, HoistConfig, InMemoryDocument, MarkStyle, Orchestrator, ProcessingContext,
    ProgressSink, RenamePolicy,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

// ── CLI definition ───────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "mdhoist",
    version,
    about = "Hoist local images out of Markdown documents onto a remote image host",
    after_help = "Provider credentials are read from the TOML config file (see --config).\n\
                  Example:\n\
                  \n\
                      provider = \"smms\"\n\
                  \n\
                      [smms]\n\
                      token = \"…\"\n"
)]
struct Cli {
    /// Markdown files to process.
    #[arg(required_unless_present = "probe")]
    files: Vec<PathBuf>,

    /// Storage provider (overrides the config file).
    #[arg(long, value_name = "NAME")]
    provider: Option<String>,

    /// TOML config file with provider settings.
    #[arg(long, value_name = "PATH", default_value = "mdhoist.toml", env = "MDHOIST_CONFIG")]
    config: PathBuf,

    /// Download remote images and re-host them instead of uploading local ones.
    #[arg(long)]
    rehost: bool,

    /// Run the pipeline but leave the documents untouched.
    #[arg(long)]
    dry_run: bool,

    /// Upload filename policy: keep, date, or random.
    #[arg(long, value_name = "POLICY")]
    rename: Option<String>,

    /// Markup written back: original, common, or zoom.
    #[arg(long, value_name = "STYLE")]
    mark: Option<String>,

    /// Upper bound on concurrent uploads.
    #[arg(long, value_name = "N")]
    upload_concurrency: Option<usize>,

    /// Upper bound on concurrent downloads (rehost mode).
    #[arg(long, value_name = "N")]
    download_concurrency: Option<usize>,

    /// Validate the configured credentials with a tiny test upload, then exit.
    #[arg(long)]
    probe: bool,

    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

// ── Config file ──────────────────────────────────────────────────────────────

/// On-disk configuration. Everything is optional; flags win over the file.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    provider: Option<String>,
    rename: Option<String>,
    mark: Option<String>,
    aliyun: Option<mdhoist::AliyunSettings>,
    tencent: Option<mdhoist::TencentSettings>,
    qiniu: Option<mdhoist::QiniuSettings>,
    github: Option<mdhoist::RepoSettings>,
    gitee: Option<mdhoist::RepoSettings>,
    smms: Option<mdhoist::SmmsSettings>,
    custom: Option<mdhoist::CustomSettings>,
    piclist: Option<mdhoist::PicListSettings>,
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file '{}'", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config file '{}'", path.display()))
}

fn parse_rename(s: &str) -> Result<RenamePolicy> {
    match s.to_lowercase().as_str() {
        "keep" | "keep_name" => Ok(RenamePolicy::KeepName),
        "date" | "date_prefixed" => Ok(RenamePolicy::DatePrefixed),
        "random" => Ok(RenamePolicy::Random),
        other => bail!("unknown rename policy '{other}' (expected keep, date, or random)"),
    }
}

fn parse_mark(s: &str) -> Result<MarkStyle> {
    match s.to_lowercase().as_str() {
        "original" => Ok(MarkStyle::Original),
        "common" => Ok(MarkStyle::HtmlCommon),
        "zoom" => Ok(MarkStyle::HtmlZoom),
        other => bail!("unknown mark style '{other}' (expected original, common, or zoom)"),
    }
}

fn build_config(cli: &Cli, file: FileConfig) -> Result<HoistConfig> {
    let provider = cli
        .provider
        .as_deref()
        .or(file.provider.as_deref())
        .context("no provider selected; pass --provider or set it in the config file")?;
    let cloud: CloudKind = provider.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let mut builder = HoistConfig::builder().cloud(cloud).dry_run(cli.dry_run);
    if let Some(s) = file.aliyun {
        builder = builder.aliyun(s);
    }
    if let Some(s) = file.tencent {
        builder = builder.tencent(s);
    }
    if let Some(s) = file.qiniu {
        builder = builder.qiniu(s);
    }
    if let Some(s) = file.github {
        builder = builder.github(s);
    }
    if let Some(s) = file.gitee {
        builder = builder.gitee(s);
    }
    if let Some(s) = file.smms {
        builder = builder.smms(s);
    }
    if let Some(s) = file.custom {
        builder = builder.custom(s);
    }
    if let Some(s) = file.piclist {
        builder = builder.piclist(s);
    }
    if let Some(policy) = cli.rename.as_deref().or(file.rename.as_deref()) {
        builder = builder.rename(parse_rename(policy)?);
    }
    if let Some(style) = cli.mark.as_deref().or(file.mark.as_deref()) {
        builder = builder.mark_style(parse_mark(style)?);
    }
    if let Some(n) = cli.upload_concurrency {
        builder = builder.upload_concurrency(n);
    }
    if let Some(n) = cli.download_concurrency {
        builder = builder.download_concurrency(n);
    }
    Ok(builder.build()?)
}

// ── Progress rendering ───────────────────────────────────────────────────────

/// Terminal progress sink: one indicatif bar, stage name as the prefix,
/// current item as the message.
struct CliProgressSink {
    bar: ProgressBar,
}

impl CliProgressSink {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(1000);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {percent:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for CliProgressSink {
    fn set_primary(&self, text: &str) {
        self.bar.set_prefix(text.to_string());
    }

    fn set_secondary(&self, text: &str) {
        self.bar.set_message(text.to_string());
    }

    fn set_fraction(&self, fraction: f64) {
        self.bar.set_position((fraction * 1000.0) as u64);
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "mdhoist=debug,info",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    let file_config = load_file_config(&cli.config)?;
    let config = build_config(&cli, file_config)?;

    if cli.probe {
        return probe(&config).await;
    }
    hoist(&cli, &config).await
}

/// One-byte test upload against the selected provider's settings bag.
async fn probe(config: &HoistConfig) -> Result<()> {
    let bag = config
        .selected_provider()
        .with_context(|| format!("no settings for provider '{}' in the config file", config.cloud))?;
    let registry = mdhoist::ClientRegistry::new(config.clone());
    let client = registry.client(config.cloud)?;

    // A 1×1 transparent PNG — small, valid, accepted everywhere.
    const PROBE_PNG: &[u8] = &[
        0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
        0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x62, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
    ];

    match client.probe(PROBE_PNG, "mdhoist-probe.png", &bag).await {
        Ok(url) => {
            println!("{} credentials work: {}", green("✓"), url);
            Ok(())
        }
        Err(e) => {
            println!("{} probe failed: {e}", red("✗"));
            std::process::exit(1);
        }
    }
}

async fn hoist(cli: &Cli, config: &HoistConfig) -> Result<()> {
    let mut ctx = ProcessingContext::new(config.clone());
    for path in &cli.files {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read '{}'", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        ctx.attach_document(Box::new(InMemoryDocument::with_base_dir(name, text, base_dir)));
    }

    let sink = CliProgressSink::new();
    ctx = ctx.with_progress_sink(sink.clone());

    let orchestrator = if cli.rehost {
        Orchestrator::rehost_chain(config)
    } else {
        Orchestrator::hoist_chain(config)
    };
    let summary = orchestrator.run(&mut ctx).await?;
    sink.finish();

    // Persist rewritten documents.
    if !config.dry_run {
        for (slot, path) in ctx.slots().iter().zip(&cli.files) {
            std::fs::write(path, slot.document.text())
                .with_context(|| format!("cannot write '{}'", path.display()))?;
        }
    }

    if let Some(stage) = &summary.aborted_at {
        println!("{} stopped early at '{stage}'", dim("•"));
    }
    let stats = summary.stats;
    if cli.rehost {
        println!(
            "{} {} downloaded ({} failed), {} uploaded ({} failed)",
            green("✓"),
            stats.downloaded,
            stats.download_failed,
            stats.uploaded,
            stats.upload_failed
        );
    } else {
        println!(
            "{} {} uploaded, {} failed",
            if stats.upload_failed == 0 { green("✓") } else { red("✗") },
            stats.uploaded,
            stats.upload_failed
        );
    }
    if stats.upload_failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
