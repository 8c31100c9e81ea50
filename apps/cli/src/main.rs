use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;
use vidsum_core::{
    AppConfig, ChatCompletionsClient, LlmError, ObsidianConfig, ObsidianTemplate, PlatformFetcher,
    Provider, RunContext, RunOptions, TokenMonitor, VidsumError, format_duration_human,
    pipeline::{aggregate, detect_platform, fetch_video, segment_video, summarize, write_output},
};

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Copy, ValueEnum)]
enum CliProvider {
    Openai,
    Grok,
    Gemini,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Openai => Provider::Openai,
            CliProvider::Grok => Provider::Grok,
            CliProvider::Gemini => Provider::Gemini,
        }
    }
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum CliTemplate {
    #[default]
    Standard,
    Minimal,
    Timeline,
}

impl From<CliTemplate> for ObsidianTemplate {
    fn from(cli: CliTemplate) -> Self {
        match cli {
            CliTemplate::Standard => ObsidianTemplate::Standard,
            CliTemplate::Minimal => ObsidianTemplate::Minimal,
            CliTemplate::Timeline => ObsidianTemplate::Timeline,
        }
    }
}

#[derive(Parser)]
#[command(name = "vidsum", version)]
#[command(about = "Summarize YouTube and Bilibili videos from their subtitles")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Args)]
struct RunArgs {
    /// Video URL or Bilibili BV/AV id
    url: Option<String>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Minimum segment length in minutes
    #[arg(long)]
    min_minutes: Option<f64>,

    /// Maximum segment length in minutes
    #[arg(long)]
    max_minutes: Option<f64>,

    /// Target segment length in minutes; sets min to N-1 and max to N+1
    #[arg(short, long, conflicts_with_all = ["min_minutes", "max_minutes"])]
    segment_minutes: Option<f64>,

    /// AI provider (defaults to the configured one)
    #[arg(short, long)]
    provider: Option<CliProvider>,

    /// Model name (defaults to the provider's model)
    #[arg(short, long)]
    model: Option<String>,

    /// Report language, e.g. "Chinese" or "English"
    #[arg(short, long)]
    lang: Option<String>,

    /// Also export a note into this Obsidian vault
    #[arg(long)]
    obsidian_vault: Option<PathBuf>,

    /// Folder inside the vault
    #[arg(long)]
    obsidian_folder: Option<String>,

    /// Obsidian note layout
    #[arg(long, value_enum, default_value_t = CliTemplate::Standard)]
    obsidian_template: CliTemplate,

    /// Do not print the token usage report
    #[arg(long)]
    no_token_report: bool,

    /// Save token statistics as JSON next to the report
    #[arg(long)]
    save_token_stats: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Store an API key
    SetKey { key: String },
    /// Remove the stored API key
    RemoveKey,
    /// Set the default output directory
    SetOutputDir { dir: PathBuf },
    /// Set the default segment length range
    SetSegmentMinutes { min: f64, max: f64 },
    /// Delete the configuration file
    Reset,
    /// Print the configuration file path
    Path,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let spinner_style = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(spinner_style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn done(pb: &ProgressBar, msg: String, started: Instant) {
    pb.finish_with_message(format!(
        "{} {} {}",
        style("✓").green().bold(),
        msg,
        style(format!("[{}]", format_duration(started.elapsed()))).dim()
    ));
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "vidsum=warn,vidsum_core=warn",
        1 => "vidsum=info,vidsum_core=info",
        _ => "vidsum=debug,vidsum_core=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn segment_range(args: &RunArgs, config: &AppConfig) -> (f64, f64) {
    if let Some(n) = args.segment_minutes {
        return ((n - 1.0).max(1.0), n + 1.0);
    }
    let (min, max) = config.segment_minutes();
    (args.min_minutes.unwrap_or(min), args.max_minutes.unwrap_or(max))
}

fn config_command(action: ConfigAction) -> Result<()> {
    let path = AppConfig::path()?;
    let mut config = AppConfig::load_from(&path);

    match action {
        ConfigAction::Show => {
            let (min, max) = config.segment_minutes();
            println!("{} {}", style("Config:").dim(), style(path.display()).cyan());
            println!(
                "  api key:         {}",
                config
                    .masked_api_key()
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  provider:        {}", config.provider().name());
            println!(
                "  model:           {}",
                config
                    .model
                    .as_deref()
                    .unwrap_or(config.provider().config().model)
            );
            println!("  output dir:      {}", config.output_dir().display());
            println!("  segment minutes: {min} - {max}");
            println!("  report language: {}", config.report_lang());
            if let Some(vault) = &config.obsidian_vault {
                println!("  obsidian vault:  {}", vault.display());
            }
        }
        ConfigAction::SetKey { key } => {
            config.set_api_key(&key);
            config.save_to(&path)?;
            println!(
                "{} API key saved: {}",
                style("✓").green().bold(),
                config.masked_api_key().unwrap_or_default()
            );
        }
        ConfigAction::RemoveKey => {
            if config.remove_api_key() {
                config.save_to(&path)?;
                println!("{} API key removed", style("✓").green().bold());
            } else {
                println!("{}", style("No API key stored").dim());
            }
        }
        ConfigAction::SetOutputDir { dir } => {
            println!(
                "{} Output directory: {}",
                style("✓").green().bold(),
                style(dir.display()).cyan()
            );
            config.set_default_output_dir(dir);
            config.save_to(&path)?;
        }
        ConfigAction::SetSegmentMinutes { min, max } => {
            config.set_segment_minutes(min, max)?;
            config.save_to(&path)?;
            println!(
                "{} Segment length: {min} - {max} minutes",
                style("✓").green().bold()
            );
        }
        ConfigAction::Reset => {
            AppConfig::reset(&path)?;
            println!("{} Configuration reset", style("✓").green().bold());
        }
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}

async fn summarize_video(url: String, args: RunArgs) -> Result<()> {
    let config = AppConfig::load()?;
    let provider: Provider = args
        .provider
        .map(Provider::from)
        .unwrap_or_else(|| config.provider());

    // Validate API key early
    let api_key = provider.resolve_api_key(config.api_key.as_deref())?;

    let monitor = Arc::new(TokenMonitor::new());
    let llm = ChatCompletionsClient::new(provider, api_key).with_observer(monitor.clone());
    let fetcher = PlatformFetcher::new();

    let (min_segment_minutes, max_segment_minutes) = segment_range(&args, &config);
    let model = args
        .model
        .or_else(|| config.model.clone())
        .unwrap_or_else(|| provider.config().model.to_string());

    let mut options = RunOptions::new(model);
    options.output_dir = args.output.unwrap_or_else(|| config.output_dir());
    options.min_segment_minutes = min_segment_minutes;
    options.max_segment_minutes = max_segment_minutes;
    options.language = args
        .lang
        .unwrap_or_else(|| config.report_lang().to_string());
    options.rate_limit = provider.rate_limit_preset();
    options.save_token_stats = args.save_token_stats;
    options.obsidian = args
        .obsidian_vault
        .or_else(|| config.obsidian_vault.clone())
        .map(|vault| {
            let mut obsidian = ObsidianConfig::new(vault);
            if let Some(folder) = args
                .obsidian_folder
                .clone()
                .or_else(|| config.obsidian_folder.clone())
            {
                obsidian.folder_name = folder;
            }
            obsidian.template = args.obsidian_template.into();
            obsidian
        });

    println!(
        "\n{}  {}\n",
        style("vidsum").cyan().bold(),
        style("Video Summarizer").dim()
    );
    println!(
        "{} {} ({})",
        style("Provider:").dim(),
        provider.name(),
        style(&options.model).yellow()
    );
    println!("{}", style("─".repeat(60)).dim());

    let total_start = Instant::now();
    let mut ctx = RunContext::new(url, options);

    detect_platform(&mut ctx)?;
    if let Some(info) = &ctx.platform {
        println!(
            "{} {} video {}",
            style("✓").green().bold(),
            info.platform,
            style(&info.video_id).dim()
        );
    }

    // Step 1: Fetch metadata and subtitles
    let step_start = Instant::now();
    let spinner = create_spinner("Fetching video info and subtitles...");
    fetch_video(&mut ctx, &fetcher).await?;
    if let Some(video) = &ctx.video {
        done(
            &spinner,
            format!(
                "Fetched: {} ({} subtitle lines)",
                style(&video.title).bold(),
                video.fragments.len()
            ),
            step_start,
        );
    }

    // Step 2: Segment
    let step_start = Instant::now();
    let spinner = create_spinner("Segmenting subtitles...");
    segment_video(&mut ctx)?;
    let length = ctx
        .duration()
        .map(format_duration_human)
        .unwrap_or_else(|| "unknown length".to_string());
    done(
        &spinner,
        format!("Segmented: {} segments, {length}", ctx.segments.len()),
        step_start,
    );

    // Step 3: Segment summaries
    let step_start = Instant::now();
    let spinner = create_spinner(&format!(
        "Summarizing {} segments with {}...",
        ctx.segments.len(),
        provider.name()
    ));
    summarize(&mut ctx, &llm).await?;
    done(
        &spinner,
        format!("Summarized {} segments", ctx.processed.len()),
        step_start,
    );

    // Step 4: Overall summary
    let step_start = Instant::now();
    let spinner = create_spinner("Generating overall summary...");
    aggregate(&mut ctx, &llm).await?;
    done(&spinner, "Overall summary generated".to_string(), step_start);

    // Step 5: Write files
    write_output(&mut ctx, Some(monitor.as_ref())).await?;

    println!(
        "\n{} {}\n",
        style("Total time:").dim(),
        style(format_duration(total_start.elapsed())).cyan().bold()
    );

    if let Some(outputs) = &ctx.outputs {
        println!(
            "{} {}",
            style("Saved:").dim(),
            style(outputs.markdown_path.display()).cyan()
        );
        if let Some(path) = &outputs.obsidian_path {
            println!(
                "{} {}",
                style("Obsidian:").dim(),
                style(path.display()).cyan()
            );
        }
        if let Some(path) = &outputs.token_stats_path {
            println!(
                "{} {}",
                style("Token stats:").dim(),
                style(path.display()).cyan()
            );
        }
    }
    println!("{}", style("─".repeat(60)).dim());

    if let Some(overall) = &ctx.overall {
        println!("\n{}\n{}\n", style("Main theme").bold(), overall.main_theme);
        println!("{}", style("Key points").bold());
        for (i, point) in overall.key_points.iter().enumerate() {
            println!("{}. {}", i + 1, point);
        }
        println!();
    }

    if !args.no_token_report {
        println!("{}", monitor.report());
        let analysis = monitor.efficiency_analysis();
        println!("{} {}", style("Efficiency:").dim(), analysis.rating);
        for warning in &analysis.warnings {
            println!("  {} {}", style("!").yellow().bold(), warning);
        }
        for recommendation in &analysis.recommendations {
            println!("  {} {}", style("-").dim(), recommendation);
        }
    }

    Ok(())
}

fn is_missing_key(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<LlmError>(),
        Some(LlmError::MissingApiKey { .. })
    ) || matches!(
        err.downcast_ref::<VidsumError>(),
        Some(VidsumError::Llm(LlmError::MissingApiKey { .. }))
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match (cli.command, cli.run.url.clone()) {
        (Some(Commands::Config { action }), _) => config_command(action),
        (None, Some(url)) => summarize_video(url, cli.run).await,
        (None, None) => Err(anyhow::anyhow!(
            "no video URL given, run `vidsum --help` for usage"
        )),
    };

    if let Err(e) = result {
        eprintln!("\n{} {}", style("Error:").red().bold(), e);
        if is_missing_key(&e) {
            eprintln!(
                "{} set the provider's API key env var or run {}",
                style("Hint:").yellow().bold(),
                style("vidsum config set-key <KEY>").cyan()
            );
        }
        std::process::exit(1);
    }

    Ok(())
}
