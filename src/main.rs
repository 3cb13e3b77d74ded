//! Autotyper - 输入自动化序列器
//!
//! 入口：解析命令行、初始化日志、加载配置，按子命令组装驱动 / 运行器 / AI 注册表。

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use autotyper::action::{create_driver, special_keys_help};
use autotyper::ai::{AiResponse, ProviderRegistry};
use autotyper::config::{load_config, AppConfig};
use autotyper::observability;
use autotyper::sequence::{
    format_duration, load_sequence, save_sequence, ActionSequence, ProgressEvent, RunEvent,
    RunOutcome, SequenceRunner,
};

#[derive(Parser)]
#[command(name = "autotyper")]
#[command(about = "Record-free input automation: typed text, clicks, hotkeys, scrolls and drags")]
#[command(version)]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// 调试日志
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sequence file
    Run {
        file: PathBuf,
        /// Enable looping with this many iterations
        #[arg(long)]
        loops: Option<u32>,
        /// Seconds to wait between iterations
        #[arg(long)]
        interval: Option<f64>,
        /// Keep going when an action fails
        #[arg(long)]
        continue_on_error: bool,
        /// Seconds to count down before the first action
        #[arg(long)]
        countdown: Option<u64>,
        /// Log actions instead of sending input
        #[arg(long)]
        dry_run: bool,
        /// Print progress as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Check a sequence file for problems
    Validate { file: PathBuf },
    /// List the actions in a sequence file
    Show { file: PathBuf },
    /// List the special keys usable inside typed text
    Keys,
    /// Generate actions from a natural-language description
    Generate {
        prompt: String,
        /// Save the generated actions as a sequence file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Sequence name used when saving
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Ask the AI provider to explain a sequence
    Explain {
        file: PathBuf,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Ask the AI provider for optimization suggestions
    Optimize {
        file: PathBuf,
        #[arg(long)]
        provider: Option<String>,
    },
    /// List configured AI providers
    Providers,
    /// Send a test request to an AI provider
    TestConnection {
        #[arg(long)]
        provider: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init_with_default(if cli.verbose { "debug" } else { "info" });

    let config = load_config(cli.config.clone()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            file,
            loops,
            interval,
            continue_on_error,
            countdown,
            dry_run,
            json,
        } => {
            let mut sequence = open_sequence(&file)?;
            if let Some(loops) = loops {
                sequence.loop_enabled = true;
                sequence.loop_count = loops;
            }
            if let Some(interval) = interval {
                sequence.repeat_interval = interval;
            }
            if continue_on_error {
                sequence.stop_on_error = false;
            }
            let driver_name = if dry_run { "dry-run" } else { config.engine.driver.as_str() };
            let countdown = countdown.unwrap_or(config.engine.countdown_secs);
            run_sequence(sequence, driver_name, countdown, json).await
        }
        Commands::Validate { file } => {
            let sequence = open_sequence(&file)?;
            let problems = sequence.validate();
            if problems.is_empty() {
                println!("{} is valid ({} actions)", file.display(), sequence.len());
                return Ok(());
            }
            for problem in &problems {
                println!("- {problem}");
            }
            bail!("{} has {} problem(s)", file.display(), problems.len());
        }
        Commands::Show { file } => {
            let sequence = open_sequence(&file)?;
            print_sequence(&sequence);
            Ok(())
        }
        Commands::Keys => {
            print!("{}", special_keys_help());
            Ok(())
        }
        Commands::Generate {
            prompt,
            output,
            name,
            provider,
        } => {
            let registry = build_registry(&config, provider.as_deref())?;
            let response = expect_success(registry.generate_actions_from_text(&prompt).await)?;
            let actions = response.actions.unwrap_or_default();
            if actions.is_empty() {
                println!("{}", response.content);
                bail!("The provider response contained no usable actions");
            }

            let mut sequence = new_sequence(
                &config,
                name.unwrap_or_else(|| "Generated Sequence".to_string()),
            );
            sequence.description = prompt;
            for action in actions {
                sequence.add_action(action)?;
            }
            print_sequence(&sequence);

            if let Some(output) = output {
                let path = resolve_output(&config, output);
                save_sequence(&mut sequence, &path)
                    .with_context(|| format!("Failed to save {}", path.display()))?;
                println!("\nSaved to {}", path.display());
            }
            Ok(())
        }
        Commands::Explain { file, provider } => {
            let sequence = open_sequence(&file)?;
            let registry = build_registry(&config, provider.as_deref())?;
            let response =
                expect_success(registry.explain_action_sequence(sequence.actions()).await)?;
            println!("{}", response.content);
            Ok(())
        }
        Commands::Optimize { file, provider } => {
            let sequence = open_sequence(&file)?;
            let registry = build_registry(&config, provider.as_deref())?;
            let response =
                expect_success(registry.suggest_optimizations(sequence.actions()).await)?;
            println!("{}", response.content);
            Ok(())
        }
        Commands::Providers => {
            let registry = ProviderRegistry::from_config(&config.ai);
            let names = registry.available_providers();
            if names.is_empty() {
                println!("No AI provider configured. Set GEMINI_API_KEY or OPENAI_API_KEY, or enable one under [ai] in the config.");
                return Ok(());
            }
            for name in names {
                let marker = if registry.current_name() == Some(name) { "*" } else { " " };
                let model = registry.get(name).map(|p| p.model()).unwrap_or_default();
                println!("{marker} {name} ({model})");
            }
            Ok(())
        }
        Commands::TestConnection { provider } => {
            let registry = ProviderRegistry::from_config(&config.ai);
            match registry.test_connection(provider.as_deref()).await {
                Ok(message) => {
                    println!("{message}");
                    Ok(())
                }
                Err(error) => bail!("Connection failed: {error}"),
            }
        }
    }
}

fn open_sequence(path: &Path) -> anyhow::Result<ActionSequence> {
    let loaded = load_sequence(path).with_context(|| format!("Failed to load {}", path.display()))?;
    if loaded.skipped > 0 {
        eprintln!(
            "warning: skipped {} action(s) that could not be loaded",
            loaded.skipped
        );
    }
    Ok(loaded.sequence)
}

/// 新序列套用 [engine] 默认策略
fn new_sequence(config: &AppConfig, name: String) -> ActionSequence {
    let mut sequence = ActionSequence::new(name);
    sequence.loop_enabled = config.engine.loop_enabled;
    sequence.loop_count = config.engine.loop_count;
    sequence.repeat_interval = config.engine.repeat_interval;
    sequence.stop_on_error = config.engine.stop_on_error;
    sequence
}

/// 仅文件名时放到 sequences_dir 下
fn resolve_output(config: &AppConfig, output: PathBuf) -> PathBuf {
    let bare = output
        .parent()
        .map_or(true, |p| p.as_os_str().is_empty());
    if output.is_relative() && bare {
        config.app.sequences_dir.join(output)
    } else {
        output
    }
}

fn build_registry(config: &AppConfig, provider: Option<&str>) -> anyhow::Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::from_config(&config.ai);
    if let Some(name) = provider {
        if !registry.set_current(name) {
            bail!(
                "Provider '{}' is not available (configured: {})",
                name,
                registry.available_providers().join(", ")
            );
        }
    }
    Ok(registry)
}

fn expect_success(response: AiResponse) -> anyhow::Result<AiResponse> {
    if response.success {
        return Ok(response);
    }
    bail!(
        "{}",
        response
            .error
            .unwrap_or_else(|| "AI request failed".to_string())
    )
}

fn print_sequence(sequence: &ActionSequence) {
    println!("{}", sequence.name);
    if !sequence.description.is_empty() {
        println!("  {}", sequence.description);
    }
    let looping = if sequence.loop_enabled {
        format!(
            "{} loops, {}s apart",
            sequence.loop_count, sequence.repeat_interval
        )
    } else {
        "single pass".to_string()
    };
    println!(
        "  {}; {}; estimated {}",
        looping,
        if sequence.stop_on_error { "stop on error" } else { "continue on error" },
        format_duration(sequence.estimated_duration())
    );
    for (i, action) in sequence.actions().iter().enumerate() {
        let disabled = if action.enabled { "" } else { " (disabled)" };
        println!(
            "{:>3}. [{}] {}{}",
            i + 1,
            action.name,
            action.description(),
            disabled
        );
    }
}

async fn run_sequence(
    sequence: ActionSequence,
    driver_name: &str,
    countdown: u64,
    json: bool,
) -> anyhow::Result<()> {
    let driver = create_driver(driver_name)?;
    let runner = SequenceRunner::new().with_countdown(countdown);
    let mut handle = runner.start(sequence, driver)?;

    let token = handle.cancel_token();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            tracing::info!("Received Ctrl+C, stopping sequence...");
            token.cancel();
        }
    });

    while let Some(event) = handle.next_event().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
            continue;
        }
        match event {
            RunEvent::Countdown { remaining } => println!("Starting in {remaining}..."),
            RunEvent::Progress(ProgressEvent::Action {
                loop_index,
                loop_count,
                action_index,
                total_actions,
                action,
            }) => println!(
                "[loop {}/{loop_count}] {}/{total_actions}: {action}",
                loop_index + 1,
                action_index + 1
            ),
            RunEvent::Progress(ProgressEvent::LoopPause { interval_secs, .. }) => {
                println!("Waiting {interval_secs}s before next loop...")
            }
            RunEvent::Progress(ProgressEvent::ActionFailed {
                action_index,
                error,
                ..
            }) => println!("Action {} failed: {error}", action_index + 1),
            RunEvent::Finished { .. } => {}
        }
    }

    let report = handle.wait().await?;
    match report.outcome {
        RunOutcome::Completed => println!("Sequence '{}' completed", report.sequence.name),
        RunOutcome::Stopped => println!("Sequence '{}' stopped", report.sequence.name),
        RunOutcome::Failed => bail!("Sequence '{}' failed", report.sequence.name),
    }
    Ok(())
}
