// Copyright 2025 TrafficFlou contributors

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use trafficflou::metrics::logger::RequestLogger;
use trafficflou::metrics::report;
use trafficflou::prelude::*;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args)]
struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long, env = "TRAFFICFLOU_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(short, long)]
        target: Option<String>,
        #[arg(short, long)]
        duration: Option<u64>,
        #[arg(short = 'n', long)]
        sessions: Option<u32>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(short, long)]
        rate: Option<f64>,
        #[arg(short, long)]
        strategy: Option<String>,
        /// Pin every session to this profile
        #[arg(short, long)]
        profile: Option<String>,
        #[arg(long)]
        seed: Option<u64>,
        /// Same as --strategy fixed
        #[arg(long)]
        no_adapt: bool,
        #[arg(long)]
        request_log: Option<PathBuf>,
        #[arg(long)]
        report_dir: Option<PathBuf>,
        #[arg(long)]
        no_progress: bool,
    },

    /// Validate the configuration and print the resolved page table
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },

    Profiles {
        #[command(flatten)]
        config: ConfigArgs,
    },

    Strategies,
}

#[tokio::main]
async fn main() -> Result<()> {
    let program_start = Instant::now();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            config,
            target,
            duration,
            sessions,
            concurrency,
            rate,
            strategy,
            profile,
            seed,
            no_adapt,
            request_log,
            report_dir,
            no_progress,
        } => {
            let mut config = load_config(config.config.as_ref())?;

            if let Some(target) = target {
                config.target_base_url = target;
            }
            if let Some(duration) = duration {
                config.duration_secs = duration;
            }
            if let Some(sessions) = sessions {
                config.sessions = sessions;
            }
            if let Some(concurrency) = concurrency {
                config.max_concurrent_sessions = concurrency;
            }
            if let Some(rate) = rate {
                config.initial_rate_per_minute = rate;
            }
            if let Some(strategy) = strategy {
                config.rate_strategy = strategy;
            }
            if no_adapt {
                config.rate_strategy = "fixed".to_string();
            }
            if let Some(seed) = seed {
                config.seed = Some(seed);
            }
            if request_log.is_some() {
                config.request_log = request_log;
            }
            if report_dir.is_some() {
                config.report_dir = report_dir;
            }

            config.validate()?;
            run_traffic(config, ProfileSelector::from_option(profile), !no_progress).await?;
        }

        Commands::Check { config } => {
            let config = load_config(config.config.as_ref())?;
            config.validate()?;
            print_page_table(&config)?;
        }

        Commands::Profiles { config } => {
            let config = load_config(config.config.as_ref())?;

            println!("\nConfigured Profiles");
            if config.profiles.is_empty() {
                println!("  (none, sessions browse by page weight only)");
            }
            for profile in &config.profiles {
                println!(
                    "  - {} [{}] weight {:.2}: {} -> {}",
                    profile.name,
                    profile.age_range,
                    profile.weight,
                    profile.interests.join(", "),
                    profile.preferred_sequence.join(" > ")
                );
            }
            println!();
        }

        Commands::Strategies => {
            println!("\nAvailable Rate Strategies");

            for strategy in RateRegistry::global().list() {
                println!("  - {}", strategy);
            }

            println!("\nUsage: trafficflou run --strategy <name>\n");
        }
    }

    let total_time = program_start.elapsed();
    info!("Total runtime: {:.2}s", total_time.as_secs_f64());

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<TrafficConfig> {
    let mut config = match path {
        Some(path) => TrafficConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TrafficConfig::default(),
    };
    config.apply_env()?;
    config.load_user_agents_file()?;
    Ok(config)
}

async fn run_traffic(config: TrafficConfig, selector: ProfileSelector, progress: bool) -> Result<()> {
    let request_log = config
        .request_log
        .as_ref()
        .map(RequestLogger::new)
        .transpose()?;

    let mut generator = Generator::http(config)?;
    if let Some(logger) = request_log {
        generator = generator.with_request_log(logger);
    }

    let run = TrafficRun::new(generator).with_progress(progress);

    let cancel = run.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping sessions");
            cancel.cancel();
        }
    });

    let result = run.run(selector).await?;
    report::summary_table(&result);

    Ok(())
}

fn print_page_table(config: &TrafficConfig) -> Result<()> {
    let pages = config.weighted_pages()?;
    let base = trafficflou::session::config::parse_target(&config.target_base_url)
        .map_err(anyhow::Error::msg)?;

    println!("\nTarget: {}", base);
    println!("{:<24} {:>8}  {}", "Page", "Share", "URL");
    for (idx, page) in pages.pages().iter().enumerate() {
        let url = page.resolve(&base)?;
        println!("{:<24} {:>7.2}%  {}", page.name, pages.normalized_weight(idx) * 100.0, url);
    }
    println!(
        "\nRate: {:.1} req/min ({}), bounds [{:.1}, {:.1}]",
        config.initial_rate_per_minute,
        config.rate_strategy,
        config.adaptation.min_rate_per_minute,
        config.adaptation.max_rate_per_minute
    );
    println!("Configuration OK\n");
    Ok(())
}
