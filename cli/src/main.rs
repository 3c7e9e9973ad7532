//! Revive CLI: discovery runs and completion-gateway checks.
//!
//! Secrets come from flags or the environment and override the config file.
//! Logs go to stderr so stdout stays machine-readable.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

use agent::{execute_run, DiscoveryAgent};
use common::config::ReviveConfig;
use common::models::SearchStrategy;
use common::store::InMemoryDiscoveryStore;
use providers::openrouter::known_models;
use providers::{AIProvider, CompletionRequest, Message, OpenRouterProvider, ProviderManager};

#[derive(Parser, Debug)]
#[command(name = "revive", author, version, about, long_about = None)]
struct Args {
    /// Config file (JSON). Defaults to ./revive.json, then ~/.revive/revive.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true, global = true)]
    openrouter_api_key: Option<String>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    github_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one discovery pass and print the run record as JSON.
    Run {
        /// Run a single strategy instead of the configured list.
        #[arg(long)]
        strategy: Option<SearchStrategy>,
        #[arg(long)]
        max_repos: Option<usize>,
        /// Replaces the configured languages; repeatable.
        #[arg(long = "language")]
        languages: Vec<String>,
        #[arg(long)]
        min_stars: Option<u32>,
        #[arg(long)]
        max_stars: Option<u32>,
        #[arg(long)]
        threshold: Option<f64>,
        /// Skip README analysis through the completion service.
        #[arg(long)]
        no_ai: bool,
    },
    /// List the search strategies.
    Strategies,
    /// Health-check every configured completion provider.
    Health,
    /// Show per-million-token pricing; lists every known model when none is given.
    Pricing { model: Option<String> },
    /// Send one prompt through the gateway.
    Complete {
        prompt: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value_t = 512)]
        max_tokens: u32,
        /// Print fragments as they arrive. Bypasses fallback and budget admission.
        #[arg(long)]
        stream: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let mut config = load_config(args.config.as_deref())?;
    if let Some(key) = args.openrouter_api_key {
        config.ai.api_key = key;
    }
    if let Some(token) = args.github_token {
        config.github.token = token;
    }

    match args.command {
        Command::Run {
            strategy,
            max_repos,
            languages,
            min_stars,
            max_stars,
            threshold,
            no_ai,
        } => {
            let discovery = &mut config.discovery;
            if !languages.is_empty() {
                discovery.languages = languages;
            }
            if let Some(min) = min_stars {
                discovery.min_stars = min;
            }
            if let Some(max) = max_stars {
                discovery.max_stars = max;
            }
            if let Some(threshold) = threshold {
                discovery.acceptance_threshold = threshold;
            }
            if no_ai {
                discovery.analyze_readme = false;
            }
            run_discovery(&config, strategy, max_repos).await
        }
        Command::Strategies => {
            for strategy in SearchStrategy::ALL {
                println!("{:<18} {}", strategy.as_str(), strategy.description());
            }
            Ok(())
        }
        Command::Health => check_health(&config).await,
        Command::Pricing { model } => {
            show_pricing(&config, model.as_deref())?;
            Ok(())
        }
        Command::Complete {
            prompt,
            model,
            max_tokens,
            stream,
        } => {
            let mut request = CompletionRequest::new(vec![Message::user(prompt)]).with_max_tokens(max_tokens);
            if let Some(model) = model {
                request = request.with_model(model);
            }
            if stream {
                stream_completion(&config, &request).await
            } else {
                complete_once(&config, &request).await
            }
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "revive=info,agent=info,providers=info,common=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(explicit: Option<&std::path::Path>) -> Result<ReviveConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let local = PathBuf::from("revive.json");
            match dirs::home_dir() {
                Some(home) if !local.exists() => home.join(".revive").join("revive.json"),
                _ => local,
            }
        }
    };
    ReviveConfig::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))
}

async fn run_discovery(config: &ReviveConfig, strategy: Option<SearchStrategy>, max_repos: Option<usize>) -> Result<()> {
    if config.github.token.is_empty() {
        warn!("No GitHub token configured, search is limited to unauthenticated rate limits");
    }
    if config.ai.api_key.is_empty() && config.discovery.analyze_readme {
        warn!("No OpenRouter key configured, README analysis will fail and degrade");
    }

    let agent = DiscoveryAgent::from_config(config)?;
    let store = InMemoryDiscoveryStore::new();

    info!("🔎 {} v{}", agent.config().name, agent.config().version);
    let result = execute_run(&store, &agent, strategy, max_repos).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        bail!(
            "Discovery run {} failed: {}",
            result.data.run_id,
            result.error.unwrap_or_default()
        );
    }
    Ok(())
}

async fn check_health(config: &ReviveConfig) -> Result<()> {
    let manager = ProviderManager::from_settings(&config.ai)?;
    let mut healthy = true;
    for (name, ok) in manager.health().await {
        println!("{:<12} {}", name, if ok { "ok" } else { "unreachable" });
        healthy &= ok;
    }
    if !healthy {
        bail!("One or more providers are unhealthy");
    }
    Ok(())
}

fn show_pricing(config: &ReviveConfig, model: Option<&str>) -> Result<()> {
    match model {
        Some(model) => {
            let provider = OpenRouterProvider::new(&config.ai)?;
            let pricing = provider.get_model_pricing(model);
            println!("{:<36} in ${:>7.3}/M  out ${:>7.3}/M", model, pricing.input, pricing.output);
        }
        None => {
            for (model, pricing) in known_models() {
                println!("{:<36} in ${:>7.3}/M  out ${:>7.3}/M", model, pricing.input, pricing.output);
            }
        }
    }
    Ok(())
}

async fn complete_once(config: &ReviveConfig, request: &CompletionRequest) -> Result<()> {
    let manager = ProviderManager::from_settings(&config.ai)?;
    let response = manager.complete(request).await?;
    println!("{}", response.content);
    info!(
        provider = %response.provider,
        model = %response.model,
        tokens = response.usage.total_tokens,
        cost_usd = response.cost.total_cost,
        latency_ms = response.latency_ms,
        "Completion finished"
    );
    Ok(())
}

async fn stream_completion(config: &ReviveConfig, request: &CompletionRequest) -> Result<()> {
    let provider = OpenRouterProvider::new(&config.ai)?;
    let mut stream = provider.complete_stream(request).await?;
    let mut stdout = std::io::stdout();
    while let Some(fragment) = stream.next().await {
        stdout.write_all(fragment?.as_bytes())?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}
