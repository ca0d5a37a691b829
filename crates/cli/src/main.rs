mod config;
mod error;
mod repl;
mod scenario;

use std::error::Error as _;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, ValueEnum};
use runtime::tools::builtin::{shell, sms, weather};
use runtime::{Dispatcher, OpenAiBackend, Session, ToolRegistry};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::Config;
use error::Result;

/// Chat with a local model that can call tools
#[derive(Parser, Debug)]
#[command(name = "toolcall", version, about)]
struct Cli {
    /// Prompt for a one-shot run; the interactive loop starts when omitted
    prompt: Vec<String>,

    /// Maximum number of tokens the model may generate per response
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_tokens: Option<u32>,

    /// Conversation flow to run
    #[arg(long, value_enum, default_value_t = Scenario::Chat)]
    scenario: Scenario,

    /// Override the model from config
    #[arg(long)]
    model: Option<String>,

    /// Override the server endpoint from config
    #[arg(long)]
    endpoint: Option<String>,

    /// Path to toolcall.toml config file
    #[arg(long, default_value = "toolcall.toml")]
    config: PathBuf,

    /// Describe tools in the system prompt instead of offering them natively,
    /// in every scenario
    #[arg(long)]
    textual: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Show reasoning, tool calls and results, and log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Shell agent: one-shot prompt or interactive loop
    Chat,
    /// Single turn with the SMS tool
    Sms,
    /// Multi-round location and weather lookup
    Weather,
    /// Streamed completion with the SMS tool
    Stream,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(true))
        .init();
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        if let Some(cause) = e.source() {
            eprintln!("Caused by: {cause}");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    if std::env::args().skip(1).any(|arg| arg == "/?") {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { &cli.log_level });

    let config = load_config(&cli)?;
    let backend = config.build_backend();
    tracing::info!(%backend, scenario = ?cli.scenario, "starting");

    let prompt = (!cli.prompt.is_empty()).then(|| cli.prompt.join(" "));
    let system = config.agent.system_prompt.as_str();

    match cli.scenario {
        Scenario::Chat => {
            let mut registry = ToolRegistry::new();
            shell::register(&mut registry, config.shell_config());
            sms::register(&mut registry);
            weather::register(&mut registry);
            let mut session = Session::new(dispatcher(&config, backend, registry)?).with_system(system);

            match prompt {
                Some(prompt) => repl::turn(&mut session, &prompt, cli.verbose).await,
                None => repl::run(&mut session, &config.backend.model, cli.verbose).await?,
            }
        }
        Scenario::Sms => {
            let mut registry = ToolRegistry::new();
            sms::register(&mut registry);
            let dispatcher = dispatcher(&config, backend, registry)?;
            let prompt = prompt.as_deref().unwrap_or(scenario::SMS_PROMPT);
            scenario::sms(&dispatcher, system, prompt).await?;
        }
        Scenario::Weather => {
            let mut registry = ToolRegistry::new();
            weather::register(&mut registry);
            let dispatcher = dispatcher(&config, backend, registry)?;
            let prompt = prompt.as_deref().unwrap_or(scenario::WEATHER_PROMPT);
            scenario::weather(&dispatcher, system, prompt).await?;
        }
        Scenario::Stream => {
            let mut registry = ToolRegistry::new();
            sms::register(&mut registry);
            let dispatcher = dispatcher(&config, backend, registry)?;
            let prompt = prompt.as_deref().unwrap_or(scenario::SMS_PROMPT);
            scenario::stream(&dispatcher, system, prompt).await?;
        }
    }
    Ok(())
}

/// Config file, then environment, then command-line flags.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_or_default(&cli.config)?;
    config.apply_env(|key| std::env::var(key).ok());

    if let Some(model) = &cli.model {
        config.backend.model = model.clone();
    }
    if let Some(endpoint) = &cli.endpoint {
        config.backend.endpoint = endpoint.clone();
    }
    if let Some(max_tokens) = cli.max_tokens {
        config.agent.max_tokens = max_tokens;
    }
    if cli.textual {
        config.backend.native_tools = false;
    }

    config.validate()?;
    Ok(config)
}

fn dispatcher(
    config: &Config,
    backend: OpenAiBackend,
    registry: ToolRegistry,
) -> Result<Dispatcher<OpenAiBackend>> {
    let dispatch = config.dispatch_config();
    dispatch.validate()?;
    Ok(Dispatcher::new(backend, Arc::new(registry), dispatch))
}
