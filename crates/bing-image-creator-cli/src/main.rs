//! bing-image-creator CLI entry point.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use bing_image_creator::{CreatorError, ExtractionStrategy};
use bing_image_creator_cli::commands::{self, IframeMode};
use bing_image_creator_cli::config::{load_config_at, resolve_config_path, ConfigOverrides};

#[derive(Parser)]
#[command(
    name = "bing-image-creator",
    about = "Generate images with Bing Image Creator from the command line",
    version
)]
struct Cli {
    /// Path to a JSON config file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log request details (forces debug level).
    #[arg(long, global = true)]
    debug: bool,

    /// HTTP(S) or SOCKS proxy URL.
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Value of the `_U` session cookie.
    #[arg(long, global = true)]
    token: Option<String>,

    /// Full cookie header; takes precedence over --token.
    #[arg(long, global = true)]
    cookies: Option<String>,

    /// Service origin, e.g. https://www.bing.com.
    #[arg(long, global = true)]
    host: Option<String>,

    /// User-Agent header to send.
    #[arg(long, global = true)]
    user_agent: Option<String>,

    /// x-forwarded-for address or CIDR range to draw one from.
    #[arg(long, global = true)]
    forwarded_for: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate images and save them to disk.
    Draw {
        /// Prompt text, or `![prompt](#generative_image)`.
        prompt: String,

        /// Output directory.
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Extraction strategy (polling, browser).
        #[arg(long, default_value = "polling", value_parser = parse_strategy)]
        strategy: ExtractionStrategy,

        /// Give up after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Print written paths as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Print an embeddable iframe for a prompt.
    Iframe {
        /// Prompt text, or `![prompt](#generative_image)`.
        prompt: String,

        /// Which fragment to print.
        #[arg(long, value_enum, default_value = "ssr")]
        mode: IframeMode,

        /// Give up after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   bing-image-creator completions bash > ~/.local/share/bash-completion/completions/bing-image-creator
    ///   bing-image-creator completions zsh > ~/.zfunc/_bing-image-creator
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn parse_strategy(s: &str) -> Result<ExtractionStrategy, String> {
    s.parse().map_err(|e: CreatorError| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "bing-image-creator", &mut std::io::stdout());
        return Ok(());
    }

    let overrides = ConfigOverrides {
        proxy: cli.proxy,
        user_token: cli.token,
        cookies: cli.cookies,
        host: cli.host,
        user_agent: cli.user_agent,
        forwarded_for: cli.forwarded_for,
        debug: cli.debug,
    };
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = overrides.apply(load_config_at(config_path.as_deref())?);

    let level = if config.debug { "debug" } else { cli.log_level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &config_path {
        Some(path) => tracing::debug!("loaded config from {}", path.display()),
        None => tracing::debug!("no config file found, using defaults"),
    }

    let outcome = match cli.command {
        Commands::Draw {
            prompt,
            out,
            strategy,
            timeout,
            json,
        } => commands::draw(&config, &prompt, &out, strategy, timeout)
            .await
            .map(|written| {
                if json {
                    let paths: Vec<String> =
                        written.iter().map(|p| p.display().to_string()).collect();
                    println!("{}", serde_json::Value::from(paths));
                } else {
                    for path in &written {
                        println!("{}", path.display());
                    }
                }
            }),

        Commands::Iframe {
            prompt,
            mode,
            timeout,
        } => commands::iframe(&config, &prompt, mode, timeout)
            .await
            .map(|html| println!("{html}")),

        Commands::Completions { .. } => Ok(()),
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(err)
            if err
                .downcast_ref::<CreatorError>()
                .is_some_and(CreatorError::is_cancelled) =>
        {
            eprintln!("cancelled");
            std::process::exit(130);
        }
        Err(err) => {
            tracing::error!("{err:#}");
            std::process::exit(1);
        }
    }
}
