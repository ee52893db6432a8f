use std::path::PathBuf;

use chatwidget::settings::{ConfigError, ConfigLoader};
use chatwidget::transport::{TransportConfig, TransportError, create_transport};
use chatwidget::{WidgetConfig, WidgetHandle};
use clap::Parser;
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod terminal;

use terminal::TerminalSurface;

const CONFIG_DIRECTORY_NAME: &str = "chatwidget";
const CONFIG_FILE_NAME: &str = "widget.toml";

#[derive(Debug, Parser)]
#[command(name = "chatwidget")]
#[command(about = "Talk to a chat backend through the chat widget from a terminal", long_about = None)]
struct Args {
    /// Configuration file (TOML or JSON). Defaults to the user config directory.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Backend endpoint, overriding the configured one.
    #[arg(long)]
    url: Option<String>,
    /// Treat replies as a raw text stream.
    #[arg(long)]
    stream: bool,
    #[arg(long)]
    title: Option<String>,
    /// Print rendered HTML instead of markdown source.
    #[arg(long)]
    markup: bool,
}

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("failed to load configuration on `{stage}`"))]
    Config {
        stage: &'static str,
        source: ConfigError,
    },
    #[snafu(display("failed to create transport on `{stage}`"))]
    Transport {
        stage: &'static str,
        source: TransportError,
    },
    #[snafu(display("failed to read input on `{stage}`"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
}

enum Command<'a> {
    Open,
    Close,
    OutsideClick,
    Reset,
    Quit,
    Help,
    Say(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "/open" => Self::Open,
            "/close" => Self::Close,
            "/outside" => Self::OutsideClick,
            "/reset" => Self::Reset,
            "/quit" | "/exit" => Self::Quit,
            "/help" => Self::Help,
            _ => Self::Say(line),
        }
    }
}

const HELP: &str = "commands: /open /close /outside /reset /quit; anything else is sent";

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|path| path.join(CONFIG_DIRECTORY_NAME))
        .unwrap_or_else(|| PathBuf::from(".chatwidget"))
        .join(CONFIG_FILE_NAME)
}

fn load_config(args: &Args) -> Result<WidgetConfig, CliError> {
    let loader = match &args.config {
        Some(path) => ConfigLoader::new().with_file(path, true),
        None => ConfigLoader::new().with_file(default_config_path(), false),
    };
    let mut config = loader.load().context(ConfigSnafu {
        stage: "load-widget-config",
    })?;

    if let Some(url) = &args.url {
        config.url = url.clone();
    }
    if args.stream {
        config.response_is_a_stream = true;
    }
    if let Some(title) = &args.title {
        config.widget_title = title.clone();
    }

    Ok(config)
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    tracing::info!(
        url = %config.url,
        streaming = config.response_is_a_stream,
        "starting terminal chat widget"
    );

    let transport = create_transport(&TransportConfig::default()).context(TransportSnafu {
        stage: "create-http-transport",
    })?;
    let surface = TerminalSurface::new(std::io::stdout(), args.markup);
    let mut widget = WidgetHandle::new(config, transport, surface);

    if !widget.on_host_loaded().await {
        widget.open(None);
    }
    widget.controller_mut().surface_mut().prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context(ReadInputSnafu {
        stage: "read-stdin-line",
    })? {
        match Command::parse(&line) {
            Command::Open => widget.open(None),
            Command::Close => widget.close(),
            Command::OutsideClick => widget.outside_click(),
            Command::Reset => widget.controller_mut().reset(),
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Say(text) => {
                if !widget.controller().state().is_open() {
                    widget.open(None);
                }
                let outcome = widget.submit(text).await;
                tracing::debug!(?outcome, "turn finished");
            }
        }
        widget.controller_mut().surface_mut().prompt();
    }

    widget.close();
    Ok(())
}
