use clap::{Parser, Subcommand};
use rangekit::config::Config;
use rangekit::http::range::{parse_range, unsatisfied_content_range, RangeError};
use rangekit::http::RangeClient;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "rangekit", version, about = "HTTP byte-range toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the Content-Range of every range a Range header selects
    Parse {
        /// Size of the resource in bytes
        #[arg(long)]
        size: u64,

        /// Range header value, e.g. "bytes=0-99,-100"
        header: String,
    },

    /// Download byte ranges of an http:// URL to stdout
    Fetch {
        url: Url,

        /// Range header value; empty fetches the whole resource
        #[arg(long, default_value = "")]
        range: String,

        /// YAML config file (defaults to $RANGEKIT_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Parse { size, header } => run_parse(&header, size),

        Command::Fetch { url, range, config } => {
            let cfg = match config {
                Some(path) => Config::from_file(path)?,
                None => Config::load()?,
            };
            let client = RangeClient::new(cfg.transport.build()?);

            tokio::select! {
                res = run_fetch(&client, &url, &range) => {
                    res?;
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                }
            }

            Ok(())
        }
    }
}

fn run_parse(header: &str, size: u64) -> anyhow::Result<()> {
    match parse_range(header, size) {
        Ok(ranges) => {
            for range in ranges {
                println!("{}", range.content_range(size));
            }
            Ok(())
        }
        Err(RangeError::NoOverlap) => {
            println!("{}", unsatisfied_content_range(size));
            Err(RangeError::NoOverlap.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_fetch(client: &RangeClient, url: &Url, range: &str) -> anyhow::Result<()> {
    let parts = client.fetch(url, range).await?;
    let mut stdout = tokio::io::stdout();

    for part in &parts {
        tracing::info!(content_range = %part.content_range(), "Writing range");
        stdout.write_all(&part.data).await?;
    }

    stdout.flush().await?;
    Ok(())
}
