use anyhow::Result;
use clap::{Parser, Subcommand};
use recipe_generator::app::App;
use recipe_generator::models::Config;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Parser)]
#[command(name = "recipe-generator")]
#[command(about = "Turn dish photos in Cloud Storage into stored recipes")]
struct CliArgs {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq)]
enum Command {
    /// Run the HTTP handler (default).
    Serve(ServeArgs),
    /// Handle one image reference and print the JSON response.
    Generate {
        #[arg(value_name = "GCS_URI")]
        gcs_uri: String,
    },
}

#[derive(Debug, Parser, PartialEq)]
struct ServeArgs {
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
}

/// `serve` with its defaults, as if it had been given on the command line.
fn default_serve() -> Command {
    Command::Serve(ServeArgs::parse_from(["recipe-generator"]))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recipe_generator=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    let app = App::new(&config)?;

    match args.command.unwrap_or_else(default_serve) {
        Command::Serve(ServeArgs { port, host }) => {
            let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
            info!("Starting recipe-generator on {}", addr);
            let listener = TcpListener::bind(addr).await?;
            app.serve(listener).await?;
        }
        Command::Generate { gcs_uri } => {
            let body = serde_json::json!({ "gcsUri": gcs_uri }).to_string();
            let response = app.handler().handle(body.as_bytes()).await?;
            println!("{}", serde_json::to_string_pretty(&response.body)?);
            if response.is_error() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
