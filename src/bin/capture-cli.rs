use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use capture_relay::http::wire::split_data_frame;

#[derive(Parser)]
#[command(name = "capture-cli")]
#[command(about = "Client for the capture relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint a new namespace
    New,
    /// Stream captures sent to a namespace
    Tail {
        namespace: String,
        /// Print data chunks as lossy UTF-8 instead of byte counts
        #[arg(long)]
        text: bool,
    },
    /// Check relay health
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::New => {
            let res = reqwest::get(format!("{base}/new")).await?;
            print_response(res).await?;
        }
        Commands::Health => {
            let res = reqwest::get(format!("{base}/healthz")).await?;
            print_response(res).await?;
        }
        Commands::Tail { namespace, text } => tail(base, &namespace, text).await?,
    }

    Ok(())
}

async fn tail(base: &str, namespace: &str, text: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ws_url = format!("{}/ws", base.replacen("http", "ws", 1));
    let (socket, _) = connect_async(ws_url.as_str()).await?;
    let (mut sink, mut stream) = socket.split();

    let join = serde_json::json!({ "type": "join", "namespace": namespace }).to_string();
    sink.send(Message::Text(join.into())).await?;

    while let Some(message) = stream.next().await {
        match message? {
            Message::Text(frame) => {
                let value: Value = serde_json::from_str(frame.as_str())?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            Message::Binary(frame) => match split_data_frame(&frame) {
                Some((id, chunk)) if text => {
                    println!("[{id}] {}", String::from_utf8_lossy(chunk));
                }
                Some((id, chunk)) => println!("[{id}] {} bytes", chunk.len()),
                None => eprintln!("Malformed data frame ({} bytes)", frame.len()),
            },
            Message::Close(frame) => {
                eprintln!("Relay closed the stream: {frame:?}");
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
