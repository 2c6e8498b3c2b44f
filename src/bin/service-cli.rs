use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "service-cli")]
#[command(about = "Management CLI for servicekit services", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Bearer token for endpoints that require one
    #[arg(short, long, env = "SERVICE_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service health
    Health,
    /// Show request statistics
    Stats,
    /// Show recent spans
    Trace {
        /// Only spans of this trace
        #[arg(long)]
        trace_id: Option<String>,
    },
    /// Call an endpoint ("Handler.Method") with a JSON body
    Call {
        endpoint: String,
        #[arg(default_value = "{}")]
        body: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))?,
        );
    }

    let (endpoint, body) = match cli.command {
        Commands::Health => ("Debug.Health".to_string(), String::new()),
        Commands::Stats => ("Debug.Stats".to_string(), String::new()),
        Commands::Trace { trace_id } => (
            "Debug.Trace".to_string(),
            trace_id
                .map(|id| json!({ "trace_id": id }).to_string())
                .unwrap_or_default(),
        ),
        Commands::Call { endpoint, body } => {
            serde_json::from_str::<Value>(&body)?;
            (endpoint, body)
        }
    };

    let res = client
        .post(format!("{}/{}", cli.url.trim_end_matches('/'), endpoint))
        .headers(headers)
        .body(body)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
