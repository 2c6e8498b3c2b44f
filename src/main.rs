//! Example service: a greeter served over HTTP.
//!
//! ```text
//! servicekit --server-name greeter --server-address 127.0.0.1:8080
//! service-cli --url http://127.0.0.1:8080 health
//! service-cli --url http://127.0.0.1:8080 stats
//! ```

use clap::Parser;
use futures_util::future;
use serde::{Deserialize, Serialize};

use servicekit::components::cmd::Flags;
use servicekit::components::server::Handler;
use servicekit::config::{load_config, ServiceConfig};
use servicekit::observability::{logging, metrics};
use servicekit::{options, CallError, Request, Response, Service};

#[derive(Debug, Deserialize)]
struct HelloRequest {
    name: String,
}

#[derive(Debug, Serialize)]
struct HelloReply {
    message: String,
}

fn hello(request: &Request) -> Result<Response, CallError> {
    match request.endpoint() {
        "Greeter.Hello" => {
            let req: HelloRequest = serde_json::from_slice(request.body())
                .map_err(|e| CallError::Internal(format!("invalid request: {e}")))?;
            Response::json(&HelloReply {
                message: format!("Hello {}", req.name),
            })
        }
        other => Err(CallError::NotFound(format!("unknown endpoint {other}"))),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let flags = Flags::parse();
    let config = match &flags.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("servicekit v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let service = Service::new(vec![
        options::name("greeter"),
        options::version(env!("CARGO_PKG_VERSION")),
        options::after_start(|| async {
            tracing::info!("Greeter ready");
            Ok(())
        }),
    ]);
    service.init(vec![])?;

    service.server().handle(Handler::new(
        "Greeter",
        tower::service_fn(|request: Request| future::ready(hello(&request))),
    ))?;

    service.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
