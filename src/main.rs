use kvgate::config::Config;
use kvgate::server;
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Environment first, command line flags override
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_env().with_args(&args);

    server::run_server(Arc::new(config)).await
}
