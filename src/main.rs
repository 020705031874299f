use tracing::{error, info};

use coderelay::{Config, WebServer};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = coderelay::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        coderelay::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("{e}");
        std::process::exit(1);
    }

    info!("coderelay - ephemeral file relay");
    info!(
        code_length = config.relay.code_length,
        ttl_secs = config.relay.ttl_secs,
        max_downloads = config.relay.max_downloads,
        "Relay configured"
    );

    let server = match WebServer::new(&config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start: {e}");
            std::process::exit(1);
        }
    };

    info!("Server configured on {}", server.addr());

    if let Err(e) = server.run().await {
        error!("Web server error: {e}");
        std::process::exit(1);
    }
}
