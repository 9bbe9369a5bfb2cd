use std::path::PathBuf;

use clap::Parser;
use handler_http::{
    config::ServerConfig, hello::HelloHandler, url_rule::UrlMatcher, url_rule::DEFAULT_HOST, App,
    HandlerRegistry, Result,
};
use log::info;

/// Threaded HTTP/1.1 server routing requests through chains of named handlers
#[derive(Parser, Debug)]
#[command(name = "handler-http")]
#[command(author, version, about)]
struct Cli {
    /// TOML file describing handlers, hosts and url rules
    #[arg(short, long, env = "HANDLER_HTTP_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overrides the config file
    #[arg(long)]
    address: Option<String>,

    /// Port to listen on, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve this directory under /files (only without --config)
    #[arg(long)]
    directory: Option<PathBuf>,
}

pub fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let app = match &cli.config {
        Some(path) => {
            info!("loading config from {}", path.display());
            let config = ServerConfig::load(path)?;
            App::from_config(&config, &HandlerRegistry::with_builtin_modules())?
        }
        None => {
            let config = ServerConfig::default();
            let mut app = App::new()
                .set_listen_ip(&config.address)
                .set_port(config.port);
            if let Some(directory) = &cli.directory {
                app = app.static_folder("/files", directory);
            }
            app.handler("hello", HelloHandler)
                .rule(DEFAULT_HOST, UrlMatcher::Any, &["hello"])
        }
    };

    let app = match cli.address {
        Some(address) => app.set_listen_ip(&address),
        None => app,
    };
    let app = match cli.port {
        Some(port) => app.set_port(port),
        None => app,
    };

    app.run()
}
