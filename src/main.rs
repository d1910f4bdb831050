use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;

use panotour::hosting::{start_server, HostingStore};
use panotour::settings;

#[derive(Parser)]
#[command(name = "panotour-host", about = "Upload and hosting service for tour bundles", version)]
struct Args {
    /// Directory uploads and hosted tours are kept in
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let data_dir = args
        .data_dir
        .unwrap_or_else(|| settings::app_config_dir().join("hosting"));
    let store = match HostingStore::open(&data_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    log::info!("Serving uploads from {}", data_dir.display());

    let (_, server) = match start_server(store, SocketAddr::new(args.bind, args.port)).await {
        Ok(started) => started,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("Shutting down"),
        result = server => {
            if let Err(e) = result {
                log::error!("Hosting server stopped: {e}");
                process::exit(1);
            }
        }
    }
}
