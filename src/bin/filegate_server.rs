//!
//! filegate server binary
//! ----------------------
//! Command-line entry point for the course file server. Supports configuration
//! via a JSON config file, `FILEGATE_*` environment variables and CLI flags
//! (flags win over environment, environment over file).

use anyhow::Result;
use std::env;
use std::path::PathBuf;

use filegate::config::ServerConfig;

fn parse_port_arg(args: &[String], flag: &str) -> Option<u16> {
    arg_value(args, flag).and_then(|v| v.parse::<u16>().ok())
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

const USAGE: &str = "filegate Server\n\nUSAGE:\n  filegate_server [--config PATH] [--http-port N] [--data-root PATH] [--catalog PATH]\n  filegate_server --hash-password PASSWORD\n\nOPTIONS:\n  --config PATH         JSON config file (env: FILEGATE_CONFIG)\n  --http-port N         HTTP port (env: FILEGATE_HTTP_PORT, default 7878)\n  --data-root PATH      Folder files are served from (env: FILEGATE_DATA_ROOT, default filedata)\n  --catalog PATH        Site catalog JSON (env: FILEGATE_CATALOG, default <data-root>/.catalog.json)\n  --hash-password PW    Print an Argon2 hash for a catalog user entry and exit\n";

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{}", USAGE);
        return Ok(());
    }
    if let Some(pw) = arg_value(&args, "--hash-password") {
        println!("{}", filegate::identity::hash_password(&pw)?);
        return Ok(());
    }

    let config_path = arg_value(&args, "--config").or_else(|| env::var("FILEGATE_CONFIG").ok());
    let mut config = match config_path {
        Some(p) => ServerConfig::load(&PathBuf::from(p))?,
        None => ServerConfig::default(),
    };
    config.apply_env(|k| env::var(k).ok());

    if let Some(port) = parse_port_arg(&args, "--http-port") { config.http_port = port; }
    if let Some(root) = arg_value(&args, "--data-root") { config.data_root = PathBuf::from(root); }
    if let Some(cat) = arg_value(&args, "--catalog") { config.catalog = Some(PathBuf::from(cat)); }

    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    tracing::info!(
        target: "filegate",
        "filegate starting: RUST_LOG='{}', http_port={}, data_root={:?}",
        rust_log, config.http_port, config.data_root
    );
    filegate::server::run(config).await
}
