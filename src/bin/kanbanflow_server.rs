//!
//! kanbanflow server binary
//! ------------------------
//! Command-line entry point for the kanbanflow HTTP/WS server. Configuration
//! comes from the environment; CLI flags override it.

use anyhow::Result;
use std::env;

use kanbanflow::config::ServerConfig;

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

#[tokio::main]
async fn main() -> Result<()> {
    println!(r" _               _                 __ _
| | ____ _ _ __ | |__   __ _ _ __  / _| | _____      __
| |/ / _` | '_ \| '_ \ / _` | '_ \| |_| |/ _ \ \ /\ / /
|   < (_| | | | | |_) | (_| | | | |  _| | (_) \ V  V /
|_|\_\__,_|_| |_|_.__/ \__,_|_| |_|_| |_|\___/ \_/\_/  ");

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?;
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("kanbanflow Server\n\nUSAGE:\n  kanbanflow_server [--http-port N] [--bind ADDR] [--allowed-origin URL]\n\nOPTIONS:\n  --http-port N          HTTP port (env: KANBANFLOW_HTTP_PORT, default 3005)\n  --bind ADDR            Bind address (env: KANBANFLOW_BIND, default 0.0.0.0)\n  --allowed-origin URL   Origin accepted on /ws (env: BASE_URL, default http://localhost:3000)\n\nENVIRONMENT:\n  CLIENT_SECRET                 Root token secret (required unless scheme is independent)\n  KANBANFLOW_SECRET_SCHEME      hmac | suffix | independent (default hmac)\n  ACCESS_SECRET, REFRESH_SECRET Secrets for the independent scheme\n  KANBANFLOW_ACCESS_TTL_SECS    Access token lifetime (default 3600)\n  KANBANFLOW_REFRESH_TTL_SECS   Refresh token lifetime (default 86400)\n  RATE_LIMIT_RPS                Rate limiter burst (default 10)\n  KANBANFLOW_WS_QUEUE           Per-connection outbound queue (default 32)\n  KANBANFLOW_WS_WRITE_TIMEOUT_MS Socket write stall limit (default 10000)\n  KANBANFLOW_SECURE_COOKIES     Mark auth cookies Secure (default true)\n");
        return Ok(());
    }

    let mut config = ServerConfig::from_env()?;

    // CLI arguments override environment
    if let Some(port) = arg_value(&args, "--http-port") {
        config.http_port = port.parse::<u16>().map_err(|_| anyhow::anyhow!("invalid --http-port {port}"))?;
    }
    if let Some(bind) = arg_value(&args, "--bind") {
        config.bind_addr = bind;
    }
    if let Some(origin) = arg_value(&args, "--allowed-origin") {
        config.allowed_origin = origin.trim_end_matches('/').to_string();
    }

    println!("kanbanflow starting on {}:{} (origin {})", config.bind_addr, config.http_port, config.allowed_origin);
    tracing::info!("Using bind={}:{}, allowed_origin={}", config.bind_addr, config.http_port, config.allowed_origin);
    kanbanflow::server::run_with_config(config).await
}
