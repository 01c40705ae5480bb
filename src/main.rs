//! Chat relay
//!
//! Usage:
//!   cargo run -- server                    # Run the chat server
//!   cargo run -- server --port 7777        # Run on a specific port
//!   cargo run -- client --host localhost   # Connect from this console

use std::env;
use std::process;

use chatrelay::config::DEFAULT_CONFIG_PATH;
use chatrelay::{ChatClient, ChatError, ChatServer, ClientConfig, ServerConfig};
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let code = match args[1].as_str() {
        "server" => {
            init_logging("info");
            run_server(&args).await
        }
        "client" => {
            // Log lines would interleave with the conversation
            init_logging("warn");
            run_client(&args).await
        }
        "help" | "--help" | "-h" => {
            print_usage();
            0
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            2
        }
    };

    // A pending console read sits on a blocking thread that a runtime drop
    // would wait for
    process::exit(code);
}

fn init_logging(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!("chatrelay - multi-room TCP chat");
    println!();
    println!("USAGE:");
    println!("    cargo run -- <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    server              Start the chat server");
    println!("    client              Connect to a server from this console");
    println!("    help                Show this help message");
    println!();
    println!("OPTIONS:");
    println!("    --config <PATH>     Properties file (default: {})", DEFAULT_CONFIG_PATH);
    println!("    --port <PORT>       Port to listen on or connect to (default: 7777)");
    println!("    --host <HOST>       Server to connect to (client only, default: localhost)");
    println!("    --max-conn <NUM>    Maximum connections (server only, default: unlimited)");
    println!();
    println!("EXAMPLES:");
    println!("    cargo run -- server");
    println!("    cargo run -- server --port 5000");
    println!("    cargo run -- client --host 10.0.0.5 --port 5000");
    println!("    RUST_LOG=debug cargo run -- server");
}

/// Value following `flag`, if present
fn option_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse_port(args: &[String]) -> Option<u16> {
    let raw = option_value(args, "--port")?;
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Some(port),
        _ => {
            warn!("Ignoring invalid --port {:?}", raw);
            None
        }
    }
}

fn parse_max_connections(args: &[String]) -> Option<usize> {
    let raw = option_value(args, "--max-conn")?;
    match raw.parse::<usize>() {
        Ok(max) if max > 0 => Some(max),
        _ => {
            warn!("Ignoring invalid --max-conn {:?}", raw);
            None
        }
    }
}

fn config_path(args: &[String]) -> &str {
    option_value(args, "--config").unwrap_or(DEFAULT_CONFIG_PATH)
}

async fn run_server(args: &[String]) -> i32 {
    let mut config = ServerConfig::load(config_path(args));
    if let Some(port) = parse_port(args) {
        config.bind_addr.set_port(port);
    }
    if let Some(max) = parse_max_connections(args) {
        config.max_connections = Some(max);
    }

    info!("Configuration:");
    info!("  - Bind address: {}", config.bind_addr);
    info!("  - Monitor interval: {:?}", config.monitor_interval);
    info!("  - Idle timeout: {:?}", config.idle_timeout);
    info!("  - Max connections: {:?}", config.max_connections);

    let server = match ChatServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server error: {}", e);
            eprintln!("Server could not start: {}", e.message());
            return 1;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match server.run(shutdown).await {
        Ok(()) => 0,
        Err(e) => {
            error!("Server error: {}", e);
            1
        }
    }
}

async fn run_client(args: &[String]) -> i32 {
    let mut config = ClientConfig::load(config_path(args));
    if let Some(host) = option_value(args, "--host") {
        config.host = host.to_string();
    }
    if let Some(port) = parse_port(args) {
        config.port = port;
    }

    let client = ChatClient::new(config);
    let input = BufReader::new(tokio::io::stdin());

    match client.run(input, tokio::io::stdout()).await {
        Ok(_) => 0,
        Err(ChatError::Connection(msg)) => {
            eprintln!("Connection failed: {}", msg);
            eprintln!(
                "Please ensure the server is running on PORT: {} and try again.",
                client.config().port
            );
            1
        }
        Err(e) => {
            eprintln!("{}", e.message());
            eprintln!("Exiting application...");
            1
        }
    }
}
