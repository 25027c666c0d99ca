//! Demo CLI against a real FreeSWITCH Event Socket endpoint.
//!
//! Not part of the library's public contract — a thin driver over
//! [`rusty_esl::EventSocket`] for manual testing against a live server.

use clap::{Parser, Subcommand};
use rusty_esl::config;
use rusty_esl::EventSocket;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eslcli", about = "FreeSWITCH Event Socket demo client")]
struct Cli {
    /// Path to a TOML config file (host, port, password, ...).
    #[arg(long, default_value = "eslcli.toml")]
    config: std::path::PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run `api <cmd> <args>` and print the reply.
    Api { cmd: String, args: Vec<String> },
    /// Run `bgapi <cmd> <args>` and print the result once it arrives.
    Bgapi { cmd: String, args: Vec<String> },
    /// Subscribe to all events and print them until interrupted.
    Watch,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let cfg = match config::load_config_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    info!(host = %cfg.host, port = cfg.port, "connecting");
    let (socket, ready, _handle) = EventSocket::start_with_ready(cfg);
    match ready.await {
        Ok(Ok(())) => info!("authenticated"),
        Ok(Err(e)) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
        Err(_) => {
            eprintln!("FATAL: connection closed before authentication completed");
            std::process::exit(1);
        }
    }

    match cli.command {
        Command::Api { cmd, args } => {
            let args = args.join(" ");
            match socket.api(&cmd, &args).await {
                Ok(packet) => print_packet(&packet),
                Err(e) => eprintln!("error: {e}"),
            }
        }
        Command::Bgapi { cmd, args } => {
            let args = args.join(" ");
            match socket.bgapi(&cmd, &args).await {
                Ok(handle) => {
                    info!(job_id = %handle.job_id, "job dispatched");
                    match handle.wait().await {
                        Ok(packet) => print_packet(&packet),
                        Err(e) => eprintln!("error waiting for job result: {e}"),
                    }
                }
                Err(e) => eprintln!("error: {e}"),
            }
        }
        Command::Watch => {
            let mut subscription = match socket.start_listening(None).await {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            };
            info!("watching events, press Ctrl+C to stop");
            loop {
                tokio::select! {
                    event = subscription.recv() => {
                        match event {
                            Some(packet) => print_packet(&packet),
                            None => break,
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }
}

fn print_packet(packet: &rusty_esl::Packet) {
    println!("type: {}", packet.packet_type);
    println!("success: {}", packet.success);
    if let Some(rest) = &packet.rest {
        println!("reply: {rest}");
    }
    if !packet.body.is_empty() {
        println!("body: {}", String::from_utf8_lossy(&packet.body));
    }
}
