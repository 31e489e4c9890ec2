//! Client Application
//!
//! Sends a local capture device to the server and plays what the server
//! sends back. Operated from stdin; type `help` for commands.

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::{bounded, unbounded, Sender};
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pcm_duplex::{
    audio::{CpalBackend, Notifier},
    config::{ClientArgs, ClientConfig},
    log::TracingLogSink,
    session::{command::HELP, describe_devices, ClientEngine, Command, TransportSession},
};

/// Readiness events queued before the engine catches up
const READINESS_QUEUE: usize = 64;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = ClientArgs::parse();
    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let (ready_tx, ready_rx) = bounded(READINESS_QUEUE);
    let backend = CpalBackend::new(Notifier::new(ready_tx));

    if args.list_devices {
        for line in describe_devices(&backend) {
            println!("{}", line);
        }
        return Ok(());
    }

    tracing::info!(
        "Starting client, server {}:{}",
        config.server.host,
        config.server.port
    );

    let (command_tx, command_rx) = unbounded();
    if args.connect {
        command_tx.send(Command::Connect { host: None, port: None })?;
    }
    thread::Builder::new()
        .name("console".into())
        .spawn(move || console(command_tx))?;

    println!("{}\n", HELP);
    let session = TransportSession::new(Box::new(backend), config, Arc::new(TracingLogSink));
    let mut engine = ClientEngine::new(session, ready_rx, command_rx);
    engine.run();

    Ok(())
}

/// Read commands from stdin until `quit` or end of input
fn console(commands: Sender<Command>) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                let quit = command == Command::Quit;
                if commands.send(command).is_err() || quit {
                    break;
                }
            }
            Err(e) => eprintln!("{}", e),
        }
    }
}
