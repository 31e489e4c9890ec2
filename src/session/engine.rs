//! Single-threaded client dispatch loop
//!
//! Device callbacks and the console thread only send messages. Everything
//! that touches the session runs here, on one thread: each wake-up handles
//! at most one command, then services the session.

use crossbeam_channel::{select, Receiver};
use std::ops::ControlFlow;

use super::command::{Command, HELP};
use super::switcher::DeviceSwitcher;
use super::transport::TransportSession;
use crate::audio::{DeviceDirectory, DeviceInfo, Direction, Readiness};
use crate::constants::ENGINE_TICK;
use crate::log::status;

/// Console listing of both device directions, default devices marked
pub fn describe_devices<D: DeviceDirectory + ?Sized>(directory: &D) -> Vec<String> {
    fn section(lines: &mut Vec<String>, title: &str, devices: Vec<DeviceInfo>) {
        lines.push(format!("{}:", title));
        if devices.is_empty() {
            lines.push("  (none)".to_string());
        }
        for device in devices {
            let marker = if device.is_default { " [DEFAULT]" } else { "" };
            if device.id == device.name {
                lines.push(format!("  {}{}", device.id, marker));
            } else {
                lines.push(format!("  {} ({}){}", device.id, device.name, marker));
            }
        }
    }

    let mut lines = Vec::new();
    section(&mut lines, "input devices", directory.list_capture_devices());
    section(&mut lines, "output devices", directory.list_playback_devices());
    lines
}

/// Drives a [`TransportSession`] from commands and device readiness
pub struct ClientEngine {
    session: TransportSession,
    readiness: Receiver<Readiness>,
    commands: Receiver<Command>,
}

impl ClientEngine {
    pub fn new(session: TransportSession, readiness: Receiver<Readiness>, commands: Receiver<Command>) -> Self {
        Self {
            session,
            readiness,
            commands,
        }
    }

    /// Run until `quit` or until the command channel closes
    pub fn run(&mut self) {
        tracing::info!("Client engine running");
        while self.run_once().is_continue() {}
        self.session.disconnect();
        tracing::info!("Client engine stopped");
    }

    /// Wait for one event (or the tick), then service the session
    pub fn run_once(&mut self) -> ControlFlow<()> {
        select! {
            recv(self.commands) -> command => match command {
                Ok(command) => {
                    if self.handle(command).is_break() {
                        return ControlFlow::Break(());
                    }
                }
                Err(_) => return ControlFlow::Break(()),
            },
            recv(self.readiness) -> _ => {}
            default(ENGINE_TICK) => {}
        }

        if let Err(e) = self.session.service() {
            tracing::debug!("Service pass failed: {}", e);
        }
        ControlFlow::Continue(())
    }

    pub fn session(&self) -> &TransportSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TransportSession {
        &mut self.session
    }

    fn report(&self, message: impl AsRef<str>) {
        status(&**self.session.log(), message);
    }

    fn handle(&mut self, command: Command) -> ControlFlow<()> {
        tracing::debug!("Command: {:?}", command);
        match command {
            Command::Connect { host, port } => {
                let server = &self.session.settings().server;
                let host = host.unwrap_or_else(|| server.host.clone());
                let port = port.unwrap_or(server.port);
                // failures are reported by the session
                let _ = self.session.connect(&host, port);
            }
            Command::Disconnect => self.session.disconnect(),
            Command::Mute(direction) => {
                let label = self.session.toggle_mute(direction);
                tracing::debug!("{} control now offers {}", direction.label(), label);
            }
            Command::SelectDevice { direction, device } => {
                let _ = self.session.switch_device(direction, device.as_deref());
            }
            Command::Gain(percent) => {
                self.session.set_input_gain(percent);
                self.report(format!("input gain {}%", percent.min(200)));
            }
            Command::Devices => {
                for line in describe_devices(self.session.backend()) {
                    self.report(line);
                }
            }
            Command::Stats => {
                let session = &self.session;
                let muted = |d: Direction| if session.is_muted(d) { "muted" } else { "live" };
                self.report(format!(
                    "{:?}, input {}, output {}{}",
                    session.state(),
                    muted(Direction::Input),
                    muted(Direction::Output),
                    if session.is_degraded() { ", degraded" } else { "" }
                ));
                self.report(session.stats().summary());
            }
            Command::Help => {
                for line in HELP.lines() {
                    self.report(line);
                }
            }
            Command::Quit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::MockBackend;
    use crate::config::ClientConfig;
    use crate::log::MemoryLogSink;
    use crate::session::wire::MemoryWire;
    use crossbeam_channel::{bounded, unbounded, Sender};
    use std::sync::Arc;

    fn engine() -> (ClientEngine, MockBackend, MemoryLogSink, Sender<Command>, Sender<Readiness>) {
        let backend = MockBackend::new();
        let log = MemoryLogSink::default();
        let session = TransportSession::new(
            Box::new(backend.clone()),
            ClientConfig::default(),
            Arc::new(log.clone()),
        );
        let (command_tx, command_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(16);
        (ClientEngine::new(session, ready_rx, command_rx), backend, log, command_tx, ready_tx)
    }

    #[test]
    fn test_device_listing_marks_default() {
        let lines = describe_devices(&MockBackend::new());
        assert_eq!(
            lines,
            vec![
                "input devices:",
                "  mic (Built-in Mic) [DEFAULT]",
                "  usb (USB Mic)",
                "output devices:",
                "  speakers (Speakers) [DEFAULT]",
                "  headset (Headset)",
            ]
        );
    }

    #[test]
    fn test_commands_are_dispatched() {
        let (mut engine, _, log, commands, _ready) = engine();

        commands.send(Command::Mute(Direction::Output)).unwrap();
        assert!(engine.run_once().is_continue());
        assert!(!engine.session().is_muted(Direction::Output));
        assert!(log.contains("output un-muted"));

        commands.send(Command::Stats).unwrap();
        assert!(engine.run_once().is_continue());
        assert!(log.contains("Disconnected, input muted, output live"));

        commands.send(Command::Quit).unwrap();
        assert!(engine.run_once().is_break());
    }

    #[test]
    fn test_closed_console_stops_engine() {
        let (mut engine, _, _, commands, _ready) = engine();
        drop(commands);
        engine.run();
        assert!(!engine.session().is_connected());
    }

    #[test]
    fn test_readiness_runs_pumps() {
        let (mut engine, backend, _, _commands, ready) = engine();
        let (wire, _) = MemoryWire::pair();
        let remote = wire.handle();
        engine.session_mut().connect_with(Box::new(wire)).unwrap();
        engine.session_mut().set_muted(Direction::Input, false);

        backend.last_capture().unwrap().feed(&[8u8; 400]);
        ready.send(Readiness::CaptureReady).unwrap();
        assert!(engine.run_once().is_continue());
        assert_eq!(remote.sent(), vec![8u8; 400]);
    }
}
