//! Operator console commands

use std::str::FromStr;

use crate::audio::Direction;

/// One line typed at the client console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `connect [host[:port]]`; missing parts come from the configuration
    Connect { host: Option<String>, port: Option<u16> },
    Disconnect,
    /// `mute in|out` toggles that direction
    Mute(Direction),
    /// `input <device>` / `output <device>`; `default` selects the default
    SelectDevice { direction: Direction, device: Option<String> },
    /// `gain <percent>`
    Gain(u32),
    Devices,
    Stats,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0} (type `help` for commands)")]
pub struct ParseCommandError(String);

pub const HELP: &str = "\
connect [host[:port]]   open devices and connect
disconnect              close the connection
mute in|out             toggle the input or output mute
input <device>          switch the capture device (`default`, or file:<path>)
output <device>         switch the playback device
gain <percent>          outbound gain, 0..200
devices                 list audio devices
stats                   show transport counters
quit                    disconnect and exit";

fn parse_direction(word: &str) -> Option<Direction> {
    match word {
        "in" | "input" => Some(Direction::Input),
        "out" | "output" => Some(Direction::Output),
        _ => None,
    }
}

fn parse_endpoint(arg: &str) -> Result<(Option<String>, Option<u16>), ParseCommandError> {
    // a bare IPv6 address has more than one colon and no port
    match arg.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port = port
                .parse()
                .map_err(|_| ParseCommandError(format!("bad port `{}`", port)))?;
            let host = (!host.is_empty()).then(|| host.to_string());
            Ok((host, Some(port)))
        }
        _ => Ok((Some(arg.to_string()), None)),
    }
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word {
            "connect" if rest.is_empty() => Ok(Command::Connect { host: None, port: None }),
            "connect" => {
                let (host, port) = parse_endpoint(rest)?;
                Ok(Command::Connect { host, port })
            }
            "disconnect" => Ok(Command::Disconnect),
            "mute" => parse_direction(rest)
                .map(Command::Mute)
                .ok_or_else(|| ParseCommandError("usage: mute in|out".into())),
            "input" | "output" => {
                if rest.is_empty() {
                    return Err(ParseCommandError(format!("usage: {} <device>", word)));
                }
                let direction = if word == "input" { Direction::Input } else { Direction::Output };
                let device = (rest != "default").then(|| rest.to_string());
                Ok(Command::SelectDevice { direction, device })
            }
            "gain" => rest
                .parse()
                .map(Command::Gain)
                .map_err(|_| ParseCommandError("usage: gain <percent>".into())),
            "devices" => Ok(Command::Devices),
            "stats" => Ok(Command::Stats),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            "" => Err(ParseCommandError("empty command".into())),
            other => Err(ParseCommandError(format!("unknown command `{}`", other))),
        }
    }
}
