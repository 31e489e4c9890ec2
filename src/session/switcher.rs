//! Changing devices while a session runs

use super::transport::{ConnectionState, TransportSession};
use crate::audio::Direction;
use crate::error::Result;
use crate::log::status;

/// Swaps the device behind one direction of a session
pub trait DeviceSwitcher {
    /// Point `direction` at `device_id` (`None` for the default device).
    ///
    /// The format is re-read from the configuration first; a bad format
    /// leaves everything as it was. While connected the new device is opened
    /// before the old one is stopped, so a device that fails to open leaves
    /// the old one streaming. Reopening the device already in use has to
    /// stop it first, and the direction is idle until the reopen succeeds.
    /// While disconnected only the selection is recorded.
    fn switch_device(&mut self, direction: Direction, device_id: Option<&str>) -> Result<()>;
}

impl DeviceSwitcher for TransportSession {
    fn switch_device(&mut self, direction: Direction, device_id: Option<&str>) -> Result<()> {
        let name = device_id.unwrap_or("default").to_string();
        let result = switch(self, direction, device_id);
        match &result {
            Ok(()) => status(&**self.log(), format!("{} device: {}", direction.label(), name)),
            Err(e) => {
                tracing::warn!("Switching {} to {} failed: {}", direction.label(), name, e);
                status(
                    &**self.log(),
                    format!("cannot switch {} to {}: {}", direction.label(), name, e),
                );
            }
        }
        result
    }
}

fn switch(session: &mut TransportSession, direction: Direction, device_id: Option<&str>) -> Result<()> {
    let settings = session.settings().direction(direction).clone();
    let format = settings.format.resolve()?;
    let selected = device_id.map(str::to_string);

    if session.state() == ConnectionState::Disconnected {
        session.settings_mut().direction_mut(direction).device = selected;
        return Ok(());
    }

    let reopen = settings.device == selected;
    let period_frames = settings.format.period_frames();

    match direction {
        Direction::Input => {
            if reopen {
                if let Some(mut old) = session.capture_slot().take() {
                    old.stop();
                }
            }
            let capture = session.backend().open_capture(device_id, &format, period_frames)?;
            if let Some(mut old) = session.capture_slot().replace(capture) {
                old.stop();
            }
        }
        Direction::Output => {
            if reopen {
                if let Some(mut old) = session.playback_slot().take() {
                    old.stop();
                }
            }
            let playback = session.backend().open_playback(device_id, &format, period_frames)?;
            if let Some(mut old) = session.playback_slot().replace(playback) {
                old.stop();
            }
        }
    }

    tracing::info!("{} now on {} ({})", direction.label(), device_id.unwrap_or("default"), format);
    session.settings_mut().direction_mut(direction).device = selected;
    Ok(())
}
