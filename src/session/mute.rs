//! Per-direction mute

/// Drops audio for one direction while leaving the pipeline running.
///
/// A muted direction is still drained at full rate; only the hand-off to the
/// sink is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuteGate {
    muted: bool,
}

impl Default for MuteGate {
    /// Endpoints start muted
    fn default() -> Self {
        Self { muted: true }
    }
}

impl MuteGate {
    pub fn new(muted: bool) -> Self {
        Self { muted }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Flip the gate. Returns the label of the action now offered to the
    /// operator: "un-mute" while muted, "mute" otherwise.
    pub fn toggle(&mut self) -> &'static str {
        self.muted = !self.muted;
        self.label()
    }

    pub fn label(&self) -> &'static str {
        if self.muted {
            "un-mute"
        } else {
            "mute"
        }
    }

    /// `data` if the gate is open
    pub fn pass<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        (!self.muted).then_some(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_muted() {
        let gate = MuteGate::default();
        assert!(gate.is_muted());
        assert_eq!(gate.label(), "un-mute");
        assert_eq!(gate.pass(&[1, 2]), None);
    }

    #[test]
    fn test_toggle_labels() {
        let mut gate = MuteGate::default();
        assert_eq!(gate.toggle(), "mute");
        assert!(!gate.is_muted());
        assert_eq!(gate.pass(&[1, 2]), Some(&[1u8, 2][..]));
        assert_eq!(gate.toggle(), "un-mute");
        assert!(gate.is_muted());
    }
}
