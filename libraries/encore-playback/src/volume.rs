//! User volume with mute
//!
//! Holds the user's intended volume (0.0-1.0). Channels are driven towards
//! `target()`; the crossfade ramps between 0 and this value.

/// User-intended volume
#[derive(Debug, Clone)]
pub struct Volume {
    /// Volume level (0.0-1.0)
    level: f32,

    /// Mute state (preserves volume level)
    muted: bool,
}

impl Volume {
    /// Create new volume controller, clamping `level` into 0.0-1.0
    pub fn new(level: f32) -> Self {
        Self {
            level: clamp_unit(level),
            muted: false,
        }
    }

    /// Set volume level (clamped to 0.0-1.0)
    pub fn set_level(&mut self, level: f32) {
        self.level = clamp_unit(level);
    }

    /// Get current volume level
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Mute audio (preserves volume level)
    pub fn mute(&mut self) {
        self.muted = true;
    }

    /// Unmute audio (restores previous volume)
    pub fn unmute(&mut self) {
        self.muted = false;
    }

    /// Toggle mute state
    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }

    /// Check if muted
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Volume the audible channel should be set to
    ///
    /// Returns 0.0 if muted, otherwise the level
    pub fn target(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.level
        }
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(0.8)
    }
}

/// Clamp into [0, 1], mapping NaN to silence
pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_volume() {
        let vol = Volume::new(0.5);
        assert!((vol.level() - 0.5).abs() < f32::EPSILON);
        assert!(!vol.is_muted());
    }

    #[test]
    fn clamps_level() {
        let mut vol = Volume::new(2.0);
        assert!((vol.level() - 1.0).abs() < f32::EPSILON);

        vol.set_level(-0.3);
        assert_eq!(vol.level(), 0.0);

        vol.set_level(f32::NAN);
        assert_eq!(vol.level(), 0.0);
    }

    #[test]
    fn mute_preserves_level() {
        let mut vol = Volume::new(0.6);
        vol.mute();
        assert_eq!(vol.target(), 0.0);
        assert!((vol.level() - 0.6).abs() < f32::EPSILON);

        vol.toggle_mute();
        assert!((vol.target() - 0.6).abs() < f32::EPSILON);
    }
}
