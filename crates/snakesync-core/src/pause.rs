use crate::input::InputEvent;

/// Derives the paused flag from space-bar toggles and focus loss.
///
/// Starts paused. A blur seen during a window forces that window's sample to
/// paused even if a later toggle in the same window flipped the live value.
#[derive(Debug, Clone)]
pub struct PauseTracker {
    paused: bool,
    blur_latched: bool,
}

impl Default for PauseTracker {
    fn default() -> Self {
        Self {
            paused: true,
            blur_latched: false,
        }
    }
}

impl PauseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self) {
        self.paused = !self.paused;
    }

    pub fn blur(&mut self) {
        self.paused = true;
        self.blur_latched = true;
    }

    /// Apply an input event. Returns true if the event was pause-related.
    pub fn handle(&mut self, event: InputEvent) -> bool {
        match event {
            InputEvent::Blur => {
                self.blur();
                true
            },
            InputEvent::Key(code) if code.is_pause_toggle() => {
                self.toggle();
                true
            },
            InputEvent::Key(_) => false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Paused flag for the window being closed. Clears the blur latch.
    pub fn sample(&mut self) -> bool {
        let sampled = self.paused || self.blur_latched;
        self.blur_latched = false;
        sampled
    }
}
