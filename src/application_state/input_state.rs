//! # Input State
//!
//! Per-frame snapshot of the tracked keys and buttons, with each one
//! classified by how it changed since the previous frame.

use std::collections::HashMap;
use winit::{event::MouseButton, keyboard::KeyCode};

/// How a key or button changed between two frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RawInputState {
    #[default]
    NotPressed,
    /// Went down this frame
    Pressed,
    /// Down this frame and the last
    Held,
    /// Went up this frame
    Released,
}

impl RawInputState {
    /// Down this frame, whether newly or still.
    pub fn is_active(&self) -> bool {
        matches!(self, RawInputState::Pressed | RawInputState::Held)
    }

    pub fn is_just_pressed(&self) -> bool {
        matches!(self, RawInputState::Pressed)
    }

    pub fn is_just_released(&self) -> bool {
        matches!(self, RawInputState::Released)
    }

    /// Classifies a key from whether it was down last frame and this frame.
    pub fn from_raw_states(previous: bool, current: bool) -> Self {
        match (previous, current) {
            (false, true) => RawInputState::Pressed,
            (true, true) => RawInputState::Held,
            (true, false) => RawInputState::Released,
            (false, false) => RawInputState::NotPressed,
        }
    }
}

/// One frame of input as seen by the engine.
#[derive(Debug, Default)]
pub struct ProcessedInputState {
    pub keyboard_states: HashMap<KeyCode, RawInputState>,
    pub mouse_button_states: HashMap<MouseButton, RawInputState>,
    /// Summed raw mouse motion since the last frame
    pub mouse_delta: Option<(f64, f64)>,
}

impl ProcessedInputState {
    /// Untracked keys read as `NotPressed`.
    pub fn get_key_state(&self, key: KeyCode) -> RawInputState {
        self.keyboard_states.get(&key).copied().unwrap_or_default()
    }

    pub fn get_mouse_button_state(&self, button: MouseButton) -> RawInputState {
        self.mouse_button_states.get(&button).copied().unwrap_or_default()
    }

    pub fn get_mouse_delta(&self) -> Option<(f64, f64)> {
        self.mouse_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_previous_frame() {
        assert_eq!(RawInputState::from_raw_states(false, true), RawInputState::Pressed);
        assert_eq!(RawInputState::from_raw_states(true, true), RawInputState::Held);
        assert!(RawInputState::from_raw_states(true, false).is_just_released());
        assert!(!RawInputState::from_raw_states(false, false).is_active());
    }

    #[test]
    fn untracked_inputs_are_not_pressed() {
        let input = ProcessedInputState::default();
        assert_eq!(input.get_key_state(KeyCode::KeyQ), RawInputState::NotPressed);
        assert_eq!(
            input.get_mouse_button_state(MouseButton::Right),
            RawInputState::NotPressed
        );
        assert_eq!(input.get_mouse_delta(), None);
    }
}
