//! # Input Manager
//!
//! Collects window and device input between frames and turns it into a
//! `ProcessedInputState` once per frame.
//!
//! Only the keys and buttons the engine binds are tracked:
//! - `W` `A` `S` `D`, `Space`, `Left Shift`: fly
//! - left mouse drag: look
//! - `R`: mesh every visible chunk again
//! - `B`: log buffer and streaming statistics

use std::collections::HashMap;

use winit::{
    event::{ElementState, KeyEvent, MouseButton, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

use super::input_state::{ProcessedInputState, RawInputState};

const KEY_CODES: [KeyCode; 8] = [
    KeyCode::KeyW,
    KeyCode::KeyS,
    KeyCode::KeyA,
    KeyCode::KeyD,
    KeyCode::KeyR,
    KeyCode::KeyB,
    KeyCode::Space,
    KeyCode::ShiftLeft,
];

const MOUSE_BUTTONS: [MouseButton; 1] = [MouseButton::Left];

/// Down/up state of one kind of input, this frame and the last.
#[derive(Debug)]
struct TrackedInputs<K> {
    previous: HashMap<K, bool>,
    current: HashMap<K, bool>,
}

impl<K: Copy + Eq + std::hash::Hash> TrackedInputs<K> {
    fn new(inputs: &[K]) -> Self {
        let released: HashMap<K, bool> = inputs.iter().map(|input| (*input, false)).collect();
        Self {
            previous: released.clone(),
            current: released,
        }
    }

    /// Untracked inputs are ignored.
    fn record(&mut self, input: K, pressed: bool) {
        if let Some(state) = self.current.get_mut(&input) {
            *state = pressed;
        }
    }

    fn release_all(&mut self) {
        self.current.values_mut().for_each(|state| *state = false);
    }

    fn processed(&self) -> HashMap<K, RawInputState> {
        self.current
            .iter()
            .map(|(input, &current)| {
                let previous = self.previous.get(input).copied().unwrap_or(false);
                (*input, RawInputState::from_raw_states(previous, current))
            })
            .collect()
    }

    fn advance(&mut self) {
        self.previous.clone_from(&self.current);
    }
}

/// Tracks input between frames.
#[derive(Debug)]
pub struct InputManager {
    keys: TrackedInputs<KeyCode>,
    mouse_buttons: TrackedInputs<MouseButton>,
    /// Raw mouse motion summed since the last frame
    mouse_delta: Option<(f64, f64)>,
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InputManager {
    /// Creates a manager with every tracked input released.
    pub fn new() -> Self {
        Self {
            keys: TrackedInputs::new(&KEY_CODES),
            mouse_buttons: TrackedInputs::new(&MOUSE_BUTTONS),
            mouse_delta: None,
        }
    }

    /// Records keyboard and mouse button events.
    pub fn intake_input(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state,
                        physical_key: PhysicalKey::Code(key),
                        ..
                    },
                ..
            } => self.keys.record(*key, *state == ElementState::Pressed),
            WindowEvent::MouseInput { button, state, .. } => self
                .mouse_buttons
                .record(*button, *state == ElementState::Pressed),
            _ => {}
        }
    }

    /// Adds raw mouse motion. Several device events can arrive per frame.
    pub fn intake_mouse_motion(&mut self, delta: (f64, f64)) {
        let (x, y) = self.mouse_delta.unwrap_or((0.0, 0.0));
        self.mouse_delta = Some((x + delta.0, y + delta.1));
    }

    /// Returns this frame's input and starts the next frame.
    pub fn get_and_reset_processed_input(&mut self) -> Option<ProcessedInputState> {
        let processed = ProcessedInputState {
            keyboard_states: self.keys.processed(),
            mouse_button_states: self.mouse_buttons.processed(),
            mouse_delta: self.mouse_delta.take(),
        };
        self.keys.advance();
        self.mouse_buttons.advance();
        Some(processed)
    }

    /// Releases everything, for when the window loses focus and key-up
    /// events would be missed.
    pub fn reset_inputs(&mut self) {
        self.keys.release_all();
        self.mouse_buttons.release_all();
        self.mouse_delta = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_frame(manager: &mut InputManager) -> ProcessedInputState {
        manager.get_and_reset_processed_input().unwrap()
    }

    #[test]
    fn keys_go_from_pressed_to_held_to_released() {
        let mut manager = InputManager::new();
        manager.keys.record(KeyCode::KeyW, true);
        assert_eq!(next_frame(&mut manager).get_key_state(KeyCode::KeyW), RawInputState::Pressed);
        assert_eq!(next_frame(&mut manager).get_key_state(KeyCode::KeyW), RawInputState::Held);

        manager.keys.record(KeyCode::KeyW, false);
        assert_eq!(next_frame(&mut manager).get_key_state(KeyCode::KeyW), RawInputState::Released);
        assert_eq!(next_frame(&mut manager).get_key_state(KeyCode::KeyW), RawInputState::NotPressed);
    }

    #[test]
    fn untracked_keys_are_ignored() {
        let mut manager = InputManager::new();
        manager.keys.record(KeyCode::KeyZ, true);
        let input = next_frame(&mut manager);
        assert!(!input.keyboard_states.contains_key(&KeyCode::KeyZ));
    }

    #[test]
    fn mouse_motion_is_summed_per_frame() {
        let mut manager = InputManager::new();
        manager.intake_mouse_motion((1.0, -2.0));
        manager.intake_mouse_motion((3.0, 0.5));
        assert_eq!(next_frame(&mut manager).get_mouse_delta(), Some((4.0, -1.5)));
        assert_eq!(next_frame(&mut manager).get_mouse_delta(), None);
    }

    #[test]
    fn losing_focus_releases_held_inputs() {
        let mut manager = InputManager::new();
        manager.mouse_buttons.record(MouseButton::Left, true);
        manager.keys.record(KeyCode::ShiftLeft, true);
        next_frame(&mut manager);

        manager.reset_inputs();
        let input = next_frame(&mut manager);
        assert!(input.get_mouse_button_state(MouseButton::Left).is_just_released());
        assert!(!input.get_key_state(KeyCode::ShiftLeft).is_active());
    }
}
