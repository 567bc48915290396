//! Keyboard input state.

use std::collections::HashSet;

use winit::keyboard::KeyCode;

/// Tracks which keys are held and which went down this frame.
#[derive(Debug, Default)]
pub struct InputState {
    pressed: HashSet<KeyCode>,
    just_pressed: HashSet<KeyCode>,
}

impl InputState {
    /// Creates an empty input state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears per-frame state; call once at the start of each frame.
    pub fn begin_frame(&mut self) {
        self.just_pressed.clear();
    }

    /// Records a key press.
    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed.insert(key) {
            self.just_pressed.insert(key);
        }
    }

    /// Records a key release.
    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed.remove(&key);
    }

    /// Whether the key is currently held.
    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    /// Whether the key went down since the last `begin_frame`.
    pub fn just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_release_cycle() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        assert!(input.is_pressed(KeyCode::KeyW));
        assert!(input.just_pressed(KeyCode::KeyW));

        input.begin_frame();
        assert!(input.is_pressed(KeyCode::KeyW));
        assert!(!input.just_pressed(KeyCode::KeyW));

        input.on_key_released(KeyCode::KeyW);
        assert!(!input.is_pressed(KeyCode::KeyW));
    }

    #[test]
    fn repeat_does_not_retrigger_just_pressed() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Escape);
        input.begin_frame();
        // OS key repeat delivers another press while held
        input.on_key_pressed(KeyCode::Escape);
        assert!(!input.just_pressed(KeyCode::Escape));
    }
}
