//! Windowing and input.
//!
//! Wraps winit for window management and ash-window for Vulkan surface
//! creation. The [`Window`] type carries the contract the renderer depends
//! on: a drawable extent that may be zero while minimized, a sticky
//! was-resized flag with an explicit reset, and a wait hook used while
//! stalled on a zero-area surface.

pub mod input;
pub mod window;

pub use input::InputState;
pub use window::{Surface, Window};

pub use winit::keyboard::KeyCode;
