//! Audio-reactive ambience visualizer core.
//!
//! A [`driver::FrameDriver`] pulls features from the active capture source
//! each tick, renders one visualizer mode into a 2D canvas (through the
//! shared GPU context for shader modes) and optionally layers a particle
//! effect on top.

pub mod audio;
pub mod config;
pub mod driver;
pub mod modes;
pub mod particles;
pub mod render;
