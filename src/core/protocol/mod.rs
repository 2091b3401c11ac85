// src/core/protocol/mod.rs

//! The wire protocol spoken between the nexus and its minions.

mod frame;

pub use frame::{Frame, FrameCodec, MAX_FRAME_SIZE};
