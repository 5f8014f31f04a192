// Kiki Companion — Firmware Core
//
// Conversation state machine, main event loop, motion executor and sleep
// coordination for a voice-controlled quadruped. Hardware sits behind the
// traits in `board`, `audio`, `protocol` and `platform`; `platform::sim`
// provides host implementations for the simulator binary and tests.

pub mod app;
pub mod audio;
pub mod board;
pub mod commands;
pub mod config;
pub mod drivers;
pub mod event_group;
pub mod events;
pub mod motion;
pub mod ota;
pub mod platform;
pub mod protocol;
pub mod scheduler;
pub mod settings;
pub mod state;
pub mod tasks;
