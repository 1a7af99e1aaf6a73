//! IRToy GW - universal remote bridge
//!
//! Turns raw infrared timing pulses from a USB IR Toy into symbolic button
//! presses, routes them through configurable, inheritable keymaps, and fans
//! the resulting actions out to actuators: synthetic key injection, remote
//! control peers, stored-packet retransmission, and external scripts.

pub mod config;
pub mod control_file;
pub mod drivers;
pub mod ir;
pub mod keymap;
pub mod reactor;
pub mod server;
