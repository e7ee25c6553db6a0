//! Synchronized velocity coordination for Dynamixel servos sharing one
//! serial bus, on no-std embedded platforms.
//!
//! For a runnable driver loop over a simulated bus, see `dxl-app/mock-bus`.
#![no_std]

extern crate alloc;

pub mod utils;
