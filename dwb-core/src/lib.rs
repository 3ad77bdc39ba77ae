//! Core drivers and utilities for a differential-wheel bot on no-std embedded platforms.
//!
//! For a runnable host simulation, see the `dwb-app/mock-mcu` binary.
#![no_std]

pub mod utils;
