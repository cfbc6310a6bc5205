//! Hardware Abstraction Layer
//!
//! Semantic wrappers over the board's pins and timers. Pins are taken as
//! `embedded-hal` 1.0 traits so the same wrappers run on the STM32 and in
//! host tests.

pub mod gpio;
pub mod timer;
