//! Build script for amplifier link firmware
//!
//! Handles:
//! - Linker scripts for the embedded target (memory layout comes from
//!   `embassy-stm32`'s `memory-x` feature)

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Host builds (tests) link normally
    if std::env::var_os("CARGO_FEATURE_EMBEDDED").is_none() {
        return;
    }

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
