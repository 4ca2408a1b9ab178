//! Linker script setup for the STM32L433 build.
//!
//! Copies `memory.x` next to the build output so `link.x` (from
//! cortex-m-rt) can include it. Host builds skip this entirely.

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    if env::var_os("CARGO_FEATURE_HARDWARE").is_none() {
        return;
    }
    let Some(out_dir) = env::var_os("OUT_DIR") else {
        return;
    };
    let out = PathBuf::from(out_dir);
    if let Err(e) = fs::write(out.join("memory.x"), include_bytes!("../../memory.x")) {
        println!("cargo:warning=could not stage memory.x: {e}");
        return;
    }
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=../../memory.x");
}
