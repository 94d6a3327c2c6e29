// Build script for the Pi 4 kernel
//
// Wires the bare-metal linker script into the aarch64-unknown-none build.
// Host builds (unit tests) link normally and skip it.

use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=kernel.ld");

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    if target_os == "none" && target_arch == "aarch64" {
        let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
        println!("cargo:rustc-link-arg=-T{}/kernel.ld", manifest_dir);
    }
}
