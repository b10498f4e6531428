//! Puts `memory.x` on the linker search path for the RP2350 build and records the embassy-rp version
//! that the firmware reports as its platform SDK version.

use std::env;
use std::fs;
use std::path::PathBuf;

// Crate whose version is reported at boot.
const SDK_CRATE: &str = "embassy-rp";

fn main() {
    let manifest_dir = PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").unwrap());
    let out = PathBuf::from(env::var_os("OUT_DIR").unwrap());

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=Cargo.lock");

    let version = fs::read_to_string(manifest_dir.join("Cargo.lock"))
        .ok()
        .and_then(|lock| locked_version(&lock, SDK_CRATE))
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=PLATFORM_SDK_VERSION={SDK_CRATE} {version}");

    // Only the firmware build needs the linker scripts, host builds run tests and tools.
    if env::var("CARGO_CFG_TARGET_ARCH").as_deref() != Ok("arm") {
        return;
    }
    fs::copy(manifest_dir.join("memory.x"), out.join("memory.x")).unwrap();
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}

/// Find the version of `name` in the contents of a Cargo.lock file.
fn locked_version(lock: &str, name: &str) -> Option<String> {
    let wanted = format!("name = \"{name}\"");
    let mut lines = lock.lines().map(str::trim);
    while let Some(line) = lines.next() {
        if line != wanted {
            continue;
        }
        // The version line directly follows the name in a [[package]] entry.
        let version = lines.next()?.strip_prefix("version = ")?;
        return Some(version.trim_matches('"').to_string());
    }
    None
}
