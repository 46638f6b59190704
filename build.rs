//! Embeds the build revision as `GIT_HASH`
//!
//! Device images are often cross-built from a source tarball, so
//! `PRESENCE_BUILD_REV` takes precedence over asking git.

use std::env;
use std::process::Command;

fn git_short_hash() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!hash.is_empty()).then_some(hash)
}

fn main() {
    let revision = env::var("PRESENCE_BUILD_REV")
        .ok()
        .filter(|rev| !rev.trim().is_empty())
        .or_else(git_short_hash)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", revision);
    println!("cargo:rerun-if-env-changed=PRESENCE_BUILD_REV");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
