// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=PHOTOBOOTH_VERSION");

    // Kiosk images are built from tarballs and stamp the version themselves
    let version = std::env::var("PHOTOBOOTH_VERSION")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(version_from_git);

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `<package version>-<short hash>`, with `-dirty` when the tree has changes
fn version_from_git() -> String {
    let package = env!("CARGO_PKG_VERSION");

    let Some(hash) = git(&["rev-parse", "--short", "HEAD"]) else {
        return package.to_string();
    };

    let dirty = git(&["status", "--porcelain", "--untracked-files=no"])
        .is_some_and(|status| !status.is_empty());

    if dirty {
        format!("{}-{}-dirty", package, hash)
    } else {
        format!("{}-{}", package, hash)
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}
