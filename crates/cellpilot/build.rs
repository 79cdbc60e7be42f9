//! Stamps the binary with its build date and source revision

use std::process::Command;

fn main() {
    println!(
        "cargo:rustc-env=CELLPILOT_BUILD_DATE={}",
        chrono::Utc::now().format("%Y-%m-%d")
    );

    let describe = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|describe| !describe.is_empty());
    if let Some(describe) = describe {
        println!("cargo:rustc-env=CELLPILOT_GIT_DESCRIBE={}", describe);
    }

    // Paths are relative to this crate, two levels below the workspace root
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=build.rs");
}
