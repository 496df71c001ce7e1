fn main() {
    // 1. If EXPLORER_BUILD_VERSION is already set (e.g., by a packaging script), use it as-is
    println!("cargo:rerun-if-env-changed=EXPLORER_BUILD_VERSION");
    if let Ok(v) = std::env::var("EXPLORER_BUILD_VERSION") {
        if !v.is_empty() {
            println!("cargo:rustc-env=EXPLORER_BUILD_VERSION={v}");
            return;
        }
    }

    // 2. Try VERSION file (used by CI to override git describe)
    println!("cargo:rerun-if-changed=VERSION");
    if let Ok(v) = std::fs::read_to_string("VERSION") {
        let v = v.trim();
        let v = v.strip_prefix('v').unwrap_or(v);
        if !v.is_empty() {
            println!("cargo:rustc-env=EXPLORER_BUILD_VERSION={v}");
            return;
        }
    }

    // 3. Try git describe
    if let Ok(output) = std::process::Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
    {
        if output.status.success() {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let version = version.strip_prefix('v').unwrap_or(&version);
            if !version.is_empty() {
                println!("cargo:rustc-env=EXPLORER_BUILD_VERSION={version}");
                println!("cargo:rerun-if-changed=.git/HEAD");
                println!("cargo:rerun-if-changed=.git/refs/tags");
                return;
            }
        }
    }

    // 4. Fallback to Cargo.toml version
    let version = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    println!("cargo:rustc-env=EXPLORER_BUILD_VERSION={version}");
}
