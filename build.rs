use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
}

fn main() {
    for path in [".git/HEAD", ".git/refs/heads/", ".git/refs/tags/", ".git/index"] {
        println!("cargo:rerun-if-changed={path}");
    }

    let dirty = git(&["status", "--porcelain", "--untracked-files=no"]).is_some_and(|s| !s.is_empty());
    let hash = git(&["rev-parse", "--short", "HEAD"]).map_or_else(
        || "unknown".to_string(),
        |h| if dirty { format!("{h}-dirty") } else { h },
    );
    let is_release = !dirty && git(&["describe", "--exact-match", "--tags", "HEAD"]).is_some();

    println!("cargo:rustc-env=WARDEN_GIT_HASH={hash}");
    println!("cargo:rustc-env=WARDEN_IS_RELEASE={is_release}");
}
