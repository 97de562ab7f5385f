use std::fs;

fn main() {
    // workspace manifest, relative to this crate
    let workspace_manifest_path = "../../Cargo.toml";
    println!("cargo:rerun-if-changed={}", workspace_manifest_path);
    let manifest_content = fs::read_to_string(workspace_manifest_path).unwrap_or_default();

    // `name` under [workspace.metadata]
    let app_name = manifest_content
        .lines()
        .skip_while(|l| l.trim() != "[workspace.metadata]")
        .find(|l| l.trim_start().starts_with("name"))
        .and_then(|l| l.split('=').nth(1))
        .map(|v| v.trim().trim_matches('"').to_string())
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

    println!("cargo:rustc-env=APP_NAME={}", app_name);
}
