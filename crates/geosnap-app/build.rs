//! Embeds the workspace `VERSION` file as `GEOSNAP_VERSION`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    let manifest_dir = PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").unwrap_or_default());

    let from_file = version_file(&manifest_dir).and_then(|path| {
        println!("cargo:rerun-if-changed={}", path.display());
        read_version(&path)
    });

    let version = from_file.unwrap_or_else(|| {
        let package = env::var("CARGO_PKG_VERSION").unwrap_or_default();
        println!("cargo:warning=no usable VERSION file, embedding package version {package}");
        package
    });

    println!("cargo:rustc-env=GEOSNAP_VERSION={version}");
}

/// Nearest `VERSION` file at or above the crate directory.
fn version_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join("VERSION"))
        .find(|candidate| candidate.is_file())
}

fn read_version(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let version = raw.lines().next().unwrap_or_default().trim();
    (!version.is_empty()).then(|| version.to_string())
}
