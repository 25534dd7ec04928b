//! Locating the headless browser executable
//!
//! The executable is resolved once at startup. It can be left to the CDP
//! backend's own discovery, pinned to a local path, or downloaded from a
//! version-pinned URL on cold start. Downloaded packs are unpacked into the
//! cache directory together with the libraries and resources they carry,
//! and reused on later starts.

use crate::{Error, Result};
use flate2::read::GzDecoder;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// File names a browser build's main executable goes by.
const EXECUTABLE_NAMES: [&str; 4] = ["chromium", "chrome", "headless_shell", "chrome-headless-shell"];

/// Where the browser executable comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExecutableSource {
    /// Let the backend search the usual install locations
    #[default]
    Auto,
    /// A browser bundled with the deployment
    Local(PathBuf),
    /// A pinned build fetched from `url` and unpacked under `cache_dir`
    Remote { url: String, cache_dir: PathBuf },
}

impl ExecutableSource {
    /// Resolve to a path on disk, downloading if needed.
    ///
    /// Uses blocking I/O; call before entering the async runtime.
    pub fn resolve(&self) -> Result<Option<PathBuf>> {
        match self {
            ExecutableSource::Auto => Ok(None),
            ExecutableSource::Local(path) => {
                if path.is_file() {
                    Ok(Some(path.clone()))
                } else {
                    Err(Error::ConfigError(format!(
                        "Browser executable not found at {}",
                        path.display()
                    )))
                }
            }
            ExecutableSource::Remote { url, cache_dir } => {
                let dir = pack_dir(url, cache_dir)?;
                if dir.is_dir() {
                    if let Some(exe) = find_executable(&dir)? {
                        info!("Using cached browser at {}", exe.display());
                        return Ok(Some(exe));
                    }
                }
                let bytes = fetch_remote(url)?;
                install_pack(&bytes, &pack_name(url)?, &dir).map(Some)
            }
        }
    }
}

/// How a downloaded build is packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackFormat {
    Tar,
    TarGz,
    TarBrotli,
    /// A single self-contained executable
    Executable,
}

impl PackFormat {
    /// Guess from the file name, then from the leading bytes.
    pub fn detect(name: &str, bytes: &[u8]) -> Self {
        if name.ends_with(".tar.br") {
            PackFormat::TarBrotli
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") || bytes.starts_with(&[0x1f, 0x8b]) {
            PackFormat::TarGz
        } else if name.ends_with(".tar") || bytes.get(257..262) == Some(b"ustar".as_slice()) {
            PackFormat::Tar
        } else {
            PackFormat::Executable
        }
    }
}

/// Last non-empty path segment of `url`, or `chromium`.
pub fn pack_name(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url)
        .map_err(|e| Error::ConfigError(format!("Invalid executable URL '{}': {}", url, e)))?;

    Ok(parsed
        .path_segments()
        .and_then(|segments| segments.rev().find(|s| !s.is_empty()))
        .unwrap_or("chromium")
        .to_string())
}

/// Cache directory for the build published at `url`: its pack name without
/// archive suffix, inside `cache_dir`.
pub fn pack_dir(url: &str, cache_dir: &Path) -> Result<PathBuf> {
    let name = pack_name(url)?;
    let stem = [".tar.gz", ".tar.br", ".tgz", ".tar"]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .filter(|stem| !stem.is_empty())
        .unwrap_or(&name);
    Ok(cache_dir.join(stem))
}

/// Unpack a downloaded pack into `dir` and return its browser executable.
///
/// The pack is unpacked next to `dir` first and moved into place only once
/// an executable was found, so a broken download never looks cached.
pub fn install_pack(bytes: &[u8], name: &str, dir: &Path) -> Result<PathBuf> {
    let staging = dir.with_file_name(format!(
        "{}.part",
        dir.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let format = PackFormat::detect(name, bytes);
    debug!("Unpacking {} ({:?}, {} bytes)", name, format, bytes.len());
    if let Err(e) = unpack(format, bytes, &staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(Error::ConfigError(format!("Failed to unpack {}: {}", name, e)));
    }

    let Some(exe) = find_executable(&staging)? else {
        let _ = fs::remove_dir_all(&staging);
        return Err(Error::ConfigError(format!(
            "No browser executable ({}) found in {}",
            EXECUTABLE_NAMES.join(", "),
            name
        )));
    };
    make_executable(&exe)?;

    let relative = exe
        .strip_prefix(&staging)
        .map_err(|e| Error::Other(format!("Unpacked executable outside {}: {}", staging.display(), e)))?
        .to_path_buf();
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::rename(&staging, dir)?;

    let exe = dir.join(relative);
    info!("Installed browser at {}", exe.display());
    Ok(exe)
}

fn unpack(format: PackFormat, bytes: &[u8], dest: &Path) -> std::io::Result<()> {
    match format {
        PackFormat::Tar => tar::Archive::new(bytes).unpack(dest),
        PackFormat::TarGz => tar::Archive::new(GzDecoder::new(bytes)).unpack(dest),
        PackFormat::TarBrotli => tar::Archive::new(brotli::Decompressor::new(bytes, 4096)).unpack(dest),
        PackFormat::Executable => fs::write(dest.join(EXECUTABLE_NAMES[0]), bytes),
    }
}

/// First file below `dir` named like a browser executable.
pub fn find_executable(dir: &Path) -> Result<Option<PathBuf>> {
    let root = glob::Pattern::escape(&dir.to_string_lossy());
    for name in EXECUTABLE_NAMES {
        let pattern = format!("{}/**/{}", root, name);
        let paths = glob::glob(&pattern)
            .map_err(|e| Error::ConfigError(format!("Bad search pattern {}: {}", pattern, e)))?;
        if let Some(found) = paths.filter_map(|p| p.ok()).find(|p| p.is_file()) {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

#[cfg(feature = "remote")]
fn fetch_remote(url: &str) -> Result<Vec<u8>> {
    info!("Downloading browser from {}", url);
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::NetworkError(format!("Failed to download {}: {}", url, e)))?;
    let bytes = response
        .bytes()
        .map_err(|e| Error::NetworkError(format!("Failed to read {}: {}", url, e)))?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

#[cfg(not(feature = "remote"))]
fn fetch_remote(url: &str) -> Result<Vec<u8>> {
    Err(Error::ConfigError(format!(
        "Cannot fetch {}: built without the `remote` feature",
        url
    )))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
