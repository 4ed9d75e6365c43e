// src/core/locator.rs

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Resolves external tool names to executable paths.
///
/// Search order: the configured tools directory, a fixed list of common
/// install locations, then `PATH`. When nothing matches the bare name is
/// returned unchanged so the later spawn fails with a clear "not found".
#[derive(Debug)]
pub struct ToolLocator {
    tools_dir: Option<PathBuf>,
    common_paths: Vec<PathBuf>,
    resolved: Mutex<HashMap<String, PathBuf>>,
}

impl ToolLocator {
    pub fn new(tools_dir: Option<PathBuf>) -> Self {
        Self::with_search_paths(tools_dir, common_install_paths())
    }

    pub fn with_search_paths(tools_dir: Option<PathBuf>, common_paths: Vec<PathBuf>) -> Self {
        Self {
            tools_dir,
            common_paths,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, tool: &str) -> PathBuf {
        if let Some(hit) = self.cached(tool) {
            return hit;
        }

        let found = self.search(tool, std::env::var_os("PATH").as_deref());
        match found {
            Some(path) => {
                debug!(tool, path = %path.display(), "Resolved tool.");
                if let Ok(mut cache) = self.resolved.lock() {
                    cache.insert(tool.to_string(), path.clone());
                }
                path
            }
            // Misses are not cached: the tool may be installed later.
            None => {
                debug!(tool, "Tool not found, falling back to bare name.");
                PathBuf::from(tool)
            }
        }
    }

    fn cached(&self, tool: &str) -> Option<PathBuf> {
        self.resolved.lock().ok()?.get(tool).cloned()
    }

    fn search(&self, tool: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
        // The configured directory is trusted as-is; everything else must be executable.
        if let Some(dir) = &self.tools_dir {
            let candidate = dir.join(tool);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        self.common_paths
            .iter()
            .map(|dir| dir.join(tool))
            .find(|candidate| is_executable(candidate))
            .or_else(|| find_in_path(tool, path_var?))
    }
}

fn common_install_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = ["/usr/local/bin", "/usr/bin", "/bin", "/opt/go/bin"]
        .into_iter()
        .map(PathBuf::from)
        .collect();
    if let Some(dirs) = directories::BaseDirs::new() {
        let home = dirs.home_dir();
        paths.push(home.join("go").join("bin"));
        paths.push(home.join(".local").join("bin"));
        paths.push(home.join("bin"));
    }
    paths
}

/// Looks `tool` up in a `PATH`-style list of directories.
pub fn find_in_path(tool: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}
