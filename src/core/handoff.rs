// src/core/handoff.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::core::errors::EngineError;

/// A temporary file passed from one stage to the next.
///
/// The file is removed when the handle is dropped, on every exit path of
/// the pipeline.
#[derive(Debug)]
pub struct HandoffFile {
    path: TempPath,
}

impl HandoffFile {
    /// Reserves a unique path for a tool to create. The file itself does not
    /// exist afterwards, so a tool that never writes it can be detected.
    pub fn reserve(dir: &Path, suffix: &str) -> Result<Self, EngineError> {
        let handle = Self::create(dir, suffix)?;
        std::fs::remove_file(handle.path()).map_err(|e| EngineError::io(handle.path(), e))?;
        Ok(handle)
    }

    /// Creates an empty file.
    pub fn create(dir: &Path, suffix: &str) -> Result<Self, EngineError> {
        let file = tempfile::Builder::new()
            .prefix("hawks_")
            .suffix(suffix)
            .tempfile_in(dir)
            .map_err(|e| EngineError::io(dir, e))?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    /// Creates a file holding `lines`, one per line.
    pub async fn from_lines(dir: &Path, suffix: &str, lines: &[String]) -> Result<Self, EngineError> {
        let handle = Self::create(dir, suffix)?;
        handle.write_lines(lines).await?;
        Ok(handle)
    }

    /// Replaces the file contents with `lines`, one per line.
    pub async fn write_lines(&self, lines: &[String]) -> Result<(), EngineError> {
        let mut body = lines.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        tokio::fs::write(self.path(), body)
            .await
            .map_err(|e| EngineError::io(self.path(), e))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    pub async fn read_to_string(&self) -> Result<String, EngineError> {
        tokio::fs::read_to_string(self.path())
            .await
            .map_err(|e| EngineError::io(self.path(), e))
    }

    pub async fn append_lines(&self, lines: &[String]) -> Result<(), EngineError> {
        if lines.is_empty() {
            return Ok(());
        }
        let existing = self.read_to_string().await?;
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(self.path())
            .await
            .map_err(|e| EngineError::io(self.path(), e))?;

        let mut body = String::new();
        if !existing.is_empty() && !existing.ends_with('\n') {
            body.push('\n');
        }
        for line in lines {
            body.push_str(line);
            body.push('\n');
        }
        file.write_all(body.as_bytes())
            .await
            .map_err(|e| EngineError::io(self.path(), e))?;
        file.flush().await.map_err(|e| EngineError::io(self.path(), e))
    }
}

/// Hosts handed from one stage to the next, optionally backed by a file.
#[derive(Debug, Default)]
pub struct WorkingSet {
    pub hosts: Vec<String>,
    pub file: Option<HandoffFile>,
}

impl WorkingSet {
    pub fn in_memory(hosts: Vec<String>) -> Self {
        Self { hosts, file: None }
    }

    pub fn file_backed(hosts: Vec<String>, file: HandoffFile) -> Self {
        Self {
            hosts,
            file: Some(file),
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        self.file.as_ref().map(|f| f.path().to_path_buf())
    }

    /// Adds `extra` hosts as a set union. New hosts are appended to the
    /// backing file too, so downstream tools read a single artifact.
    /// Returns how many hosts were new.
    pub async fn merge(&mut self, extra: &[String]) -> Result<usize, EngineError> {
        let known: HashSet<&str> = self.hosts.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let fresh: Vec<String> = extra
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty() && !known.contains(h) && seen.insert(*h))
            .map(str::to_string)
            .collect();

        if let Some(file) = &self.file {
            file.append_lines(&fresh).await?;
        }
        debug!(added = fresh.len(), total = self.hosts.len() + fresh.len(), "Merged hosts into working set.");
        self.hosts.extend(fresh.iter().cloned());
        Ok(fresh.len())
    }
}

/// Parses tool output into hosts.
///
/// Understands plain one-per-line output, a JSON array of strings, and JSON
/// Lines objects carrying a `host` (or `input`/`url`) field. Duplicates are
/// dropped, first occurrence wins.
pub fn parse_host_lines(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
            return dedup(list.into_iter());
        }
    }

    let hosts = trimmed.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if line.starts_with('{') {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
                return ["host", "input", "url"]
                    .iter()
                    .find_map(|key| value.get(key).and_then(|v| v.as_str()))
                    .map(str::to_string);
            }
        }
        Some(line.to_string())
    });
    dedup(hosts)
}

fn dedup(hosts: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    hosts
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty() && seen.insert(h.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn hosts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn merged(base: &[&str], extra: &[&str]) -> Vec<String> {
        let mut set = WorkingSet::in_memory(hosts(base));
        set.merge(&hosts(extra)).await.unwrap();
        let mut all = set.hosts;
        all.sort();
        all
    }

    #[tokio::test]
    async fn merge_is_a_set_union() {
        let expected = hosts(&["a", "b", "c"]);

        assert_eq!(merged(&["a", "b"], &["b", "c"]).await, expected);
        assert_eq!(merged(&["b", "c"], &["a", "b"]).await, expected);
        assert_eq!(merged(&["a", "b", "c"], &["c", " b ", ""]).await, expected);
    }

    #[test]
    fn parses_every_output_shape() {
        assert_eq!(
            parse_host_lines(r#"["a.example.com","b.example.com"]"#),
            hosts(&["a.example.com", "b.example.com"])
        );
        assert_eq!(
            parse_host_lines("a.example.com\n\n b.example.com \na.example.com\n"),
            hosts(&["a.example.com", "b.example.com"])
        );
        assert_eq!(
            parse_host_lines("{\"host\":\"a.example.com\",\"source\":\"crtsh\"}\n{\"input\":\"b.example.com\"}"),
            hosts(&["a.example.com", "b.example.com"])
        );
        assert!(parse_host_lines("   \n").is_empty());
    }

    #[test]
    fn handle_removes_file_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = {
            let handle = HandoffFile::create(dir.path(), "_subfinder.txt").unwrap();
            assert!(handle.exists());
            handle.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn reserved_path_is_not_created() {
        let dir = TempDir::new().unwrap();
        let handle = HandoffFile::reserve(dir.path(), "_httpx.txt").unwrap();
        assert!(!handle.exists());
        assert!(handle.path().to_string_lossy().ends_with("_httpx.txt"));
    }

    #[tokio::test]
    async fn merge_appends_only_new_hosts_to_file() {
        let dir = TempDir::new().unwrap();
        let file = HandoffFile::create(dir.path(), ".txt").unwrap();
        tokio::fs::write(file.path(), "a.example.com\nb.example.com").await.unwrap();

        let mut set = WorkingSet::file_backed(hosts(&["a.example.com", "b.example.com"]), file);
        let added = set
            .merge(&hosts(&["b.example.com", "c.example.com", "c.example.com", " "]))
            .await
            .unwrap();

        assert_eq!(added, 1);
        assert_eq!(set.hosts, hosts(&["a.example.com", "b.example.com", "c.example.com"]));
        let on_disk = set.file.as_ref().unwrap().read_to_string().await.unwrap();
        assert_eq!(parse_host_lines(&on_disk), set.hosts);
        assert_eq!(on_disk, "a.example.com\nb.example.com\nc.example.com\n");
    }

    #[tokio::test]
    async fn from_lines_round_trips() {
        let dir = TempDir::new().unwrap();
        let file = HandoffFile::from_lines(dir.path(), ".txt", &hosts(&["x", "y"])).await.unwrap();
        assert_eq!(file.read_to_string().await.unwrap(), "x\ny\n");
    }
}
