// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Capture-directory watcher for newly dropped note photos

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::Result;

/// Image extensions accepted as note captures
const CAPTURE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "heic", "heif"];

/// Events emitted by the watcher
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A new capture appeared
    CaptureCreated(PathBuf),
    /// Watcher error
    Error(String),
}

/// Filesystem watcher over capture directories
pub struct CaptureWatcher {
    watcher: RecommendedWatcher,
    watched_paths: Vec<PathBuf>,
    event_rx: Receiver<notify::Result<Event>>,
}

impl CaptureWatcher {
    /// Create a new capture watcher
    pub fn new() -> Result<Self> {
        let (tx, rx) = channel();

        let config = Config::default().with_poll_interval(Duration::from_secs(2));

        let watcher = RecommendedWatcher::new(tx, config)?;

        Ok(Self {
            watcher,
            watched_paths: Vec::new(),
            event_rx: rx,
        })
    }

    /// Add a capture directory to watch
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::create_dir_all(path)?;
            info!("Created capture directory: {:?}", path);
        }

        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.watched_paths.push(path.to_path_buf());
        info!("Watching: {:?}", path);

        Ok(())
    }

    /// Get the next event (blocking with timeout)
    pub fn next_event(&self, timeout: Duration) -> Option<WatchEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => Self::convert_event(event),
            Ok(Err(e)) => Some(WatchEvent::Error(e.to_string())),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => None,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                Some(WatchEvent::Error("Watcher disconnected".to_string()))
            }
        }
    }

    fn convert_event(event: Event) -> Option<WatchEvent> {
        match event.kind {
            EventKind::Create(_) => event
                .paths
                .first()
                .map(|p| WatchEvent::CaptureCreated(p.clone())),
            _ => None,
        }
    }

    /// Get currently watched paths
    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched_paths
    }
}

/// Check whether a file looks like a finished note capture
pub fn is_capture_candidate(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Skip hidden files
    if filename.starts_with('.') {
        return false;
    }

    // Skip files still being transferred
    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    for ext in &temp_extensions {
        if filename.ends_with(ext) {
            return false;
        }
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => CAPTURE_EXTENSIONS
            .iter()
            .any(|c| c.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Wait for a file to be stable (not being written)
pub async fn wait_for_stable(path: &Path, max_wait: Duration) -> bool {
    let check_interval = Duration::from_millis(500);
    let start = std::time::Instant::now();

    let mut last_size = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(_) => return false,
    };

    loop {
        tokio::time::sleep(check_interval).await;

        if start.elapsed() > max_wait {
            warn!("Stability check timed out for {:?}", path);
            return true; // Proceed anyway
        }

        // File may have been deleted mid-transfer
        let current_size = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(_) => return false,
        };

        if current_size == last_size {
            return true;
        }

        last_size = current_size;
        debug!("File {:?} still being written, size: {}", path, current_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_image_extensions() {
        assert!(is_capture_candidate(Path::new("/captures/notes.jpg")));
        assert!(is_capture_candidate(Path::new("/captures/NOTES.JPEG")));
        assert!(is_capture_candidate(Path::new("/captures/page.png")));
        assert!(is_capture_candidate(Path::new("scan.heic")));
    }

    #[test]
    fn rejects_non_images_and_partials() {
        assert!(!is_capture_candidate(Path::new("/captures/notes.pdf")));
        assert!(!is_capture_candidate(Path::new("/captures/notes.txt")));
        assert!(!is_capture_candidate(Path::new("/captures/.hidden.jpg")));
        assert!(!is_capture_candidate(Path::new("/captures/notes.jpg.part")));
        assert!(!is_capture_candidate(Path::new("/captures/noextension")));
    }
}
