//! The polling-watcher dispatch trigger.
//!
//! Every `poll_interval_ms` the upload directory is listed and the set
//! difference against the previous listing yields candidate artifacts. A
//! candidate is only dispatched once its size is unchanged across two
//! consecutive scans — reacting to a file the instant it appears races the
//! writer that is still streaming it in, so stability is the debounce, not
//! an optimisation.
//!
//! Files present when the watcher starts are treated as already observed;
//! re-running the watcher over a directory of processed decks must not
//! regenerate anything (and even if it did, the runner's idempotency check
//! would make it a no-op).
//!
//! Job identity: if the file name embeds a job id (the `submit` naming
//! scheme) that id is adopted, preserving id/artifact derivability; bare
//! files dropped into the directory by hand get a fresh id, and the runner
//! finds them through the stored name kept on the record.

use crate::error::ExplainError;
use crate::job::JobId;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Set-difference scanner with a size-stability debounce.
///
/// Pure state machine over directory listings; the async loop around it
/// lives in [`crate::service::Explainer::watch`] so this part is testable
/// without a filesystem or a clock.
#[derive(Debug, Default)]
pub(crate) struct DirScanner {
    /// Names already dispatched (or present before the first scan).
    known: HashSet<String>,
    /// Names seen once, mapped to their last observed size.
    candidates: HashMap<String, u64>,
    primed: bool,
}

impl DirScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one directory listing (name -> size); returns the names that
    /// just became new-and-stable, in arbitrary order.
    ///
    /// The first listing primes the known set and returns nothing.
    pub fn observe(&mut self, current: &HashMap<String, u64>) -> Vec<String> {
        if !self.primed {
            self.primed = true;
            self.known = current.keys().cloned().collect();
            debug!(existing = self.known.len(), "watcher primed");
            return Vec::new();
        }

        let mut stable = Vec::new();
        for (name, size) in current {
            if self.known.contains(name) {
                continue;
            }
            match self.candidates.get(name) {
                Some(previous) if previous == size => {
                    self.candidates.remove(name);
                    self.known.insert(name.clone());
                    stable.push(name.clone());
                }
                // Still growing (or first sighting): remember the size and
                // check again next scan.
                _ => {
                    self.candidates.insert(name.clone(), *size);
                }
            }
        }

        // Forget entries for files that disappeared so a re-created file
        // counts as new again.
        self.known.retain(|name| current.contains_key(name));
        self.candidates.retain(|name, _| current.contains_key(name));

        stable
    }
}

/// List a directory as name -> size, skipping subdirectories, dotfiles,
/// and in-progress `.tmp` files.
pub(crate) async fn list_dir(dir: &std::path::Path) -> Result<HashMap<String, u64>, ExplainError> {
    let mut listing = HashMap::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ExplainError::Storage {
            path: dir.to_path_buf(),
            source: e,
        })?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ExplainError::Storage {
            path: dir.to_path_buf(),
            source: e,
        })?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || name.ends_with(".tmp") {
            continue;
        }
        match entry.metadata().await {
            Ok(meta) if meta.is_file() => {
                listing.insert(name, meta.len());
            }
            Ok(_) => {}
            Err(e) => warn!(name, error = %e, "skipping unreadable entry"),
        }
    }
    Ok(listing)
}

/// Derive the job id and original source name from a discovered file.
///
/// `"{timestamp}_{id}_{source}"` names yield the embedded id and the
/// trailing source portion; anything else gets a fresh id and keeps its
/// full name as the source name.
pub(crate) fn identify(name: &str) -> (JobId, String) {
    match JobId::from_artifact_name(name) {
        Some(id) => {
            let source = name
                .find(id.as_str())
                .map(|pos| &name[pos + id.as_str().len()..])
                .map(|rest| rest.trim_start_matches('_'))
                .filter(|rest| !rest.is_empty())
                .unwrap_or(name)
                .to_string();
            info!(%id, source, "adopting job id from artifact name");
            (id, source)
        }
        None => (JobId::new(), name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(entries: &[(&str, u64)]) -> HashMap<String, u64> {
        entries
            .iter()
            .map(|(n, s)| (n.to_string(), *s))
            .collect()
    }

    #[test]
    fn first_scan_primes_without_dispatching() {
        let mut scanner = DirScanner::new();
        let out = scanner.observe(&listing(&[("old.pptx", 100)]));
        assert!(out.is_empty());
        // The pre-existing file never becomes "new".
        let out = scanner.observe(&listing(&[("old.pptx", 100)]));
        assert!(out.is_empty());
    }

    #[test]
    fn new_file_dispatches_only_after_stable_size() {
        let mut scanner = DirScanner::new();
        scanner.observe(&listing(&[]));

        // Appears while still being written.
        assert!(scanner.observe(&listing(&[("deck.pptx", 10)])).is_empty());
        // Still growing.
        assert!(scanner.observe(&listing(&[("deck.pptx", 50)])).is_empty());
        // Size settled: dispatched exactly once.
        assert_eq!(
            scanner.observe(&listing(&[("deck.pptx", 50)])),
            vec!["deck.pptx".to_string()]
        );
        assert!(scanner.observe(&listing(&[("deck.pptx", 50)])).is_empty());
    }

    #[test]
    fn removed_then_recreated_file_counts_as_new() {
        let mut scanner = DirScanner::new();
        scanner.observe(&listing(&[]));
        scanner.observe(&listing(&[("deck.pptx", 10)]));
        scanner.observe(&listing(&[("deck.pptx", 10)]));

        // Gone, then back with a different size.
        scanner.observe(&listing(&[]));
        scanner.observe(&listing(&[("deck.pptx", 99)]));
        assert_eq!(
            scanner.observe(&listing(&[("deck.pptx", 99)])),
            vec!["deck.pptx".to_string()]
        );
    }

    #[test]
    fn identify_adopts_embedded_id() {
        let id = JobId::new();
        let name = format!("20240131120000_{id}_lecture.pptx");
        let (found, source) = identify(&name);
        assert_eq!(found, id);
        assert_eq!(source, "lecture.pptx");
    }

    #[test]
    fn identify_generates_fresh_id_for_bare_names() {
        let (a, source_a) = identify("lecture.pptx");
        let (b, _) = identify("lecture.pptx");
        assert_ne!(a, b);
        assert_eq!(source_a, "lecture.pptx");
    }
}
