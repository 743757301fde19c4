//! Local file backend.
//!
//! Reads every file matching the configured glob patterns and returns one
//! result per line. Files are addressed by the backend's static labels: a
//! query label whose key is also a static label must carry the same value,
//! otherwise the backend contributes nothing.

use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use loghub_core::{
    merge_labels, BackendError, BackendFuture, BackendKind, Labels, LogBackend, RouteSet,
    SearchParams, SearchResult, SearchResults,
};
use tracing::{debug, warn};

use crate::config::FileConfig;
use crate::error::{ConfigError, Result};

/// Searches lines of local files.
#[derive(Debug)]
pub struct FileBackend {
    name: String,
    routes: RouteSet,
    labels: Labels,
    timeout: Option<Duration>,
    patterns: Vec<String>,
}

impl FileBackend {
    /// Builds the backend, resolving relative patterns against the working
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an error when no pattern is given or a pattern is invalid.
    pub fn from_config(config: FileConfig, index: usize) -> Result<Self> {
        let base = std::env::current_dir().map_err(|e| ConfigError::invalid(BackendKind::File, "paths", e))?;
        Self::with_base_dir(config, index, &base)
    }

    /// Builds the backend, resolving relative patterns against `base`.
    ///
    /// # Errors
    ///
    /// Returns an error when no pattern is given or a pattern is invalid.
    pub fn with_base_dir(config: FileConfig, index: usize, base: &Path) -> Result<Self> {
        let paths: Vec<&String> = config.paths.iter().filter(|p| !p.trim().is_empty()).collect();
        if paths.is_empty() {
            return Err(ConfigError::missing(BackendKind::File, "paths"));
        }

        let mut patterns = Vec::with_capacity(paths.len());
        for raw in paths {
            let raw = raw.trim();
            let resolved = if Path::new(raw).is_absolute() {
                PathBuf::from(raw)
            } else {
                base.join(raw)
            };
            let pattern = resolved.to_string_lossy().into_owned();
            glob::Pattern::new(&pattern)
                .map_err(|e| ConfigError::invalid(BackendKind::File, "paths", format!("{raw}: {e}")))?;
            patterns.push(pattern);
        }

        let name = config.common.resolved_name(BackendKind::File, index);
        let timeout = config.common.timeout();
        Ok(Self {
            name,
            routes: config.common.routes.normalized(),
            labels: config.common.labels,
            timeout,
            patterns,
        })
    }

    /// The resolved glob patterns.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True when every query label that names a static label agrees with it.
    fn selects(&self, query: &Labels) -> bool {
        query
            .iter()
            .all(|(key, value)| self.labels.get(key).is_none_or(|own| own == value))
    }

    async fn do_search(&self, params: &SearchParams) -> loghub_core::Result<SearchResults> {
        if !self.selects(&params.labels) {
            debug!(backend = %self.name, "query labels do not select this file set");
            return Ok(SearchResults::default());
        }

        let scan = Scan {
            patterns: self.patterns.clone(),
            labels: self.labels.clone(),
            per_file: usize::try_from(params.limit_per_item).unwrap_or(usize::MAX),
            needle: params.query.trim().to_lowercase(),
        };
        let backend = self.name.clone();
        let mut results = tokio::task::spawn_blocking(move || scan.run(&backend))
            .await
            .map_err(|e| BackendError::Io(std::io::Error::other(e)))?;

        let total = results.len() as u64;
        results.truncate(usize::try_from(params.limit).unwrap_or(usize::MAX));
        Ok(SearchResults::from_results(results).with_total(total))
    }
}

impl LogBackend for FileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn routes(&self) -> &RouteSet {
        &self.routes
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn search<'a>(&'a self, params: &'a SearchParams) -> BackendFuture<'a, SearchResults> {
        Box::pin(self.do_search(params))
    }
}

/// One blocking pass over the matched files.
struct Scan {
    patterns: Vec<String>,
    labels: Labels,
    per_file: usize,
    needle: String,
}

impl Scan {
    fn run(&self, backend: &str) -> Vec<SearchResult> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for pattern in &self.patterns {
            let entries = match glob::glob(pattern) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(backend, pattern, error = %e, "invalid glob pattern");
                    continue;
                }
            };
            for entry in entries {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(backend, error = %e, "cannot read glob match");
                        continue;
                    }
                };
                if !path.is_file() || !seen.insert(path.clone()) {
                    continue;
                }
                match self.read_file(&path) {
                    Ok(lines) => results.extend(lines),
                    Err(e) => warn!(backend, path = %path.display(), error = %e, "failed to read log file"),
                }
            }
        }
        results
    }

    fn read_file(&self, path: &Path) -> std::io::Result<Vec<SearchResult>> {
        let file = File::open(path)?;
        let modified: DateTime<Utc> = file.metadata()?.modified()?.into();
        let timestamp = modified.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut tail = VecDeque::new();
        for line in BufReader::new(file).split(b'\n') {
            let line = line?;
            let text = String::from_utf8_lossy(&line);
            let message = text.trim();
            if !self.needle.is_empty() && !message.to_lowercase().contains(&self.needle) {
                continue;
            }
            if tail.len() == self.per_file {
                tail.pop_front();
            }
            if self.per_file > 0 {
                tail.push_back(message.to_string());
            }
        }

        let mut derived = Labels::new();
        derived.insert("path".to_string(), path.to_string_lossy().into_owned());
        let labels = merge_labels(&self.labels, derived);

        Ok(tail
            .into_iter()
            .map(|message| {
                SearchResult::new(message)
                    .with_time(timestamp.clone())
                    .with_labels(labels.clone())
            })
            .collect())
    }
}
