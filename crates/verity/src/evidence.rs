//! Evidence capture: best-effort screenshots named by scenario and label.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::driver::PageDriver;
use crate::result::VerityResult;

/// Label of the capture taken when a run fails
pub const FAILURE_LABEL: &str = "failure";

/// A captured screenshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Caller-supplied label
    pub label: String,
    /// Where the image was written
    pub image_path: PathBuf,
    /// Capture time
    pub timestamp: DateTime<Utc>,
}

/// Writes screenshots for one scenario run
#[derive(Debug, Clone)]
pub struct EvidenceCapture {
    output_dir: PathBuf,
    scenario: String,
    taken: HashMap<String, usize>,
}

impl EvidenceCapture {
    /// Create a capturer writing under `output_dir`
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, scenario: &str) -> Self {
        Self {
            output_dir: output_dir.into(),
            scenario: file_stem(scenario),
            taken: HashMap::new(),
        }
    }

    /// Output directory
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path for the next capture under `label`; repeated labels get a numeric suffix
    fn next_path(&mut self, label: &str) -> PathBuf {
        let stem = format!("{}_{}", self.scenario, file_stem(label));
        let count = self.taken.entry(stem.clone()).or_insert(0);
        *count += 1;
        let name = if *count == 1 {
            format!("{stem}.png")
        } else {
            format!("{stem}_{count}.png")
        };
        self.output_dir.join(name)
    }

    /// Take a screenshot and write it to disk
    ///
    /// Never fails: problems are logged and yield `None`.
    pub async fn capture<P>(
        &mut self,
        page: &P,
        label: &str,
        full_page: bool,
    ) -> Option<EvidenceRecord>
    where
        P: PageDriver + ?Sized,
    {
        let path = self.next_path(label);
        match Self::write(page, &path, full_page).await {
            Ok(()) => {
                info!(label, path = %path.display(), "evidence captured");
                Some(EvidenceRecord {
                    label: label.to_string(),
                    image_path: path,
                    timestamp: Utc::now(),
                })
            }
            Err(e) => {
                warn!(label, error = %e, "evidence capture failed");
                None
            }
        }
    }

    async fn write<P>(page: &P, path: &Path, full_page: bool) -> VerityResult<()>
    where
        P: PageDriver + ?Sized,
    {
        let bytes = page.screenshot(full_page).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

/// Distinct file stems for a batch of runs, in order: a repeated stem gets `_2`, `_3`, ...
#[must_use]
pub fn unique_stems<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|name| {
            let stem = file_stem(name);
            let count = seen.entry(stem.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                stem
            } else {
                format!("{stem}_{count}")
            }
        })
        .collect()
}

/// File-system safe stem: ASCII alphanumerics, `-` and `_` kept, the rest become `_`
#[must_use]
pub fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "unnamed".to_string()
    } else {
        stem
    }
}
