// src/batch/job.rs
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchStatus {
    Idle,
    Running,
    Stopped,
    Completed,
}

impl BatchStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, BatchStatus::Stopped | BatchStatus::Completed)
    }
}

/// Snapshot of a batch run, published after every URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    pub urls: Vec<String>,
    pub current_index: usize,
    pub status: BatchStatus,
    pub progress_percent: u8,
}

impl Default for BatchJob {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            current_index: 0,
            status: BatchStatus::Idle,
            progress_percent: 0,
        }
    }
}

impl BatchJob {
    pub(crate) fn start(urls: Vec<String>) -> Self {
        Self {
            urls,
            current_index: 0,
            status: BatchStatus::Running,
            progress_percent: 0,
        }
    }

    pub(crate) fn finish(&mut self, status: BatchStatus) {
        self.status = status;
        self.progress_percent = 100;
    }
}

/// Trims, drops blanks and duplicates, keeps first-seen order.
pub fn dedup_urls<I, S>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    urls.into_iter()
        .map(|u| u.as_ref().trim().to_string())
        .filter(|u| !u.is_empty())
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

/// Whole-number percentage, capped below 100 until the job finishes.
pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done * 100) / total).min(99) as u8
}
