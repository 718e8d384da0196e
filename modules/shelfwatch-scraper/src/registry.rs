use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use chrono::Utc;

use shelfwatch_common::{ScrapeTask, TaskStatus};

/// Task id → task state for one orchestrator.
///
/// Each task has a single writer (its monitor) after registration. Every
/// mutation refuses to touch a task that is already Completed or Failed, so a
/// late poll can never overwrite a terminal state.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, ScrapeTask>>,
    reconciling: Mutex<HashSet<String>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: ScrapeTask) {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        tasks.insert(task.id.clone(), task);
    }

    /// Snapshot of a task.
    pub fn get(&self, id: &str) -> Option<ScrapeTask> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.get(id).cloned()
    }

    pub fn subjects(&self, id: &str) -> Vec<String> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks
            .get(id)
            .map(|t| t.subject_ids.clone())
            .unwrap_or_default()
    }

    pub fn active_count(&self) -> usize {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.values().filter(|t| t.is_active()).count()
    }

    /// Move an active task to Processing with the reported progress. Progress
    /// never goes backwards. Returns false if the task is unknown or terminal.
    pub fn record_progress(&self, id: &str, progress: u8) -> bool {
        self.update_active(id, |task| {
            task.status = TaskStatus::Processing;
            task.progress = task.progress.max(progress.min(100));
        })
    }

    /// Reserve an active task for result reconciliation. Returns false if
    /// the task is unknown, terminal, or already reserved.
    pub fn begin_reconcile(&self, id: &str) -> bool {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        if !tasks.get(id).is_some_and(|t| t.is_active()) {
            return false;
        }
        let mut reconciling = self.reconciling.lock().unwrap_or_else(|e| e.into_inner());
        reconciling.insert(id.to_string())
    }

    pub fn complete(&self, id: &str) -> bool {
        let done = self.update_active(id, |task| {
            task.status = TaskStatus::Completed;
            task.progress = 100;
            task.completed_at = Some(Utc::now());
        });
        self.end_reconcile(id);
        done
    }

    pub fn fail(&self, id: &str, error: impl Into<String>) -> bool {
        let error = error.into();
        let done = self.update_active(id, move |task| {
            task.status = TaskStatus::Failed;
            task.error = Some(error);
            task.completed_at = Some(Utc::now());
        });
        self.end_reconcile(id);
        done
    }

    fn end_reconcile(&self, id: &str) {
        let mut reconciling = self.reconciling.lock().unwrap_or_else(|e| e.into_inner());
        reconciling.remove(id);
    }

    fn update_active(&self, id: &str, apply: impl FnOnce(&mut ScrapeTask)) -> bool {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        match tasks.get_mut(id) {
            Some(task) if task.is_active() => {
                apply(task);
                true
            }
            _ => false,
        }
    }
}

/// Identifiers currently claimed by an active product task.
#[derive(Default)]
pub struct InFlightSet {
    held: Mutex<HashSet<String>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim every identifier, or none. On conflict returns the identifiers
    /// that are already held, in input order. Check and insert happen under
    /// one lock, so overlapping claims cannot both succeed.
    pub fn try_claim(&self, asins: &[String]) -> Result<(), Vec<String>> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        let conflicts: Vec<String> = asins.iter().filter(|a| held.contains(*a)).cloned().collect();
        if !conflicts.is_empty() {
            return Err(conflicts);
        }
        held.extend(asins.iter().cloned());
        Ok(())
    }

    /// Claim like `try_claim`, returning a guard that releases the
    /// identifiers when dropped unless it is kept.
    pub fn claim(&self, asins: &[String]) -> Result<Claim<'_>, Vec<String>> {
        self.try_claim(asins)?;
        Ok(Claim {
            set: self,
            asins: asins.to_vec(),
            kept: false,
        })
    }

    /// Release one identifier. Releasing something not held is a no-op.
    pub fn release(&self, asin: &str) -> bool {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(asin)
    }

    pub fn release_all(&self, asins: &[String]) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        for asin in asins {
            held.remove(asin);
        }
    }

    pub fn contains(&self, asin: &str) -> bool {
        let held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.contains(asin)
    }

    pub fn len(&self) -> usize {
        self.held.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Claimed identifiers whose task is not registered yet. Dropping the guard,
/// including when the owning future is cancelled, releases them.
#[must_use = "dropping a claim releases it"]
pub struct Claim<'a> {
    set: &'a InFlightSet,
    asins: Vec<String>,
    kept: bool,
}

impl Claim<'_> {
    /// Hand the identifiers over to a registered task.
    pub fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.set.release_all(&self.asins);
        }
    }
}
