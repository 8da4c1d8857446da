use std::path::{Path, PathBuf};

use crate::common::error::error;
use crate::server::job::{Job, JobStatus};

/// Access to the persisted job records.
///
/// The store is the only durable state of the scheduler. The upload flow (or
/// the `job add` command) writes records with `pending` status exactly once;
/// afterwards the scheduler is the sole writer of the status, remote handle
/// and retry fields. Sequence counts and submission parameters are never
/// updated.
pub trait JobStore {
    /// Returns at most `limit` pending jobs, ordered by submission time
    /// ascending (oldest first). Jobs in any other status are never returned.
    fn list_pending(&self, limit: usize) -> crate::Result<Vec<Job>>;

    /// Returns all job records, in no particular order.
    fn jobs(&self) -> crate::Result<Vec<Job>>;

    fn get(&self, id: &str) -> crate::Result<Option<Job>>;

    /// Inserts a new record. Fails if the identifier is already taken.
    fn add_job(&mut self, job: Job) -> crate::Result<()>;

    fn set_status(&mut self, id: &str, status: JobStatus) -> crate::Result<()>;

    /// Records the identifier assigned by the cluster resource manager.
    fn set_remote_handle(&mut self, id: &str, handle: u64) -> crate::Result<()>;

    /// Bumps the counter of unsuccessful dispatch attempts and returns the
    /// new value.
    fn increment_retry(&mut self, id: &str) -> crate::Result<u32>;
}

const JOBS_FILE: &str = "jobs.json";

/// Job records persisted as a single JSON document.
///
/// The document is loaded once at open and rewritten after every mutation;
/// the rewrite goes through a sibling temp file and a rename, so a crash
/// mid-write cannot destroy the previous document.
pub struct FileJobStore {
    path: PathBuf,
    jobs: Vec<Job>,
}

impl FileJobStore {
    /// Opens the store in `data_dir`, creating an empty one if the directory
    /// or the document does not exist yet.
    pub fn open(data_dir: &Path) -> crate::Result<FileJobStore> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(JOBS_FILE);
        let jobs = if path.is_file() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            Vec::new()
        };
        Ok(FileJobStore { path, jobs })
    }

    fn persist(&self) -> crate::Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&self.jobs)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn find_mut(&mut self, id: &str) -> crate::Result<&mut Job> {
        match self.jobs.iter_mut().find(|job| job.id == id) {
            Some(job) => Ok(job),
            None => error(format!("Unknown job {id}")),
        }
    }
}

impl JobStore for FileJobStore {
    fn list_pending(&self, limit: usize) -> crate::Result<Vec<Job>> {
        let mut pending: Vec<Job> = self
            .jobs
            .iter()
            .filter(|job| job.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|job| job.submission_time);
        pending.truncate(limit);
        Ok(pending)
    }

    fn jobs(&self) -> crate::Result<Vec<Job>> {
        Ok(self.jobs.clone())
    }

    fn get(&self, id: &str) -> crate::Result<Option<Job>> {
        Ok(self.jobs.iter().find(|job| job.id == id).cloned())
    }

    fn add_job(&mut self, job: Job) -> crate::Result<()> {
        if self.jobs.iter().any(|existing| existing.id == job.id) {
            return error(format!("Job {} already exists", job.id));
        }
        self.jobs.push(job);
        self.persist()
    }

    fn set_status(&mut self, id: &str, status: JobStatus) -> crate::Result<()> {
        self.find_mut(id)?.status = status;
        self.persist()
    }

    fn set_remote_handle(&mut self, id: &str, handle: u64) -> crate::Result<()> {
        self.find_mut(id)?.remote_handle = Some(handle);
        self.persist()
    }

    fn increment_retry(&mut self, id: &str) -> crate::Result<u32> {
        let job = self.find_mut(id)?;
        job.retries += 1;
        let retries = job.retries;
        self.persist()?;
        Ok(retries)
    }
}
