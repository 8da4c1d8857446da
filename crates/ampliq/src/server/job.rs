use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque job identifier assigned by the upload flow (UUID-shaped in practice).
pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for capacity and dispatch.
    Pending,
    /// Inputs were copied, verified and the analysis was started on the
    /// cluster.
    Submitted,
    /// The allowed number of dispatch attempts was exhausted.
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            JobStatus::Pending => "pending",
            JobStatus::Submitted => "submitted",
            JobStatus::Failed => "failed",
        };
        f.write_str(status)
    }
}

/// Tuning options captured by the submission form.
///
/// The flag names rendered from these fields are a contract with the
/// downstream analysis tool; every field has to round-trip into the rendered
/// command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionParams {
    pub job_name: String,
    pub notify_email: String,
    pub max_ambig: u32,
    pub max_homop: u32,
    pub min_overlap: u32,
    pub screen_criteria: u32,
    pub chop_length: u32,
    pub precluster_diffs: u32,
    pub classify_seqs_cutoff: u32,
    pub amplicon_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Total number of sequences in the uploaded input. Set once after upload
    /// analysis, immutable afterwards.
    pub seqs_count: u64,
    pub params: SubmissionParams,
    pub status: JobStatus,
    /// Identifier assigned by the cluster resource manager, populated only
    /// after a successful remote dispatch.
    pub remote_handle: Option<u64>,
    /// Number of unsuccessful dispatch attempts so far.
    pub retries: u32,
    pub submission_time: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, seqs_count: u64, params: SubmissionParams) -> Job {
        Job {
            id,
            seqs_count,
            params,
            status: JobStatus::Pending,
            remote_handle: None,
            retries: 0,
            submission_time: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, JobStatus::Pending)
    }
}
