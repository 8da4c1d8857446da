use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::common::utils::fs::absolute_path;
use crate::server::dispatch::admission::AdmissionLimits;
use crate::server::job::JobId;

/// Scheduler deployment configuration, loaded from a TOML file.
///
/// Every field has a default, so an empty file (or no file at all) is a valid
/// configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Partition that runs standard jobs.
    #[serde(default = "default_standard_partition")]
    pub standard_partition: String,
    /// Partition with accelerator nodes, used for large jobs.
    #[serde(default = "default_accel_partition")]
    pub accel_partition: String,
    /// Number of idle standard nodes that must remain spare for a standard
    /// job to be admitted.
    #[serde(default = "default_standard_min_idle")]
    pub standard_min_idle: u64,
    /// Number of idle accelerator nodes that must remain spare for a large
    /// job to be admitted.
    #[serde(default = "default_accel_min_idle")]
    pub accel_min_idle: u64,
    /// Sequence count above which a job competes for the accelerator
    /// partition.
    #[serde(default = "default_large_job_cutoff")]
    pub large_job_cutoff: u64,
    /// Maximum number of unsuccessful dispatch attempts before a job is
    /// marked as failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// When false, unsuccessful attempts do not touch the persisted retry
    /// counter and an external process is expected to own it.
    #[serde(default = "default_count_failed_attempts")]
    pub count_failed_attempts: bool,
    /// Scheduling interval in seconds. Values above 30 are recommended, the
    /// remote round trips dominate shorter intervals.
    #[serde(default = "default_interval_s")]
    pub interval_s: u64,
    /// Upper bound for a single remote operation, in seconds.
    #[serde(default = "default_remote_timeout_s")]
    pub remote_timeout_s: u64,
    /// How many pending jobs are examined per cycle.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Cluster head node, as accepted by ssh/scp.
    #[serde(default = "default_remote_host")]
    pub remote_host: String,
    /// Input files holding area on the web-service side, one directory per
    /// job.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// The same holding area as seen from the cluster head node.
    #[serde(default = "default_remote_root")]
    pub remote_root: String,
    /// Analysis tool invoked on the head node.
    #[serde(default = "default_analysis_cmd")]
    pub analysis_cmd: String,
    /// Command producing the node-state report.
    #[serde(default = "default_report_cmd")]
    pub report_cmd: String,
    /// Directory with the persisted job records.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl SchedulerConfig {
    pub fn load(path: &Path) -> crate::Result<SchedulerConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: SchedulerConfig = toml::from_str(&content)?;
        config.upload_dir = absolute_path(config.upload_dir);
        config.data_dir = absolute_path(config.data_dir);
        Ok(config)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_s)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_s)
    }

    pub fn admission_limits(&self) -> AdmissionLimits {
        AdmissionLimits {
            standard_partition: self.standard_partition.clone(),
            accel_partition: self.accel_partition.clone(),
            standard_min_idle: self.standard_min_idle,
            accel_min_idle: self.accel_min_idle,
        }
    }

    /// Holding area of one job on the web-service side.
    pub fn local_job_dir(&self, id: &JobId) -> PathBuf {
        self.upload_dir.join(id)
    }

    /// Directory of one job on the head node. Remote paths are plain strings,
    /// they never touch the local filesystem.
    pub fn remote_job_dir(&self, id: &JobId) -> String {
        format!("{}/{}", self.remote_root.trim_end_matches('/'), id)
    }
}

impl Default for SchedulerConfig {
    fn default() -> SchedulerConfig {
        SchedulerConfig {
            standard_partition: default_standard_partition(),
            accel_partition: default_accel_partition(),
            standard_min_idle: default_standard_min_idle(),
            accel_min_idle: default_accel_min_idle(),
            large_job_cutoff: default_large_job_cutoff(),
            max_retries: default_max_retries(),
            count_failed_attempts: default_count_failed_attempts(),
            interval_s: default_interval_s(),
            remote_timeout_s: default_remote_timeout_s(),
            batch_limit: default_batch_limit(),
            remote_host: default_remote_host(),
            upload_dir: default_upload_dir(),
            remote_root: default_remote_root(),
            analysis_cmd: default_analysis_cmd(),
            report_cmd: default_report_cmd(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_standard_partition() -> String {
    "long".to_string()
}

fn default_accel_partition() -> String {
    "accel".to_string()
}

fn default_standard_min_idle() -> u64 {
    30
}

fn default_accel_min_idle() -> u64 {
    5
}

fn default_large_job_cutoff() -> u64 {
    500_000
}

fn default_max_retries() -> u32 {
    1
}

fn default_count_failed_attempts() -> bool {
    true
}

fn default_interval_s() -> u64 {
    300
}

fn default_remote_timeout_s() -> u64 {
    120
}

fn default_batch_limit() -> usize {
    20
}

fn default_remote_host() -> String {
    "headnode".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("/srv/ampliq/jobs")
}

fn default_remote_root() -> String {
    "/home/ampliq/jobs".to_string()
}

fn default_analysis_cmd() -> String {
    "mothulity".to_string()
}

fn default_report_cmd() -> String {
    "sinfo".to_string()
}

fn default_data_dir() -> PathBuf {
    let mut home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
    home.push(".ampliq");
    home
}
