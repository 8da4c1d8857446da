use anyhow::Context;
use tokio::time::MissedTickBehavior;

use crate::common::rpc::RpcReceiver;
use crate::server::config::SchedulerConfig;
use crate::server::dispatch::DispatchResult;
use crate::server::dispatch::admission::{AdmissionDecision, ResourceClass, classify, decide};
use crate::server::dispatch::command::render_analysis_cmd;
use crate::server::dispatch::probe::take_snapshot;
use crate::server::dispatch::service::DispatchMessage;
use crate::server::dispatch::verify::verify;
use crate::server::job::{Job, JobStatus};
use crate::server::remote::RemoteSession;
use crate::server::store::JobStore;

/// Counters accumulated over the lifetime of one scheduler instance.
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    pub cycles: u64,
    pub submitted: u64,
    pub deferred: u64,
    pub failed_attempts: u64,
    pub failed_jobs: u64,
}

/// The dispatch scheduler with its injected collaborators.
///
/// Holds no per-job state between cycles: every cycle re-reads the pending
/// jobs from the store, so a crash mid-cycle loses nothing and dispatch
/// attempts are at-least-once.
pub struct Dispatcher {
    config: SchedulerConfig,
    store: Box<dyn JobStore>,
    session: Box<dyn RemoteSession>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(
        config: SchedulerConfig,
        store: Box<dyn JobStore>,
        session: Box<dyn RemoteSession>,
    ) -> Dispatcher {
        Dispatcher {
            config,
            store,
            session,
            stats: DispatchStats::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Runs one scheduling cycle: fetch the oldest pending jobs, capture one
    /// resource snapshot and walk the batch. Failures are isolated per job,
    /// a broken attempt never aborts the rest of the batch.
    pub async fn run_cycle(&mut self) {
        self.stats.cycles += 1;

        let batch = match self.store.list_pending(self.config.batch_limit) {
            Ok(batch) => batch,
            Err(error) => {
                log::error!("Cannot read pending jobs: {error:?}");
                return;
            }
        };
        if batch.is_empty() {
            log::debug!("No pending jobs");
            return;
        }
        log::debug!("Dispatch cycle: examining {} pending job(s)", batch.len());

        // One snapshot per cycle. Jobs admitted within the cycle are judged
        // against the same, possibly slightly stale, capacity numbers; the
        // cluster resource manager performs its own final admission check.
        let snapshot = match take_snapshot(self.session.as_ref(), &self.config.report_cmd).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                log::error!("Cannot query cluster occupancy: {error:?}");
                return;
            }
        };
        let limits = self.config.admission_limits();

        for job in batch {
            let class = classify(job.seqs_count, self.config.large_job_cutoff);
            match decide(class, &snapshot, &limits) {
                AdmissionDecision::Defer => {
                    log::debug!(
                        "Deferring job {} ({:?}, {} seqs): not enough idle nodes",
                        job.id,
                        class,
                        job.seqs_count
                    );
                    self.stats.deferred += 1;
                }
                AdmissionDecision::Admit(class) => match self.dispatch_job(&job, class).await {
                    Ok(remote_handle) => self.commit_submission(&job, remote_handle),
                    Err(error) => {
                        log::warn!("Dispatch attempt for job {} failed: {error:?}", job.id);
                        self.record_failed_attempt(&job);
                    }
                },
            }
        }
    }

    /// One dispatch attempt: copy the job inputs to the head node, verify
    /// the copy and start the analysis. Returns the scheduler id parsed from
    /// the submission output, if there was one.
    async fn dispatch_job(&self, job: &Job, class: ResourceClass) -> DispatchResult<Option<u64>> {
        let local_dir = self.config.local_job_dir(&job.id);
        let remote_dir = self.config.remote_job_dir(&job.id);

        self.session
            .copy_to_remote(&local_dir, &self.config.remote_root)
            .await
            .with_context(|| format!("Cannot copy inputs of job {}", job.id))?;

        if !verify(self.session.as_ref(), &local_dir, &remote_dir).await {
            anyhow::bail!(
                "Content verification failed between {} and {}:{}",
                local_dir.display(),
                self.config.remote_host,
                remote_dir
            );
        }

        let command = render_analysis_cmd(
            &self.config.analysis_cmd,
            &remote_dir,
            &job.params,
            class,
            &self.config.accel_partition,
        );
        let output = self
            .session
            .execute(&command)
            .await
            .with_context(|| format!("Remote execution of job {} failed", job.id))?;

        Ok(parse_remote_handle(&output))
    }

    fn commit_submission(&mut self, job: &Job, remote_handle: Option<u64>) {
        match remote_handle {
            Some(handle) => {
                if let Err(error) = self.store.set_remote_handle(&job.id, handle) {
                    log::error!("Cannot record remote handle of job {}: {error:?}", job.id);
                }
            }
            None => log::warn!(
                "No scheduler id found in the submission output of job {}",
                job.id
            ),
        }
        match self.store.set_status(&job.id, JobStatus::Submitted) {
            Ok(()) => {
                log::info!("Job {} submitted to the cluster", job.id);
                self.stats.submitted += 1;
            }
            Err(error) => log::error!("Cannot mark job {} as submitted: {error:?}", job.id),
        }
    }

    /// Accounts one unsuccessful dispatch attempt. Deferred jobs never pass
    /// through here; waiting for capacity is not an attempt.
    fn record_failed_attempt(&mut self, job: &Job) {
        self.stats.failed_attempts += 1;
        if !self.config.count_failed_attempts {
            return;
        }
        match self.store.increment_retry(&job.id) {
            Ok(retries) if retries > self.config.max_retries => {
                log::warn!(
                    "Job {} exceeded {} allowed resubmission(s), marking as failed",
                    job.id,
                    self.config.max_retries
                );
                if let Err(error) = self.store.set_status(&job.id, JobStatus::Failed) {
                    log::error!("Cannot mark job {} as failed: {error:?}", job.id);
                } else {
                    self.stats.failed_jobs += 1;
                }
            }
            Ok(_) => {}
            Err(error) => {
                log::error!("Cannot update retry counter of job {}: {error:?}", job.id)
            }
        }
    }
}

/// Scans submission output for the scheduler acknowledgement line
/// (`Submitted batch job <id>`) and extracts the assigned id. The analysis
/// tool prints more than that line, so the whole output is scanned.
fn parse_remote_handle(output: &str) -> Option<u64> {
    output
        .lines()
        .map(|line| line.trim())
        .find(|line| line.to_lowercase().starts_with("submitted batch job"))
        .and_then(|line| line.split(' ').nth(3))
        .and_then(|id| id.parse().ok())
}

/// The dispatch event loop. Runs one cycle per interval tick and reacts to
/// service messages between cycles; cycles never overlap, and a quit request
/// received mid-cycle takes effect once the cycle has finished.
pub async fn dispatch_process(
    mut dispatcher: Dispatcher,
    mut receiver: RpcReceiver<DispatchMessage>,
) {
    let mut interval = tokio::time::interval(dispatcher.config().interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                dispatcher.run_cycle().await;
            }
            msg = receiver.recv() => {
                match msg {
                    None | Some(DispatchMessage::QuitService) => break,
                    Some(DispatchMessage::GetStats(token)) => {
                        token.respond(dispatcher.stats().clone());
                    }
                }
            }
        }
    }
    log::debug!("Ending dispatch process");
}
