use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use cli_table::{Cell, CellStruct, Style, Table, print_stdout};

use ampliq::common::setup::setup_logging;
use ampliq::server::bootstrap::{run_scheduler, run_single_cycle};
use ampliq::server::config::SchedulerConfig;
use ampliq::server::job::{Job, SubmissionParams};
use ampliq::server::store::{FileJobStore, JobStore};

#[derive(Parser)]
#[command(
    name = "ampliq",
    about = "Admission and dispatch scheduler for amplicon analysis jobs on HPC clusters",
    version = ampliq::AMPLIQ_VERSION
)]
struct RootOptions {
    /// Path to the scheduler configuration file. Defaults apply when omitted.
    #[arg(long, global = true, env = "AMPLIQ_CONFIG")]
    config: Option<PathBuf>,

    /// Log debug messages
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand)]
enum SubCommand {
    /// Run the dispatch scheduler until interrupted
    Serve(ServeOpts),
    /// Run exactly one dispatch cycle and exit
    Cycle,
    /// Operations on the persisted job records
    Job(JobOpts),
}

#[derive(Parser)]
struct ServeOpts {
    /// Override the scheduling interval from the configuration, e.g. `90s`
    /// or `5min`
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
}

#[derive(Parser)]
struct JobOpts {
    #[command(subcommand)]
    subcmd: JobCommand,
}

#[derive(Subcommand)]
enum JobCommand {
    /// List all job records
    List,
    /// Add a pending job record (normally done by the upload flow)
    Add(JobAddOpts),
}

#[derive(Parser)]
struct JobAddOpts {
    /// Job identifier; has to match the name of the job's directory in the
    /// upload holding area
    #[arg(long)]
    id: String,

    /// Total number of sequences in the uploaded input
    #[arg(long)]
    seqs_count: u64,

    #[arg(long)]
    job_name: String,

    #[arg(long)]
    notify_email: String,

    #[arg(long, default_value_t = 0)]
    max_ambig: u32,

    #[arg(long, default_value_t = 8)]
    max_homop: u32,

    #[arg(long, default_value_t = 25)]
    min_overlap: u32,

    #[arg(long, default_value_t = 95)]
    screen_criteria: u32,

    #[arg(long, default_value_t = 250)]
    chop_length: u32,

    #[arg(long, default_value_t = 2)]
    precluster_diffs: u32,

    #[arg(long, default_value_t = 80)]
    classify_seqs_cutoff: u32,

    #[arg(long, default_value = "16S")]
    amplicon_type: String,
}

fn load_config(path: Option<&PathBuf>) -> ampliq::Result<SchedulerConfig> {
    match path {
        Some(path) => SchedulerConfig::load(path),
        None => Ok(SchedulerConfig::default()),
    }
}

fn command_job_list(config: &SchedulerConfig) -> anyhow::Result<()> {
    let store = FileJobStore::open(&config.data_dir)?;
    let mut jobs = store.jobs()?;
    jobs.sort_by_key(|job| job.submission_time);

    let rows: Vec<Vec<CellStruct>> = jobs
        .into_iter()
        .map(|job| {
            vec![
                job.id.cell(),
                job.seqs_count.cell(),
                job.status.to_string().cell(),
                job.retries.cell(),
                job.remote_handle
                    .map(|handle| handle.to_string())
                    .unwrap_or_default()
                    .cell(),
                job.submission_time
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
                    .cell(),
            ]
        })
        .collect();
    let table = rows.table().title(vec![
        "Id".cell().bold(true),
        "Seqs".cell().bold(true),
        "Status".cell().bold(true),
        "Retries".cell().bold(true),
        "Remote id".cell().bold(true),
        "Submitted at".cell().bold(true),
    ]);
    print_stdout(table)?;
    Ok(())
}

fn command_job_add(config: &SchedulerConfig, opts: JobAddOpts) -> anyhow::Result<()> {
    let params = SubmissionParams {
        job_name: opts.job_name,
        notify_email: opts.notify_email,
        max_ambig: opts.max_ambig,
        max_homop: opts.max_homop,
        min_overlap: opts.min_overlap,
        screen_criteria: opts.screen_criteria,
        chop_length: opts.chop_length,
        precluster_diffs: opts.precluster_diffs,
        classify_seqs_cutoff: opts.classify_seqs_cutoff,
        amplicon_type: opts.amplicon_type,
    };
    let job = Job::new(opts.id, opts.seqs_count, params);

    let local_dir = config.local_job_dir(&job.id);
    if !local_dir.is_dir() {
        log::warn!(
            "Upload directory {} does not exist yet; the job cannot dispatch until it does",
            local_dir.display()
        );
    }

    let mut store = FileJobStore::open(&config.data_dir)?;
    let id = job.id.clone();
    store.add_job(job)?;
    log::info!("Job {id} added as pending");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let opts = RootOptions::parse();
    setup_logging(opts.verbose);

    let mut config = load_config(opts.config.as_ref())?;
    match opts.subcmd {
        SubCommand::Serve(serve) => {
            if let Some(interval) = serve.interval {
                config.interval_s = interval.as_secs().max(1);
            }
            run_scheduler(config).await?;
        }
        SubCommand::Cycle => {
            let stats = run_single_cycle(config).await?;
            log::info!(
                "Cycle finished: {} submitted, {} deferred, {} failed attempt(s)",
                stats.submitted,
                stats.deferred,
                stats.failed_attempts
            );
        }
        SubCommand::Job(job) => match job.subcmd {
            JobCommand::List => command_job_list(&config)?,
            JobCommand::Add(add) => command_job_add(&config, add)?,
        },
    }
    Ok(())
}
