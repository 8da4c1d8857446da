//! Rendering of the remote analysis command line.

use std::fmt::Write;

use crate::server::dispatch::admission::ResourceClass;
use crate::server::job::SubmissionParams;

/// Builds the command line executed on the head node for one job.
///
/// Every submission parameter is rendered; the flag names are a contract
/// with the downstream analysis tool. Large jobs additionally request the
/// accelerator partition.
pub fn render_analysis_cmd(
    tool: &str,
    input_dir: &str,
    params: &SubmissionParams,
    class: ResourceClass,
    accel_partition: &str,
) -> String {
    let mut cmd = format!(
        "{tool} {input_dir} \
         --job-name {} \
         --notify-email {} \
         --max-ambig {} \
         --max-homop {} \
         --min-overlap {} \
         --screen-criteria {} \
         --chop-length {} \
         --precluster-diffs {} \
         --classify-seqs-cutoff {} \
         --amplicon-type {}",
        params.job_name,
        params.notify_email,
        params.max_ambig,
        params.max_homop,
        params.min_overlap,
        params.screen_criteria,
        params.chop_length,
        params.precluster_diffs,
        params.classify_seqs_cutoff,
        params.amplicon_type,
    );
    if class == ResourceClass::Large {
        write!(cmd, " --resources {accel_partition}").unwrap();
    }
    cmd
}

#[cfg(test)]
mod tests {
    use crate::server::dispatch::admission::ResourceClass;
    use crate::server::dispatch::command::render_analysis_cmd;
    use crate::server::job::SubmissionParams;

    fn params() -> SubmissionParams {
        SubmissionParams {
            job_name: "soil-2024".to_string(),
            notify_email: "lab@example.org".to_string(),
            max_ambig: 0,
            max_homop: 8,
            min_overlap: 25,
            screen_criteria: 95,
            chop_length: 250,
            precluster_diffs: 2,
            classify_seqs_cutoff: 80,
            amplicon_type: "16S".to_string(),
        }
    }

    #[test]
    fn every_parameter_round_trips() {
        let cmd = render_analysis_cmd(
            "mothulity",
            "/home/ampliq/jobs/j1",
            &params(),
            ResourceClass::Standard,
            "accel",
        );
        assert!(cmd.starts_with("mothulity /home/ampliq/jobs/j1 "));
        assert!(cmd.contains("--job-name soil-2024"));
        assert!(cmd.contains("--notify-email lab@example.org"));
        assert!(cmd.contains("--max-ambig 0"));
        assert!(cmd.contains("--max-homop 8"));
        assert!(cmd.contains("--min-overlap 25"));
        assert!(cmd.contains("--screen-criteria 95"));
        assert!(cmd.contains("--chop-length 250"));
        assert!(cmd.contains("--precluster-diffs 2"));
        assert!(cmd.contains("--classify-seqs-cutoff 80"));
        assert!(cmd.contains("--amplicon-type 16S"));
    }

    #[test]
    fn accelerator_request_only_for_large_jobs() {
        let standard =
            render_analysis_cmd("mothulity", "/j", &params(), ResourceClass::Standard, "accel");
        let large = render_analysis_cmd("mothulity", "/j", &params(), ResourceClass::Large, "accel");
        assert!(!standard.contains("--resources"));
        assert!(large.ends_with("--resources accel"));
    }
}
