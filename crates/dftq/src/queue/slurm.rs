use std::process::Command;

use super::{Job, Queue, QueueError, cancel_inner, query, submit_inner};

/// job states after which a job will never run again
const FINISHED_STATES: [&str; 8] = [
    "COMPLETED",
    "COMPLETING",
    "FAILED",
    "CANCELLED",
    "TIMEOUT",
    "NODE_FAIL",
    "OUT_OF_MEMORY",
    "BOOT_FAIL",
];

/// Slurm is a type for holding the information for submitting a slurm job.
#[derive(Debug)]
pub struct Slurm {
    sleep_int: usize,
    pub(crate) template: Option<String>,
}

impl Slurm {
    pub fn new(sleep_int: usize, template: Option<String>) -> Self {
        Self {
            sleep_int,
            template,
        }
    }

    /// interpret the output of `squeue -h -o %T -j job_id`, which is just the
    /// state of the job, if the job is known at all
    pub(crate) fn finished(stdout: &str, stderr: &str) -> bool {
        if stderr.contains("Invalid job id") {
            return true;
        }
        match stdout.split_whitespace().next() {
            None => true,
            // jobs can hang in COMPLETING long after the program exits
            Some(state) => FINISHED_STATES.contains(&state),
        }
    }
}

impl Queue for Slurm {
    fn submit_command(&self) -> &str {
        "sbatch"
    }

    fn sleep_int(&self) -> usize {
        self.sleep_int
    }

    fn template(&self) -> &Option<String> {
        &self.template
    }

    fn default_submit_script(&self) -> String {
        "#!/bin/bash
#SBATCH --job-name={{.basename}}
#SBATCH --ntasks=1
#SBATCH -o {{.basename}}.slurm.out
#SBATCH --no-requeue
"
        .to_owned()
    }

    /// pipe the submit script into `sbatch --chdir=dir [params]`. the output of
    /// sbatch is `Submitted batch job 30627992`
    fn submit(&self, job: &Job) -> Result<String, QueueError> {
        let mut cmd = Command::new(self.submit_command());
        cmd.arg(format!("--chdir={}", job.dir.display()))
            .args(job.param_args());
        submit_inner(&mut cmd, &self.submit_script(job), self.sleep_int)
    }

    fn status(&self, job_id: &str) -> Result<bool, QueueError> {
        let mut cmd = Command::new("squeue");
        cmd.args(["-h", "-o", "%T", "-j", job_id]);
        let (stdout, stderr) = query(&mut cmd)?;
        let done = Self::finished(&stdout, &stderr);
        if !done {
            log::trace!("squeue {job_id}: {}", stdout.trim());
        }
        Ok(done)
    }

    /// run `scancel job_id`, which also succeeds for jobs that have already
    /// finished but are still known to the controller
    fn cancel(&self, job_id: &str) -> Result<(), QueueError> {
        let mut cmd = Command::new("scancel");
        cmd.arg(job_id);
        cancel_inner(&mut cmd, job_id, |_, stderr| {
            stderr.contains("Invalid job id")
        })
    }
}
