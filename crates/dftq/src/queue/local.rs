use std::process::Command;

use super::{Job, Queue, QueueError, pipe_script};

/// Minimal implementation for running jobs directly on the current machine.
/// [Queue::submit] blocks until the job exits, so every job is already out of
/// the "queue" by the time its id is returned
#[derive(Debug, Default)]
pub struct Local {
    pub template: Option<String>,
}

impl Local {
    pub fn new(template: Option<String>) -> Self {
        Self { template }
    }
}

impl Queue for Local {
    fn submit_command(&self) -> &str {
        "sh"
    }

    fn sleep_int(&self) -> usize {
        0
    }

    fn template(&self) -> &Option<String> {
        &self.template
    }

    fn default_submit_script(&self) -> String {
        String::new()
    }

    /// run the submit script with `sh` in the job's directory. a failing exit
    /// status is only logged, matching the other queues, which cannot see
    /// exit codes at all
    fn submit(&self, job: &Job) -> Result<String, QueueError> {
        let mut cmd = Command::new(self.submit_command());
        cmd.arg("-s").current_dir(&job.dir);
        let out = pipe_script(&mut cmd, &self.submit_script(job))?;
        if !out.status.success() {
            log::warn!(
                "{} exited with {} and `{}`",
                job.name,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(format!("local.{}", job.name))
    }

    fn status(&self, _job_id: &str) -> Result<bool, QueueError> {
        Ok(true)
    }
}
