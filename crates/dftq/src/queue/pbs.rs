use std::{process::Command, sync::OnceLock};

use regex::Regex;

use super::{Job, Queue, QueueError, cancel_inner, query, submit_inner};

static NOT_FOUND: OnceLock<Regex> = OnceLock::new();

/// Pbs is a type for holding the information for submitting a pbs job.
#[derive(Debug)]
pub struct Pbs {
    pub sleep_int: usize,
    pub template: Option<String>,
}

impl Pbs {
    pub fn new(sleep_int: usize, template: Option<String>) -> Self {
        Self {
            sleep_int,
            template,
        }
    }

    /// return `true` if the output of `qstat` says the job is unknown. Torque
    /// and PBS Pro print `Unknown Job Id`, while some older servers print
    /// `Following jobs do not exist`. `qstat -x` also keeps finished jobs
    /// around in state `F`
    pub(crate) fn not_found(stdout: &str, stderr: &str) -> bool {
        let re = NOT_FOUND.get_or_init(|| {
            Regex::new(r"(?i)unknown job id|do(es)? not exist|job has finished")
                .unwrap()
        });
        re.is_match(stdout) || re.is_match(stderr)
    }
}

impl Queue for Pbs {
    fn submit_command(&self) -> &str {
        "qsub"
    }

    fn sleep_int(&self) -> usize {
        self.sleep_int
    }

    fn template(&self) -> &Option<String> {
        &self.template
    }

    fn default_submit_script(&self) -> String {
        "#!/bin/sh
#PBS -N {{.basename}}
#PBS -S /bin/bash
#PBS -j oe
#PBS -W umask=022
#PBS -l walltime=1000:00:00

cd {{.dir}}
"
        .to_owned()
    }

    /// pipe the submit script into `qsub -V -d dir [params] -`. `-V` exports
    /// the current environment to the job, and `-d` sets its working
    /// directory
    fn submit(&self, job: &Job) -> Result<String, QueueError> {
        let mut cmd = Command::new(self.submit_command());
        cmd.arg("-V")
            .arg("-d")
            .arg(&job.dir)
            .args(job.param_args())
            .arg("-");
        submit_inner(&mut cmd, &self.submit_script(job), self.sleep_int)
    }

    /// run `qstat job_id`. For a running job the output looks like
    ///
    /// ```text
    /// Job id            Name             User              Time Use S Queue
    /// ----------------  ---------------- ----------------  -------- - -----
    /// 819446.maple      kpoints_4x4x4    user              00:00:00 R workq
    /// ```
    ///
    /// and once the job is gone, `qstat: Unknown Job Id 819446.maple` is
    /// printed to stderr instead
    fn status(&self, job_id: &str) -> Result<bool, QueueError> {
        let (stdout, stderr) = query(Command::new("qstat").arg(job_id))?;
        let done = Self::not_found(&stdout, &stderr);
        if !done {
            log::trace!("qstat {job_id}: {}", stdout.trim());
        }
        Ok(done)
    }

    /// run `qdel job_id`
    fn cancel(&self, job_id: &str) -> Result<(), QueueError> {
        let mut cmd = Command::new("qdel");
        cmd.arg(job_id);
        cancel_inner(&mut cmd, job_id, Self::not_found)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use test_case::test_case;

    use super::*;

    fn job() -> Job {
        Job::new(
            "kpoints_4x4x4",
            "mpirun -np 16 pw.x",
            "/tmp/kpoints_4x4x4",
            "kpoints_4x4x4.in",
            "kpoints_4x4x4.out",
            Some("-l nodes=1:ppn=16".to_owned()),
        )
    }

    #[test]
    fn default_script() {
        let got = Pbs::new(10, None).submit_script(&job());
        assert_snapshot!(got, @r"
        #!/bin/sh
        #PBS -N kpoints_4x4x4
        #PBS -S /bin/bash
        #PBS -j oe
        #PBS -W umask=022
        #PBS -l walltime=1000:00:00

        cd /tmp/kpoints_4x4x4
        mpirun -np 16 pw.x < kpoints_4x4x4.in > kpoints_4x4x4.out
        ");
    }

    #[test]
    fn template_script() {
        let pbs = Pbs::new(
            10,
            Some("#PBS -N {{.basename}}\nmodule load qe".to_owned()),
        );
        let got = pbs.submit_script(&job());
        assert_snapshot!(got, @r"
        #PBS -N kpoints_4x4x4
        module load qe
        mpirun -np 16 pw.x < kpoints_4x4x4.in > kpoints_4x4x4.out
        ");
    }

    #[test_case("", "qstat: Unknown Job Id 819446.maple\n", true ; "torque")]
    #[test_case("Following jobs do not exist:\n819446\n", "", true ; "sge")]
    #[test_case("Job id  Name  User  Time Use S Queue
----------------  ---------------- ----------------  -------- - -----
819446.maple      kpoints_4x4x4    user              00:00:00 R workq
", "", false ; "running")]
    #[test_case("", "qstat: cannot connect to server maple\n", false ; "server down")]
    fn not_found(stdout: &str, stderr: &str, want: bool) {
        assert_eq!(Pbs::not_found(stdout, stderr), want);
    }
}
