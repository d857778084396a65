use std::{
    error::Error,
    fmt::Display,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
    time::{Duration, Instant},
};

pub mod local;
pub mod pbs;
pub mod slurm;


/// the number of times to retry a failed submission before giving up
const SUBMIT_RETRIES: usize = 5;

#[derive(Debug, PartialEq, Eq)]
pub enum QueueError {
    /// the command could not be started at all
    Spawn(String, std::io::ErrorKind),
    /// the submit command kept exiting unsuccessfully
    Submit { cmd: String, stderr: String },
    /// the submit command succeeded but printed nothing resembling a job id
    NoJobId(String),
    /// the job was still in the queue when the deadline passed
    Timeout { job_id: String, waited: Duration },
    /// the job could not be removed from the queue and may still be running
    Cancel { job_id: String, stderr: String },
}

impl Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Spawn(cmd, e) => {
                write!(f, "failed to run `{cmd}` with {e}")
            }
            QueueError::Submit { cmd, stderr } => {
                write!(f, "`{cmd}` failed with `{}`", stderr.trim())
            }
            QueueError::NoJobId(out) => {
                write!(f, "no job id in submit output `{}`", out.trim())
            }
            QueueError::Timeout { job_id, waited } => write!(
                f,
                "job {job_id} still queued after {:.1} s",
                waited.as_secs_f64()
            ),
            QueueError::Cancel { job_id, stderr } => {
                write!(f, "failed to cancel job {job_id}: `{}`", stderr.trim())
            }
        }
    }
}

impl Error for QueueError {}

impl QueueError {
    /// Returns `true` if the queue error is [`Timeout`].
    ///
    /// [`Timeout`]: QueueError::Timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the queue error is [`Cancel`].
    ///
    /// [`Cancel`]: QueueError::Cancel
    #[must_use]
    pub fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancel { .. })
    }
}

/// A single run of a program, described by the command to run and the input
/// and output files, relative to `dir`, to connect to its stdin and stdout.
/// Jobs are built fresh for each submission and never reused
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    /// name of the job in the queue
    pub name: String,

    /// the command to run, including any launcher like mpirun
    pub command: String,

    /// the directory to run in
    pub dir: PathBuf,

    pub infile: String,

    pub outfile: String,

    /// extra options passed to the submit command
    pub params: Option<String>,

    /// assigned by the queue on submission
    pub job_id: Option<String>,
}

impl Job {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        dir: impl AsRef<Path>,
        infile: impl Into<String>,
        outfile: impl Into<String>,
        params: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            dir: dir.as_ref().to_owned(),
            infile: infile.into(),
            outfile: outfile.into(),
            params,
            job_id: None,
        }
    }

    /// the shell command redirecting `infile` to the program's stdin and its
    /// stdout to `outfile`
    pub fn shell_command(&self) -> String {
        format!("{} < {} > {}", self.command, self.infile, self.outfile)
    }

    pub fn inpath(&self) -> PathBuf {
        self.dir.join(&self.infile)
    }

    pub fn outpath(&self) -> PathBuf {
        self.dir.join(&self.outfile)
    }

    /// split `params` into separate arguments for the submit command
    pub(crate) fn param_args(&self) -> Vec<&str> {
        self.params
            .as_deref()
            .map(|p| p.split_whitespace().collect())
            .unwrap_or_default()
    }
}

/// A batch queue that [Job]s can be submitted to and polled on
pub trait Queue {
    /// the name of the program used to submit jobs
    fn submit_command(&self) -> &str;

    /// seconds to sleep between status checks
    fn sleep_int(&self) -> usize;

    /// the user-supplied submit script template, if any
    fn template(&self) -> &Option<String>;

    /// the script header to use when no template is supplied
    fn default_submit_script(&self) -> String;

    /// Build the full submit script for `job`. In line with the templates used
    /// elsewhere, `{{.basename}}` in the template is replaced with the job's
    /// name and `{{.dir}}` with its directory. The shell command running the
    /// job is appended to the end
    fn submit_script(&self, job: &Job) -> String {
        use std::fmt::Write;
        let mut body = self
            .template()
            .clone()
            .unwrap_or_else(|| self.default_submit_script())
            .replace("{{.basename}}", &job.name)
            .replace("{{.dir}}", &job.dir.to_string_lossy());
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        writeln!(body, "{}", job.shell_command()).unwrap();
        body
    }

    /// submit `job` to the queue and return the job id assigned by the queue
    fn submit(&self, job: &Job) -> Result<String, QueueError>;

    /// return `true` if the queue no longer knows about `job_id`. there is no
    /// way to distinguish a job that finished from one that crashed
    fn status(&self, job_id: &str) -> Result<bool, QueueError>;

    /// remove `job_id` from the queue, whether it is waiting or running. the
    /// default does nothing, for queues whose jobs are done by the time
    /// [Queue::submit] returns
    fn cancel(&self, _job_id: &str) -> Result<(), QueueError> {
        Ok(())
    }

    /// Poll [Queue::status] every [Queue::sleep_int] seconds until `job_id`
    /// leaves the queue. If `timeout` is given and passes first, cancel the
    /// job with [Queue::cancel] and return [QueueError::Timeout], so a timed
    /// out job never lingers in the queue
    fn wait(
        &self,
        job_id: &str,
        timeout: Option<Duration>,
    ) -> Result<(), QueueError> {
        let start = Instant::now();
        let mut polls = 0;
        loop {
            if self.status(job_id)? {
                log::debug!(
                    "job {job_id} finished after {polls} polls in {:.1} s",
                    start.elapsed().as_secs_f64()
                );
                return Ok(());
            }
            polls += 1;
            let waited = start.elapsed();
            if let Some(t) = timeout
                && waited >= t
            {
                log::warn!(
                    "job {job_id} still queued after {:.1} s, cancelling",
                    waited.as_secs_f64()
                );
                self.cancel(job_id)?;
                return Err(QueueError::Timeout {
                    job_id: job_id.to_owned(),
                    waited,
                });
            }
            log::trace!("job {job_id} still running after {polls} polls");
            std::thread::sleep(Duration::from_secs(self.sleep_int() as u64));
        }
    }

    /// submit `job`, record its id, and block until it leaves the queue or
    /// `timeout` passes
    fn run(
        &self,
        job: &mut Job,
        timeout: Option<Duration>,
    ) -> Result<(), QueueError> {
        let job_id = self.submit(job)?;
        log::info!("submitted {} as job {job_id}", job.name);
        job.job_id = Some(job_id.clone());
        self.wait(&job_id, timeout)
    }
}

/// run `cmd` with `script` on its stdin, returning the output of the command
/// or [QueueError::Spawn] if it couldn't be started
pub(crate) fn pipe_script(
    cmd: &mut Command,
    script: &str,
) -> Result<Output, QueueError> {
    let spawn_err = |cmd: &Command, e: std::io::Error| {
        QueueError::Spawn(format!("{cmd:?}"), e.kind())
    };
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_err(cmd, e))?;
    // a command that exits without reading its input is not an error here
    if let Some(mut stdin) = child.stdin.take()
        && let Err(e) = stdin.write_all(script.as_bytes())
        && e.kind() != std::io::ErrorKind::BrokenPipe
    {
        return Err(spawn_err(cmd, e));
    }
    child.wait_with_output().map_err(|e| spawn_err(cmd, e))
}

/// helper function to consolidate error handling between the submit
/// implementations. the job id is taken to be the last whitespace-separated
/// field of the submit command's output
pub(crate) fn submit_inner(
    cmd: &mut Command,
    script: &str,
    sleep_int: usize,
) -> Result<String, QueueError> {
    let mut retries = SUBMIT_RETRIES;
    loop {
        let s = pipe_script(cmd, script)?;
        if !s.status.success() {
            let stderr = String::from_utf8_lossy(&s.stderr).to_string();
            if retries > 0 {
                log::warn!(
                    "{cmd:?} failed with `{}`, retrying {retries} more times",
                    stderr.trim()
                );
                retries -= 1;
                std::thread::sleep(Duration::from_secs(sleep_int as u64));
                continue;
            }
            return Err(QueueError::Submit {
                cmd: format!("{cmd:?}"),
                stderr,
            });
        }
        let raw = String::from_utf8_lossy(&s.stdout).trim().to_string();
        return match raw.split_whitespace().last() {
            Some(id) => Ok(id.to_string()),
            None => Err(QueueError::NoJobId(raw)),
        };
    }
}

/// run the status command `cmd`, returning its stdout and stderr. the exit
/// status is ignored because queues report missing jobs as errors
pub(crate) fn query(cmd: &mut Command) -> Result<(String, String), QueueError> {
    let out = cmd
        .output()
        .map_err(|e| QueueError::Spawn(format!("{cmd:?}"), e.kind()))?;
    Ok((
        String::from_utf8_lossy(&out.stdout).to_string(),
        String::from_utf8_lossy(&out.stderr).to_string(),
    ))
}

/// run the cancel command `cmd` for `job_id`. a job that `gone` reports as
/// already out of the queue counts as cancelled
pub(crate) fn cancel_inner(
    cmd: &mut Command,
    job_id: &str,
    gone: impl Fn(&str, &str) -> bool,
) -> Result<(), QueueError> {
    let out = cmd.output().map_err(|e| QueueError::Cancel {
        job_id: job_id.to_owned(),
        stderr: format!("failed to run {cmd:?} with {e}"),
    })?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    let stderr = String::from_utf8_lossy(&out.stderr);
    if out.status.success() || gone(&stdout, &stderr) {
        log::debug!("cancelled job {job_id}");
        return Ok(());
    }
    Err(QueueError::Cancel {
        job_id: job_id.to_owned(),
        stderr: stderr.to_string(),
    })
}
