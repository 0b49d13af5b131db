use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("could not launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Records a stream to a file by running ffmpeg.
pub struct Capture {
    ffmpeg: PathBuf,
}

impl Capture {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// `-t` is given as an input option: only `duration` of the stream is read.
    fn arguments(stream_url: &str, duration: Duration, output: &Path) -> Vec<OsString> {
        let duration = duration.as_secs().to_string();

        ["-y", "-t", duration.as_str(), "-i", stream_url, "-vn", "-acodec", "copy"]
            .into_iter()
            .map(OsString::from)
            .chain([output.as_os_str().to_owned()])
            .collect()
    }

    /// Captures `duration` of audio from `stream_url` into `output`.
    ///
    /// On failure the partially written output is removed.
    pub async fn run(
        &self,
        stream_url: &str,
        duration: Duration,
        output: &Path,
    ) -> Result<(), CaptureError> {
        let program = self.ffmpeg.display().to_string();
        debug!(%program, %stream_url, output = %output.display(), "Launching the capture");

        let result = Command::new(&self.ffmpeg)
            .args(Self::arguments(stream_url, duration, output))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let failure = match result {
            Ok(out) if out.status.success() => return Ok(()),

            Ok(out) => CaptureError::Failed {
                program,
                status: out.status,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            },

            Err(source) => CaptureError::Launch { program, source },
        };

        match fs::remove_file(output) {
            Ok(()) => info!("Removed the partial recording `{}`", output.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove the partial recording `{}`: {e}", output.display()),
        }

        Err(failure)
    }
}

/// Held while a recording is in progress; removes the lock file when dropped.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Creates the lock file, or returns `None` if it already exists.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Option<Self>> {
        let path = path.into();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),

            Err(e) => {
                return Err(e)
                    .with_context(|| anyhow!("could not create the lock file `{}`", path.display()));
            }
        };

        let guard = Self { path };
        writeln!(file, "{}", std::process::id()).with_context(|| {
            anyhow!("could not write to the lock file `{}`", guard.path.display())
        })?;
        debug!("Created the lock file `{}`", guard.path.display());

        Ok(Some(guard))
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed the lock file `{}`", self.path.display()),
            Err(e) => warn!("Could not remove the lock file `{}`: {e}", self.path.display()),
        }
    }
}
