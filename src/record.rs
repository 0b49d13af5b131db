use std::fs;

use anyhow::{anyhow, bail, Context, Result};
use rand::thread_rng;
use tracing::{info, warn};

use crate::capture::{Capture, LockGuard};
use crate::cli::RecordArgs;
use crate::config::Config;
use crate::recordings::{self, recording_file_name};
use crate::resolve::{self, RecordingPlan, Resolution, LAUNCH_TOLERANCE_MINUTES};
use crate::schedule::{ClockTime, Programs};

/// Entry point of the `record` command. Returns without recording when another recording holds
/// the lock or when nothing is scheduled.
pub async fn run(cfg: &Config, args: RecordArgs) -> Result<()> {
    let Some(_lock) = LockGuard::acquire(&cfg.lock_file)? else {
        info!(
            "Another recording is in progress (`{}` exists); skipping",
            cfg.lock_file.display()
        );

        return Ok(());
    };

    let plan = match plan(cfg, args)? {
        Some(plan) => plan,
        None => return Ok(()),
    };

    record(cfg, &plan).await
}

fn plan(cfg: &Config, args: RecordArgs) -> Result<Option<RecordingPlan>> {
    if let Some(duration) = args.duration_minutes {
        let plan = resolve::manual(&duration, args.stream_url.as_deref())?;
        info!("Manual recording: {} minutes", plan.duration.as_secs() / 60);

        return Ok(Some(plan));
    }

    info!("Checking for scheduled programs");
    let programs = Programs::from_env();

    if programs.is_empty() {
        bail!("no programs are configured (set PROGRAM1, PROGRAM2, ...)");
    }

    let now = cfg.timezone.now();
    let current = ClockTime::from_time(now.time());

    match resolve::resolve(&programs, current, now.weekday()) {
        Resolution::Matched(plan) => {
            if let Some(program) = plan.program_id.as_deref().and_then(|id| programs.get(id)) {
                info!(
                    "Matched the program `{}` ({}-{}); recording for {} minutes",
                    program.name,
                    program.start,
                    program.end,
                    plan.duration.as_secs() / 60,
                );
            }

            Ok(Some(plan))
        }

        Resolution::NoMatch => {
            info!(
                "No program starts within {LAUNCH_TOLERANCE_MINUTES} minutes of {current}; \
                    nothing to record"
            );

            Ok(None)
        }
    }
}

async fn record(cfg: &Config, plan: &RecordingPlan) -> Result<()> {
    let now = cfg.timezone.now();
    let start = plan
        .start
        .unwrap_or_else(|| ClockTime::from_time(now.time()));

    fs::create_dir_all(&cfg.recordings_dir).with_context(|| {
        anyhow!(
            "could not create the recordings directory `{}`",
            cfg.recordings_dir.display()
        )
    })?;

    let output = cfg
        .recordings_dir
        .join(recording_file_name(now.date(), start, &mut thread_rng()));
    info!(
        "Recording `{}` to `{}` for {}s",
        plan.stream_url,
        output.display(),
        plan.duration.as_secs(),
    );

    Capture::new(&cfg.ffmpeg)
        .run(&plan.stream_url, plan.duration, &output)
        .await
        .context("the recording failed")?;

    info!("Saved the recording to `{}`", output.display());

    match recordings::touch_marker(&cfg.recordings_dir) {
        Ok(marker) => info!("Updated the freshness marker `{}`", marker.display()),
        Err(e) => warn!("Failed to update the freshness marker: {e}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> Config {
        Config {
            recordings_dir: dir.join("recordings"),
            lock_file: dir.join("record.lock"),
            ffmpeg: "true".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn held_lock_skips_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        fs::write(&cfg.lock_file, b"").unwrap();

        let args = RecordArgs {
            duration_minutes: Some("not a number".into()),
            stream_url: None,
        };

        run(&cfg, args).await.unwrap();
        assert!(cfg.lock_file.exists());
    }

    #[tokio::test]
    async fn invalid_manual_duration_fails_and_releases_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());

        let args = RecordArgs {
            duration_minutes: Some("0".into()),
            stream_url: Some("http://example.com/live".into()),
        };

        let e = run(&cfg, args).await.unwrap_err();
        assert_eq!(
            e.downcast_ref::<resolve::InputError>(),
            Some(&resolve::InputError::NotPositive(0)),
        );
        assert!(!cfg.lock_file.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn manual_recording_touches_the_marker() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());

        let args = RecordArgs {
            duration_minutes: Some("1".into()),
            stream_url: Some("http://example.com/live".into()),
        };

        run(&cfg, args).await.unwrap();

        assert!(cfg.marker_path().exists());
        assert!(!cfg.lock_file.exists());
    }
}
