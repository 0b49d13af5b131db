use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use regex_lite::Regex;
use time::macros::format_description;
use time::{Date, Time};
use time_tz::{OffsetResult, PrimitiveDateTimeExt};
use tracing::{debug, info, warn};

use crate::config::Timezone;
use crate::schedule::ClockTime;

pub const RECORDING_EXTENSION: &str = "m4a";

/// Touched after every successful recording; its mtime tells feed caches that they are stale.
pub const MARKER_FILE_NAME: &str = ".last_recording";

/// How far a recording's start may be from a program's start and still belong to it.
pub const SCHEDULE_TOLERANCE_MINUTES: u16 = 5;

/// Hour of the day that `retime` assigns to recordings.
const RETIME_HOUR: u8 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFile {
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
}

pub fn marker_path(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(MARKER_FILE_NAME)
}

/// Creates the freshness marker or bumps its mtime.
pub fn touch_marker(dir: impl AsRef<Path>) -> io::Result<PathBuf> {
    let path = marker_path(dir);
    File::options()
        .create(true)
        .append(true)
        .open(&path)?
        .set_modified(SystemTime::now())?;

    Ok(path)
}

/// Name for a new recording: `YYYYMMDD-HHMM-xxxxxxxx.m4a`.
pub fn recording_file_name(date: Date, start: ClockTime, rng: &mut impl Rng) -> String {
    format!(
        "{:04}{:02}{:02}-{start}-{:08x}.{RECORDING_EXTENSION}",
        date.year(),
        u8::from(date.month()),
        date.day(),
        rng.gen::<u32>(),
    )
}

fn is_recording(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == RECORDING_EXTENSION)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(Into::into)
}

/// Lists the recordings in `dir`, newest first (by name).
///
/// A missing directory yields no recordings. Entries that cannot be inspected are logged and
/// skipped.
pub fn list_files(dir: impl AsRef<Path>) -> Result<Vec<RecordedFile>> {
    let dir = dir.as_ref();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,

        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("The recordings directory `{}` does not exist", dir.display());
            return Ok(vec![]);
        }

        Err(e) => {
            return Err(e).with_context(|| {
                anyhow!("could not read the recordings directory `{}`", dir.display())
            });
        }
    };

    let mut files = vec![];

    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),

            Err(e) => {
                warn!("Could not read an entry of `{}`: {e}", dir.display());
                continue;
            }
        };

        if !is_recording(&path) {
            continue;
        }

        let Some(name) = file_name(&path) else {
            debug!("Skipping `{}`: the name is not valid UTF-8", path.display());
            continue;
        };

        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,

            Err(e) => {
                warn!("Failed to process the file `{name}`: {e}");
                continue;
            }
        };

        let modified = match metadata.modified() {
            Ok(modified) => modified,

            Err(e) => {
                warn!("Could not get the modification time of `{name}`: {e}");
                continue;
            }
        };

        files.push(RecordedFile {
            name,
            size: metadata.len(),
            modified,
        });
    }

    files.sort_unstable_by(|lhs, rhs| rhs.name.cmp(&lhs.name));

    Ok(files)
}

/// Extracts the capture start time from `YYYYMMDD-HHMM...` (or the legacy `YYYYMMDD HHMM...`).
///
/// Four digits that do not form a valid time of day (`2400`, `0760`) yield `None`, so such files
/// never match a schedule.
pub fn extract_start_time(file_name: &str) -> Option<ClockTime> {
    static REGEXP: OnceLock<Regex> = OnceLock::new();

    let regexp = REGEXP.get_or_init(|| Regex::new(r"^[0-9]{8}[- ]([0-9]{4})").unwrap());

    ClockTime::from_hhmm(regexp.captures(file_name)?.get(1)?.as_str())
}

/// Whether `time` is within `tolerance` minutes of any of `schedule`.
pub fn matches_schedule(time: ClockTime, schedule: &[ClockTime], tolerance: u16) -> bool {
    schedule
        .iter()
        .any(|start| time.minutes().abs_diff(start.minutes()) <= tolerance)
}

/// Keeps the recordings whose start time is near one of `schedule`; an empty schedule keeps all.
pub fn filter_by_schedule(
    files: impl IntoIterator<Item = RecordedFile>,
    schedule: &[ClockTime],
    tolerance: u16,
) -> Vec<RecordedFile> {
    if schedule.is_empty() {
        return files.into_iter().collect();
    }

    files
        .into_iter()
        .filter(|file| {
            extract_start_time(&file.name)
                .is_some_and(|time| matches_schedule(time, schedule, tolerance))
        })
        .collect()
}

fn legacy_name(name: &str) -> Option<String> {
    static REGEXP: OnceLock<Regex> = OnceLock::new();

    let regexp = REGEXP.get_or_init(|| {
        Regex::new(r"^([0-9]{8})\s+([0-9]{4})\s+([a-f0-9]{8})\.m4a$").unwrap()
    });
    let captures = regexp.captures(name)?;

    Some(format!(
        "{}-{}-{}.{RECORDING_EXTENSION}",
        &captures[1], &captures[2], &captures[3],
    ))
}

fn recordings_in(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!("`{}` is not a directory", dir.display()));
    }

    let mut paths = fs::read_dir(dir)
        .with_context(|| anyhow!("could not read the directory `{}`", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| is_recording(path))
        .collect::<Vec<_>>();
    paths.sort_unstable();

    Ok(paths)
}

/// Renames legacy space-separated recordings to the hyphenated form. Returns the rename count.
pub fn rename_legacy(dir: impl AsRef<Path>) -> Result<usize> {
    let dir = dir.as_ref();
    info!("Checking for legacy file names in `{}`", dir.display());

    let mut renamed = 0;

    for path in recordings_in(dir)? {
        let Some(name) = file_name(&path) else {
            continue;
        };
        let Some(new_name) = legacy_name(&name) else {
            continue;
        };

        info!("Renaming `{name}` -> `{new_name}`");

        match fs::rename(&path, path.with_file_name(&new_name)) {
            Ok(()) => renamed += 1,
            Err(e) => warn!("Could not rename `{name}`: {e}"),
        }
    }

    info!("Renamed {renamed} files");

    Ok(renamed)
}

/// Sets the mtime of every recording to [`RETIME_HOUR`] on the date its name starts with.
/// Returns the number of files updated.
pub fn retime(dir: impl AsRef<Path>, timezone: Timezone) -> Result<usize> {
    let dir = dir.as_ref();
    info!("Retiming recordings in `{}`", dir.display());

    let mut updated = 0;

    for path in recordings_in(dir)? {
        let Some(name) = file_name(&path) else {
            continue;
        };
        let Some(date) = name
            .get(..8)
            .and_then(|prefix| Date::parse(prefix, format_description!("[year][month][day]")).ok())
        else {
            debug!("Skipping `{name}`: no date prefix");
            continue;
        };

        let Some(mtime) = retime_target(date, timezone) else {
            warn!("Skipping `{name}`: {date} {RETIME_HOUR:02}:00 does not exist in {}", timezone.name());
            continue;
        };

        let result = File::options()
            .append(true)
            .open(&path)
            .and_then(|f| f.set_modified(mtime));

        match result {
            Ok(()) => {
                debug!("{name} -> {date} {RETIME_HOUR:02}:00");
                updated += 1;
            }

            Err(e) => warn!("Could not set the modification time of `{name}`: {e}"),
        }
    }

    info!("Updated {updated} files");

    Ok(updated)
}

fn retime_target(date: Date, timezone: Timezone) -> Option<SystemTime> {
    let time = Time::from_hms(RETIME_HOUR, 0, 0).ok()?;

    match date.with_time(time).assume_timezone(timezone.tz()) {
        OffsetResult::Some(datetime) | OffsetResult::Ambiguous(datetime, _) => {
            Some(datetime.into())
        }

        OffsetResult::None => None,
    }
}
