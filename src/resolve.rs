//! Deciding what to record at a given instant.

use std::time::Duration;

use thiserror::Error;
use time::Weekday;

use crate::schedule::{ClockTime, ProgramSchedule, Programs, MINUTES_PER_DAY};

/// How late after its start a program may still be launched.
pub const LAUNCH_TOLERANCE_MINUTES: u16 = 5;

/// Longest manual recording, in minutes.
pub const MAX_MANUAL_MINUTES: i64 = MINUTES_PER_DAY as i64;

/// Everything the capture step needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingPlan {
    pub duration: Duration,

    /// Scheduled start of the program; `None` for manual recordings.
    pub start: Option<ClockTime>,

    pub stream_url: String,

    /// Id of the matched program; `None` for manual recordings.
    pub program_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Matched(RecordingPlan),

    /// Nothing is due right now. Not an error.
    NoMatch,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("duration must be an integer number of minutes, got `{0}`")]
    NotAnInteger(String),

    #[error("duration must be positive, got {0}")]
    NotPositive(i64),

    #[error("duration must be at most {MAX_MANUAL_MINUTES} minutes, got {0}")]
    TooLarge(i64),

    #[error("the STREAM_URL environment variable must be set for a manual recording")]
    MissingStreamUrl,
}

/// Recording length for a slot from `start` to `end`; an `end` before `start` means the slot
/// spans midnight.
pub fn resolve_duration(start: ClockTime, end: ClockTime) -> Duration {
    Duration::from_secs(u64::from(start.minutes_until(end)) * 60)
}

/// Picks the program that should start recording at `now`.
///
/// A program is eligible from its start time up to [`LAUNCH_TOLERANCE_MINUTES`] later. The one
/// closest to its start wins; ties go to the program configured first.
pub fn resolve(programs: &Programs, now: ClockTime, today: Weekday) -> Resolution {
    programs
        .iter()
        .filter(|program| program.days.matches(today))
        .filter_map(|program| {
            let diff = i32::from(now.minutes()) - i32::from(program.start.minutes());

            (0..=i32::from(LAUNCH_TOLERANCE_MINUTES))
                .contains(&diff)
                .then_some((diff, program))
        })
        .min_by_key(|&(diff, _)| diff)
        .map(|(_, program)| Resolution::Matched(plan_for(program)))
        .unwrap_or(Resolution::NoMatch)
}

fn plan_for(program: &ProgramSchedule) -> RecordingPlan {
    RecordingPlan {
        duration: resolve_duration(program.start, program.end),
        start: Some(program.start),
        stream_url: program.stream_url.clone(),
        program_id: Some(program.id.clone()),
    }
}

/// An ad-hoc recording of `duration_minutes` from `stream_url`, bypassing the schedule.
pub fn manual(
    duration_minutes: &str,
    stream_url: Option<&str>,
) -> Result<RecordingPlan, InputError> {
    let duration_minutes = duration_minutes.trim();
    let minutes: i64 = duration_minutes
        .parse()
        .map_err(|_| InputError::NotAnInteger(duration_minutes.into()))?;

    if minutes <= 0 {
        return Err(InputError::NotPositive(minutes));
    }

    if minutes > MAX_MANUAL_MINUTES {
        return Err(InputError::TooLarge(minutes));
    }

    let stream_url = stream_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(InputError::MissingStreamUrl)?;

    Ok(RecordingPlan {
        duration: Duration::from_secs(minutes.unsigned_abs() * 60),
        start: None,
        stream_url: stream_url.into(),
        program_id: None,
    })
}
