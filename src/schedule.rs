mod days;

use std::fmt::{self, Display};
use std::env;

use thiserror::Error;
use tracing::{info, warn};

pub use self::days::DaySpec;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// The highest `PROGRAM{i}` key consulted.
pub const MAX_PROGRAMS: usize = 50;

/// A wall-clock time of day with minute precision, displayed as `HHMM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_hm(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then(|| Self(u16::from(hour) * 60 + u16::from(minute)))
    }

    pub fn from_time(time: time::Time) -> Self {
        Self(u16::from(time.hour()) * 60 + u16::from(time.minute()))
    }

    /// Parses exactly four digits, `HHMM`.
    pub fn from_hhmm(s: &str) -> Option<Self> {
        if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        Self::from_hm(s[..2].parse().ok()?, s[2..].parse().ok()?)
    }

    /// Parses `HH:MM` as written in program definitions; `HHMM` is accepted as well.
    pub fn parse(s: &str) -> Option<Self> {
        match s.split_once(':') {
            Some((hour, minute)) if hour.len() == 2 && minute.len() == 2 => {
                Self::from_hhmm(&format!("{hour}{minute}"))
            }

            Some(_) => None,
            None => Self::from_hhmm(s),
        }
    }

    /// Minutes since midnight.
    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u8 {
        (self.0 / 60) as u8
    }

    pub fn minute(self) -> u8 {
        (self.0 % 60) as u8
    }

    /// Minutes from `self` forward to `end`, wrapping past midnight.
    pub fn minutes_until(self, end: ClockTime) -> u16 {
        (end.0 + MINUTES_PER_DAY - self.0) % MINUTES_PER_DAY
    }
}

impl Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{:02}", self.hour(), self.minute())
    }
}

/// One recurring broadcast slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSchedule {
    pub id: String,
    pub name: String,
    pub days: DaySpec,
    pub start: ClockTime,
    pub end: ClockTime,
    pub stream_url: String,
}

impl ProgramSchedule {
    /// Start times used to attribute recordings to this program.
    pub fn start_times(&self) -> Vec<ClockTime> {
        vec![self.start]
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("expected 5 `|`-separated fields (`HH:MM-HH:MM|days|id|name|url`), found {0}")]
    FieldCount(usize),

    #[error("the {0} field is empty")]
    EmptyField(&'static str),

    #[error("the time range `{0}` has no `-` (expected `HH:MM-HH:MM`)")]
    MissingTimeSeparator(String),

    #[error("`{0}` is not a valid `HH:MM` time")]
    InvalidTime(String),
}

/// Parses a single `HH:MM-HH:MM|days|id|name|url` definition.
///
/// Whitespace around fields and around the `-` of the time range is ignored. The URL is the last
/// field, so it may itself contain `|`.
pub fn parse_program(raw: &str) -> Result<ProgramSchedule, ProgramError> {
    let fields = raw.splitn(5, '|').map(str::trim).collect::<Vec<_>>();

    let &[time_range, days, id, name, stream_url] = fields.as_slice() else {
        return Err(ProgramError::FieldCount(fields.len()));
    };

    for (value, what) in [
        (time_range, "time range"),
        (id, "program id"),
        (name, "display name"),
        (stream_url, "stream URL"),
    ] {
        if value.is_empty() {
            return Err(ProgramError::EmptyField(what));
        }
    }

    let (start, end) = time_range
        .split_once('-')
        .ok_or_else(|| ProgramError::MissingTimeSeparator(time_range.into()))?;
    let parse_time = |s: &str| {
        let s = s.trim();
        ClockTime::parse(s).ok_or_else(|| ProgramError::InvalidTime(s.into()))
    };

    Ok(ProgramSchedule {
        id: id.into(),
        name: name.into(),
        days: DaySpec::parse(days),
        start: parse_time(start)?,
        end: parse_time(end)?,
        stream_url: stream_url.into(),
    })
}

/// The configured programs in configuration order, keyed by program id.
#[derive(Debug, Clone, Default)]
pub struct Programs {
    entries: Vec<ProgramSchedule>,
}

impl Programs {
    /// Adds a program. A program with the same id is replaced but keeps its original position.
    pub fn insert(&mut self, program: ProgramSchedule) -> Option<ProgramSchedule> {
        match self.entries.iter_mut().find(|entry| entry.id == program.id) {
            Some(entry) => Some(std::mem::replace(entry, program)),

            None => {
                self.entries.push(program);

                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&ProgramSchedule> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProgramSchedule> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses labelled program definitions, skipping (and logging) malformed ones.
    pub fn parse<'a, L, I>(definitions: I) -> Self
    where
        L: Display,
        I: IntoIterator<Item = (L, &'a str)>,
    {
        let mut programs = Self::default();

        for (label, raw) in definitions {
            let program = match parse_program(raw) {
                Ok(program) => program,

                Err(e) => {
                    warn!("Skipping {label} (`{raw}`): {e}");
                    continue;
                }
            };

            if program.days.has_unknown_tokens() {
                warn!(
                    "{label}: the day spec `{}` contains unrecognized days; they will never match",
                    program.days.as_str(),
                );
            }

            if let Some(replaced) = programs.insert(program) {
                warn!(
                    "{label} redefines the program `{}`; the earlier definition is dropped",
                    replaced.id,
                );
            }
        }

        programs
    }

    /// Reads `PROGRAM1`, `PROGRAM2`, ... through `lookup`, stopping at the first absent key.
    pub fn load_numbered(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let definitions = (1..=MAX_PROGRAMS)
            .map(|i| format!("PROGRAM{i}"))
            .map_while(|key| lookup(&key).filter(|v| !v.is_empty()).map(|v| (key, v)))
            .collect::<Vec<_>>();

        let programs = Self::parse(definitions.iter().map(|(key, v)| (key, v.as_str())));
        programs.log_summary();

        programs
    }

    pub fn from_env() -> Self {
        Self::load_numbered(|key| env::var(key).ok())
    }

    fn log_summary(&self) {
        if self.is_empty() {
            warn!("No programs configured");
            return;
        }

        info!("Loaded {} programs", self.len());

        for program in self.iter() {
            info!(
                "  {}: {} @ {}-{} ({})",
                program.id, program.name, program.start, program.end, program.days,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Programs {
        let vars = vars
            .iter()
            .map(|&(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();

        Programs::load_numbered(|key| vars.get(key).cloned())
    }

    fn hm(hour: u8, minute: u8) -> ClockTime {
        ClockTime::from_hm(hour, minute).unwrap()
    }

    #[test]
    fn clock_time_parsing() {
        assert_eq!(ClockTime::parse("07:40"), Some(hm(7, 40)));
        assert_eq!(ClockTime::parse("0740"), Some(hm(7, 40)));
        assert_eq!(ClockTime::parse("23:59"), Some(hm(23, 59)));
        assert_eq!(ClockTime::parse("24:00"), None);
        assert_eq!(ClockTime::parse("12:60"), None);
        assert_eq!(ClockTime::parse("7:40"), None);
        assert_eq!(ClockTime::parse("ab:cd"), None);
        assert_eq!(ClockTime::parse(""), None);
        assert_eq!(hm(0, 5).to_string(), "0005");
    }

    #[test]
    fn minutes_until_wraps_past_midnight() {
        assert_eq!(hm(23, 50).minutes_until(hm(0, 10)), 20);
        assert_eq!(hm(9, 0).minutes_until(hm(10, 0)), 60);
        assert_eq!(hm(9, 0).minutes_until(hm(9, 0)), 0);
    }

    #[test]
    fn single_program() {
        let programs = load(&[(
            "PROGRAM1",
            "07:40-08:00|ALL|program1|Program Name #1|https://example.com/stream1.m3u8",
        )]);

        assert_eq!(programs.len(), 1);
        let program = programs.get("program1").unwrap();
        assert_eq!(program.name, "Program Name #1");
        assert_eq!(program.start.to_string(), "0740");
        assert_eq!(program.end.to_string(), "0800");
        assert_eq!(program.stream_url, "https://example.com/stream1.m3u8");
        assert_eq!(program.days, DaySpec::parse("ALL"));
        assert_eq!(program.days.to_string(), "ALL");
    }

    #[test]
    fn multiple_programs_keep_configuration_order() {
        let programs = load(&[
            ("PROGRAM1", "07:40-08:00|ALL|program1|Program Name #1|url1"),
            ("PROGRAM2", "08:00-08:20|MON-FRI|program2|Program Name #2|url2"),
            ("PROGRAM3", "08:20-08:40|SAT,SUN|program3|Program Name #3|url3"),
        ]);

        let ids = programs.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["program1", "program2", "program3"]);
        assert_eq!(programs.get("program2").unwrap().days.as_str(), "MON-FRI");
    }

    #[test]
    fn scanning_stops_at_the_first_gap() {
        let programs = load(&[
            ("PROGRAM1", "07:40-08:00|ALL|program1|Program Name #1|url1"),
            ("PROGRAM3", "08:20-08:40|ALL|program3|Program Name #3|url3"),
        ]);

        assert_eq!(programs.len(), 1);
        assert!(programs.get("program3").is_none());
    }

    #[test]
    fn no_programs() {
        assert!(load(&[]).is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let programs = load(&[
            ("PROGRAM1", "07:40-08:00|MON|program1"),
            ("PROGRAM2", "07:40-08:00 program1 Program Name #1 url"),
            ("PROGRAM3", "0740|ALL|program1|Program Name #1|url"),
            ("PROGRAM4", "07:40-08:00||||"),
            ("PROGRAM5", "07:40-25:00|ALL|program1|Program Name #1|url"),
            ("PROGRAM6", "09:30-10:15|ALL|good|Good Program|url"),
        ]);

        assert_eq!(programs.len(), 1);
        assert!(programs.get("good").is_some());
    }

    #[test]
    fn parse_errors_are_specific() {
        assert_eq!(
            parse_program("07:40-08:00|MON|program1"),
            Err(ProgramError::FieldCount(3)),
        );
        assert_eq!(
            parse_program("07:40-08:00|ALL||name|url"),
            Err(ProgramError::EmptyField("program id")),
        );
        assert_eq!(
            parse_program("0740|ALL|id|name|url"),
            Err(ProgramError::MissingTimeSeparator("0740".into())),
        );
        assert_eq!(
            parse_program("07:4x-08:00|ALL|id|name|url"),
            Err(ProgramError::InvalidTime("07:4x".into())),
        );
    }

    #[test]
    fn whitespace_is_trimmed() {
        let program =
            parse_program("  07:40 - 08:00  |  ALL  |  program1  |  Program Name #1  |  url  ")
                .unwrap();

        assert_eq!(program.id, "program1");
        assert_eq!(program.name, "Program Name #1");
        assert_eq!(program.start, hm(7, 40));
        assert_eq!(program.end, hm(8, 0));
        assert_eq!(program.stream_url, "url");
    }

    #[test]
    fn empty_day_spec_means_every_day() {
        let program = parse_program("07:40-08:00||program1|Program|url").unwrap();

        assert!(program.days.matches(time::Weekday::Wednesday));
    }

    #[test]
    fn url_may_contain_pipes() {
        let program = parse_program("07:40-08:00|ALL|id|name|https://example.com/a|b").unwrap();

        assert_eq!(program.stream_url, "https://example.com/a|b");
    }

    #[test]
    fn special_characters_in_id() {
        let programs = load(&[("PROGRAM1", "07:40-08:00|ALL|test-program|Program Name|url")]);

        assert!(programs.get("test-program").is_some());
    }

    #[test]
    fn last_definition_of_an_id_wins() {
        let programs = load(&[
            ("PROGRAM1", "07:40-08:00|ALL|program1|Program Name #1|url1"),
            ("PROGRAM2", "09:00-10:00|ALL|program2|Program Name #2|url2"),
            ("PROGRAM3", "20:00-20:20|ALL|program1|Program Name #1|url3"),
        ]);

        assert_eq!(programs.len(), 2);
        let program = programs.get("program1").unwrap();
        assert_eq!(program.start, hm(20, 0));
        assert_eq!(program.stream_url, "url3");
        assert_eq!(programs.iter().next().unwrap().id, "program1");
    }

    #[test]
    fn midnight_edges() {
        let programs = load(&[
            ("PROGRAM1", "00:00-01:00|ALL|midnight|Midnight Show|url"),
            ("PROGRAM2", "23:30-00:30|ALL|latenight|Late Night Show|url"),
        ]);

        assert_eq!(programs.get("midnight").unwrap().start.to_string(), "0000");
        let late = programs.get("latenight").unwrap();
        assert_eq!(late.start.to_string(), "2330");
        assert_eq!(late.end.to_string(), "0030");
    }
}
