use std::fmt::{self, Display};

use time::Weekday;

const DAYS_PER_WEEK: i16 = 7;

/// Which days of the week a program airs on.
///
/// Accepted forms: `ALL`, `EVERY`, `*` or an empty string for every day; a single day (`MON`); a
/// comma-separated list (`MON,WED,FRI`); a range (`MON-FRI`), which may wrap around the end of the
/// week (`SAT-MON`). Days are three-letter English abbreviations, case-insensitive. List items may
/// themselves be ranges.
///
/// Parsing never fails: tokens that are not recognized simply never match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySpec {
    raw: String,
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Every,
    Items(Vec<Item>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Day(Weekday),
    Range(Weekday, Weekday),
    Unknown,
}

impl DaySpec {
    pub fn parse(s: &str) -> Self {
        let raw = s.trim();

        let kind = if is_every_day(raw) {
            Kind::Every
        } else {
            Kind::Items(raw.split(',').map(|item| Item::parse(item.trim())).collect())
        };

        Self {
            raw: raw.into(),
            kind,
        }
    }

    pub fn every_day() -> Self {
        Self {
            raw: String::new(),
            kind: Kind::Every,
        }
    }

    pub fn matches(&self, today: Weekday) -> bool {
        match &self.kind {
            Kind::Every => true,
            Kind::Items(items) => items.iter().any(|item| item.matches(today)),
        }
    }

    /// Whether some token was not understood.
    pub fn has_unknown_tokens(&self) -> bool {
        match &self.kind {
            Kind::Every => false,
            Kind::Items(items) => items.iter().any(|item| matches!(item, Item::Unknown)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Default for DaySpec {
    fn default() -> Self {
        Self::every_day()
    }
}

impl Display for DaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Kind::Every => f.write_str("ALL"),
            Kind::Items(_) => f.write_str(&self.raw),
        }
    }
}

impl Item {
    fn parse(s: &str) -> Self {
        match s.split_once('-') {
            Some((from, to)) => match (parse_weekday(from.trim()), parse_weekday(to.trim())) {
                (Some(from), Some(to)) => Self::Range(from, to),
                _ => Self::Unknown,
            },

            None => parse_weekday(s).map(Self::Day).unwrap_or(Self::Unknown),
        }
    }

    fn matches(&self, today: Weekday) -> bool {
        match *self {
            Self::Day(day) => day == today,

            // walk forward from `from`: today is inside iff it is reached no later than `to`.
            Self::Range(from, to) => days_between(from, today) <= days_between(from, to),

            Self::Unknown => false,
        }
    }
}

fn is_every_day(s: &str) -> bool {
    s.is_empty()
        || s == "*"
        || s.eq_ignore_ascii_case("ALL")
        || s.eq_ignore_ascii_case("EVERY")
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    Some(match s.to_ascii_uppercase().as_str() {
        "MON" => Weekday::Monday,
        "TUE" => Weekday::Tuesday,
        "WED" => Weekday::Wednesday,
        "THU" => Weekday::Thursday,
        "FRI" => Weekday::Friday,
        "SAT" => Weekday::Saturday,
        "SUN" => Weekday::Sunday,
        _ => return None,
    })
}

fn days_between(from: Weekday, to: Weekday) -> i16 {
    let from = i16::from(from.number_days_from_monday());
    let to = i16::from(to.number_days_from_monday());

    (to - from).rem_euclid(DAYS_PER_WEEK)
}
