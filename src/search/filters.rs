//! Structured filters applied alongside keyword matching.

use crate::model::types::{CourseMeetingPattern, CourseRecord, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Optional bounds on a meeting, in minutes after midnight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeWindow {
    pub min: Option<u16>,
    pub max: Option<u16>,
}

impl TimeWindow {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn between(min: u16, max: u16) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Whether a meeting starting at `start` and ending at `end` fits.
    /// Unknown times only pass unbounded sides.
    pub fn admits(&self, start: Option<u16>, end: Option<u16>) -> bool {
        let lower_ok = match (self.min, start) {
            (None, _) => true,
            (Some(min), Some(start)) => start >= min,
            (Some(_), None) => false,
        };
        let upper_ok = match (self.max, end) {
            (None, _) => true,
            (Some(max), Some(end)) => end <= max,
            (Some(_), None) => false,
        };
        lower_ok && upper_ok
    }
}

impl std::str::FromStr for TimeWindow {
    type Err = String;

    /// Parses `HH:MM-HH:MM`, either side may be left empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = s
            .split_once('-')
            .ok_or_else(|| format!("expected HH:MM-HH:MM, got `{s}`"))?;
        Ok(Self {
            min: parse_clock(min)?,
            max: parse_clock(max)?,
        })
    }
}

fn parse_clock(s: &str) -> Result<Option<u16>, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    let (h, m) = s.split_once(':').unwrap_or((s, "0"));
    let h: u16 = h.parse().map_err(|_| format!("invalid hour in `{s}`"))?;
    let m: u16 = m.parse().map_err(|_| format!("invalid minute in `{s}`"))?;
    if h > 23 || m > 59 {
        return Err(format!("time out of range: `{s}`"));
    }
    Ok(Some(h * 60 + m))
}

/// Structured narrowing of a keyword search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CourseFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub academic_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// A course passes when some meeting pattern meets on each listed day
    /// within the window.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub days: BTreeMap<Weekday, TimeWindow>,
}

impl CourseFilters {
    pub fn is_empty(&self) -> bool {
        self.term_name.is_none()
            && self.term_year.is_none()
            && self.academic_group.is_none()
            && self.subject.is_none()
            && self.component.is_none()
            && self.days.is_empty()
    }

    /// Parse a `NAME_YEAR` term token as produced by the terms catalog.
    pub fn with_term_token(mut self, token: &str) -> Result<Self, String> {
        let (name, year) = token
            .rsplit_once('_')
            .ok_or_else(|| format!("expected TERM_YEAR, got `{token}`"))?;
        self.term_name = Some(name.to_string());
        self.term_year = Some(year.parse().map_err(|_| format!("invalid year in `{token}`"))?);
        Ok(self)
    }

    pub fn matches_patterns(&self, patterns: &[CourseMeetingPattern]) -> bool {
        self.days.iter().all(|(day, window)| {
            patterns.iter().any(|mp| {
                mp.meets_on(*day) && window.admits(mp.meeting_time_start, mp.meeting_time_end)
            })
        })
    }

    /// Whether `course` passes every set filter.
    pub fn admits(&self, course: &CourseRecord) -> bool {
        fn eq(want: &Option<String>, have: &Option<String>) -> bool {
            want.as_ref().is_none_or(|w| have.as_deref() == Some(w.as_str()))
        }
        self.term_name
            .as_ref()
            .is_none_or(|t| *t == course.term_name)
            && self.term_year.is_none_or(|y| y == course.term_year)
            && eq(&self.academic_group, &course.academic_group)
            && eq(&self.subject, &course.subject)
            && eq(&self.component, &course.component)
            && self.matches_patterns(&course.course_meeting_patterns)
    }
}
