//! Normalized course entity structs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite natural key of a course offering.
///
/// Two rows describe the same offering when the external catalog id, the
/// term, and the section all agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CourseKey {
    pub external_course_id: i64,
    pub term_name: String,
    pub term_year: i32,
    pub class_section: String,
}

impl CourseKey {
    pub fn new(
        external_course_id: i64,
        term_name: impl Into<String>,
        term_year: i32,
        class_section: impl Into<String>,
    ) -> Self {
        Self {
            external_course_id,
            term_name: term_name.into(),
            term_year,
            class_section: class_section.into(),
        }
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.external_course_id, self.term_name, self.term_year, self.class_section
        )
    }
}

impl std::str::FromStr for CourseKey {
    type Err = String;

    /// Parses `EXTERNAL_ID:TERM:YEAR:SECTION`, e.g. `1042:Fall:2026:001`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let [ext, term, year, section] = parts.as_slice() else {
            return Err(format!("expected EXTERNAL_ID:TERM:YEAR:SECTION, got `{s}`"));
        };
        let external_course_id = ext
            .parse::<i64>()
            .map_err(|_| format!("invalid external course id `{ext}`"))?;
        let term_year = year
            .parse::<i32>()
            .map_err(|_| format!("invalid term year `{year}`"))?;
        if term.is_empty() || section.is_empty() {
            return Err(format!("term and section must be non-empty in `{s}`"));
        }
        Ok(Self::new(external_course_id, *term, term_year, *section))
    }
}

/// Day of week, Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
            Weekday::Sunday => "sunday",
        }
    }

    pub fn short(self) -> &'static str {
        match self {
            Weekday::Monday => "Mon",
            Weekday::Tuesday => "Tue",
            Weekday::Wednesday => "Wed",
            Weekday::Thursday => "Thu",
            Weekday::Friday => "Fri",
            Weekday::Saturday => "Sat",
            Weekday::Sunday => "Sun",
        }
    }

    /// Storage column holding this day's meeting flag.
    pub fn meets_column(self) -> &'static str {
        match self {
            Weekday::Monday => "meets_on_monday",
            Weekday::Tuesday => "meets_on_tuesday",
            Weekday::Wednesday => "meets_on_wednesday",
            Weekday::Thursday => "meets_on_thursday",
            Weekday::Friday => "meets_on_friday",
            Weekday::Saturday => "meets_on_saturday",
            Weekday::Sunday => "meets_on_sunday",
        }
    }
}

impl std::str::FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Weekday::ALL
            .into_iter()
            .find(|d| d.as_str() == lower || d.short().eq_ignore_ascii_case(&lower))
            .ok_or_else(|| format!("unknown weekday `{s}`"))
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

/// One meeting pattern row of a course (a recurring weekly slot).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CourseMeetingPattern {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub class_meeting_number: Option<String>,
    #[serde(default)]
    pub meets_on_monday: bool,
    #[serde(default)]
    pub meets_on_tuesday: bool,
    #[serde(default)]
    pub meets_on_wednesday: bool,
    #[serde(default)]
    pub meets_on_thursday: bool,
    #[serde(default)]
    pub meets_on_friday: bool,
    #[serde(default)]
    pub meets_on_saturday: bool,
    #[serde(default)]
    pub meets_on_sunday: bool,
    /// Minutes after midnight.
    #[serde(default)]
    pub meeting_time_start: Option<u16>,
    /// Minutes after midnight.
    #[serde(default)]
    pub meeting_time_end: Option<u16>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub external_facility_id: Option<String>,
    #[serde(default)]
    pub facility_description: Option<String>,
}

impl CourseMeetingPattern {
    pub fn meets_on(&self, day: Weekday) -> bool {
        match day {
            Weekday::Monday => self.meets_on_monday,
            Weekday::Tuesday => self.meets_on_tuesday,
            Weekday::Wednesday => self.meets_on_wednesday,
            Weekday::Thursday => self.meets_on_thursday,
            Weekday::Friday => self.meets_on_friday,
            Weekday::Saturday => self.meets_on_saturday,
            Weekday::Sunday => self.meets_on_sunday,
        }
    }

    pub fn meeting_days(&self) -> impl Iterator<Item = Weekday> + '_ {
        Weekday::ALL.into_iter().filter(|d| self.meets_on(*d))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CourseInstructor {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl CourseInstructor {
    /// Display name, falling back to "First Last".
    pub fn label(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|s| !s.is_empty()) {
            return name.to_string();
        }
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A single display block of a combined schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub day: Weekday,
    pub start_time: Option<u16>,
    pub end_time: Option<u16>,
    pub facility: Option<String>,
}

impl fmt::Display for ScheduleBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.day)?;
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => write!(f, " {}-{}", clock(start), clock(end))?,
            (Some(start), None) => write!(f, " {}", clock(start))?,
            _ => f.write_str(" TBA")?,
        }
        if let Some(facility) = &self.facility {
            write!(f, " @ {facility}")?;
        }
        Ok(())
    }
}

/// Format minutes after midnight as `HH:MM`.
pub fn clock(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// A course offering as stored and imported: catalog attributes plus its
/// child rows. Row ids are assigned by storage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CourseRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub external_course_id: i64,
    pub term_name: String,
    pub term_year: i32,
    pub class_section: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub subject_description: Option<String>,
    #[serde(default)]
    pub subject_academic_org_description: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub catalog_number: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub course_description_long: Option<String>,
    #[serde(default)]
    pub units_maximum: Option<f64>,
    #[serde(default)]
    pub academic_group: Option<String>,
    #[serde(default)]
    pub class_academic_org_description: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub course_instructors: Vec<CourseInstructor>,
    #[serde(default)]
    pub course_meeting_patterns: Vec<CourseMeetingPattern>,
}

impl CourseRecord {
    pub fn key(&self) -> CourseKey {
        CourseKey::new(
            self.external_course_id,
            self.term_name.clone(),
            self.term_year,
            self.class_section.clone(),
        )
    }
}

/// Catalog numbers show up both as `"101A"` and as bare `101`.
pub(crate) fn string_or_number<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(d)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Canonical course record produced by the result normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub external_course_id: i64,
    pub term_name: String,
    pub term_year: i32,
    pub class_section: String,
    pub subject: Option<String>,
    pub subject_description: Option<String>,
    pub subject_academic_org_description: Option<String>,
    pub catalog_number: Option<String>,
    pub title: Option<String>,
    pub course_description_long: Option<String>,
    pub units_maximum: Option<f64>,
    pub academic_group: Option<String>,
    pub class_academic_org_description: Option<String>,
    pub component: Option<String>,
    pub course_instructors: Vec<CourseInstructor>,
    pub course_meeting_patterns: Vec<CourseMeetingPattern>,
    /// Relevance from the backend; absent for identity lookups.
    pub score: Option<f64>,
    pub schedule: Vec<ScheduleBlock>,
    pub semester: String,
    pub department_color: String,
}

impl Course {
    pub fn key(&self) -> CourseKey {
        CourseKey::new(
            self.external_course_id,
            self.term_name.clone(),
            self.term_year,
            self.class_section.clone(),
        )
    }

    /// "SUBJ 101" style label.
    pub fn subject_and_catalog(&self) -> String {
        match (self.subject.as_deref(), self.catalog_number.as_deref()) {
            (Some(s), Some(n)) => format!("{s} {n}"),
            (Some(s), None) => s.to_string(),
            (None, Some(n)) => n.to_string(),
            (None, None) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_key_parses_and_displays() {
        let key: CourseKey = "1042:Fall:2026:001".parse().unwrap();
        assert_eq!(key, CourseKey::new(1042, "Fall", 2026, "001"));
        assert_eq!(key.to_string(), "1042:Fall:2026:001");
    }

    #[test]
    fn course_key_rejects_bad_shapes() {
        assert!("1042:Fall:2026".parse::<CourseKey>().is_err());
        assert!("abc:Fall:2026:001".parse::<CourseKey>().is_err());
        assert!("1:Fall:year:001".parse::<CourseKey>().is_err());
        assert!("1::2026:001".parse::<CourseKey>().is_err());
    }

    #[test]
    fn weekday_parses_long_and_short_names() {
        assert_eq!("Monday".parse::<Weekday>().unwrap(), Weekday::Monday);
        assert_eq!("thu".parse::<Weekday>().unwrap(), Weekday::Thursday);
        assert!("someday".parse::<Weekday>().is_err());
    }

    #[test]
    fn meeting_days_follow_flags() {
        let mp = CourseMeetingPattern {
            meets_on_tuesday: true,
            meets_on_thursday: true,
            ..Default::default()
        };
        let days: Vec<_> = mp.meeting_days().collect();
        assert_eq!(days, vec![Weekday::Tuesday, Weekday::Thursday]);
    }

    #[test]
    fn instructor_label_prefers_display_name() {
        let named = CourseInstructor {
            first_name: Some("Ada".into()),
            last_name: Some("Smith".into()),
            display_name: Some("Dr. A. Smith".into()),
            ..Default::default()
        };
        assert_eq!(named.label(), "Dr. A. Smith");

        let plain = CourseInstructor {
            first_name: Some("Ada".into()),
            last_name: Some("Smith".into()),
            ..Default::default()
        };
        assert_eq!(plain.label(), "Ada Smith");
    }

    #[test]
    fn schedule_block_display() {
        let block = ScheduleBlock {
            day: Weekday::Wednesday,
            start_time: Some(9 * 60 + 30),
            end_time: Some(10 * 60 + 45),
            facility: Some("Hall 2".into()),
        };
        assert_eq!(block.to_string(), "Wed 09:30-10:45 @ Hall 2");

        let tba = ScheduleBlock {
            day: Weekday::Friday,
            start_time: None,
            end_time: None,
            facility: None,
        };
        assert_eq!(tba.to_string(), "Fri TBA");
    }
}
