//! Raw backend rows → canonical, display-ready courses.
//!
//! The normalizer never reorders: output follows executor rank order, minus
//! any records that fail validation.

use crate::model::types::{
    Course, CourseInstructor, CourseMeetingPattern, ScheduleBlock, string_or_number,
};
use crate::search::backend::RawHit;
use crate::search::error::MalformedResult;
use crate::search::registry::CourseRegistry;
use serde::Deserialize;

/// Colors assigned by academic group.
const DEPARTMENT_PALETTE: [&str; 12] = [
    "#e57373", "#f06292", "#ba68c8", "#9575cd", "#7986cb", "#64b5f6", "#4db6ac", "#81c784",
    "#dce775", "#ffd54f", "#ffb74d", "#a1887f",
];
const UNGROUPED_COLOR: &str = "#9e9e9e";

#[derive(Debug, Default)]
pub struct NormalizeReport {
    pub courses: Vec<Course>,
    pub skipped: Vec<MalformedResult>,
}

/// Loosely typed view of a hit record; every field may be absent.
#[derive(Debug, Deserialize)]
struct CourseRow {
    id: Option<i64>,
    external_course_id: Option<i64>,
    term_name: Option<String>,
    term_year: Option<i32>,
    class_section: Option<String>,
    subject: Option<String>,
    subject_description: Option<String>,
    subject_academic_org_description: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    catalog_number: Option<String>,
    title: Option<String>,
    course_description_long: Option<String>,
    units_maximum: Option<f64>,
    academic_group: Option<String>,
    class_academic_org_description: Option<String>,
    component: Option<String>,
    #[serde(default)]
    course_instructors: Vec<CourseInstructor>,
    #[serde(default)]
    course_meeting_patterns: Vec<CourseMeetingPattern>,
}

/// Normalize `hits` in order, upserting every good record into `registry`.
pub fn normalize(hits: Vec<RawHit>, registry: &mut CourseRegistry) -> NormalizeReport {
    let mut report = NormalizeReport {
        courses: Vec::with_capacity(hits.len()),
        skipped: Vec::new(),
    };
    for (position, hit) in hits.into_iter().enumerate() {
        match normalize_hit(hit) {
            Ok(course) => {
                registry.upsert(course.clone());
                report.courses.push(course);
            }
            Err(reason) => {
                tracing::warn!(position, reason = %reason, "record_skipped");
                report.skipped.push(MalformedResult { position, reason });
            }
        }
    }
    report
}

/// Turn a single hit into a course, or explain why it cannot be one.
pub fn normalize_hit(hit: RawHit) -> Result<Course, String> {
    let row: CourseRow =
        serde_json::from_value(hit.record).map_err(|e| format!("undecodable record: {e}"))?;

    let id = row.id.ok_or("missing id")?;
    let external_course_id = row.external_course_id.ok_or("missing external_course_id")?;
    let term_name = row
        .term_name
        .filter(|s| !s.trim().is_empty())
        .ok_or("missing term_name")?;
    let term_year = row.term_year.ok_or("missing term_year")?;
    let class_section = row
        .class_section
        .filter(|s| !s.trim().is_empty())
        .ok_or("missing class_section")?;

    let schedule = build_schedule(&row.course_meeting_patterns);
    let semester = semester_label(&term_name, term_year);
    let department_color = department_color(row.academic_group.as_deref()).to_string();

    Ok(Course {
        id,
        external_course_id,
        term_name,
        term_year,
        class_section,
        subject: row.subject,
        subject_description: row.subject_description,
        subject_academic_org_description: row.subject_academic_org_description,
        catalog_number: row.catalog_number,
        title: row.title,
        course_description_long: row.course_description_long,
        units_maximum: row.units_maximum,
        academic_group: row.academic_group,
        class_academic_org_description: row.class_academic_org_description,
        component: row.component,
        course_instructors: row.course_instructors,
        course_meeting_patterns: row.course_meeting_patterns,
        score: hit.score,
        schedule,
        semester,
        department_color,
    })
}

/// One block per (pattern, meeting day), Monday first, then by start time.
pub fn build_schedule(patterns: &[CourseMeetingPattern]) -> Vec<ScheduleBlock> {
    let mut blocks: Vec<ScheduleBlock> = patterns
        .iter()
        .flat_map(|mp| {
            mp.meeting_days().map(move |day| ScheduleBlock {
                day,
                start_time: mp.meeting_time_start,
                end_time: mp.meeting_time_end,
                facility: mp
                    .facility_description
                    .clone()
                    .or_else(|| mp.external_facility_id.clone()),
            })
        })
        .collect();
    blocks.sort_by_key(|b| (b.day, b.start_time.unwrap_or(u16::MAX)));
    blocks
}

pub fn semester_label(term_name: &str, term_year: i32) -> String {
    format!("{term_name} {term_year}")
}

/// Display-only color, stable for a given academic group.
pub fn department_color(academic_group: Option<&str>) -> &'static str {
    match academic_group.map(str::trim).filter(|g| !g.is_empty()) {
        Some(group) => {
            let idx = crc32fast::hash(group.as_bytes()) as usize % DEPARTMENT_PALETTE.len();
            DEPARTMENT_PALETTE[idx]
        }
        None => UNGROUPED_COLOR,
    }
}
