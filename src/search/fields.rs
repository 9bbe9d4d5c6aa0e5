//! Searchable fields and where they physically live.
//!
//! The mapping from a logical [`FieldTag`] to storage columns is a closed
//! table resolved with a `match`, so adding a field means adding a variant
//! and the compiler points at every place that needs a decision.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical searchable concept a keyword can be applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldTag {
    Title,
    Description,
    Instructor,
    CourseId,
    /// Library reserves. Selectable, but not backed by any column yet.
    Readings,
}

impl FieldTag {
    pub const ALL: [FieldTag; 5] = [
        FieldTag::Title,
        FieldTag::Description,
        FieldTag::Instructor,
        FieldTag::CourseId,
        FieldTag::Readings,
    ];

    /// Fields applied when a keyword does not name any.
    pub const DEFAULTS: [FieldTag; 2] = [FieldTag::Title, FieldTag::Description];

    pub fn display_name(self) -> &'static str {
        match self {
            FieldTag::Title => "Title",
            FieldTag::Description => "Description",
            FieldTag::Instructor => "Instructor",
            FieldTag::CourseId => "Course ID",
            FieldTag::Readings => "Library reserves",
        }
    }

    pub fn is_default(self) -> bool {
        Self::DEFAULTS.contains(&self)
    }

    pub fn mapping(self) -> Option<FieldMapping> {
        field_mapping(self)
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for FieldTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "title" => Ok(FieldTag::Title),
            "description" | "desc" => Ok(FieldTag::Description),
            "instructor" => Ok(FieldTag::Instructor),
            "course_id" | "id" => Ok(FieldTag::CourseId),
            "readings" | "library" => Ok(FieldTag::Readings),
            other => Err(format!("unknown field `{other}`")),
        }
    }
}

/// Entity a searchable column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetEntity {
    Course,
    Instructor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToMany,
}

/// Relation from the course row to a child entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JoinPath {
    pub table: &'static str,
    /// Full-text table indexing the child's searchable columns, if any.
    pub fts_table: Option<&'static str>,
    /// Key on the course side.
    pub parent_key: &'static str,
    /// Foreign key on the child side.
    pub child_key: &'static str,
    pub cardinality: Cardinality,
}

pub const INSTRUCTOR_JOIN: JoinPath = JoinPath {
    table: "course_instructors",
    fts_table: Some("course_instructors_fts"),
    parent_key: "id",
    child_key: "course_id",
    cardinality: Cardinality::OneToMany,
};

pub const COL_TITLE: &str = "title";
pub const COL_DESCRIPTION: &str = "course_description_long";
pub const COL_SUBJECT: &str = "subject";
pub const COL_CATALOG_NUMBER: &str = "catalog_number";
pub const COL_FIRST_NAME: &str = "first_name";
pub const COL_LAST_NAME: &str = "last_name";

/// Columns searched when no keyword scopes itself to a mapped field.
pub const FALLBACK_PRIMARY_COLUMNS: [&str; 2] = [COL_TITLE, COL_DESCRIPTION];

/// Where a field's text physically lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub target: TargetEntity,
    pub columns: &'static [&'static str],
}

impl FieldMapping {
    /// Join path needed to reach the columns, `None` for course columns.
    pub fn join_path(&self) -> Option<JoinPath> {
        join_path_for(self.target)
    }
}

pub fn field_mapping(tag: FieldTag) -> Option<FieldMapping> {
    match tag {
        FieldTag::Title => Some(FieldMapping {
            target: TargetEntity::Course,
            columns: &[COL_TITLE],
        }),
        FieldTag::Description => Some(FieldMapping {
            target: TargetEntity::Course,
            columns: &[COL_DESCRIPTION],
        }),
        FieldTag::CourseId => Some(FieldMapping {
            target: TargetEntity::Course,
            columns: &[COL_SUBJECT, COL_CATALOG_NUMBER],
        }),
        FieldTag::Instructor => Some(FieldMapping {
            target: TargetEntity::Instructor,
            columns: &[COL_FIRST_NAME, COL_LAST_NAME],
        }),
        FieldTag::Readings => None,
    }
}

pub fn join_path_for(entity: TargetEntity) -> Option<JoinPath> {
    match entity {
        TargetEntity::Course => None,
        TargetEntity::Instructor => Some(INSTRUCTOR_JOIN),
    }
}

/// Reverse lookup: the field that owns `column` on `entity`.
pub fn owning_field(entity: TargetEntity, column: &str) -> Option<FieldTag> {
    FieldTag::ALL.into_iter().find(|tag| {
        field_mapping(*tag).is_some_and(|m| m.target == entity && m.columns.contains(&column))
    })
}
