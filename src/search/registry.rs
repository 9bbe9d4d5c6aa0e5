//! Session-scoped store of fetched courses, keyed by identity.

use crate::model::types::{Course, CourseKey};
use fxhash::FxHashMap;

/// Identity-keyed course store.
///
/// Owned by a search session and handed to the normalizer by `&mut`, so a
/// single writer upserts at a time. Entries are overwritten whole, never
/// merged, and never evicted here.
#[derive(Debug, Default, Clone)]
pub struct CourseRegistry {
    courses: FxHashMap<CourseKey, Course>,
}

impl CourseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the previous entry for the identity.
    pub fn upsert(&mut self, course: Course) -> Option<Course> {
        self.courses.insert(course.key(), course)
    }

    pub fn get(&self, key: &CourseKey) -> Option<&Course> {
        self.courses.get(key)
    }

    pub fn contains(&self, key: &CourseKey) -> bool {
        self.courses.contains_key(key)
    }

    /// Courses for `keys` in that order, skipping unknown keys.
    pub fn select<'a>(&'a self, keys: &'a [CourseKey]) -> impl Iterator<Item = &'a Course> + 'a {
        keys.iter().filter_map(|k| self.courses.get(k))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Course> {
        self.courses.values()
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}
