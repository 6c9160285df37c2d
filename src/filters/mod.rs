//! Structured track filters.
//!
//! A [`FilterCriteria`] is sparse: every field left empty or `None` imposes no
//! constraint. The builder turns it into one parameterized `WHERE` clause.

mod query;

pub use query::{FilterQuery, Predicate};

use serde::{Deserialize, Serialize};

/// Inclusive range; either bound may be open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<T>,
}

impl<T: Copy> Range<T> {
    pub fn between(min: T, max: T) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(min: T) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: T) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn is_open(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    /// Matches either the track artist or the album artist.
    pub artists: Vec<String>,
    pub albums: Vec<String>,
    pub genres: Vec<String>,
    pub years: Option<Range<i32>>,
    /// Seconds.
    pub duration: Option<Range<i64>>,
    /// Kilobits per second.
    pub bitrate: Option<Range<i64>>,
    /// Lowercase extensions.
    pub formats: Vec<String>,
    pub play_count: Option<Range<i64>>,
    /// Milliseconds since the epoch.
    pub date_added: Option<Range<i64>>,
    pub has_lyrics: Option<bool>,
    pub has_artwork: Option<bool>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        FilterQuery::build(self).predicates.is_empty()
    }
}
