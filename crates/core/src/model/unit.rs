use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, UnitId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors raised while validating unit definitions.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum UnitError {
    #[error("unit title must not be empty")]
    EmptyTitle,

    #[error("invalid unit kind value: {0}")]
    InvalidKind(String),

    #[error("prerequisite minimum score out of range: {0}")]
    InvalidMinScore(f64),

    #[error("release delay must not be negative")]
    NegativeReleaseDelay,
}

//
// ─── UNIT KIND ────────────────────────────────────────────────────────────────
//

/// Kind of content a unit carries.
///
/// Only `Quiz` units are scored; `Passed`/`Failed` events are rejected for
/// every other kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Video,
    Text,
    Quiz,
    Exercise,
}

impl UnitKind {
    /// Stable string form used by persistence.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Video => "video",
            UnitKind::Text => "text",
            UnitKind::Quiz => "quiz",
            UnitKind::Exercise => "exercise",
        }
    }

    /// Parses the stable string form.
    ///
    /// # Errors
    ///
    /// Returns `UnitError::InvalidKind` for unknown values.
    pub fn parse(s: &str) -> Result<Self, UnitError> {
        match s {
            "video" => Ok(UnitKind::Video),
            "text" => Ok(UnitKind::Text),
            "quiz" => Ok(UnitKind::Quiz),
            "exercise" => Ok(UnitKind::Exercise),
            _ => Err(UnitError::InvalidKind(s.to_string())),
        }
    }

    /// Returns true if this unit kind records a score.
    #[must_use]
    pub fn is_scored(self) -> bool {
        matches!(self, UnitKind::Quiz)
    }
}

//
// ─── PREREQUISITE ─────────────────────────────────────────────────────────────
//

/// A gating condition on another unit: it must be completed or passed, and
/// when `min_score` is set, passed with at least that score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prerequisite {
    pub unit_id: UnitId,
    pub min_score: Option<f64>,
}

impl Prerequisite {
    #[must_use]
    pub fn completion_of(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            min_score: None,
        }
    }

    #[must_use]
    pub fn with_min_score(unit_id: UnitId, min_score: f64) -> Self {
        Self {
            unit_id,
            min_score: Some(min_score),
        }
    }
}

//
// ─── UNIT ─────────────────────────────────────────────────────────────────────
//

/// A single gated piece of course content.
///
/// Units are owned by the external catalog source and immutable from the
/// engine's perspective. `position` orders units within a course; values
/// need not be contiguous but must be strictly increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    id: UnitId,
    course_id: CourseId,
    title: String,
    position: u32,
    kind: UnitKind,
    prerequisites: Vec<Prerequisite>,
    release_delay: Option<Duration>,
}

impl Unit {
    /// Create a unit definition.
    ///
    /// # Errors
    ///
    /// Returns `UnitError::EmptyTitle` for a blank title,
    /// `UnitError::InvalidMinScore` if a prerequisite threshold falls outside
    /// `0..=100`, or `UnitError::NegativeReleaseDelay` for a negative delay.
    pub fn new(
        id: UnitId,
        course_id: CourseId,
        title: impl Into<String>,
        position: u32,
        kind: UnitKind,
        prerequisites: Vec<Prerequisite>,
        release_delay: Option<Duration>,
    ) -> Result<Self, UnitError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(UnitError::EmptyTitle);
        }
        for prereq in &prerequisites {
            if let Some(min) = prereq.min_score {
                if !(0.0..=100.0).contains(&min) {
                    return Err(UnitError::InvalidMinScore(min));
                }
            }
        }
        if let Some(delay) = release_delay {
            if delay < Duration::zero() {
                return Err(UnitError::NegativeReleaseDelay);
            }
        }

        Ok(Self {
            id,
            course_id,
            title,
            position,
            kind,
            prerequisites,
            release_delay,
        })
    }

    #[must_use]
    pub fn id(&self) -> UnitId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    #[must_use]
    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    #[must_use]
    pub fn prerequisites(&self) -> &[Prerequisite] {
        &self.prerequisites
    }

    #[must_use]
    pub fn release_delay(&self) -> Option<Duration> {
        self.release_delay
    }
}

//
// ─── TESTS ────────────────────────────────────────────────────────────────────
//
