use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LearnerId, UnitId};
use crate::model::unit::UnitKind;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors raised while applying a progress event to an item row.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("scored event requires a score in its payload")]
    MissingScore,

    #[error("score out of range: {0}")]
    ScoreOutOfRange(f64),

    #[error("scored event submitted for a {0:?} unit")]
    NotScorable(UnitKind),

    #[error("continuous progress value out of range: {0}")]
    ProgressOutOfRange(f64),

    #[error("invalid item status value: {0}")]
    InvalidStatus(String),
}

//
// ─── ITEM STATUS ──────────────────────────────────────────────────────────────
//

/// Completion state of a learner on a single unit.
///
/// Transitions are monotonic in completion strength, with one deliberate
/// exception: `Passed` and `Failed` may replace each other on a fresh scored
/// attempt (unlimited-retries model, latest attempt authoritative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    NotStarted,
    InProgress,
    Completed,
    Passed,
    Failed,
}

impl ItemStatus {
    /// Stable string form used by persistence.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::NotStarted => "not_started",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Completed => "completed",
            ItemStatus::Passed => "passed",
            ItemStatus::Failed => "failed",
        }
    }

    /// Parses the stable string form.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidStatus` for unknown values.
    pub fn parse(s: &str) -> Result<Self, ProgressError> {
        match s {
            "not_started" => Ok(ItemStatus::NotStarted),
            "in_progress" => Ok(ItemStatus::InProgress),
            "completed" => Ok(ItemStatus::Completed),
            "passed" => Ok(ItemStatus::Passed),
            "failed" => Ok(ItemStatus::Failed),
            _ => Err(ProgressError::InvalidStatus(s.to_string())),
        }
    }

    /// Returns true if this status counts toward course completion.
    ///
    /// `Failed` and `InProgress` do not count.
    #[must_use]
    pub fn counts_as_complete(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Passed)
    }
}

//
// ─── EVENTS ───────────────────────────────────────────────────────────────────
//

/// Discrete progress events accepted by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    Progress,
    Complete,
    Passed,
    Failed,
}

/// Optional data carried by a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EventPayload {
    /// Seconds spent on the unit since the last event.
    pub time_spent_sec: Option<u32>,
    /// Continuous progress within the unit, 0–100.
    pub progress: Option<f64>,
    /// Attempt score, 0–100. Required for `Passed`/`Failed`.
    pub score: Option<f64>,
}

impl EventPayload {
    #[must_use]
    pub fn score(score: f64) -> Self {
        Self {
            score: Some(score),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn time_spent(seconds: u32) -> Self {
        Self {
            time_spent_sec: Some(seconds),
            ..Self::default()
        }
    }
}

//
// ─── ITEM PROGRESS ────────────────────────────────────────────────────────────
//

/// Per-learner, per-unit progress row, keyed by `(learner_id, unit_id)`.
///
/// `revision` increments on every applied change and backs the storage
/// layer's compare-and-swap upsert, serializing concurrent writers per key.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemProgress {
    learner_id: LearnerId,
    unit_id: UnitId,
    course_id: CourseId,
    status: ItemStatus,
    score: Option<f64>,
    time_spent_sec: u32,
    revision: u32,
    updated_at: DateTime<Utc>,
}

impl ItemProgress {
    /// A row that has not yet seen any event.
    #[must_use]
    pub fn fresh(
        learner_id: LearnerId,
        unit_id: UnitId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            learner_id,
            unit_id,
            course_id,
            status: ItemStatus::NotStarted,
            score: None,
            time_spent_sec: 0,
            revision: 0,
            updated_at: now,
        }
    }

    /// Rehydrate a row from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::ScoreOutOfRange` if the stored score is not
    /// within `0..=100`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        learner_id: LearnerId,
        unit_id: UnitId,
        course_id: CourseId,
        status: ItemStatus,
        score: Option<f64>,
        time_spent_sec: u32,
        revision: u32,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if let Some(s) = score {
            if !(0.0..=100.0).contains(&s) {
                return Err(ProgressError::ScoreOutOfRange(s));
            }
        }
        Ok(Self {
            learner_id,
            unit_id,
            course_id,
            status,
            score,
            time_spent_sec,
            revision,
            updated_at,
        })
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn status(&self) -> ItemStatus {
        self.status
    }

    #[must_use]
    pub fn score(&self) -> Option<f64> {
        self.score
    }

    #[must_use]
    pub fn time_spent_sec(&self) -> u32 {
        self.time_spent_sec
    }

    #[must_use]
    pub fn revision(&self) -> u32 {
        self.revision
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Apply a single event according to the transition rules.
    ///
    /// Returns `true` if the row changed. `Start` on an already-started row
    /// is a no-op so that re-opening a unit never erases prior completion,
    /// and `Complete` never downgrades a `Passed` quiz.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` for malformed payloads; the row is left
    /// untouched in that case.
    pub fn apply_event(
        &mut self,
        kind: EventKind,
        payload: &EventPayload,
        unit_kind: UnitKind,
        now: DateTime<Utc>,
    ) -> Result<bool, ProgressError> {
        if let Some(p) = payload.progress {
            if !(0.0..=100.0).contains(&p) {
                return Err(ProgressError::ProgressOutOfRange(p));
            }
        }

        match kind {
            EventKind::Start => {
                if self.status != ItemStatus::NotStarted {
                    return Ok(false);
                }
                self.status = ItemStatus::InProgress;
                self.touch(now);
                Ok(true)
            }
            EventKind::Progress => {
                if self.status == ItemStatus::NotStarted {
                    self.status = ItemStatus::InProgress;
                }
                if let Some(sec) = payload.time_spent_sec {
                    self.time_spent_sec = self.time_spent_sec.saturating_add(sec);
                }
                self.touch(now);
                Ok(true)
            }
            EventKind::Complete => {
                if self.status == ItemStatus::Passed {
                    return Ok(false);
                }
                self.status = ItemStatus::Completed;
                self.touch(now);
                Ok(true)
            }
            EventKind::Passed | EventKind::Failed => {
                if !unit_kind.is_scored() {
                    return Err(ProgressError::NotScorable(unit_kind));
                }
                let score = payload.score.ok_or(ProgressError::MissingScore)?;
                if !(0.0..=100.0).contains(&score) {
                    return Err(ProgressError::ScoreOutOfRange(score));
                }
                // Latest attempt is authoritative; Passed -> Failed is an
                // allowed regression on retry.
                self.status = if kind == EventKind::Passed {
                    ItemStatus::Passed
                } else {
                    ItemStatus::Failed
                };
                self.score = Some(score);
                if let Some(sec) = payload.time_spent_sec {
                    self.time_spent_sec = self.time_spent_sec.saturating_add(sec);
                }
                self.touch(now);
                Ok(true)
            }
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.revision += 1;
    }
}

//
// ─── TESTS ────────────────────────────────────────────────────────────────────
//
