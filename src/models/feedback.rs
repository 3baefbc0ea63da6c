//! Feedback record model and submission validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::RatingBounds;
use crate::{AppError, Result};

/// Whether `key` names a rating field (`rating`, `rating1`, `rating2`, …).
#[must_use]
pub fn is_rating_key(key: &str) -> bool {
    key.strip_prefix("rating")
        .is_some_and(|suffix| suffix.bytes().all(|b| b.is_ascii_digit()))
}

/// One persisted session outcome.
///
/// Known keys are typed; everything else (ratings, legacy keys such as
/// `timestamp`, `study_data` or camelCase `startTime`) lives in `fields` so a
/// read-rewrite cycle never drops or renames data. Client camelCase names are
/// accepted only on the request bodies below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    /// Session key this record belongs to; absent on legacy records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Client-reported study start time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Value>,
    /// Client-reported study end time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Value>,
    /// Number of questions the participant answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions_answered: Option<u64>,
    /// Whether the participant reached the end of the study.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    /// Network origin of the submitting client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    /// Region hint supplied by the edge proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Interaction events recorded by the external program, in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction: Option<Vec<Value>>,
    /// Server-assigned completion timestamp (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_time: Option<String>,
    /// Ratings and any other keys, kept verbatim.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl FeedbackRecord {
    /// Build a record from a parsed JSON object without losing any key.
    ///
    /// Objects whose known keys carry unexpected types are kept as a plain
    /// bag of fields instead of being rejected.
    #[must_use]
    pub fn from_object(object: Map<String, Value>) -> Self {
        match serde_json::from_value::<Self>(Value::Object(object.clone())) {
            Ok(record) => record,
            Err(_) => Self {
                fields: object,
                ..Self::default()
            },
        }
    }

    /// Empty record tagged with a session key.
    #[must_use]
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    /// Rating values keyed by field name.
    #[must_use]
    pub fn ratings(&self) -> BTreeMap<String, i64> {
        self.fields
            .iter()
            .filter(|(key, _)| is_rating_key(key))
            .filter_map(|(key, value)| value.as_i64().map(|v| (key.clone(), v)))
            .collect()
    }

    /// Insert or replace a rating value.
    pub fn set_rating(&mut self, key: impl Into<String>, value: i64) {
        self.fields.insert(key.into(), Value::from(value));
    }

    /// A record is open until it carries both a rating and a start time.
    #[must_use]
    pub fn is_open(&self) -> bool {
        let has_rating = self.fields.keys().any(|key| is_rating_key(key));
        let has_start = self.start_time.as_ref().is_some_and(|v| !v.is_null());
        !(has_rating && has_start)
    }

    /// Whether this record belongs to `session_id`.
    #[must_use]
    pub fn belongs_to(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }

    /// Fold `other` into `self`.
    ///
    /// Present scalar fields in `other` win, extra fields are overlaid, and
    /// interaction events are appended after the existing ones.
    pub fn merge_from(&mut self, other: Self) {
        let Self {
            session_id,
            start_time,
            end_time,
            questions_answered,
            completed,
            client_ip,
            region,
            interaction,
            submission_time,
            fields,
        } = other;

        overlay(&mut self.session_id, session_id);
        overlay(&mut self.start_time, start_time);
        overlay(&mut self.end_time, end_time);
        overlay(&mut self.questions_answered, questions_answered);
        overlay(&mut self.completed, completed);
        overlay(&mut self.client_ip, client_ip);
        overlay(&mut self.region, region);
        overlay(&mut self.submission_time, submission_time);

        if let Some(events) = interaction {
            self.interaction.get_or_insert_with(Vec::new).extend(events);
        }

        self.fields.extend(fields);
    }
}

fn overlay<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

/// Network origin of a submitting client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOrigin {
    /// Client address (forwarded-for or socket peer).
    pub ip: Option<String>,
    /// Region hint from the configured header.
    pub region: Option<String>,
}

/// Body of a study completion call.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionSubmission {
    /// Session key.
    pub session_id: String,
    /// Client-reported start time.
    #[serde(default, alias = "startTime")]
    pub start_time: Option<Value>,
    /// Client-reported end time.
    #[serde(default, alias = "endTime")]
    pub end_time: Option<Value>,
    /// Number of questions answered.
    #[serde(default, alias = "questionsAnswered")]
    pub questions_answered: Option<u64>,
    /// Whether the study was completed.
    #[serde(default)]
    pub completed: Option<bool>,
}

impl CompletionSubmission {
    /// Partial record carrying the timing fields.
    #[must_use]
    pub fn into_record(self) -> FeedbackRecord {
        FeedbackRecord {
            start_time: self.start_time.filter(|v| !v.is_null()),
            end_time: self.end_time.filter(|v| !v.is_null()),
            questions_answered: self.questions_answered,
            completed: self.completed,
            ..FeedbackRecord::for_session(self.session_id)
        }
    }
}

/// Body of a feedback submission.
///
/// Rating keys arrive as top-level `rating`, `rating1`, `rating2`, … and are
/// collected from `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackSubmission {
    /// Session key.
    pub session_id: String,
    /// Client-side timestamp, stored verbatim.
    #[serde(default)]
    pub timestamp: Option<Value>,
    /// Opaque study payload, stored verbatim.
    #[serde(default, alias = "studyData")]
    pub study_data: Option<Value>,
    /// Remaining keys, including ratings.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FeedbackSubmission {
    /// Validate every rating key and return the ratings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when no rating is present, a rating is
    /// not an integer, or a rating lies outside `bounds`.
    pub fn validated_ratings(&self, bounds: RatingBounds) -> Result<BTreeMap<String, i64>> {
        let mut ratings = BTreeMap::new();
        for (key, value) in self.extra.iter().filter(|(key, _)| is_rating_key(key)) {
            let rating = rating_value(value).ok_or_else(|| {
                AppError::Validation(format!("{key} must be an integer, got {value}"))
            })?;
            if !bounds.contains(rating) {
                return Err(AppError::Validation(format!(
                    "{key} must be between {} and {}, got {rating}",
                    bounds.min, bounds.max
                )));
            }
            ratings.insert(key.clone(), rating);
        }

        if ratings.is_empty() {
            return Err(AppError::Validation("at least one rating is required".into()));
        }
        Ok(ratings)
    }

    /// Validate and convert into a partial record stamped with server-side metadata.
    ///
    /// # Errors
    ///
    /// Propagates the rating validation failure; nothing is built on error.
    pub fn into_record(
        self,
        bounds: RatingBounds,
        origin: ClientOrigin,
        submitted_at: String,
    ) -> Result<FeedbackRecord> {
        let ratings = self.validated_ratings(bounds)?;
        let mut record = FeedbackRecord {
            client_ip: origin.ip,
            region: origin.region,
            submission_time: Some(submitted_at),
            ..FeedbackRecord::for_session(self.session_id)
        };
        for (key, value) in ratings {
            record.set_rating(key, value);
        }
        if let Some(timestamp) = self.timestamp {
            record.fields.insert("timestamp".into(), timestamp);
        }
        if let Some(study_data) = self.study_data {
            record.fields.insert("study_data".into(), study_data);
        }
        Ok(record)
    }
}

/// Accept integer JSON numbers and strings holding an integer.
fn rating_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
