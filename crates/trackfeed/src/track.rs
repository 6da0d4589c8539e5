//! Core track types for trackfeed.
//!
//! This module defines the records kept by the track store and the explicit
//! field whitelist used to answer single-field lookups.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identifier assigned to a track at insertion.
pub type TrackId = i64;

/// Track metadata extracted from a flight-recorder file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTrack {
    /// Pilot in charge.
    pub pilot: String,
    /// Glider model.
    pub glider: String,
    /// Glider registration or competition id.
    pub glider_id: String,
    /// Flight date from the file header, if present.
    pub date: Option<NaiveDate>,
    /// Length of the recorded path in kilometres.
    pub distance: f64,
}

/// A track submitted for insertion, before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrack {
    /// Where the track was fetched from.
    pub source_url: String,
    /// Deduplication key derived from the source URL.
    pub source_key: String,
    /// The parsed metadata.
    pub parsed: ParsedTrack,
}

impl NewTrack {
    /// Build a submission for a track fetched from `source_url`.
    #[must_use]
    pub fn new(source_url: impl Into<String>, parsed: ParsedTrack) -> Self {
        let source_url = source_url.into();
        let source_key = Self::compute_source_key(&source_url);
        Self {
            source_url,
            source_key,
            parsed,
        }
    }

    /// Compute the dedup key for a source URL.
    ///
    /// Surrounding whitespace is ignored, so the same URL pasted twice with a
    /// trailing newline is still recognised as a resubmission.
    #[must_use]
    pub fn compute_source_key(source_url: &str) -> String {
        blake3::hash(source_url.trim().as_bytes())
            .to_hex()
            .to_string()
    }
}

/// A stored track. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Unique, monotonically assigned id.
    pub id: TrackId,
    /// Unique deduplication key.
    pub source_key: String,
    /// Where the track was fetched from.
    pub source_url: String,
    /// Pilot in charge.
    pub pilot: String,
    /// Glider model.
    pub glider: String,
    /// Glider registration or competition id.
    pub glider_id: String,
    /// Length of the recorded path in kilometres.
    pub distance: f64,
    /// Flight date, if the file carried one.
    pub date: Option<NaiveDate>,
    /// Milliseconds since the Unix epoch at which the store accepted the track.
    pub arrival_timestamp: i64,
}

impl TrackRecord {
    /// Look up a single whitelisted field as text.
    ///
    /// Returns `None` for optional fields that are not set.
    #[must_use]
    pub fn field(&self, field: TrackField) -> Option<String> {
        match field {
            TrackField::Pilot => Some(self.pilot.clone()),
            TrackField::Glider => Some(self.glider.clone()),
            TrackField::GliderId => Some(self.glider_id.clone()),
            TrackField::TrackLength => Some(self.distance.to_string()),
            TrackField::Date => self.date.map(|d| d.to_string()),
            TrackField::SourceUrl => Some(self.source_url.clone()),
        }
    }
}

/// Fields that can be requested individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackField {
    /// `pilot`
    Pilot,
    /// `glider`
    Glider,
    /// `glider_id`
    GliderId,
    /// `track_length`
    TrackLength,
    /// `H_date`
    Date,
    /// `track_src_url`
    SourceUrl,
}

impl TrackField {
    /// All fields in the order they appear in the JSON representation.
    pub const ALL: [TrackField; 6] = [
        Self::Date,
        Self::Pilot,
        Self::Glider,
        Self::GliderId,
        Self::TrackLength,
        Self::SourceUrl,
    ];

    /// The public name of the field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pilot => "pilot",
            Self::Glider => "glider",
            Self::GliderId => "glider_id",
            Self::TrackLength => "track_length",
            Self::Date => "H_date",
            Self::SourceUrl => "track_src_url",
        }
    }
}

impl fmt::Display for TrackField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| Error::not_found(format!("field '{s}'")))
    }
}

/// Result of adding a track to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The track was stored under a new id.
    Inserted(TrackId),
    /// A track with the same source key already exists under this id.
    Duplicate(TrackId),
}

impl AddOutcome {
    /// The id of the stored track, new or existing.
    #[must_use]
    pub fn id(&self) -> TrackId {
        match *self {
            Self::Inserted(id) | Self::Duplicate(id) => id,
        }
    }

    /// Whether the call inserted a new record.
    #[must_use]
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

#[cfg(test)]
pub(crate) fn sample_track(url: &str) -> NewTrack {
    NewTrack::new(
        url,
        ParsedTrack {
            pilot: "Miguel Angel Gordillo".to_string(),
            glider: "RV8".to_string(),
            glider_id: "EC-XLL".to_string(),
            date: NaiveDate::from_ymd_opt(2016, 2, 19),
            distance: 443.28,
        },
    )
}
