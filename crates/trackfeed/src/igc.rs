//! Minimal IGC flight-recorder file reader.
//!
//! Only the parts needed for track metadata are read: the `H` header records
//! for pilot, glider, glider id and flight date, and the `B` fix records whose
//! positions are summed into the track length. Everything else is ignored.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::track::ParsedTrack;

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^H[FOP](?P<code>[A-Z]{3})(?:[A-Za-z ]*:)?(?P<value>.*)$")
        .expect("Invalid header regex")
});

static FIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^B(\d{6})(\d{2})(\d{5})([NS])(\d{3})(\d{5})([EW])")
        .expect("Invalid fix regex")
});

/// A position fix in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Fix {
    lat: f64,
    lon: f64,
}

/// Parse the text of an IGC file.
///
/// # Errors
///
/// Returns [`Error::TrackParse`] if the content does not start with an `A`
/// record or contains no `B` fixes.
pub fn parse(content: &str) -> Result<ParsedTrack> {
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

    match lines.next() {
        Some(first) if first.starts_with('A') => {}
        _ => return Err(Error::track_parse("missing A record; not an IGC file")),
    }

    let mut track = ParsedTrack {
        pilot: String::new(),
        glider: String::new(),
        glider_id: String::new(),
        date: None,
        distance: 0.0,
    };
    let mut previous: Option<Fix> = None;
    let mut fixes = 0usize;

    for line in lines {
        if let Some(caps) = HEADER_RE.captures(line) {
            let value = caps["value"].trim();
            match &caps["code"] {
                "PLT" => track.pilot = value.to_string(),
                "GTY" => track.glider = value.to_string(),
                "GID" => track.glider_id = value.to_string(),
                "DTE" => track.date = parse_date(value),
                _ => {}
            }
        } else if let Some(fix) = parse_fix(line) {
            if let Some(prev) = previous {
                track.distance += haversine_km(prev, fix);
            }
            previous = Some(fix);
            fixes += 1;
        }
    }

    if fixes == 0 {
        return Err(Error::track_parse("no B fix records"));
    }

    debug!(
        "Parsed IGC track: {} fixes, {:.2} km",
        fixes, track.distance
    );
    Ok(track)
}

/// Parse a `DDMMYY` header date. Two-digit years below 80 are 20xx.
fn parse_date(value: &str) -> Option<NaiveDate> {
    let digits: String = value.chars().filter(char::is_ascii_digit).take(6).collect();
    if digits.len() != 6 {
        return None;
    }
    let day: u32 = digits[0..2].parse().ok()?;
    let month: u32 = digits[2..4].parse().ok()?;
    let yy: i32 = digits[4..6].parse().ok()?;
    let year = if yy < 80 { 2000 + yy } else { 1900 + yy };

    let date = NaiveDate::from_ymd_opt(year, month, day);
    if date.is_none() {
        debug!("Ignoring invalid header date: {}", value);
    }
    date
}

fn parse_fix(line: &str) -> Option<Fix> {
    let caps = FIX_RE.captures(line)?;
    let lat = to_degrees(&caps[2], &caps[3])?;
    let lon = to_degrees(&caps[5], &caps[6])?;
    Some(Fix {
        lat: if &caps[4] == "S" { -lat } else { lat },
        lon: if &caps[7] == "W" { -lon } else { lon },
    })
}

/// Degrees plus thousandths of minutes (`MMmmm`) to decimal degrees.
fn to_degrees(degrees: &str, milli_minutes: &str) -> Option<f64> {
    let degrees: f64 = degrees.parse().ok()?;
    let milli_minutes: f64 = milli_minutes.parse().ok()?;
    Some(degrees + milli_minutes / 1000.0 / 60.0)
}

fn haversine_km(a: Fix, b: Fix) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
pub(crate) const SAMPLE_IGC: &str = "AXXXABC FLIGHT:1
HFDTE190216
HFPLTPILOTINCHARGE:Miguel Angel Gordillo
HFGTYGLIDERTYPE:RV8
HFGIDGLIDERID:EC-XLL
HFFTYFRTYPE:Test Recorder
B1101355206343N00006198WA0058700558
B1102355207343N00006198WA0059300556
B1103355208343N00006198WA0060000560
";
