//! Deterministic L1 gate: schema, volume and freshness checks over raw
//! ingested records. No I/O, no external calls.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value as JsonValue};

use crate::types::{L1Report, Status};

pub const REQUIRED_FIELDS: [&str; 3] = ["image_url", "caption", "source_id"];

const TIMESTAMP_FIELDS: [&str; 5] = [
    "captured_at",
    "created_at",
    "updated_at",
    "timestamp",
    "event_time",
];

/// Sentinel for "no record carried a parseable timestamp".
pub const FRESHNESS_UNKNOWN: i64 = -1;

pub fn validate(records: &[JsonValue], expected_count: usize) -> L1Report {
    let actual_count = records.len();

    let mut missing: BTreeSet<&str> = BTreeSet::new();
    for record in records {
        for field in REQUIRED_FIELDS {
            if record.get(field).is_none() {
                missing.insert(field);
            }
        }
    }
    let schema_passed = missing.is_empty();

    let freshness_delay_sec = freshness_delay(records);

    let caption_len_sum: usize = records
        .iter()
        .filter_map(|r| r.get("caption").and_then(JsonValue::as_str))
        .map(|c| c.chars().count())
        .sum();
    let avg_caption_len = if actual_count == 0 {
        0.0
    } else {
        caption_len_sum as f64 / actual_count as f64
    };

    let l1_status = if schema_passed && actual_count >= expected_count {
        Status::Pass
    } else {
        Status::Block
    };

    let mut details: HashMap<String, JsonValue> = HashMap::new();
    details.insert("avg_caption_len".into(), json!(avg_caption_len));
    details.insert(
        "freshness_known".into(),
        json!(freshness_delay_sec >= 0),
    );
    if !schema_passed {
        details.insert(
            "missing_fields".into(),
            json!(missing.into_iter().collect::<Vec<_>>()),
        );
    }

    L1Report {
        schema_passed,
        volume_actual: actual_count as i64,
        volume_expected: expected_count as i64,
        freshness_delay_sec,
        l1_status,
        details,
    }
}

/// Non-negative seconds between now and the single newest timestamp found
/// across all records and all recognized fields, or `FRESHNESS_UNKNOWN`.
fn freshness_delay(records: &[JsonValue]) -> i64 {
    let mut latest: Option<DateTime<Utc>> = None;
    for record in records {
        for field in TIMESTAMP_FIELDS {
            let Some(parsed) = record.get(field).and_then(parse_timestamp) else {
                continue;
            };
            if latest.map_or(true, |cur| parsed > cur) {
                latest = Some(parsed);
            }
        }
    }

    match latest {
        Some(ts) => (Utc::now() - ts).num_seconds().max(0),
        None => FRESHNESS_UNKNOWN,
    }
}

/// Epoch seconds or ISO-8601; a trailing "Z" is normalized to an explicit
/// UTC offset and naive datetimes are treated as UTC. T- and
/// space-separated datetimes and bare dates are all accepted.
fn parse_timestamp(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() {
                return None;
            }
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9) as u32;
            DateTime::from_timestamp(whole, nanos)
        }
        JsonValue::String(s) => {
            let candidate = s.trim();
            let normalized = match candidate.strip_suffix('Z') {
                Some(prefix) => format!("{prefix}+00:00"),
                None => candidate.to_string(),
            };
            if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
                return Some(dt.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(candidate, format) {
                    return Some(naive.and_utc());
                }
            }
            NaiveDate::parse_from_str(candidate, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(caption: &str) -> JsonValue {
        json!({
            "image_url": "https://example.com/img.jpg",
            "caption": caption,
            "source_id": "cam_01",
        })
    }

    #[test]
    fn test_schema_fails_when_any_record_misses_a_field() {
        let records = vec![record("ok"), json!({"caption": "no image", "source_id": "s"})];
        let report = validate(&records, 1);

        assert!(!report.schema_passed);
        assert_eq!(report.l1_status, Status::Block);
        assert_eq!(report.details["missing_fields"], json!(["image_url"]));
    }

    #[test]
    fn test_low_volume_blocks_even_with_valid_schema() {
        let records = vec![record("a"), record("b")];
        let report = validate(&records, 10);

        assert!(report.schema_passed);
        assert_eq!(report.volume_actual, 2);
        assert_eq!(report.volume_expected, 10);
        assert_eq!(report.l1_status, Status::Block);
    }

    #[test]
    fn test_passes_when_schema_and_volume_hold() {
        let records: Vec<JsonValue> = (0..10).map(|i| record(&format!("cap {i}"))).collect();
        let report = validate(&records, 10);
        assert_eq!(report.l1_status, Status::Pass);
    }

    #[test]
    fn test_freshness_picks_newest_timestamp_across_records() {
        let mut a = record("a");
        a["captured_at"] = json!((Utc::now() - Duration::seconds(120)).to_rfc3339());
        let mut b = record("b");
        b["event_time"] = json!((Utc::now() - Duration::seconds(30)).to_rfc3339());

        let report = validate(&[a, b], 1);
        assert!(
            (28..=35).contains(&report.freshness_delay_sec),
            "expected ~30s, got {}",
            report.freshness_delay_sec
        );
        assert_eq!(report.details["freshness_known"], json!(true));
    }

    #[test]
    fn test_freshness_unknown_is_sentinel_not_failure() {
        let records: Vec<JsonValue> = (0..10).map(|_| record("c")).collect();
        let report = validate(&records, 10);

        assert_eq!(report.freshness_delay_sec, FRESHNESS_UNKNOWN);
        assert_eq!(report.details["freshness_known"], json!(false));
        assert_eq!(report.l1_status, Status::Pass);
    }

    #[test]
    fn test_parses_epoch_and_zulu_and_naive_forms() {
        let epoch = json!(1_700_000_000);
        let zulu = json!("2023-11-14T22:13:20Z");
        let naive = json!("2023-11-14T22:13:20");
        let spaced = json!("2023-11-14 22:13:20");

        let a = parse_timestamp(&epoch).unwrap();
        let b = parse_timestamp(&zulu).unwrap();
        let c = parse_timestamp(&naive).unwrap();
        let d = parse_timestamp(&spaced).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(c, d);
    }

    #[test]
    fn test_parses_bare_date_as_utc_midnight() {
        let parsed = parse_timestamp(&json!("2023-11-14")).unwrap();
        assert_eq!(parsed, parse_timestamp(&json!("2023-11-14T00:00:00Z")).unwrap());
    }

    #[test]
    fn test_unparseable_timestamp_is_ignored() {
        let mut a = record("a");
        a["captured_at"] = json!("last tuesday");
        let report = validate(&[a], 1);
        assert_eq!(report.freshness_delay_sec, FRESHNESS_UNKNOWN);
    }

    #[test]
    fn test_avg_caption_len_is_zero_for_empty_input() {
        let report = validate(&[], 10);
        assert_eq!(report.details["avg_caption_len"], json!(0.0));
        assert_eq!(report.l1_status, Status::Block);
    }
}
