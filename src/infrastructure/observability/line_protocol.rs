//! InfluxDB line protocol encoding for KPI snapshots.
//!
//! Each payload is three lines sharing one bucket timestamp:
//!
//! ```text
//! uos_kpi[,tags] boarding_hit_rate_pct=93.21 1700000000000000000
//! uos_kpi[,tags] eta_error_seconds_p50=12i,eta_error_seconds_p95=47i 1700000000000000000
//! uos_kpi[,tags] active_clients=5i,routes_today=3i 1700000000000000000
//! ```

use crate::config::{EncodingMode, TagSet};
use crate::domain::kpi::{KpiSnapshot, TimeBucket};
use std::fmt::{self, Write};

pub const MEASUREMENT: &str = "uos_kpi";

enum FieldValue {
    Float(f64),
    Int(i64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}i", v),
            // Debug keeps the decimal point on whole numbers (`0.0`), which
            // stops the sink from inferring an integer-looking float.
            FieldValue::Float(v) if v.is_finite() => write!(f, "{:?}", v),
            // The sink has no representation for NaN or infinity
            FieldValue::Float(_) => f.write_str("0.0"),
        }
    }
}

/// Stateless encoder; the tag section is rendered once up front.
#[derive(Debug, Clone)]
pub struct LineProtocolEncoder {
    tag_section: String,
}

impl LineProtocolEncoder {
    pub fn new(mode: &EncodingMode) -> Self {
        let tag_section = match mode {
            EncodingMode::Anonymized => String::new(),
            EncodingMode::Tagged(tags) => render_tags(tags),
        };
        Self { tag_section }
    }

    pub fn encode(&self, snapshot: &KpiSnapshot, bucket: TimeBucket) -> String {
        let lines = [
            self.line(
                &[(
                    "boarding_hit_rate_pct",
                    FieldValue::Float(snapshot.boarding_hit_rate_pct),
                )],
                bucket,
            ),
            self.line(
                &[
                    ("eta_error_seconds_p50", FieldValue::Int(snapshot.eta_error_p50_s)),
                    ("eta_error_seconds_p95", FieldValue::Int(snapshot.eta_error_p95_s)),
                ],
                bucket,
            ),
            self.line(
                &[
                    ("active_clients", FieldValue::Int(snapshot.active_clients)),
                    ("routes_today", FieldValue::Int(snapshot.routes_today)),
                ],
                bucket,
            ),
        ];

        lines.join("\n")
    }

    fn line(&self, fields: &[(&str, FieldValue)], bucket: TimeBucket) -> String {
        let mut line = String::with_capacity(96);
        line.push_str(MEASUREMENT);
        line.push_str(&self.tag_section);
        line.push(' ');
        for (i, (key, value)) in fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            // Writing into a String cannot fail
            let _ = write!(line, "{}={}", key, value);
        }
        let _ = write!(line, " {}", bucket);
        line
    }
}

fn render_tags(tags: &TagSet) -> String {
    format!(
        ",cluster_id={},env={},region={}",
        escape_tag_value(&tags.cluster_id),
        escape_tag_value(&tags.env),
        escape_tag_value(&tags.region),
    )
}

/// Backslash-escape the characters line protocol treats as delimiters in
/// tag values.
fn escape_tag_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | ' ' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
