use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// The two metric kinds the pipeline understands.
///
/// Serializes as the lowercase strings used on the wire (`"gauge"` / `"counter"`),
/// matching the legacy path segment and the structured JSON `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(format!("unknown metric kind {other:?}")),
        }
    }
}

/// A metric record in its wire shape: `{id, type, delta?, value?, hash?}`.
///
/// `delta` and `value` are mutually exclusive and gated by `kind`; see
/// [`MetricRecord::validate_shape`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl MetricRecord {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        MetricRecord {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
            hash: None,
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        MetricRecord {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
            hash: None,
        }
    }

    /// Enforces the gauge/counter shape invariant: exactly one of `value`/`delta`
    /// present, matching `kind`.
    pub fn validate_shape(&self) -> Result<(), ModelError> {
        match self.kind {
            MetricKind::Gauge => {
                if self.value.is_none() || self.delta.is_some() {
                    return Err(ModelError::GaugeShape { id: self.id.clone() });
                }
            }
            MetricKind::Counter => {
                if self.delta.is_none() || self.value.is_some() {
                    return Err(ModelError::CounterShape { id: self.id.clone() });
                }
            }
        }
        Ok(())
    }

    /// The decimal rendering used in the canonical signing string: `%f` (six
    /// fractional digits) for gauges, `%d` for counters.
    pub fn canonical_value_string(&self) -> String {
        match self.kind {
            MetricKind::Gauge => format!("{:.6}", self.value.unwrap_or_default()),
            MetricKind::Counter => format!("{}", self.delta.unwrap_or_default()),
        }
    }
}
