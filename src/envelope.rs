//! Dataset-meta envelope: default derivation, caller hooks, and the strict
//! validator that runs before anything is persisted.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cube::CubeSource;
use crate::error::{PipelineError, PipelineResult};
use crate::resolve::{ResolvedAxis, ResolvedMetric};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeMeta {
    pub key: String,
    pub granularity: String,
    pub first: String,
    pub last: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub key: String,
    pub label: String,
    pub unit: Option<String>,
}

impl FieldMeta {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        FieldMeta {
            key: key.into(),
            label: label.into(),
            unit: Some(unit.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionValueMeta {
    pub code: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionMeta {
    pub code: String,
    pub label: String,
    pub values: Vec<DimensionValueMeta>,
}

/// The validated dataset metadata envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub id: String,
    pub generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub time: TimeMeta,
    pub fields: Vec<FieldMeta>,
    pub metrics: Vec<String>,
    pub dimensions: BTreeMap<String, DimensionMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub source_urls: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub notes: Vec<String>,
}

/// The serializable artifact handed to the persistence collaborator.
#[derive(Debug, Serialize)]
pub struct Dataset {
    pub meta: DatasetMeta,
    pub records: Vec<Value>,
}

/// Inputs for the default envelope derivation.
pub struct MetaInputs<'a> {
    pub dataset_id: &'a str,
    pub axes: &'a [ResolvedAxis],
    pub metrics: &'a [ResolvedMetric],
    pub cube_source: &'a CubeSource,
    pub source_urls: Vec<String>,
    /// Fallback unit for fields that declare none.
    pub unit: Option<&'a str>,
    pub extra_fields: &'a [FieldMeta],
    pub notes: &'a [String],
    pub granularity: Option<&'a str>,
}

/// Derive the default envelope: fields from metric values plus extras,
/// deduplicated by key (first-seen unit wins); period bounds from the time
/// axis; cube-reported unit/title/updated carried through.
pub fn build_default_meta(inputs: &MetaInputs) -> PipelineResult<DatasetMeta> {
    let time_axis = inputs
        .axes
        .iter()
        .find(|a| a.is_time)
        .ok_or_else(|| PipelineError::structural("envelope requires a resolved time axis"))?;
    let first = &time_axis.values[0];
    let last = time_axis.values.last().expect("resolved axis is non-empty");

    let fallback_unit = inputs
        .unit
        .map(str::to_string)
        .or_else(|| inputs.cube_source.unit.clone());

    let mut fields: Vec<FieldMeta> = Vec::new();
    for metric in inputs.metrics {
        for mv in &metric.values {
            fields.push(FieldMeta {
                key: mv.key.clone(),
                label: mv.label.clone(),
                unit: mv.unit.clone().or_else(|| fallback_unit.clone()),
            });
        }
    }
    fields.extend(inputs.extra_fields.iter().cloned());
    let fields = dedupe_fields(fields);
    let metrics = fields.iter().map(|f| f.key.clone()).collect();

    let mut dimensions = BTreeMap::new();
    for axis in inputs.axes.iter().filter(|a| !a.is_time) {
        dimensions.insert(
            axis.alias.clone(),
            DimensionMeta {
                code: axis.code.clone(),
                label: axis.text.clone(),
                values: axis
                    .values
                    .iter()
                    .map(|v| DimensionValueMeta {
                        code: v.code.clone(),
                        label: v.label.clone(),
                    })
                    .collect(),
            },
        );
    }

    Ok(DatasetMeta {
        id: inputs.dataset_id.to_string(),
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        updated_at: inputs.cube_source.updated.clone(),
        time: TimeMeta {
            key: "period".to_string(),
            granularity: inputs
                .granularity
                .map(str::to_string)
                .unwrap_or_else(|| infer_granularity(&first.code).to_string()),
            first: first.code.clone(),
            last: last.code.clone(),
            count: time_axis.values.len(),
        },
        fields,
        metrics,
        dimensions,
        source: inputs.cube_source.source.clone(),
        source_urls: inputs.source_urls.clone(),
        notes: inputs.notes.to_vec(),
    })
}

/// Deduplicate by key; the first occurrence wins, including its unit.
fn dedupe_fields(fields: Vec<FieldMeta>) -> Vec<FieldMeta> {
    let mut seen = std::collections::HashSet::new();
    fields
        .into_iter()
        .filter(|f| seen.insert(f.key.clone()))
        .collect()
}

/// Best-effort granularity from a period code's shape.
pub fn infer_granularity(period: &str) -> &'static str {
    let digits = period.chars().filter(|c| c.is_ascii_digit()).count();
    let upper = period.to_ascii_uppercase();
    if upper.contains('K') || upper.contains('Q') {
        "quarter"
    } else if upper.contains('M') || digits == 6 {
        "month"
    } else if upper.contains('W') {
        "week"
    } else if digits == 8 {
        "day"
    } else if digits == 4 {
        "year"
    } else {
        "other"
    }
}

/// Last line of defense before persistence: a structurally invalid envelope
/// fails loudly instead of being written.
pub fn validate_meta(meta: &DatasetMeta) -> PipelineResult<()> {
    let fail = |msg: String| Err(PipelineError::structural(format!("invalid dataset meta: {msg}")));

    if meta.id.is_empty() {
        return fail("empty id".into());
    }
    if meta.time.key != "period" {
        return fail(format!("time.key is '{}', expected 'period'", meta.time.key));
    }
    if meta.time.first.is_empty() || meta.time.last.is_empty() {
        return fail("empty period bounds".into());
    }
    if meta.time.granularity.is_empty() {
        return fail("empty granularity".into());
    }
    if meta.fields.is_empty() {
        return fail("no fields".into());
    }
    for field in &meta.fields {
        if field.key.is_empty() {
            return fail("field with empty key".into());
        }
        if field.unit.as_deref().map_or(true, str::is_empty) {
            return fail(format!("field '{}' has no unit", field.key));
        }
    }
    if meta.metrics.len() != meta.fields.len() {
        return fail(format!(
            "{} metrics vs {} fields",
            meta.metrics.len(),
            meta.fields.len()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{ResolvedMetricValue, ResolvedValue};

    fn time_axis(codes: &[&str]) -> ResolvedAxis {
        ResolvedAxis {
            code: "Manudur".into(),
            alias: "period".into(),
            text: "Month".into(),
            values: codes
                .iter()
                .map(|c| ResolvedValue {
                    code: c.to_string(),
                    label: c.to_string(),
                    meta_label: c.to_string(),
                    extra: BTreeMap::new(),
                })
                .collect(),
            iterate: true,
            is_time: true,
        }
    }

    fn metric(key: &str, unit: Option<&str>) -> ResolvedMetric {
        ResolvedMetric {
            alias: key.into(),
            code: None,
            has_dimension: false,
            values: vec![ResolvedMetricValue {
                key: key.into(),
                code: None,
                label: key.into(),
                unit: unit.map(str::to_string),
            }],
            unit: None,
        }
    }

    fn inputs<'a>(
        axes: &'a [ResolvedAxis],
        metrics: &'a [ResolvedMetric],
        source: &'a CubeSource,
        extra: &'a [FieldMeta],
    ) -> MetaInputs<'a> {
        MetaInputs {
            dataset_id: "vehicles-fuel",
            axes,
            metrics,
            cube_source: source,
            source_urls: vec!["https://px.example.is/api".into()],
            unit: Some("vehicles"),
            extra_fields: extra,
            notes: &[],
            granularity: None,
        }
    }

    #[test]
    fn default_derivation_fills_time_and_fields() {
        let axes = vec![time_axis(&["202401", "202402", "202403"])];
        let metrics = vec![metric("count", None)];
        let source = CubeSource {
            updated: Some("2024-04-02T09:00:00Z".into()),
            ..Default::default()
        };
        let meta = build_default_meta(&inputs(&axes, &metrics, &source, &[])).unwrap();

        assert_eq!(meta.time.key, "period");
        assert_eq!(meta.time.first, "202401");
        assert_eq!(meta.time.last, "202403");
        assert_eq!(meta.time.count, 3);
        assert_eq!(meta.time.granularity, "month");
        assert_eq!(meta.updated_at.as_deref(), Some("2024-04-02T09:00:00Z"));
        assert_eq!(meta.fields[0].unit.as_deref(), Some("vehicles"));
        assert_eq!(meta.metrics, vec!["count"]);
        validate_meta(&meta).unwrap();
    }

    #[test]
    fn duplicate_fields_keep_first_seen_unit() {
        let axes = vec![time_axis(&["2023", "2024"])];
        let metrics = vec![metric("count", Some("vehicles"))];
        let source = CubeSource::default();
        let extra = vec![FieldMeta::new("count", "Count again", "things")];
        let meta = build_default_meta(&inputs(&axes, &metrics, &source, &extra)).unwrap();
        assert_eq!(meta.fields.len(), 1);
        assert_eq!(meta.fields[0].unit.as_deref(), Some("vehicles"));
    }

    #[test]
    fn validator_rejects_metric_field_count_mismatch() {
        let axes = vec![time_axis(&["2023"])];
        let metrics = vec![metric("count", Some("vehicles"))];
        let source = CubeSource::default();
        let mut meta = build_default_meta(&inputs(&axes, &metrics, &source, &[])).unwrap();
        meta.metrics.push("phantom".into());
        assert!(validate_meta(&meta).is_err());
    }

    #[test]
    fn validator_rejects_missing_unit_and_wrong_time_key() {
        let axes = vec![time_axis(&["2023"])];
        let metrics = vec![metric("count", Some("vehicles"))];
        let source = CubeSource::default();
        let good = build_default_meta(&inputs(&axes, &metrics, &source, &[])).unwrap();

        let mut no_unit = good.clone();
        no_unit.fields[0].unit = None;
        assert!(validate_meta(&no_unit).is_err());

        let mut bad_key = good;
        bad_key.time.key = "time".into();
        assert!(validate_meta(&bad_key).is_err());
    }

    #[test]
    fn granularity_inference_covers_common_period_shapes() {
        assert_eq!(infer_granularity("2024"), "year");
        assert_eq!(infer_granularity("202403"), "month");
        assert_eq!(infer_granularity("2024M03"), "month");
        assert_eq!(infer_granularity("2024K1"), "quarter");
        assert_eq!(infer_granularity("20240315"), "day");
    }
}
