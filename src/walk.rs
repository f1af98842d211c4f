//! Cartesian enumeration of axis combinations and record assembly.
//!
//! Pinned axes and static filters contribute one fixed assignment computed
//! once; the walk recurses only over iterable axes (depth = axis count,
//! typically <= 4), threading three parallel contexts: raw code assignments
//! for cube lookups, and alias-/code-keyed snapshots for the caller.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::cube::{tidy_value, DecodedCube};
use crate::error::{PipelineError, PipelineResult};
use crate::resolve::{ResolvedAxis, ResolvedMetric, ResolvedValue};

/// What a record constructor may produce for one combination: skip it, one
/// record, or a fan-out of several.
pub enum RecordOutcome {
    None,
    One(Value),
    Many(Vec<Value>),
}

/// Snapshot of one axis's currently-selected value.
#[derive(Debug, Clone)]
pub struct AxisContextEntry {
    pub code: String,
    pub label: String,
    pub meta_label: String,
    pub extra: BTreeMap<String, Value>,
}

impl AxisContextEntry {
    fn from_value(v: &ResolvedValue) -> Self {
        AxisContextEntry {
            code: v.code.clone(),
            label: v.label.clone(),
            meta_label: v.meta_label.clone(),
            extra: v.extra.clone(),
        }
    }
}

/// Everything a record constructor sees for one axis combination.
pub struct RecordContext<'a> {
    pub period: &'a str,
    /// Axis snapshots keyed by alias.
    pub axes: &'a BTreeMap<String, AxisContextEntry>,
    /// The same snapshots keyed by raw dimension code.
    pub axis_by_code: &'a BTreeMap<String, AxisContextEntry>,
    /// Metric values for this combination, keyed by metric value key.
    pub values: &'a BTreeMap<String, Value>,
    /// Raw dimension-code assignments used for the cube lookups.
    pub assignments: &'a HashMap<String, String>,
}

impl RecordContext<'_> {
    pub fn axis(&self, alias: &str) -> Option<&AxisContextEntry> {
        self.axes.get(alias)
    }

    pub fn value(&self, key: &str) -> &Value {
        self.values.get(key).unwrap_or(&Value::Null)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }
}

pub type RecordFn = Box<dyn Fn(&RecordContext) -> RecordOutcome + Send + Sync>;

/// Walk every combination of the iterable axes and assemble records.
pub fn assemble_records(
    axes: &[ResolvedAxis],
    metrics: &[ResolvedMetric],
    cube: &DecodedCube,
    fixed: &[(String, String)],
    create_record: &RecordFn,
) -> PipelineResult<Vec<Value>> {
    let time_axis = axes.iter().find(|a| a.is_time).ok_or_else(|| {
        PipelineError::structural("record assembly requires a resolved time axis")
    })?;

    let mut walker = Walker {
        metrics,
        cube,
        time_code: &time_axis.code,
        create_record,
        assignments: HashMap::new(),
        by_alias: BTreeMap::new(),
        by_code: BTreeMap::new(),
        records: Vec::new(),
    };

    // fixed assignments: static filters plus pinned axes, computed once
    for (code, value) in fixed {
        walker.assignments.insert(code.clone(), value.clone());
    }
    let mut iterable: Vec<&ResolvedAxis> = Vec::new();
    for axis in axes {
        if axis.iterate {
            iterable.push(axis);
        } else {
            let value = &axis.values[0];
            walker.assignments.insert(axis.code.clone(), value.code.clone());
            let entry = AxisContextEntry::from_value(value);
            walker.by_alias.insert(axis.alias.clone(), entry.clone());
            walker.by_code.insert(axis.code.clone(), entry);
        }
    }

    walker.recurse(&iterable)?;
    Ok(walker.records)
}

struct Walker<'a> {
    metrics: &'a [ResolvedMetric],
    cube: &'a DecodedCube,
    time_code: &'a str,
    create_record: &'a RecordFn,
    assignments: HashMap<String, String>,
    by_alias: BTreeMap<String, AxisContextEntry>,
    by_code: BTreeMap<String, AxisContextEntry>,
    records: Vec<Value>,
}

impl Walker<'_> {
    fn recurse(&mut self, remaining: &[&ResolvedAxis]) -> PipelineResult<()> {
        let Some((axis, rest)) = remaining.split_first() else {
            return self.emit();
        };
        for value in &axis.values {
            self.assignments
                .insert(axis.code.clone(), value.code.clone());
            let entry = AxisContextEntry::from_value(value);
            self.by_alias.insert(axis.alias.clone(), entry.clone());
            self.by_code.insert(axis.code.clone(), entry);

            self.recurse(rest)?;

            self.assignments.remove(&axis.code);
            self.by_alias.remove(&axis.alias);
            self.by_code.remove(&axis.code);
        }
        Ok(())
    }

    fn emit(&mut self) -> PipelineResult<()> {
        // resolve every metric value via point lookup
        let mut values: BTreeMap<String, Value> = BTreeMap::new();
        for metric in self.metrics {
            for mv in &metric.values {
                let cell = if metric.has_dimension {
                    let code = metric
                        .code
                        .as_ref()
                        .expect("dimension-backed metric has a code");
                    self.assignments
                        .insert(code.clone(), mv.code.clone().unwrap_or_default());
                    let cell = self.cube.value_for(&self.assignments);
                    self.assignments.remove(code);
                    cell
                } else {
                    // implicit value: only the accumulated assignments
                    self.cube.value_for(&self.assignments)
                };
                values.insert(mv.key.clone(), tidy_value(cell));
            }
        }

        let period = self
            .assignments
            .get(self.time_code)
            .cloned()
            .unwrap_or_default();
        let ctx = RecordContext {
            period: &period,
            axes: &self.by_alias,
            axis_by_code: &self.by_code,
            values: &values,
            assignments: &self.assignments,
        };
        match (self.create_record)(&ctx) {
            RecordOutcome::None => {}
            RecordOutcome::One(record) => self.records.push(record),
            RecordOutcome::Many(records) => self.records.extend(records),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::{serialize_key, CubeSource};
    use crate::resolve::ResolvedMetricValue;
    use serde_json::json;

    fn axis(code: &str, alias: &str, codes: &[&str], is_time: bool) -> ResolvedAxis {
        ResolvedAxis {
            code: code.into(),
            alias: alias.into(),
            text: String::new(),
            values: codes
                .iter()
                .map(|c| ResolvedValue {
                    code: c.to_string(),
                    label: format!("label-{c}"),
                    meta_label: c.to_string(),
                    extra: BTreeMap::new(),
                })
                .collect(),
            iterate: true,
            is_time,
        }
    }

    fn virtual_metric(key: &str) -> ResolvedMetric {
        ResolvedMetric {
            alias: key.into(),
            code: None,
            has_dimension: false,
            values: vec![ResolvedMetricValue {
                key: key.into(),
                code: None,
                label: key.into(),
                unit: None,
            }],
            unit: None,
        }
    }

    fn cube(dim_codes: &[&str], entries: &[(&[&str], Option<f64>)]) -> DecodedCube {
        let mut lookup = HashMap::new();
        for (key, value) in entries {
            lookup.insert(serialize_key(key), *value);
        }
        DecodedCube {
            dim_codes: dim_codes.iter().map(|s| s.to_string()).collect(),
            lookup,
            source: CubeSource::default(),
        }
    }

    fn flat_record() -> RecordFn {
        Box::new(|ctx| {
            RecordOutcome::One(json!({
                "period": ctx.period,
                "fuel": ctx.axis("fuel").map(|a| a.label.clone()),
                "count": ctx.value("count"),
            }))
        })
    }

    #[test]
    fn full_walk_covers_the_cartesian_product() {
        let axes = vec![
            axis("Manudur", "period", &["202401", "202402"], true),
            axis("Eldsneyti", "fuel", &["0", "2"], false),
        ];
        let metrics = vec![virtual_metric("count")];
        let cube = cube(
            &["Manudur", "Eldsneyti"],
            &[
                (&["202401", "0"], Some(10.0)),
                (&["202401", "2"], Some(20.0)),
                (&["202402", "0"], Some(30.0)),
                // 202402/2 missing from the cube: still a record, value null
            ],
        );

        let records = assemble_records(&axes, &metrics, &cube, &[], &flat_record()).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["period"], "202401");
        assert_eq!(records[0]["count"], json!(10));
        assert_eq!(records[3]["count"], Value::Null);
    }

    #[test]
    fn returning_none_skips_and_many_fans_out() {
        let axes = vec![axis("Manudur", "period", &["202401", "202402"], true)];
        let metrics = vec![virtual_metric("count")];
        let cube = cube(
            &["Manudur"],
            &[(&["202401"], Some(1.0)), (&["202402"], Some(2.0))],
        );

        let create: RecordFn = Box::new(|ctx| {
            if ctx.period == "202401" {
                RecordOutcome::None
            } else {
                RecordOutcome::Many(vec![
                    json!({"period": ctx.period, "part": "a"}),
                    json!({"period": ctx.period, "part": "b"}),
                ])
            }
        });
        let records = assemble_records(&axes, &metrics, &cube, &[], &create).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["part"], "a");
        assert_eq!(records[1]["part"], "b");
    }

    #[test]
    fn pinned_axes_and_static_filters_apply_to_every_lookup() {
        let mut region = axis("Landsvaedi", "region", &["1"], false);
        region.iterate = false;
        let axes = vec![
            axis("Manudur", "period", &["202401"], true),
            region,
        ];
        let metrics = vec![virtual_metric("count")];
        let cube = cube(
            &["Manudur", "Landsvaedi", "Kyn"],
            &[(&["202401", "1", "T"], Some(5.0))],
        );

        let create: RecordFn = Box::new(|ctx| {
            assert_eq!(ctx.axis("region").unwrap().code, "1");
            assert_eq!(ctx.axis_by_code["Landsvaedi"].code, "1");
            RecordOutcome::One(json!({"count": ctx.value("count")}))
        });
        let fixed = vec![("Kyn".to_string(), "T".to_string())];
        let records = assemble_records(&axes, &metrics, &cube, &fixed, &create).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["count"], json!(5));
    }

    #[test]
    fn dimension_backed_metrics_add_the_metric_code_term() {
        let axes = vec![axis("Manudur", "period", &["202401"], true)];
        let metrics = vec![ResolvedMetric {
            alias: "measure".into(),
            code: Some("Eining".into()),
            has_dimension: true,
            values: vec![
                ResolvedMetricValue {
                    key: "count".into(),
                    code: Some("fjoldi".into()),
                    label: "Number".into(),
                    unit: None,
                },
                ResolvedMetricValue {
                    key: "share".into(),
                    code: Some("hlutfall".into()),
                    label: "Share".into(),
                    unit: None,
                },
            ],
            unit: None,
        }];
        let cube = cube(
            &["Manudur", "Eining"],
            &[
                (&["202401", "fjoldi"], Some(321.0)),
                (&["202401", "hlutfall"], Some(12.5)),
            ],
        );

        let create: RecordFn = Box::new(|ctx| {
            RecordOutcome::One(json!({
                "count": ctx.value("count"),
                "share": ctx.value("share"),
            }))
        });
        let records = assemble_records(&axes, &metrics, &cube, &[], &create).unwrap();
        assert_eq!(records[0]["count"], json!(321));
        assert_eq!(records[0]["share"], json!(12.5));
    }
}
