//! Dimension resolution: turn declarative axis/metric specs into concrete
//! value lists against live table metadata.
//!
//! Resolution is where a fetcher's assumptions meet the real table. A code
//! that no longer exists, or a caller-declared value the table no longer
//! carries, is a structural error; a filter that simply matches nothing is a
//! Skip so the whole table run can be abandoned gracefully.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::error::{PipelineError, PipelineResult};
use crate::meta::{
    ascending_by_code, build_value_pairs, find_variable_code, Matcher, TableMeta, ValuePair,
    Variable,
};

/// Context handed to dynamic code resolvers: the metadata plus every axis
/// resolved so far, in declaration order.
pub struct ResolveContext<'a> {
    pub meta: &'a TableMeta,
    pub axes: &'a [ResolvedAxis],
}

impl ResolveContext<'_> {
    pub fn axis(&self, alias: &str) -> Option<&ResolvedAxis> {
        self.axes.iter().find(|a| a.alias == alias)
    }
}

/// How a spec locates its backing dimension code.
pub enum CodeResolver {
    /// A code known up front.
    Literal(String),
    /// Located via ordered matcher dispatch against the metadata.
    Match(Vec<Matcher>),
    /// Computed from already-resolved context. `None` from a metric resolver
    /// means the metric is virtual; `None` from an axis is a schema mismatch.
    Dynamic(Box<dyn Fn(&ResolveContext) -> Option<String> + Send + Sync>),
    /// Metric only: no backing dimension at all.
    Implicit,
}

impl CodeResolver {
    pub fn literal(code: impl Into<String>) -> Self {
        CodeResolver::Literal(code.into())
    }

    fn resolve(&self, ctx: &ResolveContext) -> Option<String> {
        match self {
            CodeResolver::Literal(code) => Some(code.clone()),
            CodeResolver::Match(matchers) => find_variable_code(ctx.meta, matchers),
            CodeResolver::Dynamic(f) => f(ctx),
            CodeResolver::Implicit => None,
        }
    }
}

/// Caller-declared value: a code plus optional relabel and extra record
/// fields carried through to every record built from this value.
#[derive(Debug, Clone, Default)]
pub struct ValueSpec {
    pub code: String,
    pub label: Option<String>,
    pub extra: BTreeMap<String, Value>,
}

impl ValueSpec {
    pub fn new(code: impl Into<String>) -> Self {
        ValueSpec {
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn labelled(code: impl Into<String>, label: impl Into<String>) -> Self {
        ValueSpec {
            code: code.into(),
            label: Some(label.into()),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Per-table hook that filters, relabels or reorders an axis's base values.
pub trait DimensionValueResolver: Send + Sync {
    fn resolve(&self, base: &[ValuePair]) -> Vec<ValueSpec>;
}

impl<F> DimensionValueResolver for F
where
    F: Fn(&[ValuePair]) -> Vec<ValueSpec> + Send + Sync,
{
    fn resolve(&self, base: &[ValuePair]) -> Vec<ValueSpec> {
        self(base)
    }
}

/// How an axis selects its values from the variable's base set.
pub enum ValueSelection {
    /// The unmodified base set.
    All,
    /// A fixed caller-declared list.
    Explicit(Vec<ValueSpec>),
    /// A resolver over the base set.
    Resolve(Box<dyn DimensionValueResolver>),
}

pub type LabelFn = Box<dyn Fn(&ValuePair) -> String + Send + Sync>;
pub type SortFn = Box<dyn Fn(&ResolvedValue, &ResolvedValue) -> Ordering + Send + Sync>;

/// Declarative axis specification.
pub struct AxisSpec {
    pub alias: String,
    pub code: CodeResolver,
    /// Defensive equality check against the live variable's text.
    pub text: Option<String>,
    pub values: ValueSelection,
    pub to_label: Option<LabelFn>,
    pub sort: Option<SortFn>,
    /// Pinned axes (`iterate == false`) contribute one fixed assignment to
    /// every query and every record instead of joining the Cartesian walk.
    pub iterate: bool,
}

impl AxisSpec {
    pub fn new(alias: impl Into<String>, code: CodeResolver) -> Self {
        AxisSpec {
            alias: alias.into(),
            code,
            text: None,
            values: ValueSelection::All,
            to_label: None,
            sort: None,
            iterate: true,
        }
    }

    pub fn expect_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn values(mut self, selection: ValueSelection) -> Self {
        self.values = selection;
        self
    }

    pub fn to_label(mut self, f: impl Fn(&ValuePair) -> String + Send + Sync + 'static) -> Self {
        self.to_label = Some(Box::new(f));
        self
    }

    pub fn sort(
        mut self,
        f: impl Fn(&ResolvedValue, &ResolvedValue) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.sort = Some(Box::new(f));
        self
    }

    pub fn pinned(mut self) -> Self {
        self.iterate = false;
        self
    }
}

/// One metric value: `key` names the slot in every record's `values` map.
#[derive(Debug, Clone, Default)]
pub struct MetricValueSpec {
    pub key: String,
    pub code: Option<String>,
    pub label: Option<String>,
    pub unit: Option<String>,
}

impl MetricValueSpec {
    pub fn new(key: impl Into<String>, code: impl Into<String>) -> Self {
        MetricValueSpec {
            key: key.into(),
            code: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn virtual_key(key: impl Into<String>) -> Self {
        MetricValueSpec {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Declarative metric-dimension specification.
pub struct MetricSpec {
    pub alias: String,
    pub code: CodeResolver,
    pub text: Option<String>,
    /// Empty means "every value the variable offers" for a real dimension,
    /// or one synthetic value named after the alias for a virtual metric.
    pub values: Vec<MetricValueSpec>,
    pub unit: Option<String>,
}

impl MetricSpec {
    pub fn new(alias: impl Into<String>, code: CodeResolver) -> Self {
        MetricSpec {
            alias: alias.into(),
            code,
            text: None,
            values: Vec::new(),
            unit: None,
        }
    }

    pub fn virtual_metric(alias: impl Into<String>) -> Self {
        Self::new(alias, CodeResolver::Implicit)
    }

    pub fn expect_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn values(mut self, values: Vec<MetricValueSpec>) -> Self {
        self.values = values;
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// A resolved axis value: base metadata merged with caller overrides and the
/// computed label. `meta_label` always carries the live table's label.
#[derive(Debug, Clone)]
pub struct ResolvedValue {
    pub code: String,
    pub label: String,
    pub meta_label: String,
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ResolvedAxis {
    pub code: String,
    pub alias: String,
    pub text: String,
    pub values: Vec<ResolvedValue>,
    pub iterate: bool,
    pub is_time: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedMetricValue {
    pub key: String,
    pub code: Option<String>,
    pub label: String,
    pub unit: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedMetric {
    pub alias: String,
    pub code: Option<String>,
    pub has_dimension: bool,
    pub values: Vec<ResolvedMetricValue>,
    pub unit: Option<String>,
}

/// Resolve the time axis and every declared axis, in order. The time axis is
/// always first and its values are forced ascending-by-period.
pub fn resolve_axes(
    meta: &TableMeta,
    time_spec: &AxisSpec,
    axis_specs: &[AxisSpec],
) -> PipelineResult<Vec<ResolvedAxis>> {
    let mut resolved: Vec<ResolvedAxis> = Vec::with_capacity(axis_specs.len() + 1);
    resolved.push(resolve_axis(meta, time_spec, &resolved, true)?);
    for spec in axis_specs {
        let axis = resolve_axis(meta, spec, &resolved, false)?;
        resolved.push(axis);
    }
    Ok(resolved)
}

fn resolve_axis(
    meta: &TableMeta,
    spec: &AxisSpec,
    so_far: &[ResolvedAxis],
    time_slot: bool,
) -> PipelineResult<ResolvedAxis> {
    let ctx = ResolveContext { meta, axes: so_far };

    // 1) resolve the code; an axis always expects a concrete one
    let code = spec.code.resolve(&ctx).ok_or_else(|| {
        PipelineError::structural(format!("axis '{}': no dimension code resolved", spec.alias))
    })?;
    let var = meta.variable(&code).ok_or_else(|| {
        PipelineError::structural(format!(
            "axis '{}': dimension '{}' missing from table metadata",
            spec.alias, code
        ))
    })?;
    check_text(&spec.alias, spec.text.as_deref(), var)?;

    // 2) base value/label pairs, ascending when this is the time axis
    let base = if time_slot || var.is_time {
        ascending_by_code(build_value_pairs(var))
    } else {
        build_value_pairs(var)
    };

    // 3) caller selection, defaulting to the unmodified base set
    let selected: Vec<ValueSpec> = match &spec.values {
        ValueSelection::All => base.iter().map(|p| ValueSpec::new(&p.code)).collect(),
        ValueSelection::Explicit(list) => list.clone(),
        ValueSelection::Resolve(resolver) => resolver.resolve(&base),
    };

    // 4) normalize: merge base metadata, spec fields, overrides, label
    let mut values = Vec::with_capacity(selected.len());
    for vs in &selected {
        let pair = base.iter().find(|p| p.code == vs.code).ok_or_else(|| {
            // The fetcher names a code the live table no longer carries.
            PipelineError::structural(format!(
                "axis '{}': declared value '{}' absent from dimension '{}'",
                spec.alias, vs.code, code
            ))
        })?;
        values.push(normalize_value(pair, vs, spec.to_label.as_deref()));
    }

    // 5) optional caller sort
    if let Some(sort) = &spec.sort {
        values.sort_by(|a, b| sort(a, b));
    }

    // 6) empty resolution is a Skip, not an error
    if values.is_empty() {
        return Err(PipelineError::skip(format!(
            "axis '{}' resolved no values for dimension '{}'",
            spec.alias, code
        )));
    }

    Ok(ResolvedAxis {
        code,
        alias: spec.alias.clone(),
        text: var.text.clone(),
        values,
        iterate: spec.iterate,
        is_time: time_slot || var.is_time,
    })
}

fn normalize_value(
    pair: &ValuePair,
    vs: &ValueSpec,
    to_label: Option<&(dyn Fn(&ValuePair) -> String + Send + Sync)>,
) -> ResolvedValue {
    let overridden = vs.label.clone().unwrap_or_else(|| pair.label.clone());
    let label = match to_label {
        Some(f) => f(&ValuePair {
            code: pair.code.clone(),
            label: overridden.clone(),
        }),
        None => overridden,
    };
    ResolvedValue {
        code: pair.code.clone(),
        label,
        meta_label: pair.label.clone(),
        extra: vs.extra.clone(),
    }
}

/// Resolve every metric dimension. Metric value keys must be unique and
/// non-empty across the whole table; a real metric dimension resolving to
/// zero values is a structural error, never a Skip.
pub fn resolve_metrics(
    meta: &TableMeta,
    specs: &[MetricSpec],
    axes: &[ResolvedAxis],
) -> PipelineResult<Vec<ResolvedMetric>> {
    let ctx = ResolveContext { meta, axes };
    let mut resolved = Vec::with_capacity(specs.len());
    let mut seen_keys: HashSet<String> = HashSet::new();

    for spec in specs {
        let metric = resolve_metric(meta, spec, &ctx)?;
        for value in &metric.values {
            if value.key.is_empty() {
                return Err(PipelineError::structural(format!(
                    "metric '{}': empty value key",
                    spec.alias
                )));
            }
            if !seen_keys.insert(value.key.clone()) {
                return Err(PipelineError::structural(format!(
                    "metric '{}': duplicate value key '{}'",
                    spec.alias, value.key
                )));
            }
        }
        resolved.push(metric);
    }
    Ok(resolved)
}

fn resolve_metric(
    meta: &TableMeta,
    spec: &MetricSpec,
    ctx: &ResolveContext,
) -> PipelineResult<ResolvedMetric> {
    let code = spec.code.resolve(ctx);

    let Some(code) = code else {
        // Virtual metric: no backing dimension, one synthetic value.
        if spec.values.len() > 1 {
            return Err(PipelineError::structural(format!(
                "metric '{}': virtual metric declares {} values, expected one",
                spec.alias,
                spec.values.len()
            )));
        }
        let value = spec.values.first().cloned().unwrap_or_else(|| {
            MetricValueSpec::virtual_key(spec.alias.clone())
        });
        return Ok(ResolvedMetric {
            alias: spec.alias.clone(),
            code: None,
            has_dimension: false,
            values: vec![ResolvedMetricValue {
                key: value.key,
                code: None,
                label: value.label.unwrap_or_else(|| spec.alias.clone()),
                unit: value.unit.or_else(|| spec.unit.clone()),
            }],
            unit: spec.unit.clone(),
        });
    };

    let var = meta.variable(&code).ok_or_else(|| {
        PipelineError::structural(format!(
            "metric '{}': dimension '{}' missing from table metadata",
            spec.alias, code
        ))
    })?;
    check_text(&spec.alias, spec.text.as_deref(), var)?;
    let base = build_value_pairs(var);

    let values: Vec<ResolvedMetricValue> = if spec.values.is_empty() {
        base.iter()
            .map(|p| ResolvedMetricValue {
                key: p.code.clone(),
                code: Some(p.code.clone()),
                label: p.label.clone(),
                unit: spec.unit.clone(),
            })
            .collect()
    } else {
        let mut out = Vec::with_capacity(spec.values.len());
        for vs in &spec.values {
            let vcode = vs.code.as_deref().ok_or_else(|| {
                PipelineError::structural(format!(
                    "metric '{}': value '{}' has no code but the dimension '{}' is real",
                    spec.alias, vs.key, code
                ))
            })?;
            let pair = base.iter().find(|p| p.code == vcode).ok_or_else(|| {
                PipelineError::structural(format!(
                    "metric '{}': declared value '{}' absent from dimension '{}'",
                    spec.alias, vcode, code
                ))
            })?;
            out.push(ResolvedMetricValue {
                key: vs.key.clone(),
                code: Some(pair.code.clone()),
                label: vs.label.clone().unwrap_or_else(|| pair.label.clone()),
                unit: vs.unit.clone().or_else(|| spec.unit.clone()),
            });
        }
        out
    };

    if values.is_empty() {
        return Err(PipelineError::structural(format!(
            "metric '{}': dimension '{}' resolved zero values",
            spec.alias, code
        )));
    }

    Ok(ResolvedMetric {
        alias: spec.alias.clone(),
        code: Some(code),
        has_dimension: true,
        values,
        unit: spec.unit.clone(),
    })
}

fn check_text(alias: &str, expected: Option<&str>, var: &Variable) -> PipelineResult<()> {
    if let Some(expected) = expected {
        if !var.text.eq_ignore_ascii_case(expected) {
            return Err(PipelineError::structural(format!(
                "'{}': dimension '{}' text is '{}', expected '{}'",
                alias, var.code, var.text, expected
            )));
        }
    }
    Ok(())
}
