//! Selection-query construction.
//!
//! The dimension order rendered here (time axis, then declared axes, then
//! metric dimensions with a real backing code, then static query-only
//! filters) is the same order the cube decoder uses to interpret response
//! keys. The two sides share `QueryPlan::dim_codes`; nothing may reorder it.

use serde::Serialize;
use serde_json::Value;

use crate::resolve::{ResolvedAxis, ResolvedMetric};

/// A query-only filter: pins one dimension the records never iterate.
#[derive(Debug, Clone)]
pub struct StaticFilter {
    pub code: String,
    pub value: String,
}

impl StaticFilter {
    pub fn new(code: impl Into<String>, value: impl Into<String>) -> Self {
        StaticFilter {
            code: code.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct QueryDimension {
    code: String,
    selection: Selection,
}

#[derive(Debug, Serialize)]
struct Selection {
    filter: &'static str,
    values: Vec<String>,
}

#[derive(Debug, Serialize)]
struct QueryBody {
    query: Vec<QueryDimension>,
    response: ResponseSpec,
}

#[derive(Debug, Serialize)]
struct ResponseSpec {
    format: &'static str,
}

/// The rendered query plus the positional state the decoder depends on.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Dimension codes in query order; reused verbatim to decode the cube.
    pub dim_codes: Vec<String>,
    /// Fixed assignments from pinned static filters, applied to every lookup.
    pub fixed: Vec<(String, String)>,
    pub body: Value,
}

/// Assemble the ordered multi-dimension selection query. `axes` must arrive
/// time-first, as produced by `resolve::resolve_axes`.
pub fn build_query(
    axes: &[ResolvedAxis],
    metrics: &[ResolvedMetric],
    static_filters: &[StaticFilter],
) -> QueryPlan {
    let mut dims: Vec<QueryDimension> = Vec::new();

    for axis in axes {
        dims.push(QueryDimension {
            code: axis.code.clone(),
            selection: Selection {
                filter: "item",
                values: axis.values.iter().map(|v| v.code.clone()).collect(),
            },
        });
    }

    for metric in metrics {
        let Some(code) = &metric.code else { continue };
        dims.push(QueryDimension {
            code: code.clone(),
            selection: Selection {
                filter: "item",
                values: metric
                    .values
                    .iter()
                    .filter_map(|v| v.code.clone())
                    .collect(),
            },
        });
    }

    for filter in static_filters {
        dims.push(QueryDimension {
            code: filter.code.clone(),
            selection: Selection {
                filter: "item",
                values: vec![filter.value.clone()],
            },
        });
    }

    let dim_codes = dims.iter().map(|d| d.code.clone()).collect();
    let fixed = static_filters
        .iter()
        .map(|f| (f.code.clone(), f.value.clone()))
        .collect();
    let body = serde_json::to_value(QueryBody {
        query: dims,
        response: ResponseSpec { format: "JSON" },
    })
    .expect("query body serializes");

    QueryPlan {
        dim_codes,
        fixed,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{ResolvedMetricValue, ResolvedValue};
    use std::collections::BTreeMap;

    fn axis(code: &str, alias: &str, codes: &[&str], is_time: bool) -> ResolvedAxis {
        ResolvedAxis {
            code: code.into(),
            alias: alias.into(),
            text: String::new(),
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
            is_time,
        }
    }

    fn metric(code: Option<&str>, keys: &[(&str, Option<&str>)]) -> ResolvedMetric {
        ResolvedMetric {
            alias: "measure".into(),
            code: code.map(|c| c.to_string()),
            has_dimension: code.is_some(),
            values: keys
                .iter()
                .map(|(k, c)| ResolvedMetricValue {
                    key: k.to_string(),
                    code: c.map(|c| c.to_string()),
                    label: k.to_string(),
                    unit: None,
                })
                .collect(),
            unit: None,
        }
    }

    #[test]
    fn renders_dimensions_in_contract_order() {
        let axes = vec![
            axis("Manudur", "period", &["202401", "202402"], true),
            axis("Eldsneyti", "fuel", &["0", "2"], false),
        ];
        let metrics = vec![metric(Some("Eining"), &[("fjoldi", Some("fjoldi"))])];
        let filters = vec![StaticFilter::new("Landsvaedi", "0")];

        let plan = build_query(&axes, &metrics, &filters);
        assert_eq!(
            plan.dim_codes,
            vec!["Manudur", "Eldsneyti", "Eining", "Landsvaedi"]
        );
        assert_eq!(
            plan.fixed,
            vec![("Landsvaedi".to_string(), "0".to_string())]
        );

        let query = plan.body["query"].as_array().unwrap();
        assert_eq!(query.len(), 4);
        assert_eq!(query[0]["code"], "Manudur");
        assert_eq!(query[0]["selection"]["filter"], "item");
        assert_eq!(
            query[1]["selection"]["values"],
            serde_json::json!(["0", "2"])
        );
        assert_eq!(plan.body["response"]["format"], "JSON");
    }

    #[test]
    fn virtual_metrics_add_no_selection() {
        let axes = vec![axis("Ar", "period", &["2023", "2024"], true)];
        let metrics = vec![metric(None, &[("count", None)])];
        let plan = build_query(&axes, &metrics, &[]);
        assert_eq!(plan.dim_codes, vec!["Ar"]);
        assert_eq!(plan.body["query"].as_array().unwrap().len(), 1);
    }
}
