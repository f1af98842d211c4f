//! Consumer price index: a flat monthly table with two measures read off a
//! real metric dimension, pinned to the current index base via a static
//! query filter.

use serde_json::json;

use crate::meta::Matcher;
use crate::pipeline::TableConfig;
use crate::query::StaticFilter;
use crate::resolve::{AxisSpec, CodeResolver, MetricSpec, MetricValueSpec};
use crate::walk::RecordOutcome;

pub fn config() -> TableConfig {
    let time = AxisSpec::new(
        "period",
        CodeResolver::Match(vec![Matcher::code("Manudur"), Matcher::regex("(?i)month")]),
    );

    let measure = MetricSpec::new(
        "measure",
        CodeResolver::Match(vec![
            Matcher::text("Index and changes"),
            Matcher::regex("(?i)lidur|index"),
        ]),
    )
    .values(vec![
        MetricValueSpec::new("index", "CPI")
            .label("Consumer price index")
            .unit("index points"),
        MetricValueSpec::new("monthly_change", "M-breyting")
            .label("Change from previous month")
            .unit("%"),
    ]);

    let mut cfg = TableConfig::new(
        "cpi",
        &["Efnahagur", "visitolur", "neysluverd", "VIS01000.px"],
        time,
        Box::new(|ctx| {
            RecordOutcome::One(json!({
                "period": ctx.period,
                "index": ctx.value("index"),
                "monthlyChange": ctx.value("monthly_change"),
            }))
        }),
    );
    cfg.metrics = vec![measure];
    // base-year dimension is query-only; records never iterate it
    cfg.static_filters = vec![StaticFilter::new("Grunnur", "1988M05")];
    cfg.granularity = Some("month".into());
    cfg
}
