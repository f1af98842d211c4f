//! Energy consumption by source. One combination fans out into one record
//! per energy source; combinations with no data at all are skipped.

use serde_json::json;

use crate::meta::Matcher;
use crate::pipeline::TableConfig;
use crate::resolve::{AxisSpec, CodeResolver, MetricSpec, MetricValueSpec};
use crate::walk::RecordOutcome;

const SOURCES: &[(&str, &str)] = &[
    ("electricity", "Electricity"),
    ("hot_water", "Geothermal hot water"),
    ("oil", "Oil products"),
];

pub fn config() -> TableConfig {
    let time = AxisSpec::new(
        "period",
        CodeResolver::Match(vec![Matcher::code("Ar"), Matcher::regex("(?i)year")]),
    );

    let source = MetricSpec::new(
        "source",
        CodeResolver::Match(vec![
            Matcher::text("Energy source"),
            Matcher::regex("(?i)orkugjafi|energy source"),
        ]),
    )
    .values(vec![
        MetricValueSpec::new("electricity", "1")
            .label("Electricity")
            .unit("GWh"),
        MetricValueSpec::new("hot_water", "2")
            .label("Geothermal hot water")
            .unit("GWh"),
        MetricValueSpec::new("oil", "3").label("Oil products").unit("GWh"),
    ]);

    let mut cfg = TableConfig::new(
        "energy-consumption",
        &["Umhverfi", "orkumal", "orkunotkun", "IDN02101.px"],
        time,
        Box::new(|ctx| {
            let rows: Vec<_> = SOURCES
                .iter()
                .filter_map(|&(key, label)| {
                    ctx.number(key).map(|value| {
                        json!({
                            "period": ctx.period,
                            "source": label,
                            "sourceKey": key,
                            "gwh": value,
                        })
                    })
                })
                .collect();
            // a period the table has not published yet produces no rows
            if rows.is_empty() {
                RecordOutcome::None
            } else {
                RecordOutcome::Many(rows)
            }
        }),
    );
    cfg.metrics = vec![source];
    cfg.granularity = Some("year".into());
    cfg.notes = vec!["Preliminary figures for the most recent year.".into()];
    cfg
}
