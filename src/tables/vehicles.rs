//! New passenger-car registrations by month and fuel type.
//!
//! The fuel dimension carries a long tail of rare codes; only the groups the
//! charts present are kept, relabelled, and given a stable plot color.

use serde_json::{json, Value};

use crate::meta::{Matcher, ValuePair};
use crate::pipeline::TableConfig;
use crate::resolve::{AxisSpec, CodeResolver, MetricSpec, ValueSelection, ValueSpec};
use crate::walk::RecordOutcome;

const FUEL_GROUPS: &[(&str, &str, &str)] = &[
    ("0", "Petrol", "#c0392b"),
    ("1", "Diesel", "#7f8c8d"),
    ("2", "Electric", "#27ae60"),
    ("3", "Plug-in hybrid", "#2980b9"),
    ("4", "Hybrid", "#8e44ad"),
];

pub fn config() -> TableConfig {
    let time = AxisSpec::new(
        "period",
        CodeResolver::Match(vec![Matcher::code("Manudur"), Matcher::regex("(?i)month")]),
    );

    let fuel = AxisSpec::new("fuel", CodeResolver::Match(vec![
        Matcher::text("Fuel type"),
        Matcher::regex("(?i)eldsneyti|fuel"),
    ]))
    .values(ValueSelection::Resolve(Box::new(|base: &[ValuePair]| {
        FUEL_GROUPS
            .iter()
            .filter(|(code, _, _)| base.iter().any(|p| p.code == *code))
            .map(|(code, label, color)| {
                ValueSpec::labelled(*code, *label).with_extra("color", Value::from(*color))
            })
            .collect::<Vec<_>>()
    })));

    let mut cfg = TableConfig::new(
        "vehicles-fuel",
        &["Umhverfi", "samgongur", "okutaeki", "SAM03106.px"],
        time,
        Box::new(|ctx| {
            let fuel = match ctx.axis("fuel") {
                Some(entry) => entry,
                None => return RecordOutcome::None,
            };
            RecordOutcome::One(json!({
                "period": ctx.period,
                "fuel": fuel.label,
                "fuelCode": fuel.code,
                "color": fuel.extra.get("color"),
                "count": ctx.value("count"),
            }))
        }),
    );
    cfg.axes = vec![fuel];
    cfg.metrics = vec![MetricSpec::virtual_metric("count").unit("vehicles")];
    cfg.unit = Some("vehicles".into());
    cfg.notes = vec!["New registrations only; imports of used vehicles excluded.".into()];
    cfg.finalize = Some(Box::new(|meta, mut records| {
        records.sort_by(|a, b| {
            let key = |r: &Value| {
                (
                    r["period"].as_str().unwrap_or_default().to_string(),
                    r["fuelCode"].as_str().unwrap_or_default().to_string(),
                )
            };
            key(a).cmp(&key(b))
        });
        (meta, records)
    }));
    cfg
}
