//! Population by region, annual. The sex dimension is pinned to the total
//! so every query and record carries one fixed assignment for it.

use serde_json::json;

use crate::meta::Matcher;
use crate::pipeline::TableConfig;
use crate::resolve::{AxisSpec, CodeResolver, MetricSpec, ValueSelection, ValueSpec};
use crate::walk::RecordOutcome;

pub fn config() -> TableConfig {
    let time = AxisSpec::new(
        "period",
        CodeResolver::Match(vec![Matcher::code("Ar"), Matcher::regex("(?i)year")]),
    );

    let region = AxisSpec::new(
        "region",
        CodeResolver::Match(vec![
            Matcher::text("Region"),
            Matcher::regex("(?i)landsvaedi|region"),
        ]),
    )
    // strip the sorting prefix some tables put in front of region names
    .to_label(|p| {
        p.label
            .split_once(' ')
            .filter(|(head, _)| head.chars().all(|c| c.is_ascii_digit()))
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_else(|| p.label.clone())
    });

    let sex = AxisSpec::new(
        "sex",
        CodeResolver::Match(vec![Matcher::text("Sex"), Matcher::regex("(?i)kyn|sex")]),
    )
    .values(ValueSelection::Explicit(vec![ValueSpec::new("0")]))
    .pinned();

    let mut cfg = TableConfig::new(
        "population-region",
        &["Ibuar", "mannfjoldi", "yfirlit", "MAN02001.px"],
        time,
        Box::new(|ctx| {
            let region = match ctx.axis("region") {
                Some(entry) => entry,
                None => return RecordOutcome::None,
            };
            RecordOutcome::One(json!({
                "period": ctx.period,
                "region": region.label,
                "regionCode": region.code,
                "population": ctx.value("population"),
            }))
        }),
    );
    cfg.axes = vec![region, sex];
    cfg.metrics = vec![MetricSpec::virtual_metric("population").unit("people")];
    cfg.granularity = Some("year".into());
    cfg.build_meta = Some(Box::new(|ctx| {
        let mut meta = ctx.default_meta;
        if meta.source.is_none() {
            meta.source = Some("Statistics Iceland".into());
        }
        meta
    }));
    cfg
}
