//! Per-table pipeline: configuration surface and the sequential state
//! machine driving one table fetch from metadata to persisted dataset.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::cube::{decode_cube, CubeSource};
use crate::envelope::{
    build_default_meta, validate_meta, Dataset, DatasetMeta, FieldMeta, MetaInputs,
};
use crate::error::{PipelineError, PipelineResult};
use crate::fetch::PxClient;
use crate::query::{build_query, StaticFilter};
use crate::resolve::{resolve_axes, resolve_metrics, AxisSpec, MetricSpec, ResolvedAxis, ResolvedMetric};
use crate::walk::{assemble_records, RecordFn};

/// Context handed to a `build_meta` override.
pub struct MetaContext<'a> {
    pub default_meta: DatasetMeta,
    pub axes: &'a [ResolvedAxis],
    pub metrics: &'a [ResolvedMetric],
    pub cube_source: &'a CubeSource,
    pub records: &'a [Value],
}

pub type MetaFn = Box<dyn Fn(MetaContext) -> DatasetMeta + Send + Sync>;
pub type FinalizeFn =
    Box<dyn Fn(DatasetMeta, Vec<Value>) -> (DatasetMeta, Vec<Value>) + Send + Sync>;

/// Everything one per-table fetcher declares. This is the only API the
/// fetchers consume; the engine owns the rest.
pub struct TableConfig {
    pub dataset_id: String,
    pub filename: String,
    pub path_parts: Vec<String>,
    pub time: AxisSpec,
    pub axes: Vec<AxisSpec>,
    pub metrics: Vec<MetricSpec>,
    pub static_filters: Vec<StaticFilter>,
    pub unit: Option<String>,
    pub extra_fields: Vec<FieldMeta>,
    pub notes: Vec<String>,
    pub granularity: Option<String>,
    pub create_record: RecordFn,
    pub build_meta: Option<MetaFn>,
    pub finalize: Option<FinalizeFn>,
}

impl TableConfig {
    pub fn new(
        dataset_id: impl Into<String>,
        path_parts: &[&str],
        time: AxisSpec,
        create_record: RecordFn,
    ) -> Self {
        let dataset_id = dataset_id.into();
        TableConfig {
            filename: format!("{dataset_id}.json"),
            dataset_id,
            path_parts: path_parts.iter().map(|s| s.to_string()).collect(),
            time,
            axes: Vec::new(),
            metrics: Vec::new(),
            static_filters: Vec::new(),
            unit: None,
            extra_fields: Vec::new(),
            notes: Vec::new(),
            granularity: None,
            create_record,
            build_meta: None,
            finalize: None,
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub dataset_id: String,
    pub filename: String,
    pub records: usize,
    pub periods: usize,
    pub path: PathBuf,
}

/// Run one table fetch end to end. Sequential, no internal parallelism; the
/// only suspension points are the two HTTP calls.
pub async fn run_table(
    client: &PxClient,
    cfg: &TableConfig,
    out_dir: &Path,
) -> PipelineResult<RunSummary> {
    let id = &cfg.dataset_id;

    let meta = client.fetch_meta(&cfg.path_parts).await?;
    debug!(dataset = %id, variables = meta.variables.len(), "metadata fetched");

    let axes = resolve_axes(&meta, &cfg.time, &cfg.axes)?;
    let metrics = resolve_metrics(&meta, &cfg.metrics, &axes)?;
    debug!(dataset = %id, axes = axes.len(), metrics = metrics.len(), "dimensions resolved");

    let plan = build_query(&axes, &metrics, &cfg.static_filters);
    let cube_body = client.fetch_cube(&cfg.path_parts, &plan.body).await?;
    let cube = decode_cube(&cube_body, &plan.dim_codes)?;
    debug!(dataset = %id, cells = cube.lookup.len(), "cube decoded");

    let records = assemble_records(&axes, &metrics, &cube, &plan.fixed, &cfg.create_record)?;
    debug!(dataset = %id, records = records.len(), "records assembled");

    let source_urls = vec![client.source_url(&cfg.path_parts)];
    let dataset = finish_dataset(cfg, &axes, &metrics, &cube.source, records, source_urls)?;

    let periods = dataset.meta.time.count;
    let path = crate::write::write_dataset(out_dir, &cfg.filename, &dataset)
        .map_err(|e| PipelineError::structural(format!("writing {}: {e:#}", cfg.filename)))?;
    info!(dataset = %id, records = dataset.records.len(), path = %path.display(), "dataset written");

    Ok(RunSummary {
        dataset_id: id.clone(),
        filename: cfg.filename.clone(),
        records: dataset.records.len(),
        periods,
        path,
    })
}

/// Envelope derivation, caller hooks, and validation. Factored out of
/// `run_table` so it is testable without a network.
pub fn finish_dataset(
    cfg: &TableConfig,
    axes: &[ResolvedAxis],
    metrics: &[ResolvedMetric],
    cube_source: &CubeSource,
    records: Vec<Value>,
    source_urls: Vec<String>,
) -> PipelineResult<Dataset> {
    let default_meta = build_default_meta(&MetaInputs {
        dataset_id: &cfg.dataset_id,
        axes,
        metrics,
        cube_source,
        source_urls,
        unit: cfg.unit.as_deref(),
        extra_fields: &cfg.extra_fields,
        notes: &cfg.notes,
        granularity: cfg.granularity.as_deref(),
    })?;

    let meta = match &cfg.build_meta {
        Some(hook) => hook(MetaContext {
            default_meta,
            axes,
            metrics,
            cube_source,
            records: &records,
        }),
        None => default_meta,
    };

    let (meta, records) = match &cfg.finalize {
        Some(hook) => hook(meta, records),
        None => (meta, records),
    };

    validate_meta(&meta)?;
    Ok(Dataset { meta, records })
}

/// Candidate API base URLs, overridable via `PX_API_BASES` (comma-separated).
pub fn api_bases() -> Vec<String> {
    match std::env::var("PX_API_BASES") {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => vec![
            "https://px.hagstofa.is/pxen/api/v1/en".to_string(),
            "https://px.hagstofa.is:443/pxen/api/v1/en".to_string(),
        ],
    }
}

/// Output directory, overridable via `PX_OUT_DIR`.
pub fn out_dir() -> PathBuf {
    std::env::var("PX_OUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}
