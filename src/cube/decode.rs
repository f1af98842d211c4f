//! Shape detection and decoding for the two PxWeb response formats.
//!
//! *Sparse*: `{columns[], data: [{key: [codes], values: [...]}]}`, one row
//! per populated combination. *Dense*: JSON-stat style
//! `{value: [...], dimension: {code: {category: {index}}}, id: [codes]}`,
//! a flat array addressed by row-major stride arithmetic.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use super::{coerce_value, serialize_key, DecodedCube};
use crate::error::{PipelineError, PipelineResult};

/// Cube-reported metadata carried into the dataset envelope.
#[derive(Debug, Clone, Default)]
pub struct CubeSource {
    pub updated: Option<String>,
    pub unit: Option<String>,
    pub title: Option<String>,
    pub source: Option<String>,
}

/// Decode either response shape against the query's dimension order.
/// `query_order` is the exact order the selection was built in; it wins over
/// whatever order the response reports.
pub fn decode_cube(body: &Value, query_order: &[String]) -> PipelineResult<DecodedCube> {
    if body.get("data").map_or(false, Value::is_array) {
        decode_sparse(body, query_order)
    } else if body.get("value").map_or(false, Value::is_array)
        && body.get("dimension").map_or(false, Value::is_object)
    {
        decode_dense(body, query_order)
    } else {
        Err(PipelineError::structural(
            "unrecognized cube shape: neither sparse rows nor dense value array",
        ))
    }
}

fn decode_sparse(body: &Value, query_order: &[String]) -> PipelineResult<DecodedCube> {
    // dimension columns, excluding measure ("c") columns
    let column_dims: Vec<String> = body
        .get("columns")
        .and_then(Value::as_array)
        .map(|cols| {
            cols.iter()
                .filter(|c| c.get("type").and_then(Value::as_str) != Some("c"))
                .filter_map(|c| c.get("code").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    // Row keys are positional in column order; when the caller's query order
    // differs, remap each key into that order.
    let (dim_codes, remap): (Vec<String>, Option<Vec<usize>>) = if query_order.is_empty() {
        (column_dims.clone(), None)
    } else if column_dims.is_empty() {
        (query_order.to_vec(), None)
    } else {
        let remap: Option<Vec<usize>> = query_order
            .iter()
            .map(|code| column_dims.iter().position(|c| c == code))
            .collect();
        match remap {
            Some(indices) => (query_order.to_vec(), Some(indices)),
            None => {
                return Err(PipelineError::structural(format!(
                    "sparse cube columns {:?} do not cover query dimensions {:?}",
                    column_dims, query_order
                )))
            }
        }
    };

    let rows = body
        .get("data")
        .and_then(Value::as_array)
        .expect("checked by shape detection");

    let mut lookup = HashMap::with_capacity(rows.len());
    for row in rows {
        let key: Vec<&str> = row
            .get("key")
            .and_then(Value::as_array)
            .map(|k| k.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if key.len() != dim_codes.len() {
            return Err(PipelineError::structural(format!(
                "sparse row key has {} parts, expected {}",
                key.len(),
                dim_codes.len()
            )));
        }
        let ordered: Vec<&str> = match &remap {
            Some(indices) => indices.iter().map(|&i| key[i]).collect(),
            None => key,
        };
        let cell = row
            .get("values")
            .and_then(Value::as_array)
            .and_then(|v| v.first())
            .or_else(|| row.get("value"));
        let value = cell.and_then(coerce_value);
        lookup.insert(serialize_key(&ordered), value);
    }

    Ok(DecodedCube {
        dim_codes,
        lookup,
        source: sparse_source(body),
    })
}

fn decode_dense(body: &Value, query_order: &[String]) -> PipelineResult<DecodedCube> {
    let dimension = body
        .get("dimension")
        .and_then(Value::as_object)
        .expect("checked by shape detection");

    // iteration order from `id`, falling back to the query order
    let dim_codes: Vec<String> = body
        .get("id")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .filter(|ids: &Vec<String>| !ids.is_empty())
        .unwrap_or_else(|| query_order.to_vec());
    if dim_codes.is_empty() {
        return Err(PipelineError::structural(
            "dense cube reports no dimension order",
        ));
    }

    // per-dimension ordinal → value-code tables
    let mut ordinal_maps: Vec<Vec<Option<String>>> = Vec::with_capacity(dim_codes.len());
    for code in &dim_codes {
        let index = dimension
            .get(code)
            .and_then(|d| d.get("category"))
            .and_then(|c| c.get("index"))
            .ok_or_else(|| {
                PipelineError::structural(format!(
                    "dense cube: dimension '{code}' has no category index"
                ))
            })?;
        ordinal_maps.push(invert_index(index)?);
    }

    // row-major strides, last dimension fastest-varying
    let cards: Vec<usize> = ordinal_maps.iter().map(Vec::len).collect();
    if cards.iter().any(|&c| c == 0) {
        return Err(PipelineError::structural(
            "dense cube: zero-cardinality dimension",
        ));
    }
    let mut strides = vec![1usize; cards.len()];
    for d in (0..cards.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * cards[d + 1];
    }

    let values = body
        .get("value")
        .and_then(Value::as_array)
        .expect("checked by shape detection");

    let mut lookup = HashMap::with_capacity(values.len());
    'samples: for (i, cell) in values.iter().enumerate() {
        let mut codes: Vec<&str> = Vec::with_capacity(dim_codes.len());
        for d in 0..dim_codes.len() {
            let ordinal = (i / strides[d]) % cards[d];
            match ordinal_maps[d].get(ordinal).and_then(Option::as_deref) {
                Some(code) => codes.push(code),
                None => {
                    // Best-effort: drop the sample but make it observable.
                    warn!(
                        dimension = %dim_codes[d],
                        ordinal,
                        index = i,
                        "dense cube sample dropped: ordinal has no value code"
                    );
                    continue 'samples;
                }
            }
        }
        lookup.insert(serialize_key(&codes), coerce_value(cell));
    }

    Ok(DecodedCube {
        dim_codes,
        lookup,
        source: dense_source(body),
    })
}

/// `category.index` is either `{code: ordinal}` or an ordered code array.
fn invert_index(index: &Value) -> PipelineResult<Vec<Option<String>>> {
    match index {
        Value::Object(map) => {
            let card = map.len();
            let mut out = vec![None; card];
            for (code, ordinal) in map {
                let ord = ordinal.as_u64().ok_or_else(|| {
                    PipelineError::structural(format!(
                        "dense cube: non-integer ordinal for value '{code}'"
                    ))
                })? as usize;
                if ord < card {
                    out[ord] = Some(code.clone());
                }
            }
            Ok(out)
        }
        Value::Array(codes) => Ok(codes
            .iter()
            .map(|c| c.as_str().map(str::to_string))
            .collect()),
        _ => Err(PipelineError::structural(
            "dense cube: category index is neither object nor array",
        )),
    }
}

fn sparse_source(body: &Value) -> CubeSource {
    let meta = body.get("metadata");
    // either a bare object or an array whose first element carries the info
    let obj = match meta {
        Some(Value::Array(items)) => items.first(),
        Some(v @ Value::Object(_)) => Some(v),
        _ => None,
    };
    let get = |key: &str| {
        obj.and_then(|o| o.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    CubeSource {
        updated: get("updated"),
        unit: get("unit"),
        title: get("title").or_else(|| get("label")),
        source: get("source"),
    }
}

fn dense_source(body: &Value) -> CubeSource {
    let get = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
    CubeSource {
        updated: get("updated"),
        unit: get("unit"),
        title: get("label").or_else(|| get("title")),
        source: get("source"),
    }
}
