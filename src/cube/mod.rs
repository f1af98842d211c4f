//! Cube decoding: both PxWeb response shapes collapse into one lookup table
//! keyed by the canonical ordered dimension-code tuple.

pub mod coerce;
pub mod decode;

pub use coerce::{coerce_str, coerce_value, tidy_number, tidy_value};
pub use decode::{decode_cube, CubeSource};

use std::collections::HashMap;

/// Separator for serialized lookup keys. Dimension value codes never carry
/// control characters, so the unit separator cannot collide.
const KEY_SEP: char = '\u{1f}';

pub fn serialize_key<S: AsRef<str>>(codes: &[S]) -> String {
    let mut out = String::new();
    for (i, code) in codes.iter().enumerate() {
        if i > 0 {
            out.push(KEY_SEP);
        }
        out.push_str(code.as_ref());
    }
    out
}

/// Uniform decode output: dimension order plus the value lookup. The order
/// is the same positional state the query was built with.
#[derive(Debug, Clone)]
pub struct DecodedCube {
    pub dim_codes: Vec<String>,
    pub lookup: HashMap<String, Option<f64>>,
    pub source: CubeSource,
}

impl DecodedCube {
    /// Point lookup from an assignment map. A dimension missing from the
    /// assignments, or a combination absent from the cube, yields `None`;
    /// not every combination need exist.
    pub fn value_for(&self, assignments: &HashMap<String, String>) -> Option<f64> {
        let mut codes: Vec<&str> = Vec::with_capacity(self.dim_codes.len());
        for dim in &self.dim_codes {
            codes.push(assignments.get(dim)?.as_str());
        }
        self.lookup.get(&serialize_key(&codes)).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_assignment_yields_none_not_panic() {
        let mut lookup = HashMap::new();
        lookup.insert(serialize_key(&["202401", "0"]), Some(7.0));
        let cube = DecodedCube {
            dim_codes: vec!["Manudur".into(), "Eldsneyti".into()],
            lookup,
            source: CubeSource::default(),
        };

        let mut assignments = HashMap::new();
        assignments.insert("Manudur".to_string(), "202401".to_string());
        assert_eq!(cube.value_for(&assignments), None);

        assignments.insert("Eldsneyti".to_string(), "0".to_string());
        assert_eq!(cube.value_for(&assignments), Some(7.0));

        assignments.insert("Eldsneyti".to_string(), "5".to_string());
        assert_eq!(cube.value_for(&assignments), None);
    }
}
