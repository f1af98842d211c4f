//! Per-table fetcher configurations. Each module declares one table's
//! dimension specs and record shape; the engine in `pipeline` does the rest.

mod cpi;
mod energy;
mod population;
mod vehicles;

use crate::pipeline::TableConfig;

/// The full fetch registry, run sequentially by the orchestrator.
pub fn all() -> Vec<TableConfig> {
    vec![
        vehicles::config(),
        cpi::config(),
        population::config(),
        energy::config(),
    ]
}
