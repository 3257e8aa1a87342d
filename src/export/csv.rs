//! CSV edge-list writer.

use std::path::Path;

use crate::error::{Result, SvcTopoError};
use crate::export::{edge_row, EDGE_COLUMNS};
use crate::topology::ResolvedEdge;

/// Write the edge list to a UTF-8 CSV file with the stable header row.
pub fn write_csv(edges: &[ResolvedEdge], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| SvcTopoError::Export(format!("cannot open {}: {}", path.display(), e)))?;

    writer
        .write_record(EDGE_COLUMNS)
        .map_err(|e| SvcTopoError::Export(e.to_string()))?;

    for edge in edges {
        writer
            .write_record(edge_row(edge))
            .map_err(|e| SvcTopoError::Export(e.to_string()))?;
    }

    writer
        .flush()
        .map_err(|e| SvcTopoError::Export(e.to_string()))?;

    log::info!("CSV exported: {} ({} edges)", path.display(), edges.len());
    Ok(())
}
