use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{EnclavegenError, Result};
use super::analyzer::SourceAnalyzer;

/// Aggregates the call-reference set of one partition tree
pub struct CallGraphExtractor {
    analyzer: SourceAnalyzer,
}

impl CallGraphExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            analyzer: SourceAnalyzer::new()?,
        })
    }

    /// Union of per-file call sets over every non-directory file under the root
    ///
    /// Both partitions' sets must be fully built before boundary resolution
    /// consults them; the union is commutative, so the sorted traversal only
    /// serves reproducible logging.
    pub fn extract(&mut self, partition_root: &Path) -> Result<HashSet<String>> {
        let mut calls = HashSet::new();

        for entry in WalkDir::new(partition_root).sort_by_file_name() {
            let entry = entry.map_err(|e| EnclavegenError::FileSystem(e.to_string()))?;
            if entry.file_type().is_file() {
                calls.extend(self.analyzer.collect_calls(entry.path())?);
            }
        }

        Ok(calls)
    }
}
