use std::collections::HashSet;
use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use super::analyzer::SourceAnalyzer;
use super::shaper::{self, ParameterDescriptor};

/// A function accepted as crossing the partition boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub return_type: String,
    pub parameters: Vec<ParameterDescriptor>,

    /// Verbatim body text, re-emitted into the generated stubs
    pub body: String,
}

/// Determines which functions declared in a file are boundary functions
pub struct BoundaryResolver {
    analyzer: SourceAnalyzer,
}

impl BoundaryResolver {
    pub fn new() -> Result<Self> {
        Ok(Self {
            analyzer: SourceAnalyzer::new()?,
        })
    }

    /// Resolve the boundary functions declared in `file`
    ///
    /// A declaration qualifies when its name appears in the opposite
    /// partition's call-reference set. Parameters are validated for every
    /// qualifying declaration, prototypes included, so an unsafe signature in
    /// a header aborts the run; body-less declarations are then dropped.
    /// Results keep declaration order.
    pub fn resolve(
        &mut self,
        file: &Path,
        opposite_calls: &HashSet<String>,
    ) -> Result<Vec<FunctionSignature>> {
        let mut functions = Vec::new();

        for decl in self.analyzer.collect_declarations(file)? {
            if !opposite_calls.contains(&decl.name) {
                continue;
            }

            let parameters = decl
                .parameters
                .iter()
                .map(shaper::shape)
                .collect::<Result<Vec<_>>>()?;

            let body = match decl.extract_body() {
                Some(body) if !body.is_empty() => body.to_string(),
                _ => continue,
            };

            functions.push(FunctionSignature {
                name: decl.name,
                return_type: decl.return_type,
                parameters,
                body,
            });
        }

        Ok(functions)
    }
}
