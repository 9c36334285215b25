use std::collections::HashSet;
use serde::Serialize;

use super::resolver::FunctionSignature;

/// The two source partitions of a TEE project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    /// Trusted (enclave) sources
    Secure,
    /// Untrusted (host) sources
    Insecure,
}

impl Partition {
    pub fn opposite(self) -> Self {
        match self {
            Partition::Secure => Partition::Insecure,
            Partition::Insecure => Partition::Secure,
        }
    }
}

/// Accumulated state of one generation run
///
/// Created empty, grows monotonically while the partitions are processed, and
/// is read-only once project-scope templates expand. Boundary lists are
/// append-only in directory-traversal order, with no deduplication by name.
#[derive(Debug, Default, Serialize)]
pub struct GenerationSession {
    pub secure_calls: HashSet<String>,
    pub insecure_calls: HashSet<String>,
    pub secure_functions: Vec<FunctionSignature>,
    pub insecure_functions: Vec<FunctionSignature>,
}

impl GenerationSession {
    /// Call-reference set collected from the given partition
    pub fn calls(&self, partition: Partition) -> &HashSet<String> {
        match partition {
            Partition::Secure => &self.secure_calls,
            Partition::Insecure => &self.insecure_calls,
        }
    }

    /// Call-reference set a partition's declarations are matched against
    pub fn opposite_calls(&self, partition: Partition) -> &HashSet<String> {
        self.calls(partition.opposite())
    }

    /// Boundary-function list owned by the given partition
    pub fn functions_mut(&mut self, partition: Partition) -> &mut Vec<FunctionSignature> {
        match partition {
            Partition::Secure => &mut self.secure_functions,
            Partition::Insecure => &mut self.insecure_functions,
        }
    }
}
