mod engine;
mod session;

// Boundary inference
mod analyzer;
mod extractor;
mod resolver;
mod shaper;

// Template expansion
mod template;

pub use analyzer::{RawDeclaration, RawParameter, RawShape, SourceAnalyzer};
pub use extractor::CallGraphExtractor;
pub use resolver::{BoundaryResolver, FunctionSignature};
pub use session::{GenerationSession, Partition};
pub use shaper::ParameterDescriptor;
pub use template::{TemplateContext, TemplateDocument, TemplateEngine};

// Export the main engine
pub use engine::Engine;
