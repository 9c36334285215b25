use std::collections::HashSet;
use std::path::Path;
use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser, Tree};

use crate::error::{EnclavegenError, Result};

/// Declarator shape of a parameter, as written in the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawShape {
    /// A value parameter, e.g. `int n`
    Plain,

    /// Anything pointer-like: `char *p`, `char p[]`, `int (*cb)(void)`, `char *p[4]`
    Pointer,

    /// A fixed-size array; the extent is the verbatim size expression
    Array { extent: String },
}

/// One parameter of a declaration, before marshalling validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawParameter {
    /// Base type as spelled in the source (element type for arrays)
    pub type_name: String,

    /// Parameter name; empty for unnamed prototype parameters
    pub name: String,

    /// Declarator shape
    pub shape: RawShape,
}

/// A top-level function declaration found in a single source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDeclaration {
    /// Function name
    pub name: String,

    /// Return type as spelled in the source
    pub return_type: String,

    /// Declared parameters, in order
    pub parameters: Vec<RawParameter>,

    /// Verbatim body text including braces; `None` for a prototype
    pub body: Option<String>,
}

impl RawDeclaration {
    /// Body text of the declaration, if one is physically present
    pub fn extract_body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

/// C source analyzer using Tree-sitter
///
/// Works at the syntax level: inclusions are never expanded, so declarations
/// reached only via `#include` do not appear, and call collection records only
/// direct calls through a plain identifier. Calls through function pointers,
/// struct members or parenthesized expressions are silently excluded.
pub struct SourceAnalyzer {
    parser: Parser,
}

impl SourceAnalyzer {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let c_language = tree_sitter_c::language();
        parser.set_language(&c_language)
            .map_err(|e| EnclavegenError::Analyzer(format!("Failed to set C language: {}", e)))?;

        Ok(Self { parser })
    }

    /// Collect the names of all directly called functions in a file
    pub fn collect_calls<P: AsRef<Path>>(&mut self, file: P) -> Result<HashSet<String>> {
        let source = read_lossy(file.as_ref())?;
        let tree = self.parse_source(&source, file.as_ref())?;

        let mut calls = HashSet::new();
        collect_calls_in(tree.root_node(), &source, &mut calls);
        Ok(calls)
    }

    /// Collect all top-level function declarations physically present in a file
    ///
    /// Both definitions and body-less prototypes are returned; preprocessor
    /// conditionals and `extern` blocks are transparent for top-levelness.
    pub fn collect_declarations<P: AsRef<Path>>(&mut self, file: P) -> Result<Vec<RawDeclaration>> {
        let source = read_lossy(file.as_ref())?;
        let tree = self.parse_source(&source, file.as_ref())?;

        let mut declarations = Vec::new();
        collect_declarations_in(tree.root_node(), &source, &mut declarations);
        Ok(declarations)
    }

    fn parse_source(&mut self, source: &str, file: &Path) -> Result<Tree> {
        self.parser.parse(source, None).ok_or_else(|| {
            EnclavegenError::Analyzer(format!("Failed to parse {}", file.display()))
        })
    }
}

/// Read a file as text, replacing invalid UTF-8 instead of failing
fn read_lossy(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn node_text(node: Node, source: &str) -> String {
    source[node.byte_range()].to_string()
}

fn collect_calls_in(node: Node, source: &str, calls: &mut HashSet<String>) {
    if node.kind() == "call_expression" {
        if let Some(callee) = node.child_by_field_name("function") {
            if callee.kind() == "identifier" {
                calls.insert(node_text(callee, source));
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_calls_in(child, source, calls);
    }
}

fn collect_declarations_in(node: Node, source: &str, out: &mut Vec<RawDeclaration>) {
    let mut cursor = node.walk();

    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "function_definition" => {
                if let Some(decl) = parse_definition(child, source) {
                    out.push(decl);
                }
            }
            "declaration" => {
                if let Some(decl) = parse_prototype(child, source) {
                    out.push(decl);
                }
            }
            // Top-level functions may sit inside preprocessor conditionals
            // or extern "C" blocks
            "preproc_if" | "preproc_ifdef" | "preproc_else" | "preproc_elif"
            | "linkage_specification" | "declaration_list" => {
                collect_declarations_in(child, source, out);
            }
            _ => {}
        }
    }
}

/// Parse a `function_definition` node into a declaration with a body
fn parse_definition(node: Node, source: &str) -> Option<RawDeclaration> {
    let base_type = node_text(node.child_by_field_name("type")?, source);
    let declarator = node.child_by_field_name("declarator")?;
    let (func_decl, return_type) = unwrap_function_declarator(declarator, &base_type)?;

    let name_node = func_decl.child_by_field_name("declarator")?;
    if name_node.kind() != "identifier" {
        return None;
    }

    let parameters = func_decl
        .child_by_field_name("parameters")
        .map(|list| parse_parameters(list, source))
        .unwrap_or_default();

    let body = node
        .child_by_field_name("body")
        .map(|body| node_text(body, source));

    Some(RawDeclaration {
        name: node_text(name_node, source),
        return_type,
        parameters,
        body,
    })
}

/// Parse a `declaration` node into a body-less prototype, if it declares a function
fn parse_prototype(node: Node, source: &str) -> Option<RawDeclaration> {
    let base_type = node_text(node.child_by_field_name("type")?, source);

    let mut cursor = node.walk();
    for child in node.children_by_field_name("declarator", &mut cursor) {
        if let Some((func_decl, return_type)) = unwrap_function_declarator(child, &base_type) {
            let name_node = func_decl.child_by_field_name("declarator")?;
            if name_node.kind() != "identifier" {
                return None;
            }

            let parameters = func_decl
                .child_by_field_name("parameters")
                .map(|list| parse_parameters(list, source))
                .unwrap_or_default();

            return Some(RawDeclaration {
                name: node_text(name_node, source),
                return_type,
                parameters,
                body: None,
            });
        }
    }

    None
}

/// Descend through pointer declarators to the function declarator, accumulating
/// pointer markers into the return type
fn unwrap_function_declarator<'a>(
    mut node: Node<'a>,
    base_type: &str,
) -> Option<(Node<'a>, String)> {
    let mut return_type = base_type.to_string();

    loop {
        match node.kind() {
            "function_declarator" => return Some((node, return_type)),
            "pointer_declarator" => {
                return_type.push('*');
                node = node.child_by_field_name("declarator")?;
            }
            _ => return None,
        }
    }
}

fn parse_parameters(list: Node, source: &str) -> Vec<RawParameter> {
    let mut parameters = Vec::new();
    let mut cursor = list.walk();

    for param in list.named_children(&mut cursor) {
        if param.kind() != "parameter_declaration" {
            continue;
        }

        let Some(type_node) = param.child_by_field_name("type") else {
            continue;
        };
        let type_name = node_text(type_node, source);

        let Some(declarator) = param.child_by_field_name("declarator") else {
            // `void` parameter list, or an unnamed abstract parameter
            if type_name != "void" {
                parameters.push(RawParameter {
                    type_name,
                    name: String::new(),
                    shape: RawShape::Plain,
                });
            }
            continue;
        };

        parameters.push(parse_declarator(declarator, source, type_name));
    }

    parameters
}

/// Classify one parameter declarator into name + shape
fn parse_declarator(node: Node, source: &str, type_name: String) -> RawParameter {
    match node.kind() {
        "identifier" => RawParameter {
            type_name,
            name: node_text(node, source),
            shape: RawShape::Plain,
        },
        "array_declarator" => {
            let inner = node.child_by_field_name("declarator");
            let name = inner
                .filter(|n| n.kind() == "identifier")
                .map(|n| node_text(n, source))
                .unwrap_or_default();

            // Array of pointers (`char *p[4]`) is pointer-shaped; so is an
            // unsized array (`char p[]`), which decays to a pointer
            let element_is_pointer = inner.map_or(false, |n| n.kind() != "identifier");
            match node.child_by_field_name("size") {
                Some(size) if !element_is_pointer => RawParameter {
                    type_name,
                    name,
                    shape: RawShape::Array {
                        extent: node_text(size, source),
                    },
                },
                _ => RawParameter {
                    type_name,
                    name: find_identifier(node, source).unwrap_or(name),
                    shape: RawShape::Pointer,
                },
            }
        }
        // `pointer_declarator`, `function_declarator`, abstract declarators
        _ => RawParameter {
            type_name,
            name: find_identifier(node, source).unwrap_or_default(),
            shape: RawShape::Pointer,
        },
    }
}

/// First identifier anywhere under a declarator
fn find_identifier(node: Node, source: &str) -> Option<String> {
    if node.kind() == "identifier" {
        return Some(node_text(node, source));
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(name) = find_identifier(child, source) {
            return Some(name);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_source(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_collect_direct_calls() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_source(
            &dir,
            "main.c",
            r#"
int main() {
    char frame[37632];
    char result[328];
    embedding(frame, result);
    report(postprocess(result));
    return 0;
}
"#,
        );

        let mut analyzer = SourceAnalyzer::new().unwrap();
        let calls = analyzer.collect_calls(&file).unwrap();

        assert!(calls.contains("embedding"));
        assert!(calls.contains("report"));
        assert!(calls.contains("postprocess"));
        assert!(!calls.contains("main"));
    }

    #[test]
    fn test_indirect_calls_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_source(
            &dir,
            "dispatch.c",
            r#"
void dispatch(int (*handler)(int), struct ops *ops) {
    (*handler)(1);
    ops->run(2);
    direct();
}
"#,
        );

        let mut analyzer = SourceAnalyzer::new().unwrap();
        let calls = analyzer.collect_calls(&file).unwrap();

        assert_eq!(calls.len(), 1);
        assert!(calls.contains("direct"));
    }

    #[test]
    fn test_collect_declarations_definitions_and_prototypes() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_source(
            &dir,
            "embedding.c",
            r#"
int ping(void);

int embedding(char img[1*112*112*3], char res[328]) {
    run_model(img, res);
    return 0;
}
"#,
        );

        let mut analyzer = SourceAnalyzer::new().unwrap();
        let decls = analyzer.collect_declarations(&file).unwrap();

        assert_eq!(decls.len(), 2);

        assert_eq!(decls[0].name, "ping");
        assert!(decls[0].extract_body().is_none());
        assert!(decls[0].parameters.is_empty());

        let embedding = &decls[1];
        assert_eq!(embedding.name, "embedding");
        assert_eq!(embedding.return_type, "int");
        assert_eq!(embedding.parameters.len(), 2);
        assert_eq!(
            embedding.parameters[0].shape,
            RawShape::Array { extent: "1*112*112*3".to_string() }
        );
        assert_eq!(
            embedding.parameters[1].shape,
            RawShape::Array { extent: "328".to_string() }
        );
        let body = embedding.extract_body().unwrap();
        assert!(body.starts_with('{'));
        assert!(body.contains("run_model(img, res);"));
        assert!(body.ends_with('}'));
    }

    #[test]
    fn test_pointer_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_source(
            &dir,
            "shapes.c",
            r#"
void shapes(char *raw, char unsized[], char *table[4], int n) {
}
"#,
        );

        let mut analyzer = SourceAnalyzer::new().unwrap();
        let decls = analyzer.collect_declarations(&file).unwrap();
        let params = &decls[0].parameters;

        assert_eq!(params.len(), 4);
        assert_eq!(params[0].shape, RawShape::Pointer);
        assert_eq!(params[0].name, "raw");
        assert_eq!(params[1].shape, RawShape::Pointer);
        assert_eq!(params[2].shape, RawShape::Pointer);
        assert_eq!(params[3].shape, RawShape::Plain);
        assert_eq!(params[3].name, "n");
    }

    #[test]
    fn test_pointer_return_type() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_source(
            &dir,
            "ret.c",
            "char *version(void) { return 0; }\n",
        );

        let mut analyzer = SourceAnalyzer::new().unwrap();
        let decls = analyzer.collect_declarations(&file).unwrap();

        assert_eq!(decls[0].name, "version");
        assert_eq!(decls[0].return_type, "char*");
    }

    #[test]
    fn test_declarations_inside_preproc_guards() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_source(
            &dir,
            "guarded.c",
            r#"
#ifdef USE_TF
int infer(char in[8]) { return tf_infer(in); }
#endif
"#,
        );

        let mut analyzer = SourceAnalyzer::new().unwrap();
        let decls = analyzer.collect_declarations(&file).unwrap();

        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "infer");
    }

    #[test]
    fn test_non_c_file_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_source(&dir, "notes.txt", "just some notes, no code here\n");

        let mut analyzer = SourceAnalyzer::new().unwrap();
        assert!(analyzer.collect_calls(&file).unwrap().is_empty());
        assert!(analyzer.collect_declarations(&file).unwrap().is_empty());
    }
}
