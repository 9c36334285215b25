use std::path::{Path, PathBuf};
use regex::Regex;

use crate::error::{EnclavegenError, Result};
use super::resolver::FunctionSignature;
use super::shaper;

/// Opens a block repeated per boundary function of the current file
const MARKER_BEGIN: &str = "**begin**";
/// Opens a block repeated per entry of the global secure list
const MARKER_GLOBAL_SECURE: &str = "**gbegin**";
/// Opens a block repeated per entry of the global insecure list
const MARKER_GLOBAL_INSECURE: &str = "**igbegin**";
/// Closes the open block
const MARKER_END: &str = "**end**";

/// The fixed set of substitution keys a template may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Project,
    Src,
    SrcContent,
    SrcPath,
    RootCmake,
    FuncName,
    Ret,
    Params,
    ParamNames,
    EdlParams,
}

impl Key {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "project" => Some(Key::Project),
            "src" => Some(Key::Src),
            "src_content" => Some(Key::SrcContent),
            "src_path" => Some(Key::SrcPath),
            "root_cmake" => Some(Key::RootCmake),
            "func_name" => Some(Key::FuncName),
            "ret" => Some(Key::Ret),
            "params" => Some(Key::Params),
            "param_names" => Some(Key::ParamNames),
            "edl_params" => Some(Key::EdlParams),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Placeholder(Key),
}

type Line = Vec<Segment>;

/// Which boundary-function list a repeated block is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockBinding {
    CurrentFile,
    GlobalSecure,
    GlobalInsecure,
}

#[derive(Debug, Clone)]
enum BodyItem {
    Line(Line),
    Block { binding: BlockBinding, lines: Vec<Line> },
}

/// A template document parsed into literal runs, placeholders and block
/// regions; parsed once, expanded many times
#[derive(Debug, Clone)]
pub struct TemplateDocument {
    path: Line,
    body: Vec<BodyItem>,
}

/// Substitution context for template expansion
///
/// The per-function fields are populated only while a repeated block is being
/// expanded; outside a block they substitute as empty text.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub project: String,
    pub src: String,
    pub src_content: String,
    pub src_path: String,
    pub root_cmake: String,
    pub func_name: String,
    pub ret: String,
    pub params: String,
    pub param_names: String,
    pub edl_params: String,
}

impl TemplateContext {
    fn value(&self, key: Key) -> &str {
        match key {
            Key::Project => &self.project,
            Key::Src => &self.src,
            Key::SrcContent => &self.src_content,
            Key::SrcPath => &self.src_path,
            Key::RootCmake => &self.root_cmake,
            Key::FuncName => &self.func_name,
            Key::Ret => &self.ret,
            Key::Params => &self.params,
            Key::ParamNames => &self.param_names,
            Key::EdlParams => &self.edl_params,
        }
    }

    /// Copy of this context with the per-function fields set from `function`
    fn with_function(&self, function: &FunctionSignature) -> Self {
        let mut ctx = self.clone();
        ctx.func_name = function.name.clone();
        ctx.ret = function.return_type.clone();
        ctx.params = shaper::render_params(&function.parameters);
        ctx.param_names = shaper::render_param_names(&function.parameters);
        ctx.edl_params = shaper::render_edl_params(&function.parameters);
        ctx
    }
}

/// Expands template documents against a substitution context
pub struct TemplateEngine {
    placeholder: Regex,
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self {
            placeholder: Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
                .expect("Invalid placeholder regex"),
        }
    }

    /// Parse a template document
    ///
    /// The first non-empty line must be `path: <templated-path>`. Unknown
    /// placeholder keys are kept as literal text so template typos stay
    /// visible in the output. Block structure is validated strictly: an
    /// unterminated block, a stray end marker, or a begin marker while a
    /// block is open are all errors.
    pub fn parse(&self, source: &str, origin: &Path) -> Result<TemplateDocument> {
        let mut lines = source.lines();

        let path = loop {
            let Some(line) = lines.next() else {
                return Err(self.malformed(origin, "missing `path:` declaration"));
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Some(rest) = trimmed.strip_prefix("path:") else {
                return Err(self.malformed(origin, "first non-empty line must be `path: <path>`"));
            };
            break self.tokenize(rest.trim());
        };

        let mut body = Vec::new();
        let mut open_block: Option<(BlockBinding, Vec<Line>)> = None;

        for line in lines {
            let binding = if line.contains(MARKER_GLOBAL_INSECURE) {
                Some(BlockBinding::GlobalInsecure)
            } else if line.contains(MARKER_GLOBAL_SECURE) {
                Some(BlockBinding::GlobalSecure)
            } else if line.contains(MARKER_BEGIN) {
                Some(BlockBinding::CurrentFile)
            } else {
                None
            };

            if let Some(binding) = binding {
                if open_block.is_some() {
                    return Err(self.malformed(origin, "blocks do not nest"));
                }
                open_block = Some((binding, Vec::new()));
                continue;
            }

            if line.contains(MARKER_END) {
                let Some((binding, block_lines)) = open_block.take() else {
                    return Err(self.malformed(origin, "end marker without an open block"));
                };
                body.push(BodyItem::Block { binding, lines: block_lines });
                continue;
            }

            let tokenized = self.tokenize(line);
            match &mut open_block {
                Some((_, block_lines)) => block_lines.push(tokenized),
                None => body.push(BodyItem::Line(tokenized)),
            }
        }

        if open_block.is_some() {
            return Err(self.malformed(origin, "unterminated block"));
        }

        Ok(TemplateDocument { path, body })
    }

    /// Expand a parsed document into its output path and text
    pub fn expand(
        &self,
        doc: &TemplateDocument,
        ctx: &TemplateContext,
        file_functions: &[FunctionSignature],
        global_secure: &[FunctionSignature],
        global_insecure: &[FunctionSignature],
    ) -> (PathBuf, String) {
        let path = PathBuf::from(render_line(&doc.path, ctx));

        let mut text = String::new();
        for item in &doc.body {
            match item {
                BodyItem::Line(line) => {
                    text.push_str(&render_line(line, ctx));
                    text.push('\n');
                }
                BodyItem::Block { binding, lines } => {
                    let list = match binding {
                        BlockBinding::CurrentFile => file_functions,
                        BlockBinding::GlobalSecure => global_secure,
                        BlockBinding::GlobalInsecure => global_insecure,
                    };

                    for function in list {
                        let fctx = ctx.with_function(function);
                        for line in lines {
                            text.push_str(&render_line(line, &fctx));
                            text.push('\n');
                        }
                    }
                }
            }
        }

        (path, text)
    }

    /// Split one line into literal runs and recognized placeholders
    fn tokenize(&self, line: &str) -> Line {
        let mut segments = Vec::new();
        let mut last = 0;

        for captures in self.placeholder.captures_iter(line) {
            let whole = captures.get(0).unwrap();
            let name = captures.get(1).unwrap().as_str();

            match Key::parse(name) {
                Some(key) => {
                    if whole.start() > last {
                        segments.push(Segment::Literal(line[last..whole.start()].to_string()));
                    }
                    segments.push(Segment::Placeholder(key));
                    last = whole.end();
                }
                // Unrecognized key: leave the `${...}` text in place
                None => {}
            }
        }

        if last < line.len() {
            segments.push(Segment::Literal(line[last..].to_string()));
        }

        segments
    }

    fn malformed(&self, origin: &Path, reason: &str) -> EnclavegenError {
        EnclavegenError::Template(format!("{}: {}", origin.display(), reason))
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn render_line(line: &Line, ctx: &TemplateContext) -> String {
    let mut out = String::new();
    for segment in line {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder(key) => out.push_str(ctx.value(*key)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shaper::ParameterDescriptor;

    fn engine() -> TemplateEngine {
        TemplateEngine::new()
    }

    fn origin() -> PathBuf {
        PathBuf::from("test.tpl")
    }

    fn func(name: &str, ret: &str, params: &[(&str, &str, Option<&str>)]) -> FunctionSignature {
        FunctionSignature {
            name: name.to_string(),
            return_type: ret.to_string(),
            parameters: params
                .iter()
                .map(|(t, n, len)| ParameterDescriptor {
                    type_name: t.to_string(),
                    name: n.to_string(),
                    array_len: len.map(str::to_string),
                })
                .collect(),
            body: "{ }".to_string(),
        }
    }

    fn ctx() -> TemplateContext {
        TemplateContext {
            project: "face_rec".to_string(),
            src: "embedding".to_string(),
            src_path: "secure/embedding.c".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_path_is_error() {
        let err = engine().parse("just a body line\n", &origin()).unwrap_err();
        assert!(err.to_string().contains("path:"));

        assert!(engine().parse("", &origin()).is_err());
    }

    #[test]
    fn test_path_line_is_templated() {
        let doc = engine()
            .parse("path: host/${src}_proxy.c\nbody\n", &origin())
            .unwrap();
        let (path, text) = engine().expand(&doc, &ctx(), &[], &[], &[]);

        assert_eq!(path, PathBuf::from("host/embedding_proxy.c"));
        assert_eq!(text, "body\n");
    }

    #[test]
    fn test_scalar_substitution_outside_blocks() {
        let doc = engine()
            .parse("path: out.txt\nproject=${project} src=${src_path}\n", &origin())
            .unwrap();
        let (_, text) = engine().expand(&doc, &ctx(), &[], &[], &[]);

        assert_eq!(text, "project=face_rec src=secure/embedding.c\n");
    }

    #[test]
    fn test_function_keys_empty_outside_blocks() {
        let doc = engine()
            .parse("path: out.txt\nname=[${func_name}]\n", &origin())
            .unwrap();
        let (_, text) = engine().expand(&doc, &ctx(), &[], &[], &[]);

        assert_eq!(text, "name=[]\n");
    }

    #[test]
    fn test_unknown_placeholder_left_unexpanded() {
        let doc = engine()
            .parse("path: out.txt\nhello ${nonsense} and ${project}\n", &origin())
            .unwrap();
        let (_, text) = engine().expand(&doc, &ctx(), &[], &[], &[]);

        assert_eq!(text, "hello ${nonsense} and face_rec\n");
    }

    #[test]
    fn test_per_file_block_repeats_in_order() {
        let source = "path: out.txt\n**begin**\n${ret} ${func_name}(${params});\n**end**\n";
        let doc = engine().parse(source, &origin()).unwrap();

        let functions = vec![
            func("embedding", "int", &[("char", "img", Some("8")), ("char", "res", Some("4"))]),
            func("reset", "void", &[]),
        ];
        let (_, text) = engine().expand(&doc, &ctx(), &functions, &[], &[]);

        assert_eq!(text, "int embedding(char* img, char* res);\nvoid reset();\n");
    }

    #[test]
    fn test_global_blocks_use_global_lists() {
        let source = concat!(
            "path: out.edl\n",
            "trusted:\n",
            "**gbegin**\n",
            "  public ${ret} ${func_name}(${edl_params});\n",
            "**end**\n",
            "untrusted:\n",
            "**igbegin**\n",
            "  ${ret} ${func_name}(${param_names});\n",
            "**end**\n",
        );
        let doc = engine().parse(source, &origin()).unwrap();

        let secure = vec![func("embedding", "int", &[("char", "img", Some("64"))])];
        let insecure = vec![func("render", "void", &[("int", "frame", None)])];
        let (_, text) = engine().expand(&doc, &ctx(), &[], &secure, &insecure);

        assert_eq!(
            text,
            "trusted:\n  public int embedding([in, out, size=64] char* img);\nuntrusted:\n  void render(frame);\n"
        );
    }

    #[test]
    fn test_empty_list_emits_nothing_for_block() {
        let source = "path: out.txt\nbefore\n**begin**\n${func_name}\n**end**\nafter\n";
        let doc = engine().parse(source, &origin()).unwrap();
        let (_, text) = engine().expand(&doc, &ctx(), &[], &[], &[]);

        assert_eq!(text, "before\nafter\n");
    }

    #[test]
    fn test_unterminated_block_is_error() {
        let source = "path: out.txt\n**begin**\n${func_name}\n";
        let err = engine().parse(source, &origin()).unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_stray_end_is_error() {
        let source = "path: out.txt\n**end**\n";
        assert!(engine().parse(source, &origin()).is_err());
    }

    #[test]
    fn test_nested_begin_is_error() {
        let source = "path: out.txt\n**begin**\n**gbegin**\n**end**\n";
        let err = engine().parse(source, &origin()).unwrap_err();
        assert!(err.to_string().contains("nest"));
    }

    #[test]
    fn test_leading_blank_lines_before_path() {
        let doc = engine().parse("\n\npath: out.txt\nx\n", &origin()).unwrap();
        let (path, text) = engine().expand(&doc, &ctx(), &[], &[], &[]);

        assert_eq!(path, PathBuf::from("out.txt"));
        assert_eq!(text, "x\n");
    }
}
