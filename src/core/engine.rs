use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::Result;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::EnclavegenError;
use super::{
    BoundaryResolver, CallGraphExtractor, GenerationSession, Partition, TemplateContext,
    TemplateDocument, TemplateEngine,
};

/// Main orchestration engine for Enclavegen
///
/// Runs the generation pipeline as six strictly sequential phases: reset the
/// output tree, collect both partitions' call-reference sets, process the
/// secure then the insecure tree, expand project-scope templates, and finally
/// merge-copy the raw project into the host tree with generated files taking
/// precedence.
pub struct Engine {
    config: Config,
    extractor: CallGraphExtractor,
    resolver: BoundaryResolver,
    templates: TemplateEngine,
}

impl Engine {
    /// Create a new engine instance
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        debug!("Loaded configuration: {:?}", config);

        Ok(Self {
            config,
            extractor: CallGraphExtractor::new()?,
            resolver: BoundaryResolver::new()?,
            templates: TemplateEngine::new(),
        })
    }

    /// Run the full generation pipeline over a project
    pub async fn run(
        &mut self,
        project_root: PathBuf,
        templates: Option<PathBuf>,
        output: Option<PathBuf>,
    ) -> Result<()> {
        if let Some(dir) = templates {
            self.config.templates.template_dir = dir;
        }
        if let Some(dir) = output {
            self.config.output.output_dir = dir;
        }

        let project_root = project_root.canonicalize().map_err(|e| {
            EnclavegenError::Config(format!("project root {}: {}", project_root.display(), e))
        })?;

        let secure_root = project_root.join(&self.config.project.secure_dir);
        let insecure_root = project_root.join(&self.config.project.insecure_dir);
        for (root, label) in [(&secure_root, "secure"), (&insecure_root, "insecure")] {
            if !root.is_dir() {
                return Err(EnclavegenError::Config(format!(
                    "{} tree {} is missing",
                    label,
                    root.display()
                ))
                .into());
            }
        }

        let project_name = match &self.config.project.name {
            Some(name) => name.clone(),
            None => project_root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        info!("🔍 Inferring the cross-partition interface for {}", project_name);

        // Phase 1: reset the output tree
        let output_root = self.config.output.output_dir.clone();
        if output_root.exists() {
            fs::remove_dir_all(&output_root)?;
        }

        // Phase 2: collect both call-reference sets; both must be complete
        // before either partition resolves its declarations
        let mut session = GenerationSession::default();
        session.insecure_calls = self.extractor.extract(&insecure_root)?;
        session.secure_calls = self.extractor.extract(&secure_root)?;
        debug!("insecure-world calls: {}", dump_calls(&session.insecure_calls)?);
        debug!("secure-world calls: {}", dump_calls(&session.secure_calls)?);

        // Phases 3 and 4: per-file boundary resolution and template expansion
        self.process_partition(Partition::Secure, &project_root, &project_name, &mut session)?;
        self.process_partition(Partition::Insecure, &project_root, &project_name, &mut session)?;

        info!(
            "Boundary inference complete: {} secure, {} insecure function(s)",
            session.secure_functions.len(),
            session.insecure_functions.len()
        );

        // Phase 5: project-scope templates see the fully populated lists
        self.expand_project_templates(&project_root, &project_name, &session)?;

        // Phase 6: merge the raw project into the output trees
        self.merge_copy(&project_root)?;

        info!("🎉 Generation complete: {}", output_root.display());
        Ok(())
    }

    /// Process one partition tree: resolve each file's boundary functions,
    /// expand the partition's template set for files that have any, and apply
    /// the zero-candidate policy for files that don't
    fn process_partition(
        &mut self,
        partition: Partition,
        project_root: &Path,
        project_name: &str,
        session: &mut GenerationSession,
    ) -> Result<()> {
        let (tree_name, set_name) = match partition {
            Partition::Secure => (
                self.config.project.secure_dir.clone(),
                self.config.templates.secure_set.clone(),
            ),
            Partition::Insecure => (
                self.config.project.insecure_dir.clone(),
                self.config.templates.insecure_set.clone(),
            ),
        };
        let tree_root = project_root.join(&tree_name);
        let docs = self.load_template_set(&self.config.templates.template_dir.join(&set_name))?;

        for file in files_under(&tree_root)? {
            let functions = self
                .resolver
                .resolve(&file, session.opposite_calls(partition))?;
            let rel = file.strip_prefix(project_root)?;

            if functions.is_empty() {
                // A secure file with no boundary functions belongs to the
                // enclave verbatim; an insecure one is left to the merge phase
                if partition == Partition::Secure {
                    let dest = self
                        .config
                        .output
                        .output_dir
                        .join(&self.config.output.enclave_dir)
                        .join(rel);
                    copy_file(&file, &dest)?;
                }
                continue;
            }

            debug!("{}: {} boundary function(s)", rel.display(), functions.len());

            let ctx = TemplateContext {
                project: project_name.to_string(),
                src: file
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                src_path: rel.display().to_string(),
                src_content: read_lossy(&file)?,
                ..Default::default()
            };

            for doc in &docs {
                let (rel_out, text) = self.templates.expand(
                    doc,
                    &ctx,
                    &functions,
                    &session.secure_functions,
                    &session.insecure_functions,
                );
                self.write_generated(&rel_out, &text)?;
            }

            session.functions_mut(partition).extend(functions);
        }

        Ok(())
    }

    /// Phase 5: expand the project-scope template set
    fn expand_project_templates(
        &self,
        project_root: &Path,
        project_name: &str,
        session: &GenerationSession,
    ) -> Result<()> {
        let set_dir = self
            .config
            .templates
            .template_dir
            .join(&self.config.templates.project_set);
        let docs = self.load_template_set(&set_dir)?;

        let build_path = project_root.join(&self.config.project.build_file);
        let root_cmake = match fs::read(&build_path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(
                    "build descriptor {} unreadable ({}); substituting empty text",
                    build_path.display(),
                    e
                );
                String::new()
            }
        };

        let ctx = TemplateContext {
            project: project_name.to_string(),
            root_cmake,
            ..Default::default()
        };

        for doc in &docs {
            let (rel_out, text) = self.templates.expand(
                doc,
                &ctx,
                &[],
                &session.secure_functions,
                &session.insecure_functions,
            );
            self.write_generated(&rel_out, &text)?;
        }

        Ok(())
    }

    /// Phase 6: copy the raw project into the host tree and insecure headers
    /// into the enclave tree, never overwriting what earlier phases generated
    fn merge_copy(&self, project_root: &Path) -> Result<()> {
        let output_root = &self.config.output.output_dir;
        let host_root = output_root.join(&self.config.output.host_dir);
        fs::create_dir_all(&host_root)?;

        let mut top_level: Vec<fs::DirEntry> =
            fs::read_dir(project_root)?.collect::<std::io::Result<_>>()?;
        top_level.sort_by_key(|entry| entry.file_name());
        for entry in top_level {
            if entry.file_type()?.is_file() {
                copy_if_absent(&entry.path(), &host_root.join(entry.file_name()))?;
            }
        }

        for tree_name in [
            &self.config.project.secure_dir,
            &self.config.project.insecure_dir,
        ] {
            for file in files_under(&project_root.join(tree_name))? {
                let rel = file.strip_prefix(project_root)?;
                copy_if_absent(&file, &host_root.join(rel))?;
            }
        }

        let enclave_root = output_root.join(&self.config.output.enclave_dir);
        for file in files_under(&project_root.join(&self.config.project.insecure_dir))? {
            let is_header = file
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| {
                    self.config
                        .output
                        .header_extensions
                        .iter()
                        .any(|header| header == ext)
                });
            if is_header {
                let rel = file.strip_prefix(project_root)?;
                copy_if_absent(&file, &enclave_root.join(rel))?;
            }
        }

        Ok(())
    }

    /// Parse every template document in a set directory, in sorted order
    fn load_template_set(&self, dir: &Path) -> Result<Vec<TemplateDocument>> {
        if !dir.is_dir() {
            warn!("template set {} not found; nothing to expand from it", dir.display());
            return Ok(Vec::new());
        }

        let mut docs = Vec::new();
        for file in files_under(dir)? {
            let source = read_lossy(&file)?;
            docs.push(self.templates.parse(&source, &file)?);
        }
        Ok(docs)
    }

    /// Write one expanded document under the output root, overwriting, and
    /// report it
    fn write_generated(&self, rel_out: &Path, text: &str) -> Result<()> {
        let dest = self.config.output.output_dir.join(rel_out);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, text)?;
        println!("GENERATED:{}", dest.display());
        Ok(())
    }
}

/// Sorted JSON rendering of a call-reference set, for diagnostics
fn dump_calls(calls: &std::collections::HashSet<String>) -> crate::error::Result<String> {
    Ok(serde_json::to_string(&calls.iter().collect::<BTreeSet<_>>())?)
}

/// Every non-directory file under `root`, in sorted traversal order
fn files_under(root: &Path) -> crate::error::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| EnclavegenError::FileSystem(e.to_string()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn copy_file(src: &Path, dest: &Path) -> crate::error::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dest)?;
    Ok(())
}

/// Copy unless the destination already exists, so generated files win the merge
fn copy_if_absent(src: &Path, dest: &Path) -> crate::error::Result<()> {
    if dest.exists() {
        return Ok(());
    }
    copy_file(src, dest)
}

fn read_lossy(path: &Path) -> crate::error::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
