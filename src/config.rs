use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EnclavegenError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project layout configuration
    pub project: ProjectConfig,

    /// Template set locations
    pub templates: TemplateConfig,

    /// Output tree settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name; defaults to the project root's directory name
    pub name: Option<String>,

    /// Subdirectory holding the trusted (enclave) sources
    pub secure_dir: String,

    /// Subdirectory holding the untrusted (host) sources
    pub insecure_dir: String,

    /// Root build descriptor read verbatim for substitution
    pub build_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Directory containing the three template sets
    pub template_dir: PathBuf,

    /// Template set expanded per secure boundary file
    pub secure_set: String,

    /// Template set expanded per insecure boundary file
    pub insecure_set: String,

    /// Template set expanded once at project scope
    pub project_set: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root of the generated output tree
    pub output_dir: PathBuf,

    /// Host-facing subtree name
    pub host_dir: String,

    /// Enclave-facing subtree name
    pub enclave_dir: String,

    /// Extensions treated as headers when populating the enclave tree
    pub header_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig {
                name: None,
                secure_dir: "secure".to_string(),
                insecure_dir: "insecure".to_string(),
                build_file: "CMakeLists.txt".to_string(),
            },
            templates: TemplateConfig {
                template_dir: PathBuf::from("template"),
                secure_set: "secure_func_template".to_string(),
                insecure_set: "insecure_func_template".to_string(),
                project_set: "project_template".to_string(),
            },
            output: OutputConfig {
                output_dir: PathBuf::from("generated"),
                host_dir: "host".to_string(),
                enclave_dir: "enclave".to_string(),
                header_extensions: vec!["h".to_string()],
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| EnclavegenError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EnclavegenError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "Enclavegen.toml",
                    "enclavegen.toml",
                    ".enclavegen.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }
}
