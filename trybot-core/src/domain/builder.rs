//! Builder types and their build configurations
//!
//! A builder type is an opaque key naming a target platform. The registry
//! resolves it to a [`BuildConfig`] describing how a worker of that type is
//! bootstrapped and which all-tests entry point it runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Base location of the bootstrap toolchain tarballs
const BOOTSTRAP_BASE_URL: &str = "https://storage.googleapis.com/go-builder-data";

/// Builder types that may be requested explicitly.
///
/// These builders are controlled by the project and are acceptable for
/// testing private changes.
pub const ALLOWED_BUILDERS: &[&str] = &[
    "js-wasm",
    "linux-386",
    "linux-386-longtest",
    "linux-amd64",
    "linux-amd64-longtest",
    "linux-amd64-bullseye",
    "darwin-amd64-12_0",
    "darwin-arm64-12",
    "windows-386-2012",
    "windows-amd64-2016",
    "windows-arm64-11",
];

/// Default builders, covering the first class ports.
pub const FIRST_CLASS_BUILDERS: &[&str] = &[
    "linux-386-longtest",
    "linux-amd64-longtest",
    "linux-arm-aws",
    "linux-arm64-aws",
    "darwin-amd64-12_0",
    "darwin-arm64-12",
    "windows-386-2012",
    "windows-amd64-longtest",
];

/// Identifier of a target platform/configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuilderType(String);

impl BuilderType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Operating system part of the name ("linux-amd64-longtest" -> "linux")
    pub fn goos(&self) -> &str {
        self.0.split('-').next().unwrap_or_default()
    }

    /// Architecture part of the name ("linux-amd64-longtest" -> "amd64")
    pub fn goarch(&self) -> &str {
        self.0.split('-').nth(1).unwrap_or_default()
    }
}

impl std::fmt::Display for BuilderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BuilderType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// How a worker of a given builder type is prepared and tested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Toolchain tarball staged before the source.
    /// `None` means the worker image is already bootstrapped.
    pub bootstrap_url: Option<String>,

    /// Extra environment variables for the all-tests script
    pub env: Vec<(String, String)>,

    /// All-tests entry point, relative to the source root
    pub all_script: String,

    /// Arguments passed to the all-tests entry point
    pub all_script_args: Vec<String>,

    /// Final GOROOT location baked into the built toolchain
    pub goroot_final: String,
}

impl BuildConfig {
    /// Environment for the test run on a worker whose work directory is `work_dir`
    pub fn exec_env(&self, work_dir: &str) -> Vec<(String, String)> {
        let mut env = self.env.clone();
        env.push(("GOPATH".to_string(), format!("{}/gopath", work_dir)));
        env.push(("GOROOT_FINAL".to_string(), self.goroot_final.clone()));
        env
    }
}

/// Errors when selecting builders
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuilderError {
    #[error("builder type {0:?} not allowed")]
    NotAllowed(String),

    #[error("no builder types requested")]
    Empty,
}

/// Lookup table from builder type to build configuration
#[derive(Debug, Clone, Default)]
pub struct BuilderRegistry {
    configs: HashMap<BuilderType, BuildConfig>,
}

impl BuilderRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry covering every allowed and first class builder
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for name in ALLOWED_BUILDERS.iter().chain(FIRST_CLASS_BUILDERS) {
            let builder = BuilderType::from(*name);
            if registry.get(&builder).is_none() {
                let config = builtin_config(&builder);
                registry.insert(builder, config);
            }
        }
        registry
    }

    pub fn insert(&mut self, builder: BuilderType, config: BuildConfig) {
        self.configs.insert(builder, config);
    }

    pub fn get(&self, builder: &BuilderType) -> Option<&BuildConfig> {
        self.configs.get(builder)
    }
}

/// Parses a comma separated builder list.
///
/// An empty list selects the first class builders; explicit entries must be
/// on the allow-list.
pub fn select_builders(list: &str) -> Result<Vec<BuilderType>, BuilderError> {
    let list = list.trim();
    if list.is_empty() {
        return Ok(FIRST_CLASS_BUILDERS
            .iter()
            .map(|b| BuilderType::from(*b))
            .collect());
    }

    let mut builders = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !ALLOWED_BUILDERS.contains(&name) {
            return Err(BuilderError::NotAllowed(name.to_string()));
        }
        builders.push(BuilderType::from(name));
    }

    if builders.is_empty() {
        return Err(BuilderError::Empty);
    }

    Ok(builders)
}

fn builtin_config(builder: &BuilderType) -> BuildConfig {
    let name = builder.as_str();
    let windows = builder.goos() == "windows";
    let mut env = Vec::new();

    if name == "js-wasm" {
        env.push(("GOOS".to_string(), "js".to_string()));
        env.push(("GOARCH".to_string(), "wasm".to_string()));
    }

    if name.ends_with("-longtest") {
        env.push(("GO_TEST_SHORT".to_string(), "0".to_string()));
        env.push(("GO_TEST_TIMEOUT_SCALE".to_string(), "5".to_string()));
    }

    // Darwin images ship with a bootstrap toolchain installed
    let bootstrap_url = match builder.goos() {
        "darwin" => None,
        "js" => Some(format!("{}/gobootstrap-linux-amd64.tar.gz", BOOTSTRAP_BASE_URL)),
        goos => Some(format!(
            "{}/gobootstrap-{}-{}.tar.gz",
            BOOTSTRAP_BASE_URL,
            goos,
            builder.goarch()
        )),
    };

    BuildConfig {
        bootstrap_url,
        env,
        all_script: if windows { "src/all.bat" } else { "src/all.bash" }.to_string(),
        all_script_args: Vec::new(),
        goroot_final: if windows { "C:\\go" } else { "/usr/local/go" }.to_string(),
    }
}
