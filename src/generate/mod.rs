//! Endpoint generation: registry -> pin allocation -> {firmware, keymaps}.
//!
//! Both artifacts are rendered from one allocation, entirely in memory.
//! Nothing touches the output directory unless every step succeeded.

pub mod allocator;
pub mod firmware;
pub mod keymap;

pub use allocator::{allocate, Allocation, PinAllocatorState};
pub use firmware::{FirmwareEmitter, SourceBuffer, FIRMWARE_FILE_NAME};
pub use keymap::{export, KeymapArtifact, KEYMAP_SUFFIX};

use crate::agent::{load_agent, AgentDefinition, AgentError, ComponentRegistry};
use crate::config::{Config, ConfigError, FirmwareConfig};
use kinetic_shared::{PinAssignment, PinCategory, PinPoolError, PinPools};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("no {0} pins left to allocate")]
    PinPoolExhausted(PinCategory),
    #[error("invalid pin pools: {0}")]
    Pools(#[from] PinPoolError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything one generation run produces.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub agent: String,
    pub assignments: Vec<PinAssignment>,
    pub firmware: String,
    pub keymaps: Vec<KeymapArtifact>,
}

impl Artifacts {
    /// Persist the firmware and every keymap into `dir`.
    ///
    /// Every file is staged as a temporary file in `dir` before the first one
    /// is renamed into place, so a failure while staging leaves the previous
    /// artifacts untouched. Keymaps left over from components that no longer
    /// exist are removed afterwards.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, GenerateError> {
        let mut files = Vec::with_capacity(self.keymaps.len() + 1);
        files.push((FIRMWARE_FILE_NAME.to_string(), self.firmware.clone()));
        for keymap in &self.keymaps {
            files.push((keymap.file_name.clone(), keymap.to_json()?));
        }

        std::fs::create_dir_all(dir)?;
        let mut staged = Vec::with_capacity(files.len());
        for (name, content) in &files {
            let path = dir.join(name);
            if path.is_dir() {
                return Err(GenerateError::Io(std::io::Error::new(
                    std::io::ErrorKind::IsADirectory,
                    format!("{} is a directory", path.display()),
                )));
            }
            let mut file = tempfile::NamedTempFile::new_in(dir)?;
            file.write_all(content.as_bytes())?;
            file.as_file().sync_all()?;
            staged.push((path, file));
        }

        let mut written = Vec::with_capacity(staged.len());
        for (path, file) in staged {
            file.persist(&path).map_err(|e| GenerateError::Io(e.error))?;
            tracing::info!("Wrote {}", path.display());
            written.push(path);
        }

        self.remove_stale_keymaps(dir)?;
        Ok(written)
    }

    fn remove_stale_keymaps(&self, dir: &Path) -> Result<(), GenerateError> {
        let current: HashSet<&str> = self.keymaps.iter().map(|k| k.file_name.as_str()).collect();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(KEYMAP_SUFFIX) && !current.contains(name) && entry.file_type()?.is_file() {
                std::fs::remove_file(entry.path())?;
                tracing::info!("Removed stale keymap {}", entry.path().display());
            }
        }
        Ok(())
    }
}

pub struct Generator {
    pools: PinPools,
    emitter: FirmwareEmitter,
}

impl Generator {
    /// Fails when the firmware settings cannot be emitted safely.
    pub fn new(pools: PinPools, firmware: FirmwareConfig) -> Result<Self, GenerateError> {
        firmware.validate()?;
        Ok(Self {
            pools,
            emitter: FirmwareEmitter::new(firmware),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, GenerateError> {
        Self::new(config.board.pools()?, config.firmware.clone())
    }

    /// Run discovery, allocation and rendering without touching the filesystem.
    pub fn render(&self, agent: &AgentDefinition) -> Result<Artifacts, GenerateError> {
        let registry = ComponentRegistry::discover(agent)?;
        let Allocation { assignments, .. } = allocate(&self.pools, registry.declarations())?;
        let firmware = self.emitter.emit(&assignments);
        let keymaps = export(&assignments);
        Ok(Artifacts {
            agent: registry.agent().to_string(),
            assignments,
            firmware,
            keymaps,
        })
    }

    /// Render and then write to `output`.
    pub fn generate(&self, agent: &AgentDefinition, output: &Path) -> Result<Artifacts, GenerateError> {
        let artifacts = self.render(agent)?;
        artifacts.write_to(output)?;
        Ok(artifacts)
    }
}

/// Full pipeline as driven by a configuration file.
pub fn run(config: &Config) -> Result<Artifacts, GenerateError> {
    let started = Instant::now();
    let agent = load_agent(&config.paths.agent)?;
    let artifacts = Generator::from_config(config)?.generate(&agent, &config.paths.output)?;
    tracing::info!(
        "Generated endpoint for '{}' ({} components, {} keymaps) in {:.3}ms",
        artifacts.agent,
        artifacts.assignments.len(),
        artifacts.keymaps.len(),
        started.elapsed().as_secs_f64() * 1000.0
    );
    Ok(artifacts)
}
