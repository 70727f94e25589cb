//! Recording and playback sessions
//!
//! A session directory holds one sub-directory per source and a descriptor
//! mapping each sub-directory to the device type that wrote it.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use contracts::{ContractError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::SliderMapping;

/// Descriptor file name inside a session directory
pub const DESCRIPTOR_FILE_NAME: &str = "descriptor.toml";

/// Current descriptor format version
pub const DESCRIPTOR_VERSION: u32 = 1;

/// Environment override for the recording root
pub const RECORDING_ROOT_ENV: &str = "IGI_SYNCER_RECORDING_ROOT";

/// One recorded source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorEntry {
    /// Sub-directory of the session, also the playback row label
    pub directory: String,
    pub device_type: String,
}

/// Sub-directory -> device type mapping of a recording, in row order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub version: u32,
    #[serde(default)]
    pub sources: Vec<DescriptorEntry>,
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            version: DESCRIPTOR_VERSION,
            sources: Vec::new(),
        }
    }
}

impl Descriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source, or retype it in place if the directory is listed
    pub fn insert(&mut self, directory: impl Into<String>, device_type: impl Into<String>) {
        let directory = directory.into();
        let device_type = device_type.into();
        match self.sources.iter_mut().find(|e| e.directory == directory) {
            Some(entry) => entry.device_type = device_type,
            None => self.sources.push(DescriptorEntry {
                directory,
                device_type,
            }),
        }
    }

    /// Drop a source; returns whether it was listed
    pub fn remove(&mut self, directory: &str) -> bool {
        let before = self.sources.len();
        self.sources.retain(|e| e.directory != directory);
        self.sources.len() != before
    }

    pub fn device_type(&self, directory: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|e| e.directory == directory)
            .map(|e| e.device_type.as_str())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Parse descriptor text; `origin` names the file in errors
    pub fn parse_str(content: &str, origin: &str) -> Result<Self> {
        let descriptor: Descriptor =
            toml::from_str(content).map_err(|e| ContractError::corrupt(origin, e.to_string()))?;

        if descriptor.version != DESCRIPTOR_VERSION {
            return Err(ContractError::corrupt(
                origin,
                format!("unsupported descriptor version {}", descriptor.version),
            ));
        }
        let mut seen = HashSet::new();
        for entry in &descriptor.sources {
            let dir = entry.directory.as_str();
            if dir.is_empty() || dir.contains(['/', '\\']) || dir == ".." {
                return Err(ContractError::corrupt(
                    origin,
                    format!("invalid source directory '{dir}'"),
                ));
            }
            if !seen.insert(dir) {
                return Err(ContractError::corrupt(
                    origin,
                    format!("source directory '{dir}' listed twice"),
                ));
            }
        }

        Ok(descriptor)
    }

    /// Read a descriptor file
    ///
    /// # Errors
    /// `Corrupt` if the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self> {
        let origin = path.display().to_string();
        let content =
            fs::read_to_string(path).map_err(|e| ContractError::corrupt(&origin, e.to_string()))?;
        Self::parse_str(&content, &origin)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let content = toml::to_string(self).map_err(|e| {
            ContractError::persist_failure(path.display().to_string(), e.to_string())
        })?;
        fs::write(path, content)?;
        debug!(path = %path.display(), sources = self.len(), "descriptor written");
        Ok(())
    }
}

/// An active recording
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub directory: PathBuf,
    pub descriptor: Descriptor,
    pub started_at: DateTime<Local>,
}

impl RecordingSession {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            descriptor: Descriptor::new(),
            started_at: Local::now(),
        }
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.directory.join(DESCRIPTOR_FILE_NAME)
    }

    /// Directory a source writes into
    pub fn source_directory(&self, source_name: &str) -> PathBuf {
        self.directory.join(source_directory_name(source_name))
    }

    /// Register a source and rewrite the descriptor
    ///
    /// # Errors
    /// `InvalidArgument` if another source already records into the same
    /// sub-directory; I/O errors writing the descriptor.
    pub fn add_source(&mut self, source_name: &str, device_type: &str) -> Result<PathBuf> {
        let directory = source_directory_name(source_name);
        if self.descriptor.device_type(&directory).is_some() {
            return Err(ContractError::invalid_argument(format!(
                "source '{source_name}' would record into '{directory}', which is already in use"
            )));
        }
        self.descriptor.insert(directory, device_type);
        if let Err(e) = self.descriptor.write(&self.descriptor_path()) {
            self.descriptor.remove(&source_directory_name(source_name));
            return Err(e);
        }
        Ok(self.source_directory(source_name))
    }

    /// Unregister a source and rewrite the descriptor
    pub fn remove_source(&mut self, source_name: &str) -> Result<()> {
        if self.descriptor.remove(&source_directory_name(source_name)) {
            self.descriptor.write(&self.descriptor_path())?;
        }
        Ok(())
    }
}

/// An active playback
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub directory: PathBuf,
    pub mapping: SliderMapping,
    pub automatic: bool,
}

/// Session directory name for a start time, e.g. `2024-03-01-14-05-09-026`
pub fn session_directory_name(now: &DateTime<Local>) -> String {
    now.format("%Y-%m-%d-%H-%M-%S-%3f").to_string()
}

/// Filesystem-safe directory name for a source row label
pub fn source_directory_name(source_name: &str) -> String {
    let name: String = source_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        "source".to_string()
    } else {
        name
    }
}

/// Where recordings go when no root is configured
///
/// The `IGI_SYNCER_RECORDING_ROOT` environment variable if it names a
/// directory, then desktop, documents and home, then the working directory.
pub fn default_recording_root() -> PathBuf {
    env::var_os(RECORDING_ROOT_ENV)
        .map(PathBuf::from)
        .filter(|p| p.is_dir())
        .or_else(|| dirs::desktop_dir().filter(|p| p.is_dir()))
        .or_else(|| dirs::document_dir().filter(|p| p.is_dir()))
        .or_else(|| dirs::home_dir().filter(|p| p.is_dir()))
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
