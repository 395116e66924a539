//! Compiled kernel binaries.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, VkComputeError};

/// A SPIR-V blob, kept as 32-bit words.
///
/// The contents are not inspected beyond the word reinterpretation; the
/// device validates them when the shader module is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelBinary {
    words: Vec<u32>,
    source: Option<PathBuf>,
}

impl KernelBinary {
    /// Wrap raw bytes. The length must be a multiple of four.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = bytes.as_ref();
        let words = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|e| VkComputeError::ShaderModuleInvalid(e.to_string()))?;
        if words.is_empty() {
            return Err(VkComputeError::ShaderModuleInvalid("kernel binary is empty".to_string()));
        }
        Ok(Self { words, source: None })
    }

    /// Wrap already-decoded words.
    pub fn from_words(words: Vec<u32>) -> Result<Self> {
        if words.is_empty() {
            return Err(VkComputeError::ShaderModuleInvalid("kernel binary is empty".to_string()));
        }
        Ok(Self { words, source: None })
    }

    /// Read a kernel file fully.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|source| VkComputeError::KernelIo { path: path.to_path_buf(), source })?;
        let mut kernel = Self::from_bytes(&bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "loaded kernel binary");
        kernel.source = Some(path.to_path_buf());
        Ok(kernel)
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// File the binary was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}
