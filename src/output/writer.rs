//! Page artifact writer
//!
//! An artifact is `---\n`, the YAML front-matter, `---\n\n` and the Markdown
//! body, optionally compressed. Files are written to a sibling `.tmp` file,
//! synced, and renamed over the destination so readers never observe a
//! partial file.

use crate::config::Compression;
use crate::output::{OutputError, OutputResult};
use serde::Serialize;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Builds the uncompressed artifact byte stream
pub fn compose_artifact<T: Serialize>(front_matter: &T, body: &str) -> OutputResult<Vec<u8>> {
    let yaml = serde_yaml::to_string(front_matter)?;

    let mut out = String::with_capacity(yaml.len() + body.len() + 16);
    out.push_str("---\n");
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("---\n\n");
    out.push_str(body);
    Ok(out.into_bytes())
}

/// Compresses `bytes` with the configured codec
pub fn compress(bytes: &[u8], compression: Compression, level: i32) -> OutputResult<Vec<u8>> {
    match compression {
        Compression::None => Ok(bytes.to_vec()),
        Compression::Zstd => zstd::encode_all(bytes, level)
            .map_err(|e| OutputError::Compression(format!("zstd: {}", e))),
        Compression::Gzip => {
            let level = flate2::Compression::new(level.clamp(0, 9) as u32);
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), level);
            encoder
                .write_all(bytes)
                .and_then(|_| encoder.finish())
                .map_err(|e| OutputError::Compression(format!("gzip: {}", e)))
        }
    }
}

/// Reverses [`compress`]
pub fn decompress(bytes: &[u8], compression: Compression) -> OutputResult<Vec<u8>> {
    match compression {
        Compression::None => Ok(bytes.to_vec()),
        Compression::Zstd => {
            zstd::decode_all(bytes).map_err(|e| OutputError::Compression(format!("zstd: {}", e)))
        }
        Compression::Gzip => {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(|e| OutputError::Compression(format!("gzip: {}", e)))?;
            Ok(out)
        }
    }
}

/// Codec implied by a file name suffix
pub fn compression_for_path(path: &Path) -> Compression {
    match path.extension().and_then(|e| e.to_str()) {
        Some("zst") => Compression::Zstd,
        Some("gz") => Compression::Gzip,
        _ => Compression::None,
    }
}

/// Sibling temp path: `<name>.tmp`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `bytes` to `path` through a synced temp file and a rename
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> OutputResult<()> {
    use tokio::io::AsyncWriteExt;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = temp_path(path);
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Blocking variant of [`write_atomic`]
pub fn write_atomic_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp, path)
}

/// Reads an artifact back, decompressing according to its suffix
pub async fn read_artifact(path: &Path) -> OutputResult<Vec<u8>> {
    let raw = tokio::fs::read(path).await?;
    decompress(&raw, compression_for_path(path))
}

/// Writes page artifacts with one codec for the whole run
#[derive(Debug, Clone, Copy)]
pub struct ArtifactWriter {
    compression: Compression,
    level: i32,
}

impl ArtifactWriter {
    pub fn new(compression: Compression, level: i32) -> Self {
        Self { compression, level }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Destination of the artifact for `slug` inside `dir`
    pub fn artifact_path(&self, dir: &Path, slug: &str) -> PathBuf {
        dir.join(format!("{}{}", slug, self.compression.suffix()))
    }

    /// Composes, compresses and atomically writes an artifact
    ///
    /// Returns the number of bytes written to disk.
    pub async fn write<T: Serialize>(
        &self,
        path: &Path,
        front_matter: &T,
        body: &str,
    ) -> OutputResult<usize> {
        let artifact = compose_artifact(front_matter, body)?;
        let bytes = compress(&artifact, self.compression, self.level)?;
        write_atomic(path, &bytes).await?;

        tracing::debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(bytes.len())
    }
}
