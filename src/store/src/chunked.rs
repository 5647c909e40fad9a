//! File-backed container.
//!
//! A container is a directory; each dataset is a data file of appended
//! chunk frames plus a small metadata manifest. Every write call becomes
//! one frame: `crc32(payload) ^ 0xFF` (u32 LE), payload length (u64 LE),
//! then the deflate-compressed packed rows. The manifest is a
//! crc+length framed bincode blob rewritten in place on every extend, so
//! the recorded extent always matches the committed rows.

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Seek;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::Deserialize;
use serde::Serialize;
use tracing::trace;

use crate::container::Container;
use crate::container::Dataset;
use crate::container::Dataspace;
use crate::container::Selection;
use crate::error::Result;
use crate::error::StoreError;
use crate::layout::pack_records;
use crate::layout::DataLayout;

const VERSION: u64 = 1;

fn hash_crc32(v: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(v);
    // XOR so an empty payload never hashes to 0
    hasher.finalize() ^ 0xFF
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 8 + payload.len());
    out.extend_from_slice(&hash_crc32(payload).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub version: u64,
    pub name: String,
    /// Packed on-disk layout.
    pub dtype: DataLayout,
    pub dims: Vec<u64>,
    pub max_dims: Vec<Option<u64>>,
    pub chunk: Vec<u64>,
    pub compression_level: u32,
}

fn write_metadata(manifest: &mut File, md: &Metadata) -> Result<usize> {
    let data = bincode::serialize(md)?;
    let framed = frame(&data);
    manifest.rewind()?;
    manifest.write_all(&framed)?;
    Ok(framed.len())
}

/// A directory of chunked datasets.
#[derive(Debug)]
pub struct ChunkedFile {
    path: PathBuf,
}

impl ChunkedFile {
    /// Truncate-creates the container directory, discarding any previous
    /// contents at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.try_exists()? {
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn data_path(&self, name: &str) -> PathBuf {
        self.path.join(format!("{}.data", name))
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.path.join(format!("{}.md", name))
    }
}

impl Container for ChunkedFile {
    type Dataset = ChunkedDataset;

    fn create_dataset(
        &mut self,
        name: &str,
        disk_type: &DataLayout,
        space: &Dataspace,
        chunk: &[u64],
        compression_level: u32,
    ) -> Result<ChunkedDataset> {
        let data_path = self.data_path(name);
        if data_path.try_exists()? {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        let data = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&data_path)?;
        let mut manifest = OpenOptions::new()
            .create_new(true)
            .write(true)
            .read(true)
            .open(self.metadata_path(name))?;
        let md = Metadata {
            version: VERSION,
            name: name.to_string(),
            dtype: disk_type.clone(),
            dims: space.dims.clone(),
            max_dims: space.max_dims.clone(),
            chunk: chunk.to_vec(),
            compression_level,
        };
        write_metadata(&mut manifest, &md)?;
        trace!("created dataset {:?} at {:?}", name, data_path);
        Ok(ChunkedDataset {
            md,
            data,
            manifest,
            written_rows: 0,
        })
    }
}

pub struct ChunkedDataset {
    md: Metadata,
    data: File,
    manifest: File,
    /// Rows already committed to the data file, in units of the first
    /// dimension.
    written_rows: u64,
}

impl Dataset for ChunkedDataset {
    fn extend(&mut self, extent: &[u64]) -> Result<()> {
        if extent.len() != self.md.dims.len() {
            return Err(StoreError::InvalidParameter(format!(
                "extent rank {} != dataset rank {}",
                extent.len(),
                self.md.dims.len()
            )));
        }
        for (idx, (cur, new)) in self.md.dims.iter().zip(extent).enumerate() {
            if new < cur {
                return Err(StoreError::InvalidParameter(format!(
                    "extent shrinks dim {}",
                    idx
                )));
            }
            if let Some(max) = self.md.max_dims[idx] {
                if *new > max {
                    return Err(StoreError::InvalidParameter(format!(
                        "extent exceeds max in dim {}",
                        idx
                    )));
                }
            }
        }
        self.md.dims = extent.to_vec();
        write_metadata(&mut self.manifest, &self.md)?;
        Ok(())
    }

    fn space(&self) -> Result<Dataspace> {
        Ok(Dataspace {
            dims: self.md.dims.clone(),
            max_dims: self.md.max_dims.clone(),
        })
    }

    fn write(
        &mut self,
        buf: &[u8],
        mem_type: &DataLayout,
        mem_space: &Dataspace,
        file_space: &Selection,
    ) -> Result<()> {
        // this backend only materializes the append-at-tail selections
        // the writers produce
        if file_space.offset[1..].iter().any(|v| *v != 0)
            || file_space.count[1..] != self.md.dims[1..]
            || file_space.offset[0] != self.written_rows
        {
            return StoreError::nyi("only whole-row tail appends are supported");
        }
        let n = mem_space.n_elements();
        if n != file_space.n_elements() {
            return Err(StoreError::InvalidParameter(
                "memory and file selections disagree".to_string(),
            ));
        }
        if buf.len() as u64 != n * mem_type.size() as u64 {
            return Err(StoreError::InvalidParameter(
                "buffer does not match the memory space".to_string(),
            ));
        }

        let packed = pack_records(buf, mem_type);
        let mut encoder = ZlibEncoder::new(
            Vec::new(),
            Compression::new(self.md.compression_level),
        );
        encoder.write_all(&packed)?;
        let payload = encoder.finish()?;
        self.data.write_all(&frame(&payload))?;
        self.written_rows += file_space.count[0];
        trace!(
            "wrote {} values to {:?} ({} packed bytes, {} on disk)",
            n,
            self.md.name,
            packed.len(),
            payload.len()
        );
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.data.sync_all()?;
        self.manifest.sync_all()?;
        Ok(())
    }
}
