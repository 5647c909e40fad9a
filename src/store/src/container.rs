//! The narrow interface the writers consume. A container hands out
//! growable datasets; everything below this seam (file layout,
//! compression codec, chunk bookkeeping) belongs to the backend.

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::layout::DataLayout;

/// Current and maximum extent of a dataset. `None` in `max_dims` marks an
/// unlimited dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataspace {
    pub dims: Vec<u64>,
    pub max_dims: Vec<Option<u64>>,
}

impl Dataspace {
    /// A fixed-extent space, used to describe in-memory buffers.
    pub fn simple(dims: &[u64]) -> Self {
        Self {
            dims: dims.to_vec(),
            max_dims: dims.iter().map(|d| Some(*d)).collect(),
        }
    }

    pub fn extendible(dims: &[u64], max_dims: &[Option<u64>]) -> Self {
        assert_eq!(dims.len(), max_dims.len());
        Self {
            dims: dims.to_vec(),
            max_dims: max_dims.to_vec(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn n_elements(&self) -> u64 {
        self.dims.iter().product()
    }

    pub fn select_hyperslab(&self, offset: &[u64], count: &[u64]) -> Selection {
        assert_eq!(offset.len(), self.rank());
        assert_eq!(count.len(), self.rank());
        Selection {
            offset: offset.to_vec(),
            count: count.to_vec(),
        }
    }
}

/// A contiguous hyperslab of a file space, the target region of one
/// write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub offset: Vec<u64>,
    pub count: Vec<u64>,
}

impl Selection {
    pub fn n_elements(&self) -> u64 {
        self.count.iter().product()
    }
}

pub trait Dataset {
    /// Grows the dataset to `extent`. Shrinking is not supported.
    fn extend(&mut self, extent: &[u64]) -> Result<()>;

    /// The dataset's current file space.
    fn space(&self) -> Result<Dataspace>;

    /// Writes `buf`, laid out per `mem_type` with shape `mem_space`, into
    /// the selected region of the file space. The backend translates the
    /// memory layout to its on-disk type.
    fn write(
        &mut self,
        buf: &[u8],
        mem_type: &DataLayout,
        mem_space: &Dataspace,
        file_space: &Selection,
    ) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

pub trait Container {
    type Dataset: Dataset;

    /// Creates a growable dataset named `name` with the given on-disk
    /// type, initial/maximum extent, chunk shape and compression level.
    fn create_dataset(
        &mut self,
        name: &str,
        disk_type: &DataLayout,
        space: &Dataspace,
        chunk: &[u64],
        compression_level: u32,
    ) -> Result<Self::Dataset>;
}
