//! In-memory container for tests. Every extend and write call is
//! counted so tests can assert on I/O granularity, and written data is
//! kept in its packed on-disk form for byte-exact comparisons.

use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use crate::container::Container;
use crate::container::Dataset;
use crate::container::Dataspace;
use crate::container::Selection;
use crate::error::Result;
use crate::error::StoreError;
use crate::layout::pack_records;
use crate::layout::DataLayout;
use crate::layout::Record;

/// Example record used across the test suite. The bool after the f32
/// leaves trailing padding, so it exercises the packed-layout path.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Probe {
    pub pt: f32,
    pub mask: bool,
}

unsafe impl Record for Probe {
    fn layout() -> DataLayout {
        DataLayout::Compound {
            size: mem::size_of::<Probe>(),
            fields: vec![crate::field!(Probe, pt), crate::field!(Probe, mask)],
        }
    }

    fn sentinel() -> Self {
        Probe {
            pt: 0.0,
            mask: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemState {
    pub disk_type: Option<DataLayout>,
    pub dims: Vec<u64>,
    pub max_dims: Vec<Option<u64>>,
    pub chunk: Vec<u64>,
    pub compression_level: u32,
    /// Packed bytes, in row order.
    pub data: Vec<u8>,
    pub extend_calls: usize,
    pub write_calls: usize,
    pub closed: bool,
}

#[derive(Debug, Default)]
pub struct MemContainer {
    datasets: HashMap<String, Rc<RefCell<MemState>>>,
}

impl MemContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    /// Shared handle to a dataset's state, valid after the writer closed.
    pub fn dataset(&self, name: &str) -> Rc<RefCell<MemState>> {
        self.datasets[name].clone()
    }
}

impl Container for MemContainer {
    type Dataset = MemDataset;

    fn create_dataset(
        &mut self,
        name: &str,
        disk_type: &DataLayout,
        space: &Dataspace,
        chunk: &[u64],
        compression_level: u32,
    ) -> Result<MemDataset> {
        if self.datasets.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        let state = Rc::new(RefCell::new(MemState {
            disk_type: Some(disk_type.clone()),
            dims: space.dims.clone(),
            max_dims: space.max_dims.clone(),
            chunk: chunk.to_vec(),
            compression_level,
            ..Default::default()
        }));
        self.datasets.insert(name.to_string(), state.clone());
        Ok(MemDataset { state })
    }
}

#[derive(Debug)]
pub struct MemDataset {
    state: Rc<RefCell<MemState>>,
}

impl Dataset for MemDataset {
    fn extend(&mut self, extent: &[u64]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if extent.len() != state.dims.len() {
            return Err(StoreError::InvalidParameter(format!(
                "extent rank {} != dataset rank {}",
                extent.len(),
                state.dims.len()
            )));
        }
        for (idx, (cur, new)) in state.dims.iter().zip(extent).enumerate() {
            if new < cur {
                return Err(StoreError::InvalidParameter(format!(
                    "extent shrinks dim {}",
                    idx
                )));
            }
            if let Some(max) = state.max_dims[idx] {
                if *new > max {
                    return Err(StoreError::InvalidParameter(format!(
                        "extent exceeds max in dim {}",
                        idx
                    )));
                }
            }
        }
        state.dims = extent.to_vec();
        state.extend_calls += 1;
        Ok(())
    }

    fn space(&self) -> Result<Dataspace> {
        let state = self.state.borrow();
        Ok(Dataspace {
            dims: state.dims.clone(),
            max_dims: state.max_dims.clone(),
        })
    }

    fn write(
        &mut self,
        buf: &[u8],
        mem_type: &DataLayout,
        mem_space: &Dataspace,
        file_space: &Selection,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if file_space.offset[1..].iter().any(|v| *v != 0)
            || file_space.count[1..] != state.dims[1..]
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
        let row_elems: u64 = state.dims[1..].iter().product();
        let packed_size = state
            .disk_type
            .as_ref()
            .map(|t| t.size())
            .unwrap_or_default() as u64;
        if state.data.len() as u64 != file_space.offset[0] * row_elems * packed_size {
            return StoreError::nyi("only whole-row tail appends are supported");
        }
        let packed = pack_records(buf, mem_type);
        state.data.extend_from_slice(&packed);
        state.write_calls += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.borrow_mut().closed = true;
        Ok(())
    }
}
