//! Buffered writers.
//!
//! [`Writer`] appends fixed-multiplicity rows to a rank-2 dataset,
//! [`Writer1d`] appends scalar records to a rank-1 dataset. Both buffer
//! `batch_size` rows in memory and flush whole batches; a partial
//! trailing batch stays buffered until an explicit [`Writer::flush`],
//! normally right before [`Writer::close`]. A writer owns its dataset
//! exclusively and `close` consumes it, so nothing can touch a closed
//! writer.

use tracing::debug;
use tracing::trace;

use crate::container::Container;
use crate::container::Dataset;
use crate::container::Dataspace;
use crate::error::Result;
use crate::error::StoreError;
use crate::layout::raw_bytes;
use crate::layout::DataLayout;
use crate::layout::Record;

/// Deflate level used when the caller has no preference.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 7;

/// Rank-2 writer: each `add` contributes one row of exactly `max_length`
/// records. Short input is padded at the tail with the sentinel, long
/// input is truncated to its first `max_length` entries. Both are silent
/// and deliberate.
#[derive(Debug)]
pub struct Writer<T: Record, D: Dataset> {
    mem_type: DataLayout,
    sentinel: T,
    max_length: usize,
    batch_size: usize,
    offset: u64,
    buffer: Vec<T>,
    ds: D,
}

impl<T: Record, D: Dataset> Writer<T, D> {
    pub fn new<C>(
        container: &mut C,
        name: &str,
        max_length: usize,
        batch_size: usize,
        compression_level: u32,
    ) -> Result<Self>
    where
        C: Container<Dataset = D>,
    {
        if batch_size < 1 {
            return Err(StoreError::InvalidParameter(
                "batch size must be > 0".to_string(),
            ));
        }
        let mem_type = T::layout();
        let space = Dataspace::extendible(
            &[0, max_length as u64],
            &[None, Some(max_length as u64)],
        );
        let ds = container.create_dataset(
            name,
            &mem_type.packed(),
            &space,
            &[batch_size as u64, max_length as u64],
            compression_level,
        )?;
        debug!(
            "created rank-2 dataset {:?}, max length {}, batch size {}",
            name, max_length, batch_size
        );
        Ok(Self {
            mem_type,
            sentinel: T::sentinel(),
            max_length,
            batch_size,
            offset: 0,
            buffer: Vec::new(),
            ds,
        })
    }

    /// Appends one row. The input is normalized to exactly `max_length`
    /// records before buffering; a full buffer is flushed first.
    pub fn add(&mut self, mut row: Vec<T>) -> Result<()> {
        if self.buffered_rows() == self.batch_size {
            self.flush()?;
        }
        row.resize(self.max_length, self.sentinel);
        self.buffer.extend_from_slice(&row);
        Ok(())
    }

    /// Extends the dataset by the buffered rows and writes them at the
    /// current offset. No-op on an empty buffer. On failure the buffer
    /// state is undefined and the writer must be abandoned.
    pub fn flush(&mut self) -> Result<()> {
        let rows = self.buffered_rows() as u64;
        if rows == 0 {
            return Ok(());
        }
        let width = self.max_length as u64;
        self.ds.extend(&[self.offset + rows, width])?;
        let file_space = self.ds.space()?;
        let slab = file_space.select_hyperslab(&[self.offset, 0], &[rows, width]);
        let mem_space = Dataspace::simple(&[rows, width]);
        self.ds
            .write(raw_bytes(&self.buffer), &self.mem_type, &mem_space, &slab)?;
        trace!("flushed {} rows at offset {}", rows, self.offset);
        self.offset += rows;
        self.buffer.clear();
        Ok(())
    }

    /// Releases the dataset. Buffered rows that were never flushed are
    /// dropped, as in the underlying storage model; callers flush first.
    pub fn close(mut self) -> Result<()> {
        self.ds.close()
    }

    /// Number of whole rows currently buffered. The buffer only ever
    /// holds whole rows; anything else is a defect.
    pub fn buffered_rows(&self) -> usize {
        if self.buffer.is_empty() {
            return 0;
        }
        assert_eq!(
            self.buffer.len() % self.max_length,
            0,
            "buffer is not a whole number of rows"
        );
        self.buffer.len() / self.max_length
    }
}

/// Rank-1 writer: one record per `add`, no padding or truncation.
#[derive(Debug)]
pub struct Writer1d<T: Record, D: Dataset> {
    mem_type: DataLayout,
    batch_size: usize,
    offset: u64,
    buffer: Vec<T>,
    ds: D,
}

impl<T: Record, D: Dataset> Writer1d<T, D> {
    pub fn new<C>(
        container: &mut C,
        name: &str,
        batch_size: usize,
        compression_level: u32,
    ) -> Result<Self>
    where
        C: Container<Dataset = D>,
    {
        if batch_size < 1 {
            return Err(StoreError::InvalidParameter(
                "batch size must be > 0".to_string(),
            ));
        }
        let mem_type = T::layout();
        let space = Dataspace::extendible(&[0], &[None]);
        let ds = container.create_dataset(
            name,
            &mem_type.packed(),
            &space,
            &[batch_size as u64],
            compression_level,
        )?;
        debug!(
            "created rank-1 dataset {:?}, batch size {}",
            name, batch_size
        );
        Ok(Self {
            mem_type,
            batch_size,
            offset: 0,
            buffer: Vec::new(),
            ds,
        })
    }

    pub fn add(&mut self, record: T) -> Result<()> {
        if self.buffered_rows() == self.batch_size {
            self.flush()?;
        }
        self.buffer.push(record);
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        let rows = self.buffered_rows() as u64;
        if rows == 0 {
            return Ok(());
        }
        self.ds.extend(&[self.offset + rows])?;
        let file_space = self.ds.space()?;
        let slab = file_space.select_hyperslab(&[self.offset], &[rows]);
        let mem_space = Dataspace::simple(&[rows]);
        self.ds
            .write(raw_bytes(&self.buffer), &self.mem_type, &mem_space, &slab)?;
        trace!("flushed {} records at offset {}", rows, self.offset);
        self.offset += rows;
        self.buffer.clear();
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.ds.close()
    }

    pub fn buffered_rows(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::StoreError;
    use crate::layout::pack_records;
    use crate::layout::raw_bytes;
    use crate::layout::Record;
    use crate::test_util::MemContainer;
    use crate::test_util::Probe;
    use crate::writer::Writer;
    use crate::writer::Writer1d;

    fn probe(pt: f32, mask: bool) -> Probe {
        Probe { pt, mask }
    }

    fn packed(records: &[Probe]) -> Vec<u8> {
        pack_records(raw_bytes(records), &Probe::layout())
    }

    #[test]
    fn pads_short_rows_with_sentinel() {
        let mut container = MemContainer::new();
        let mut writer = Writer::new(&mut container, "tracks", 3, 2, 7).unwrap();
        writer.add(vec![probe(1.0, true), probe(2.0, true)]).unwrap();
        writer.add(vec![probe(3.0, true)]).unwrap();
        writer.flush().unwrap();
        writer.close().unwrap();

        let ds = container.dataset("tracks");
        let state = ds.borrow();
        assert_eq!(state.dims, vec![2, 3]);
        assert!(state.closed);
        let expected = packed(&[
            probe(1.0, true),
            probe(2.0, true),
            probe(0.0, false),
            probe(3.0, true),
            probe(0.0, false),
            probe(0.0, false),
        ]);
        assert_eq!(state.data, expected);
    }

    #[test]
    fn truncates_long_rows() {
        let mut container = MemContainer::new();
        let mut writer = Writer::new(&mut container, "tracks", 2, 4, 7).unwrap();
        writer
            .add(vec![
                probe(1.0, true),
                probe(2.0, true),
                probe(3.0, true),
                probe(4.0, true),
            ])
            .unwrap();
        writer.flush().unwrap();
        writer.close().unwrap();

        let ds = container.dataset("tracks");
        let state = ds.borrow();
        assert_eq!(state.dims, vec![1, 2]);
        assert_eq!(state.data, packed(&[probe(1.0, true), probe(2.0, true)]));
    }

    #[test]
    fn unit_batch_extends_once_per_add() {
        let mut container = MemContainer::new();
        let mut writer = Writer::new(&mut container, "tracks", 1, 1, 7).unwrap();
        for i in 0..5 {
            writer.add(vec![probe(i as f32, true)]).unwrap();
        }
        writer.flush().unwrap();
        writer.close().unwrap();

        let ds = container.dataset("tracks");
        let state = ds.borrow();
        assert_eq!(state.extend_calls, 5);
        assert_eq!(state.write_calls, 5);
        assert_eq!(state.dims, vec![5, 1]);
    }

    #[test]
    fn empty_writer_touches_nothing() {
        let mut container = MemContainer::new();
        let writer = Writer::<Probe, _>::new(&mut container, "tracks", 3, 2, 7).unwrap();
        writer.close().unwrap();

        let ds = container.dataset("tracks");
        let state = ds.borrow();
        assert_eq!(state.dims, vec![0, 3]);
        assert_eq!(state.extend_calls, 0);
        assert_eq!(state.write_calls, 0);
        assert!(state.data.is_empty());
    }

    #[test]
    fn zero_batch_size_is_a_configuration_error() {
        let mut container = MemContainer::new();
        let err = Writer::<Probe, _>::new(&mut container, "tracks", 3, 0, 7).unwrap_err();
        assert!(matches!(err, StoreError::InvalidParameter(_)));
        assert!(!container.contains("tracks"));
    }

    #[test]
    fn flush_on_empty_buffer_is_a_noop() {
        let mut container = MemContainer::new();
        let mut writer = Writer::<Probe, _>::new(&mut container, "tracks", 2, 2, 7).unwrap();
        writer.flush().unwrap();
        writer.add(vec![probe(1.0, true)]).unwrap();
        writer.flush().unwrap();
        writer.flush().unwrap();
        writer.close().unwrap();

        let ds = container.dataset("tracks");
        let state = ds.borrow();
        assert_eq!(state.extend_calls, 1);
        assert_eq!(state.write_calls, 1);
    }

    #[test]
    fn auto_flush_fires_on_the_overflowing_add() {
        let mut container = MemContainer::new();
        let mut writer = Writer::new(&mut container, "tracks", 1, 2, 7).unwrap();
        writer.add(vec![probe(1.0, true)]).unwrap();
        assert_eq!(writer.buffered_rows(), 1);
        writer.add(vec![probe(2.0, true)]).unwrap();
        // buffer is exactly full; the flush waits for the next add
        assert_eq!(writer.buffered_rows(), 2);
        writer.add(vec![probe(3.0, true)]).unwrap();
        assert_eq!(writer.buffered_rows(), 1);

        let ds = container.dataset("tracks");
        assert_eq!(ds.borrow().write_calls, 1);
        writer.flush().unwrap();
        writer.close().unwrap();
        let state = ds.borrow();
        assert_eq!(state.dims, vec![3, 1]);
        assert_eq!(
            state.data,
            packed(&[probe(1.0, true), probe(2.0, true), probe(3.0, true)])
        );
    }

    #[test]
    fn scalar_writer_appends_in_order() {
        let mut container = MemContainer::new();
        let mut writer = Writer1d::new(&mut container, "counts", 3, 7).unwrap();
        for i in 0..7i32 {
            writer.add(i).unwrap();
        }
        writer.flush().unwrap();
        writer.close().unwrap();

        let ds = container.dataset("counts");
        let state = ds.borrow();
        assert_eq!(state.dims, vec![7]);
        let values = [0i32, 1, 2, 3, 4, 5, 6];
        assert_eq!(state.data, raw_bytes(&values));
        // two auto-flushes plus the explicit one
        assert_eq!(state.write_calls, 3);
    }

    #[test]
    fn scalar_zero_batch_size_is_rejected() {
        let mut container = MemContainer::new();
        let err = Writer1d::<i32, _>::new(&mut container, "counts", 0, 7).unwrap_err();
        assert!(matches!(err, StoreError::InvalidParameter(_)));
        assert!(!container.contains("counts"));
    }

    #[test]
    fn batching_is_invisible_in_the_output() {
        let rows = (0..17)
            .map(|i| vec![probe(i as f32, i % 2 == 0); (i % 4) as usize])
            .collect::<Vec<_>>();

        let mut reference = MemContainer::new();
        let mut writer = Writer::new(&mut reference, "tracks", 3, 1, 7).unwrap();
        for row in &rows {
            writer.add(row.clone()).unwrap();
            writer.flush().unwrap();
        }
        writer.close().unwrap();

        let mut batched = MemContainer::new();
        let mut writer = Writer::new(&mut batched, "tracks", 3, 4, 7).unwrap();
        for (i, row) in rows.iter().enumerate() {
            writer.add(row.clone()).unwrap();
            if i % 5 == 0 {
                writer.flush().unwrap();
            }
        }
        writer.flush().unwrap();
        writer.close().unwrap();

        let lhs = reference.dataset("tracks");
        let rhs = batched.dataset("tracks");
        assert_eq!(lhs.borrow().dims, rhs.borrow().dims);
        assert_eq!(lhs.borrow().data, rhs.borrow().data);
    }
}
