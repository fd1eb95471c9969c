//! Row batches, the unit of data transfer between operators.
//!
//! A [`RowBatch`] holds up to `capacity` rows of fixed-width slot storage plus a
//! [`MemPool`] arena that owns the variable-length bytes those slots point at.
//! Rows move between batches in one of two ways:
//!
//! - [`RowBatch::copy_row_into`] duplicates the row's variable-length data into
//!   the destination arena. The source batch can be reset right away.
//! - [`RowBatch::share_row_into`] copies only the slot handles. The rows become
//!   readable in the destination once [`RowBatch::transfer_arena_ownership`]
//!   hands the source arena over. The source must not be read again afterwards.
//!
//! There is no other way for two batches to reference the same bytes.

use std::fmt;
use std::sync::Arc;

use nexus_common::memory::{MemPool, MemTracker, PoolMark};
use nexus_common::{EvalError, ExecError, ExecResult};

use crate::descriptors::{ColumnType, RowDescriptor, SlotDescriptor};
use crate::value::{Datum, ScalarValue};

/// A bounded, reusable collection of rows.
pub struct RowBatch {
    row_desc: Arc<RowDescriptor>,
    capacity: usize,
    num_rows: usize,
    /// Slot storage, `num_rows * width` datums in row-major order.
    slots: Vec<Datum>,
    pool: MemPool,
    /// Bytes charged to the tracker for the slot buffer.
    fixed_bytes: u64,
    /// Arena position before the last `push_values`, while that row is still
    /// the only thing written since.
    last_push: Option<PoolMark>,
}

impl RowBatch {
    /// Creates an empty batch, charging its slot buffer to the pool's tracker.
    pub fn new(row_desc: Arc<RowDescriptor>, capacity: usize, pool: MemPool) -> ExecResult<Self> {
        if capacity == 0 {
            return Err(ExecError::internal("row batch capacity must be positive"));
        }

        let fixed_bytes = (capacity * row_desc.fixed_row_size()) as u64;
        pool.tracker().try_consume(fixed_bytes)?;

        Ok(Self {
            slots: Vec::with_capacity(capacity * row_desc.width()),
            row_desc,
            capacity,
            num_rows: 0,
            pool,
            fixed_bytes,
            last_push: None,
        })
    }

    /// Returns the row layout.
    pub fn row_desc(&self) -> &Arc<RowDescriptor> {
        &self.row_desc
    }

    /// Returns the number of rows.
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Returns true if the batch holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Returns the maximum number of rows.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns how many more rows fit.
    #[inline]
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.num_rows
    }

    /// Returns true if no more rows fit.
    #[inline]
    pub fn at_capacity(&self) -> bool {
        self.num_rows >= self.capacity
    }

    /// Returns the number of slots per row.
    #[inline]
    pub fn width(&self) -> usize {
        self.row_desc.width()
    }

    /// Returns the arena owning this batch's variable-length data.
    pub fn pool(&self) -> &MemPool {
        &self.pool
    }

    /// Returns the tracker charged for this batch.
    pub fn tracker(&self) -> &Arc<MemTracker> {
        self.pool.tracker()
    }

    /// Returns a handle to row `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`num_rows`](Self::num_rows).
    pub fn row(&self, index: usize) -> RowRef<'_> {
        assert!(
            index < self.num_rows,
            "row {index} out of range for batch of {} rows",
            self.num_rows
        );
        RowRef { batch: self, index }
    }

    /// Iterates over all rows in order.
    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        (0..self.num_rows).map(move |index| RowRef { batch: self, index })
    }

    /// Checks that `values` fit `row_desc` without allocating anything.
    ///
    /// Each value must match its slot's type; integers widen to BIGINT and
    /// DOUBLE slots. NULL is rejected for non-nullable slots.
    pub fn check_values(row_desc: &RowDescriptor, values: &[ScalarValue]) -> ExecResult<()> {
        check_width(row_desc, values)?;
        for (slot, value) in row_desc.slots().iter().zip(values) {
            fixed_datum(slot, value)?;
        }
        Ok(())
    }

    /// Appends a row of owned values, copying strings into the arena.
    ///
    /// Values are checked as in [`check_values`](Self::check_values).
    pub fn push_values(&mut self, values: &[ScalarValue]) -> ExecResult<()> {
        self.check_room()?;
        check_width(&self.row_desc, values)?;

        let mark = self.pool.mark();
        let start = self.slots.len();
        for (index, value) in values.iter().enumerate() {
            match self.to_datum(index, value) {
                Ok(datum) => self.slots.push(datum),
                Err(e) => {
                    self.slots.truncate(start);
                    self.pool.rollback(mark);
                    return Err(e);
                }
            }
        }
        self.num_rows += 1;
        self.last_push = Some(mark);
        Ok(())
    }

    /// Removes the last row.
    ///
    /// If that row was the last thing written by [`push_values`](Self::push_values),
    /// its arena bytes are released too. Otherwise they stay allocated until the
    /// next reset.
    pub fn pop_row(&mut self) -> bool {
        if self.num_rows == 0 {
            return false;
        }
        self.num_rows -= 1;
        self.slots.truncate(self.num_rows * self.width());
        if let Some(mark) = self.last_push.take() {
            self.pool.rollback(mark);
        }
        true
    }

    /// Appends row `index` of this batch to `dst`, copying its variable-length
    /// data into `dst`'s arena.
    pub fn copy_row_into(&self, index: usize, dst: &mut RowBatch) -> ExecResult<()> {
        self.check_transfer(index, dst)?;
        dst.last_push = None;

        let start = dst.slots.len();
        for (slot, datum) in self.row_slots(index).iter().enumerate() {
            let copied = match datum {
                Datum::String(value) => {
                    let bytes = self
                        .pool
                        .get(value)
                        .ok_or(EvalError::DanglingStringRef { slot });
                    match bytes.map_err(ExecError::from).and_then(|b| dst.pool.allocate(b)) {
                        Ok(value) => Datum::String(value),
                        Err(e) => {
                            dst.slots.truncate(start);
                            return Err(e);
                        }
                    }
                }
                other => *other,
            };
            dst.slots.push(copied);
        }
        dst.num_rows += 1;
        Ok(())
    }

    /// Appends row `index` of this batch to `dst` without copying its
    /// variable-length data.
    ///
    /// The caller must hand this batch's arena to `dst` with
    /// [`transfer_arena_ownership`](Self::transfer_arena_ownership) before `dst`
    /// is read by anyone else.
    pub fn share_row_into(&self, index: usize, dst: &mut RowBatch) -> ExecResult<()> {
        self.check_transfer(index, dst)?;
        dst.last_push = None;
        dst.slots.extend_from_slice(self.row_slots(index));
        dst.num_rows += 1;
        Ok(())
    }

    /// Moves this batch's arena into `dst`.
    ///
    /// Rows still held here no longer resolve their strings; the batch should be
    /// [`reset`](Self::reset) before it is filled again.
    pub fn transfer_arena_ownership(&mut self, dst: &mut RowBatch) {
        dst.pool.acquire_data(&mut self.pool);
        self.last_push = None;
        dst.last_push = None;
    }

    /// Drops every row and frees the arena. Capacity is kept.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.num_rows = 0;
        self.last_push = None;
        self.pool.free_all();
    }

    /// Checks that every string slot resolves in this batch's own arena.
    pub fn validate(&self) -> ExecResult<()> {
        for row in self.rows() {
            for (slot, datum) in row.datums().iter().enumerate() {
                if let Datum::String(value) = datum {
                    if !self.pool.contains(value) {
                        return Err(EvalError::DanglingStringRef { slot }.into());
                    }
                }
            }
        }
        Ok(())
    }

    /// Materializes every row as owned values.
    pub fn to_values(&self) -> ExecResult<Vec<Vec<ScalarValue>>> {
        self.rows()
            .map(|row| row.to_values().map_err(ExecError::from))
            .collect()
    }

    fn row_slots(&self, index: usize) -> &[Datum] {
        let width = self.width();
        &self.slots[index * width..(index + 1) * width]
    }

    fn check_room(&self) -> ExecResult<()> {
        if self.at_capacity() {
            return Err(ExecError::internal(format!(
                "row batch is full ({} rows)",
                self.capacity
            )));
        }
        Ok(())
    }

    fn check_transfer(&self, index: usize, dst: &RowBatch) -> ExecResult<()> {
        if index >= self.num_rows {
            return Err(ExecError::internal(format!(
                "row {index} out of range for batch of {} rows",
                self.num_rows
            )));
        }
        if !dst.row_desc.is_compatible(&self.row_desc) {
            return Err(ExecError::internal(
                "cannot move rows between batches with different layouts",
            ));
        }
        dst.check_room()
    }

    fn to_datum(&mut self, index: usize, value: &ScalarValue) -> ExecResult<Datum> {
        match fixed_datum(&self.row_desc.slots()[index], value)? {
            Some(datum) => Ok(datum),
            None => match value {
                ScalarValue::String(s) => Ok(Datum::String(self.pool.allocate(s.as_bytes())?)),
                _ => Err(ExecError::internal(format!("value {value} has no arena form"))),
            },
        }
    }
}

fn check_width(row_desc: &RowDescriptor, values: &[ScalarValue]) -> ExecResult<()> {
    if values.len() != row_desc.width() {
        return Err(ExecError::internal(format!(
            "row has {} values, expected {}",
            values.len(),
            row_desc.width()
        )));
    }
    Ok(())
}

/// Converts `value` for `slot`. Returns `None` for values that live in the arena.
fn fixed_datum(slot: &SlotDescriptor, value: &ScalarValue) -> ExecResult<Option<Datum>> {
    let mismatch = || {
        ExecError::internal(format!(
            "value {value} does not fit slot '{}' of type {}",
            slot.name, slot.ty
        ))
    };

    let datum = match (slot.ty, value) {
        (_, ScalarValue::Null) if slot.nullable => Datum::Null,
        (ColumnType::Boolean, ScalarValue::Boolean(b)) => Datum::Boolean(*b),
        (ColumnType::Int, ScalarValue::Int(i)) => Datum::Int(*i),
        (ColumnType::BigInt, v) => Datum::BigInt(v.to_i64().ok_or_else(mismatch)?),
        (ColumnType::Double, v) => Datum::Double(v.to_f64().ok_or_else(mismatch)?),
        (ColumnType::String, ScalarValue::String(_)) => return Ok(None),
        _ => return Err(mismatch()),
    };
    Ok(Some(datum))
}

impl Drop for RowBatch {
    fn drop(&mut self) {
        self.pool.tracker().release(self.fixed_bytes);
    }
}

impl fmt::Debug for RowBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowBatch")
            .field("num_rows", &self.num_rows)
            .field("capacity", &self.capacity)
            .field("width", &self.width())
            .field("pool", &self.pool)
            .finish()
    }
}

impl fmt::Display for RowBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "RowBatch ({} rows x {} slots)",
            self.num_rows,
            self.width()
        )?;

        let names: Vec<&str> = self
            .row_desc
            .slots()
            .iter()
            .map(|slot| slot.name.as_str())
            .collect();
        writeln!(f, "{}", names.join(" | "))?;

        // Limit to 10 rows for display
        for row in self.rows().take(10) {
            for slot in 0..row.width() {
                if slot > 0 {
                    write!(f, " | ")?;
                }
                match row.value(slot) {
                    Ok(value) => write!(f, "{value}")?,
                    Err(_) => write!(f, "<dangling>")?,
                }
            }
            writeln!(f)?;
        }
        if self.num_rows > 10 {
            writeln!(f, "... ({} more rows)", self.num_rows - 10)?;
        }
        Ok(())
    }
}

/// A borrowed view of one row of a batch.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    batch: &'a RowBatch,
    index: usize,
}

impl<'a> RowRef<'a> {
    /// Returns the row's position in its batch.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the number of slots.
    pub fn width(&self) -> usize {
        self.batch.width()
    }

    /// Returns the raw slot storage.
    pub fn datums(&self) -> &'a [Datum] {
        self.batch.row_slots(self.index)
    }

    /// Returns the raw datum in `slot`.
    pub fn datum(&self, slot: usize) -> Result<Datum, EvalError> {
        self.datums()
            .get(slot)
            .copied()
            .ok_or(EvalError::SlotOutOfRange {
                slot,
                width: self.width(),
            })
    }

    /// Returns the string bytes in `slot`, resolved against the batch arena.
    pub fn bytes(&self, slot: usize) -> Result<Option<&'a [u8]>, EvalError> {
        match self.datum(slot)? {
            Datum::String(value) => self
                .batch
                .pool
                .get(&value)
                .map(Some)
                .ok_or(EvalError::DanglingStringRef { slot }),
            _ => Ok(None),
        }
    }

    /// Returns the value in `slot` as an owned value.
    pub fn value(&self, slot: usize) -> Result<ScalarValue, EvalError> {
        let value = match self.datum(slot)? {
            Datum::Null => ScalarValue::Null,
            Datum::Boolean(b) => ScalarValue::Boolean(b),
            Datum::Int(i) => ScalarValue::Int(i),
            Datum::BigInt(i) => ScalarValue::BigInt(i),
            Datum::Double(f) => ScalarValue::Double(f),
            Datum::String(value) => {
                let bytes = self
                    .batch
                    .pool
                    .get(&value)
                    .ok_or(EvalError::DanglingStringRef { slot })?;
                let s = std::str::from_utf8(bytes).map_err(|_| EvalError::InvalidUtf8 { slot })?;
                ScalarValue::String(s.to_string())
            }
        };
        Ok(value)
    }

    /// Materializes the row as owned values.
    pub fn to_values(&self) -> Result<Vec<ScalarValue>, EvalError> {
        (0..self.width()).map(|slot| self.value(slot)).collect()
    }
}

impl fmt::Debug for RowRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowRef")
            .field("index", &self.index)
            .field("datums", &self.datums())
            .finish()
    }
}
