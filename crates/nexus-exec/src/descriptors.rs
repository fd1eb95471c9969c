//! Tuple and slot descriptors.
//!
//! The descriptor table maps the tuple and slot ids used by serialized plans to
//! physical layout. Operators consult it during Prepare: a [`RowDescriptor`]
//! flattens the tuples that make up an operator's output row into one ordered
//! list of slots, and expressions resolve slot ids to positions in that list.

use std::collections::HashMap;
use std::fmt;
use std::mem;

use nexus_common::{ExecError, ExecResult, SlotId, TupleId};
use serde::{Deserialize, Serialize};

use crate::value::Datum;

/// The type of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Boolean.
    Boolean,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    BigInt,
    /// 64-bit floating point.
    Double,
    /// Variable-length UTF-8 string.
    String,
}

impl ColumnType {
    /// Returns true for integer and floating point types.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::BigInt | ColumnType::Double)
    }

    /// Returns true for integer types.
    pub fn is_integer(&self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::BigInt)
    }

    /// Returns true if values of both types can be compared with each other.
    pub fn is_comparable_with(&self, other: &ColumnType) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }

    /// Returns the type name.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Int => "INT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE",
            ColumnType::String => "STRING",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Describes one slot of a tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDescriptor {
    /// Slot id, unique across the descriptor table.
    pub id: SlotId,
    /// Column name, for diagnostics.
    pub name: String,
    /// Slot type.
    #[serde(rename = "type")]
    pub ty: ColumnType,
    /// Whether the slot may hold NULL.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl SlotDescriptor {
    /// Creates a nullable slot.
    pub fn nullable(id: u32, name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            id: SlotId::new(id),
            name: name.into(),
            ty,
            nullable: true,
        }
    }

    /// Creates a non-nullable slot.
    pub fn not_null(id: u32, name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            nullable: false,
            ..Self::nullable(id, name, ty)
        }
    }
}

/// Describes the layout of one tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleDescriptor {
    /// Tuple id.
    pub id: TupleId,
    /// Slots in layout order.
    pub slots: Vec<SlotDescriptor>,
}

impl TupleDescriptor {
    /// Creates a tuple descriptor.
    pub fn new(id: u32, slots: Vec<SlotDescriptor>) -> Self {
        Self {
            id: TupleId::new(id),
            slots,
        }
    }
}

/// Serialized form of the descriptor table, as shipped with a plan fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptorTableDesc {
    /// All tuple layouts referenced by the fragment.
    pub tuples: Vec<TupleDescriptor>,
}

/// Resolved descriptor table.
#[derive(Debug, Clone, Default)]
pub struct DescriptorTbl {
    tuples: HashMap<TupleId, TupleDescriptor>,
    slot_owners: HashMap<SlotId, TupleId>,
}

impl DescriptorTbl {
    /// Builds the table, rejecting duplicate tuple or slot ids.
    pub fn from_desc(desc: DescriptorTableDesc) -> ExecResult<Self> {
        let mut tbl = Self::default();
        for tuple in desc.tuples {
            for slot in &tuple.slots {
                if tbl.slot_owners.insert(slot.id, tuple.id).is_some() {
                    return Err(ExecError::prepare(format!(
                        "duplicate slot id {} in descriptor table",
                        slot.id
                    )));
                }
            }
            let id = tuple.id;
            if tbl.tuples.insert(id, tuple).is_some() {
                return Err(ExecError::prepare(format!(
                    "duplicate tuple id {id} in descriptor table"
                )));
            }
        }
        Ok(tbl)
    }

    /// Looks up a tuple layout.
    pub fn tuple(&self, id: TupleId) -> Option<&TupleDescriptor> {
        self.tuples.get(&id)
    }

    /// Looks up a slot.
    pub fn slot(&self, id: SlotId) -> Option<&SlotDescriptor> {
        let tuple = self.tuples.get(self.slot_owners.get(&id)?)?;
        tuple.slots.iter().find(|slot| slot.id == id)
    }

    /// Returns the number of tuples.
    pub fn num_tuples(&self) -> usize {
        self.tuples.len()
    }
}

/// Layout of the rows an operator produces.
///
/// Rows are the concatenation of the listed tuples' slots, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDescriptor {
    tuple_ids: Vec<TupleId>,
    slots: Vec<SlotDescriptor>,
    positions: HashMap<SlotId, usize>,
}

impl RowDescriptor {
    /// Resolves the given tuples against the descriptor table.
    pub fn new(tbl: &DescriptorTbl, tuple_ids: &[TupleId]) -> ExecResult<Self> {
        if tuple_ids.is_empty() {
            return Err(ExecError::prepare("row descriptor needs at least one tuple"));
        }

        let mut slots = Vec::new();
        for id in tuple_ids {
            let tuple = tbl
                .tuple(*id)
                .ok_or_else(|| ExecError::prepare(format!("unknown tuple id {id}")))?;
            slots.extend(tuple.slots.iter().cloned());
        }

        let positions = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (slot.id, i))
            .collect();

        Ok(Self {
            tuple_ids: tuple_ids.to_vec(),
            slots,
            positions,
        })
    }

    /// Returns the tuples making up the row.
    pub fn tuple_ids(&self) -> &[TupleId] {
        &self.tuple_ids
    }

    /// Returns the number of slots per row.
    pub fn width(&self) -> usize {
        self.slots.len()
    }

    /// Returns all slots in row order.
    pub fn slots(&self) -> &[SlotDescriptor] {
        &self.slots
    }

    /// Returns the position of a slot within the row.
    pub fn slot_index(&self, id: SlotId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Returns the type of the slot at `index`.
    pub fn column_type(&self, index: usize) -> Option<ColumnType> {
        self.slots.get(index).map(|slot| slot.ty)
    }

    /// Returns the bytes of fixed-size slot storage one row occupies.
    pub fn fixed_row_size(&self) -> usize {
        self.width() * mem::size_of::<Datum>()
    }

    /// Returns true if rows of `other` can be passed through as rows of `self`.
    pub fn is_compatible(&self, other: &RowDescriptor) -> bool {
        self.tuple_ids == other.tuple_ids
    }
}
