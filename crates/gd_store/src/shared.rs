//! Shared, possibly cyclic, object references.
//!
//! [`Shared<T>`] is a reference-counted cell. Inside one encode, the first
//! time an allocation is reached its value is written in full under a fresh
//! object id; every later occurrence writes only that id. Decoding rebuilds a
//! single allocation per id, so identity and cycles survive a round trip.
//!
//! The encoder and decoder learn about a shared field through a thread-local
//! table that is live only while `to_bytes`/`from_bytes` run. Outside of it
//! (for example with `serde_json`) a `Shared<T>` serializes as a plain `T`.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{self, Serialize, Serializer};

use crate::format::error::{FormatError, Result};

/// Newtype name the format recognizes as a shared object boundary.
pub(crate) const TOKEN: &str = "$gd_store::Shared";

/// A shared, interiorly mutable value that keeps its identity through a save.
pub struct Shared<T>(Rc<RefCell<T>>);

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Shared(Rc::new(RefCell::new(value)))
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Replaces the inner value, returning the old one.
    pub fn replace(&self, value: T) -> T {
        self.0.replace(value)
    }

    /// True when both handles point at the same allocation.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.0, &other.0)
    }

    pub fn strong_count(this: &Self) -> usize {
        Rc::strong_count(&this.0)
    }

    /// Returns the inner value if this is the last handle.
    pub fn try_unwrap(this: Self) -> std::result::Result<T, Self> {
        Rc::try_unwrap(this.0).map(RefCell::into_inner).map_err(Shared)
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(Rc::clone(&self.0))
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Shared::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A value already being printed further up is a cycle.
        match self.0.try_borrow_mut() {
            Ok(value) => f.debug_tuple("Shared").field(&*value).finish(),
            Err(_) => f.write_str("Shared(<cycle>)"),
        }
    }
}

/// Same allocation, or equal values. Comparing two distinct cyclic graphs
/// does not terminate.
impl<T: PartialEq> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        Shared::ptr_eq(self, other) || *self.0.borrow() == *other.0.borrow()
    }
}

/// What the next shared boundary should write or read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Staged {
    /// First occurrence: the full value follows the id.
    First(u32),
    /// Back-reference to an object already written or read.
    Back(u32),
}

#[derive(Default)]
struct OutgoingTable {
    // Address -> handle. Holding the handle pins the address for the whole
    // encode, so a freed allocation cannot be mistaken for a live one.
    objects: IndexMap<usize, Rc<dyn Any>>,
    staged: Option<Staged>,
}

#[derive(Default)]
struct IncomingTable {
    objects: HashMap<u32, Rc<dyn Any>>,
    staged: Option<Staged>,
}

thread_local! {
    static OUTGOING: RefCell<Option<OutgoingTable>> = const { RefCell::new(None) };
    static INCOMING: RefCell<Option<IncomingTable>> = const { RefCell::new(None) };
}

/// Activates a fresh outgoing table for one encode.
pub(crate) struct OutgoingScope {
    previous: Option<OutgoingTable>,
}

impl OutgoingScope {
    pub(crate) fn enter() -> Self {
        let previous = OUTGOING.with(|slot| slot.replace(Some(OutgoingTable::default())));
        OutgoingScope { previous }
    }
}

impl Drop for OutgoingScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        OUTGOING.with(|slot| {
            if let Some(table) = slot.replace(previous) {
                if !table.objects.is_empty() {
                    log::trace!("Encoded {} shared objects", table.objects.len());
                }
            }
        });
    }
}

/// Activates a fresh incoming table for one decode.
pub(crate) struct IncomingScope {
    previous: Option<IncomingTable>,
}

impl IncomingScope {
    pub(crate) fn enter() -> Self {
        let previous = INCOMING.with(|slot| slot.replace(Some(IncomingTable::default())));
        IncomingScope { previous }
    }
}

impl Drop for IncomingScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        INCOMING.with(|slot| {
            slot.replace(previous);
        });
    }
}

/// Records `cell` in the outgoing table and stages its id.
///
/// Returns `false` when no encode is running.
fn stage_outgoing<T: 'static>(cell: &Rc<RefCell<T>>) -> bool {
    OUTGOING.with(|slot| {
        let mut slot = slot.borrow_mut();
        let Some(table) = slot.as_mut() else {
            return false;
        };
        let address = Rc::as_ptr(cell) as *const () as usize;
        let staged = match table.objects.get_index_of(&address) {
            Some(index) => Staged::Back(index as u32),
            None => {
                let handle: Rc<dyn Any> = cell.clone();
                let (index, _) = table.objects.insert_full(address, handle);
                Staged::First(index as u32)
            }
        };
        table.staged = Some(staged);
        true
    })
}

pub(crate) fn take_outgoing() -> Option<Staged> {
    OUTGOING.with(|slot| slot.borrow_mut().as_mut().and_then(|table| table.staged.take()))
}

fn incoming_active() -> bool {
    INCOMING.with(|slot| slot.borrow().is_some())
}

/// Stages an object definition read from the input.
pub(crate) fn stage_definition(id: u32) -> Result<()> {
    INCOMING.with(|slot| {
        let mut slot = slot.borrow_mut();
        let table = slot.as_mut().ok_or(FormatError::UntypedBackReference(id))?;
        if table.objects.contains_key(&id) {
            return Err(FormatError::DuplicateObjectId(id));
        }
        table.staged = Some(Staged::First(id));
        Ok(())
    })
}

/// Stages a back-reference read from the input.
pub(crate) fn stage_reference(id: u32) -> Result<()> {
    INCOMING.with(|slot| {
        let mut slot = slot.borrow_mut();
        let table = slot.as_mut().ok_or(FormatError::UntypedBackReference(id))?;
        if !table.objects.contains_key(&id) {
            return Err(FormatError::UnknownObjectId(id));
        }
        table.staged = Some(Staged::Back(id));
        Ok(())
    })
}

fn take_incoming() -> Option<Staged> {
    INCOMING.with(|slot| slot.borrow_mut().as_mut().and_then(|table| table.staged.take()))
}

fn register_incoming(id: u32, handle: Rc<dyn Any>) {
    INCOMING.with(|slot| {
        if let Some(table) = slot.borrow_mut().as_mut() {
            table.objects.insert(id, handle);
        }
    });
}

/// Whether object `id` has been decoded in the running decode.
pub(crate) fn is_registered(id: u32) -> bool {
    INCOMING.with(|slot| slot.borrow().as_ref().is_some_and(|table| table.objects.contains_key(&id)))
}

fn lookup_incoming(id: u32) -> Option<Rc<dyn Any>> {
    INCOMING.with(|slot| slot.borrow().as_ref().and_then(|table| table.objects.get(&id).cloned()))
}

/// Borrows the cell only if the encoder asks for the body.
struct Body<'a, T>(&'a RefCell<T>);

impl<T: Serialize> Serialize for Body<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let value = self
            .0
            .try_borrow()
            .map_err(|_| ser::Error::custom("shared value is mutably borrowed during save"))?;
        value.serialize(serializer)
    }
}

impl<T: Serialize + 'static> Serialize for Shared<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if stage_outgoing(&self.0) {
            serializer.serialize_newtype_struct(TOKEN, &Body(&self.0))
        } else {
            Body(&self.0).serialize(serializer)
        }
    }
}

impl<'de, T> Deserialize<'de> for Shared<T>
where
    T: Deserialize<'de> + Default + 'static,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if incoming_active() {
            deserializer.deserialize_newtype_struct(TOKEN, SharedVisitor(PhantomData))
        } else {
            T::deserialize(deserializer).map(Shared::new)
        }
    }
}

struct SharedVisitor<T>(PhantomData<T>);

impl<'de, T> Visitor<'de> for SharedVisitor<T>
where
    T: Deserialize<'de> + Default + 'static,
{
    type Value = Shared<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a shared object")
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<Self::Value, D::Error> {
        match take_incoming() {
            Some(Staged::First(id)) => {
                // The placeholder is registered before the body is read so that
                // back-references inside the body resolve to this allocation.
                let cell = Rc::new(RefCell::new(T::default()));
                let handle: Rc<dyn Any> = cell.clone();
                register_incoming(id, handle);
                let value = T::deserialize(deserializer)?;
                *cell.borrow_mut() = value;
                Ok(Shared(cell))
            }
            Some(Staged::Back(id)) => {
                let handle = lookup_incoming(id)
                    .ok_or_else(|| de::Error::custom(FormatError::UnknownObjectId(id)))?;
                let cell = handle.downcast::<RefCell<T>>().map_err(|_| {
                    de::Error::custom(FormatError::SharedTypeMismatch {
                        id,
                        expected: std::any::type_name::<T>(),
                    })
                })?;
                Ok(Shared(cell))
            }
            None => Err(de::Error::custom("shared object boundary without an object id")),
        }
    }
}
