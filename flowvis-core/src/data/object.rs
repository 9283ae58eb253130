//! Data object with lazy representation conversion.
//!
//! # How It Works
//!
//! 1. A data object starts empty; a processor or reader seeds it with one
//!    concrete representation via [`DataObject::add_representation`].
//!
//! 2. Const access (`with::<T>`) returns the existing representation of kind
//!    `T` if it is up to date. Otherwise it synthesizes one by converting
//!    from the "last valid" representation through the registry, caches it,
//!    and leaves every sibling untouched.
//!
//! 3. Editable access (`edit::<T>`) first makes sure an up-to-date `T`
//!    exists (same synthesis), then invalidates every sibling and promotes
//!    `T` to "last valid" before handing out the mutable reference. The
//!    stale siblings are reconverted lazily on their next access.
//!
//! 4. Resizing keeps only the last valid representation (resized in place)
//!    and discards the rest; their content is unrecoverable at the old size.
//!
//! Access is closure-based so the interior lock is held exactly for the
//! duration of the caller's read or edit.
//!
//! # Invariants
//!
//! - At most one representation per concrete kind.
//! - Whenever the slot list is non-empty, exactly one slot is "last valid",
//!   and that slot is never stale.

use std::any::TypeId;
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::data::{ConverterRegistry, Dimensions, Representation};
use crate::error::ConversionError;

struct Slot {
    repr: Box<dyn Representation>,
    valid: bool,
}

impl Slot {
    fn kind(&self) -> TypeId {
        self.repr.as_any().type_id()
    }
}

struct Inner {
    /// Typically RAM / GPU / disk, rarely more than four kinds.
    slots: SmallVec<[Slot; 4]>,
    /// Index of the authoritative representation, `None` only while empty.
    last_valid: Option<usize>,
    version: u64,
}

/// A logical data object owning lazily-converted representations.
pub struct DataObject {
    converters: Arc<ConverterRegistry>,
    inner: RwLock<Inner>,
}

impl DataObject {
    pub fn new(converters: Arc<ConverterRegistry>) -> Self {
        Self {
            converters,
            inner: RwLock::new(Inner {
                slots: SmallVec::new(),
                last_valid: None,
                version: 0,
            }),
        }
    }

    /// Seed or replace the representation of kind `T` with fresh content.
    ///
    /// The new representation becomes the authoritative "last valid" one;
    /// all siblings are invalidated.
    pub fn add_representation<T: Representation>(&self, repr: T) {
        let mut inner = self.inner.write();
        let kind = TypeId::of::<T>();
        for slot in inner.slots.iter_mut() {
            slot.valid = false;
        }
        let index = match inner.slots.iter().position(|s| s.kind() == kind) {
            Some(index) => {
                inner.slots[index].repr = Box::new(repr);
                index
            }
            None => {
                inner.slots.push(Slot {
                    repr: Box::new(repr),
                    valid: true,
                });
                inner.slots.len() - 1
            }
        };
        inner.slots[index].valid = true;
        inner.last_valid = Some(index);
        inner.version += 1;
    }

    /// Whether a representation of kind `T` exists, stale or not.
    ///
    /// Never synthesizes.
    pub fn has_representation<T: Representation>(&self) -> bool {
        let inner = self.inner.read();
        inner.slots.iter().any(|s| s.kind() == TypeId::of::<T>())
    }

    /// Const access to the representation of kind `T`.
    ///
    /// Synthesizes the representation through the converter registry if it
    /// does not exist or is stale; never invalidates siblings. Fails only if
    /// the object is empty or no converter path reaches `T`.
    pub fn with<T, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ConversionError>
    where
        T: Representation,
    {
        let kind = TypeId::of::<T>();

        // Fast path: an up-to-date representation already exists.
        {
            let inner = self.inner.read();
            if let Some(slot) = inner.slots.iter().find(|s| s.kind() == kind && s.valid) {
                let typed = downcast::<T>(slot.repr.as_ref())?;
                return Ok(f(typed));
            }
        }

        let mut inner = self.inner.write();
        let index = Self::synthesize::<T>(&mut inner, &self.converters)?;
        let typed = downcast::<T>(inner.slots[index].repr.as_ref())?;
        Ok(f(typed))
    }

    /// Editable access to the representation of kind `T`.
    ///
    /// Ensures an up-to-date `T` exists, invalidates every sibling, promotes
    /// `T` to "last valid", and bumps the object version. The caller may
    /// freely mutate the representation inside the closure.
    pub fn edit<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, ConversionError>
    where
        T: Representation,
    {
        let mut inner = self.inner.write();
        let index = Self::synthesize::<T>(&mut inner, &self.converters)?;

        for (i, slot) in inner.slots.iter_mut().enumerate() {
            slot.valid = i == index;
        }
        inner.last_valid = Some(index);
        inner.version += 1;

        let typed = downcast_mut::<T>(inner.slots[index].repr.as_mut())?;
        Ok(f(typed))
    }

    /// Destructively resize the content.
    ///
    /// Only the last valid representation survives, resized in place; all
    /// other representations are discarded and reconvert (at the new size)
    /// on their next access.
    pub fn set_dimensions(&self, dimensions: Dimensions) {
        let mut inner = self.inner.write();
        let Some(last_valid) = inner.last_valid else {
            return;
        };
        let keep = inner.slots[last_valid].kind();
        inner.slots.retain(|s| s.kind() == keep);
        inner.slots[0].repr.set_dimensions(dimensions);
        inner.slots[0].valid = true;
        inner.last_valid = Some(0);
        inner.version += 1;
    }

    /// Dimensions of the authoritative representation, if any.
    pub fn dimensions(&self) -> Option<Dimensions> {
        let inner = self.inner.read();
        inner.last_valid.map(|i| inner.slots[i].repr.dimensions())
    }

    /// Drop every representation, returning the object to its freshly
    /// constructed state.
    pub fn clear_representations(&self) {
        let mut inner = self.inner.write();
        inner.slots.clear();
        inner.last_valid = None;
        inner.version += 1;
    }

    /// Number of representations currently held, stale ones included.
    pub fn representation_count(&self) -> usize {
        self.inner.read().slots.len()
    }

    /// Monotone counter bumped on every edit, seed, resize, or clear.
    ///
    /// Containers ([`DataGroup`]) snapshot member versions to detect
    /// bottom-up staleness.
    ///
    /// [`DataGroup`]: super::DataGroup
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    /// Make sure an up-to-date slot of kind `T` exists and return its index.
    ///
    /// Converts from the last valid representation when the slot is missing
    /// or stale. Does not touch validity of siblings.
    fn synthesize<T: Representation>(
        inner: &mut Inner,
        converters: &ConverterRegistry,
    ) -> Result<usize, ConversionError> {
        let kind = TypeId::of::<T>();
        let existing = inner.slots.iter().position(|s| s.kind() == kind);

        if let Some(index) = existing {
            if inner.slots[index].valid {
                return Ok(index);
            }
        }

        let source_index = inner
            .last_valid
            .ok_or(ConversionError::NoSourceRepresentation)?;
        let converted = converters.convert(inner.slots[source_index].repr.as_ref(), kind)?;
        if converted.as_any().type_id() != kind {
            return Err(ConversionError::ConverterMismatch {
                produced: "<converter output>",
                expected: std::any::type_name::<T>(),
            });
        }

        match existing {
            Some(index) => {
                inner.slots[index].repr = converted;
                inner.slots[index].valid = true;
                Ok(index)
            }
            None => {
                inner.slots.push(Slot {
                    repr: converted,
                    valid: true,
                });
                Ok(inner.slots.len() - 1)
            }
        }
    }
}

impl std::fmt::Debug for DataObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("DataObject")
            .field("representations", &inner.slots.len())
            .field("version", &inner.version)
            .finish()
    }
}

fn downcast<T: Representation>(repr: &dyn Representation) -> Result<&T, ConversionError> {
    repr.as_any()
        .downcast_ref::<T>()
        .ok_or(ConversionError::ConverterMismatch {
            produced: "<stored representation>",
            expected: std::any::type_name::<T>(),
        })
}

fn downcast_mut<T: Representation>(
    repr: &mut dyn Representation,
) -> Result<&mut T, ConversionError> {
    repr.as_any_mut()
        .downcast_mut::<T>()
        .ok_or(ConversionError::ConverterMismatch {
            produced: "<stored representation>",
            expected: std::any::type_name::<T>(),
        })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
