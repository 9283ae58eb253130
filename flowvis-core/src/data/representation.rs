//! Representation trait.
//!
//! A representation is one concrete encoding of a data object's content.
//! Representations are stored type-erased inside [`DataObject`] and recovered
//! through `Any` downcasts after a `TypeId` tag check, so the concrete kind is
//! the Rust type itself rather than a separate enum of kinds.
//!
//! [`DataObject`]: super::DataObject

use std::any::Any;

/// Logical extent of a representation's content, in elements per axis.
///
/// One- and two-dimensional content uses trailing `1` entries.
pub type Dimensions = [usize; 3];

/// One concrete encoding of a data object's content.
///
/// Implementors must be fully self-contained: a converter that produces a
/// representation deep-copies whatever it needs, so two sibling
/// representations of one data object never alias storage.
pub trait Representation: Any + Send + Sync {
    /// Current extent of the content.
    fn dimensions(&self) -> Dimensions;

    /// Destructively resize the content.
    ///
    /// Existing content need not be preserved; callers treat the resized
    /// representation as the new authoritative source.
    fn set_dimensions(&mut self, dimensions: Dimensions);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
