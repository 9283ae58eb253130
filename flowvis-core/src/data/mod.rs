//! Data and representation model.
//!
//! A logical data object (a volume, an image) owns zero or more concrete
//! *representations* of the same content: a RAM array, a GPU texture, a disk
//! placeholder. Representations are created lazily through registered
//! converters and tracked for staleness so that:
//!
//! - `const` access never copies or invalidates anything that is already
//!   up to date,
//! - editable access invalidates every sibling representation before the
//!   caller can mutate,
//! - exactly one representation is the authoritative "last valid" source
//!   that stale siblings reconvert from.
//!
//! [`DataGroup`] extends this to containers (an image owning layers): group
//! representations reference member representations and must be refreshed
//! whenever *any* member changed, bottom-up.

mod converter;
mod group;
mod object;
mod representation;

pub use converter::ConverterRegistry;
pub use group::{DataGroup, GroupRepresentation};
pub use object::DataObject;
pub use representation::{Dimensions, Representation};
