//! Port model.
//!
//! Ports are the typed connection endpoints on processors. An outport
//! publishes data into a shared slot; an inport reads from the slots of the
//! outports it is connected to. The connection itself is type-checked at
//! connect time against a static type tag (the payload's `TypeId`), because
//! networks are rebuilt dynamically from snapshots and the compile-time
//! types of the two endpoints are not visible to the network.
//!
//! Readiness rules:
//!
//! - An outport is ready when it holds data.
//! - A mandatory inport is ready when it is connected and every connected
//!   outport holds data.
//! - An optional inport is ready while unconnected; once connected it
//!   follows the same has-data rule as a mandatory one. `process()` bodies
//!   must handle its data being absent either way.

mod inport;
mod outport;
mod traits;

pub use inport::{DataInport, MultiDataInport};
pub use outport::{DataOutport, OutportSlot};
pub use traits::{Inport, Outport, OutportHandle, Port, SlotId};
