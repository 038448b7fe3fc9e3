//! Shared types for the rollapp-hub settlement layer.
//!
//! This crate defines the data model used across the delayed-acknowledgement
//! and eIBC subsystems, together with the capability traits through which the
//! settlement layer consumes the transfer protocol, the rollapp registry and
//! the ledger.

pub mod coin;
pub mod events;
pub mod hooks;
pub mod memo;
pub mod order;
pub mod packet;
pub mod traits;

pub use coin::*;
pub use events::*;
pub use hooks::*;
pub use memo::*;
pub use order::*;
pub use packet::*;
pub use traits::*;
