//! Settlement layer for rollapp transfers.
//!
//! Ties together the delayed-acknowledgement packet queue and the eIBC order
//! marketplace: the middleware intercepts transfer-protocol callbacks on
//! rollapp channels, the keepers hold the parked packets and their tradable
//! claims, and [`HubService`] wires everything and exposes the command and
//! query surface.

pub mod error;
pub mod event_bus;
pub mod middleware;
pub mod service;

pub use error::CoreError;
pub use event_bus::EventBus;
pub use middleware::DelayedAckMiddleware;
pub use service::HubService;
