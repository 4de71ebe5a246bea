//! Domain events and the in-process bus used to fan them out.
//!
//! Events are published only after the primary mutation has committed, so
//! consumers (email, location capture) can never roll it back.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
