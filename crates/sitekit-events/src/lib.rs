//! # sitekit-events
//!
//! **Purpose**: Typed publish/subscribe event bus for the SiteKit orchestrator
//!
//! Events are drawn from a closed registry ([`EventKind`]); a declared subset
//! of kinds is allowed to cross a process boundary over a newline-delimited
//! JSON relay. Local fan-out is synchronous and runs handlers in subscription
//! order. Unknown kinds arriving from a relay are logged and dropped, never
//! surfaced as errors.
//!
//! ## Usage
//!
//! ```rust
//! use sitekit_events::{Event, EventBus, EventKind};
//!
//! let bus = EventBus::new();
//! bus.on(EventKind::ReloadPage, |_event| {
//!     // notify the browser
//! });
//! bus.emit(&Event::new(EventKind::ReloadPage));
//! ```

pub mod bus;
pub mod error;
pub mod event;
pub mod kind;
pub mod relay;

pub use bus::{EventBus, HandlerId};
pub use error::{EventError, Result};
pub use event::Event;
pub use kind::EventKind;
pub use relay::{strip_sentinel, ChannelRelay, RelayChannel, StdoutRelay, IPC_SENTINEL};
