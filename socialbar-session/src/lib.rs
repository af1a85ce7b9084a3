//! Remote session contract consumed by the socialbar bridge.
//!
//! The bridge never talks to the social service directly. It goes through a
//! [`SessionConnection`] created by a [`SessionFactory`] on the bridge's worker
//! thread, and receives unsolicited change notifications through a
//! [`PushObserver`].
//!
//! [`memory::MemorySession`] is a scriptable in-process implementation used by
//! tests and the probe binary.

pub mod connection;
pub mod error;
pub mod event;
pub mod memory;
pub mod model;

pub use connection::{PushObserver, SessionConnection, SessionFactory};
pub use error::SessionError;
pub use event::{ChangeNotification, SessionEvent};
pub use model::{Counter, Friend, UserData};
