//! Cross-thread bridge between UI threads and a background social session.
//!
//! UI code calls blocking methods on a [`UserDataObserver`]; each observer
//! belongs to one thread and owns a worker thread that holds the live
//! [`SessionConnection`](socialbar_session::SessionConnection). Results are
//! cached, waits are bounded, and session pushes refresh only the facts they
//! name. Observers are handed out by an explicit [`Registry`].

pub mod bridge;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod observer;
pub mod registry;

pub use bridge::cache::{CacheSnapshot, Fact};
pub use bridge::callback::{ChangeListener, ListenerId, ViewChange};
pub use bridge::envelope::{Envelope, Operation};
pub use bridge::WorkerState;
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use observer::UserDataObserver;
pub use registry::Registry;
