//! `sa-sessions` — the session manager (§4.7): one active `Session` per
//! `session_id`, each pairing a `GroupChatManager` with the observers
//! currently attached to it, plus atomic on-disk persistence.

pub mod manager;
pub mod observer;
pub mod persistence;
pub mod session;
pub mod team;

pub use manager::SessionManager;
pub use observer::{ObserverHandle, ObserverId};
pub use session::Session;
pub use team::{Team, TeamFactory};
