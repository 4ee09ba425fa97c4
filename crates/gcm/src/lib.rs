//! `sa-gcm` — the group-chat manager: speaker selection, termination,
//! the plugin layer (state-context and analysis-watchlist), and the
//! manager actor that ties them to a conversation tree and an agent
//! roster.

pub mod analysis;
pub mod manager;
pub mod plugin;
pub mod selection;
pub mod state_context;
pub mod termination;

pub use analysis::{AnalysisWatchlistPlugin, PendingAnalysis};
pub use manager::{GroupChatManager, RunOutcome};
pub use plugin::{Plugin, PluginContext};
pub use selection::{SelectionInput, SpeakerSelector};
pub use state_context::StateContextPlugin;
pub use termination::{TerminationChecker, TerminationReason};
