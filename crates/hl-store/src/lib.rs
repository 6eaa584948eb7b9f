pub mod config;
pub mod decay;
pub mod engine;
pub mod error;
pub mod history;
pub mod ledger;
pub mod overall;
pub mod schema;
pub mod store;
pub mod suggestion;

pub use decay::{DecayEngine, DecayReport};
pub use engine::{AwardOutcome, DomainDetail, Engine};
pub use error::{ErrorKind, Result, StoreError};
pub use history::LevelHistoryLedger;
pub use ledger::{ExpertiseLedger, LedgerUpdate};
pub use overall::recompute_overall;
pub use store::Store;
pub use suggestion::SuggestionWorkflow;
