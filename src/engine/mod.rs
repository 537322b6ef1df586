pub mod collection;
pub mod coordinator;
pub mod mutation;
pub mod persister;

pub use collection::MatchesCollection;
pub use coordinator::{CollectionEvent, CoordinatorDeps, MatchCoordinator, MutationError, StatusSnapshot};
pub use mutation::{MatchMutation, MutationTag, TransitionError};
pub use persister::{PersistHandle, StoreOp, run_persister};
