//! Domain types shared by every optimizer phase.

pub mod ids;
pub mod opportunity;
pub mod params;
pub mod signal_type;
pub mod snapshot;

pub use ids::RunId;
pub use opportunity::{sort_chronologically, Opportunity};
pub use params::{merge, ParamError, ParameterDelta, ParameterSet, ParameterSetRecord};
pub use signal_type::{Direction, SignalType};
pub use snapshot::{DataError, EntryFields, MarketSnapshot, Tick};

/// Symbol type alias
pub type Symbol = String;
