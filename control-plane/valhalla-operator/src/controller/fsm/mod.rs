pub mod conditions;
pub mod evaluator;
pub mod observed;
pub mod observed_lister;

pub use conditions::{ApplyReport, aggregate};
pub use evaluator::{PhaseTransition, advance};
pub use observed::ChildSnapshot;
pub use observed_lister::observe_children;
