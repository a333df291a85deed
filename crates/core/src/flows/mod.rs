pub mod engine;
pub mod states;

pub use engine::{FlowTransitionError, QuoteFlow, TenderFlow};
pub use states::{QuoteAction, QuoteTransition, TenderAction, TenderEvent, TenderTransition};
