pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, TicketLifecycleFlow};
pub use states::{FlowAction, FlowContext, TicketEvent, TicketState, TransitionOutcome};
