pub mod engine;
pub mod states;

pub use engine::{ApprovalChainFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{FlowEffect, NotificationTarget, TransitionOutcome, VoucherEvent};
