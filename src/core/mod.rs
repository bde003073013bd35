//! Gate engine: schema, state, evaluation and dispatch.

pub mod audit;
pub mod circuit_breaker;
pub mod definitions;
pub mod dispatch;
pub mod evaluator;
pub mod event;
pub mod predicates;
pub mod result;
pub mod schema;
pub mod state;
pub mod tools;

pub use dispatch::Dispatcher;
pub use evaluator::Evaluator;
pub use event::{HookContext, HookEvent};
pub use predicates::{PredicateError, PredicateRegistry};
pub use result::{DispatchResult, GateResult, ResultKind};
pub use schema::{
    CountdownConfig, EnforcementMode, GateCondition, GateConfig, GatePolicy, GateSet,
    GateTransition, GateTrigger, Pattern, Verdict,
};
pub use state::{GateState, GateStatus, SessionState};
pub use tools::ToolCategory;
