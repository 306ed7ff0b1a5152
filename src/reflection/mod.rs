//! Guided co-parenting reflection.
//!
//! A parent works through seven fixed phases (naming the situation, feelings,
//! needs, the co-parent's view, the child's view, options, choosing). Each
//! call to [`TurnOrchestrator::process_turn`] takes the caller-owned
//! [`FlowState`] plus the latest message and returns the reply together with
//! the next state. The engine itself keeps nothing between calls.

pub mod orchestrator;
pub mod phase;
pub mod policy;
pub mod prompts;
pub mod routes;
pub mod scorer;
pub mod slots;
pub mod state;
pub mod summary;

pub use orchestrator::{TurnOrchestrator, TurnResult};
pub use phase::{Phase, PhaseCatalog, PhaseId};
pub use policy::{AdvancementPolicy, Decision, Transition};
pub use routes::{ReflectionRouteState, reflection_routes};
pub use scorer::ReadinessScorer;
pub use slots::{Context, SlotKey};
pub use state::{FlowState, Turn, TurnRole};
