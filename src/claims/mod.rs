//! Claims Intelligence (C6/C7): a read-only SQL sandbox over the claims
//! warehouse, and a four-phase LLM pipeline (plan topics, generate SQL in
//! parallel, execute, synthesize insights) built on top of it.

pub mod orchestrator;
pub mod sandbox;

pub use orchestrator::{ClaimsAnalysisOutcome, ClaimsError, ClaimsOrchestrator};
pub use sandbox::{ClaimsSandbox, SandboxError};
