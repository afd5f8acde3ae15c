//! Patient Consent Coordinator
//!
//! Consent ledger operations (request, respond, revoke, list) over a store
//! with atomic status transitions, and the access evaluator that turns the
//! ledger's history into a current yes/no for a doctor and a patient.

mod evaluator;
mod ledger;
mod store;

pub use evaluator::AccessEvaluator;
pub use ledger::{ConsentLedger, ConsentParty, ConsentView};
pub use store::{CasOutcome, ConsentStore, MemoryConsentStore, StatusUpdate};
