pub mod classify;
pub mod compose;
pub mod evidence;
pub mod extract;
pub mod guard;
pub mod loop_detect;
pub mod orchestrator;
pub mod persona;
pub mod plan;
pub mod reasoner;
pub mod sanitize;
pub mod truths;

use thiserror::Error;

use crate::store::StoreError;
use evidence::EvidenceError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Message is empty after sanitization")]
    EmptyInput,

    #[error("Evidence error: {0}")]
    Evidence(#[from] EvidenceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
