//! Lyrics-to-exercise-pack generation: language/difficulty tagging, bucketed
//! say-it-back selection, schema-constrained MCQ generation, seeded
//! scrambling, and type interleaving.

pub mod llm;
pub mod pipeline;
pub mod scramble;

pub use llm::{LlmClient, LlmError, OpenAiLikeLlmClient};
pub use pipeline::{generate_study_set, Question, Referent, StudySetPack, StudySetRequest};

#[derive(Debug, thiserror::Error)]
pub enum StudySetError {
    #[error("invalid study-set request: {0}")]
    Validation(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("study-set generation failed: {0}")]
    Generation(String),
}
