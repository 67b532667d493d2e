//! Terminal interface and session state for docqa

mod session;
mod eval;
pub mod ui;


pub use session::{ProcessingReport, Session};
pub use eval::{
    EvaluationDataset, EvaluationRecord, EvaluationReport, EvaluationSample, answer_relevancy,
    faithfulness, run_evaluation, token_recall,
};
pub use ui::{display_banner, handle_input_with_history, print_help};

// Re-export core types
pub use dqa_core::{Error, Result};
