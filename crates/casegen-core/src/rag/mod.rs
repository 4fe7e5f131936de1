//! Reference selection for test-case generation
//!
//! A local model first picks the relevant testing-guide references for an
//! attack vector. This module parses that choice and turns it, together with
//! the reference texts, into the prompt sent to the agent.

mod prompt;
mod selection;

pub use prompt::{build_test_case_prompt, ReferenceCatalog};
pub use selection::{parse_selection, ReferenceSelection, MAX_SECONDARY};
