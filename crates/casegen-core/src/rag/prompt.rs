//! Reference catalog and the augmented test-case prompt

use super::selection::ReferenceSelection;
use crate::error::{ConfigError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Reference documents keyed by id (`WSTG-INPV-01` -> markdown body)
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    entries: BTreeMap<String, String>,
}

impl ReferenceCatalog {
    /// Read a JSON object mapping reference ids to their content.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let entries: BTreeMap<String, String> =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        debug!("Loaded {} references from {}", entries.len(), path.display());
        Ok(entries.into_iter().collect())
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries
            .get(&id.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// First non-empty line of an entry, without markdown heading marks.
    pub fn title(&self, id: &str) -> Option<&str> {
        self.get(id)?
            .lines()
            .map(|line| line.trim_start_matches('#').trim())
            .find(|line| !line.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for ReferenceCatalog {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(id, content)| (id.to_ascii_uppercase(), content))
                .collect(),
        }
    }
}

fn output_instructions(attack_vector: &str) -> String {
    format!(
        r#"STRICT OUTPUT FORMAT: follow this exactly, no deviations:
- Do NOT include any preamble, introduction, or commentary before the first test case.
- Do NOT use markdown headings (## or ###). Use only bold field labels.
- Each test case MUST use exactly these bold field labels on separate lines:

**Name:** A descriptive test case name
**Attack Vector:** Analyze the user's attack vector "{attack_vector}" and restate it as a specific attack technique (e.g. "SQL injection via search parameter", "Reflected XSS in comment field"). MUST relate to the original query.
**Target Component:** The specific component/endpoint being tested (use project context if available)
**Description:** What this test case validates
**Preconditions:** Requirements before running the test
**Guidance:**
| Step | Expected-result | Example |
|------|-----------------|---------|
| ... | ... | ... |
**Reference:**
| ID | Name | URL |
|----|------|-----|
| ... | ... | ... |

- Separate each test case with a single --- on its own line.
- Place tables immediately after their field label (no blank lines between label and table).
- Start your response directly with the first **Name:** field."#
    )
}

/// Build the prompt that asks the agent for structured test cases.
pub fn build_test_case_prompt(
    attack_vector: &str,
    selection: &ReferenceSelection,
    catalog: &ReferenceCatalog,
) -> String {
    let primary_content = match catalog.get(&selection.primary) {
        Some(content) => content.to_string(),
        None => {
            warn!("No reference content for {}", selection.primary);
            format!("(No content found for {})", selection.primary)
        }
    };

    let secondary_summaries = selection
        .secondary
        .iter()
        .map(|id| {
            format!(
                "- **{}**: {}",
                id,
                catalog.title(id).unwrap_or("(secondary reference)")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Create detailed security test cases for the following attack vector: {attack_vector}\n\
         \n\
         Use the following OWASP WSTG entries as context:\n\
         \n\
         ### Primary WSTG Reference ({primary})\n\
         {primary_content}\n\
         \n\
         ### Secondary WSTG References (for additional context)\n\
         {secondary_summaries}\n\
         \n\
         {instructions}",
        primary = selection.primary,
        instructions = output_instructions(attack_vector),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn selection() -> ReferenceSelection {
        ReferenceSelection::new(
            "WSTG-INPV-01",
            vec!["WSTG-CLNT-01".to_string(), "WSTG-CLNT-03".to_string()],
        )
    }

    #[test]
    fn test_prompt_embeds_primary_and_secondary() {
        let catalog: ReferenceCatalog = [
            (
                "WSTG-INPV-01".to_string(),
                "# Testing for Reflected Cross Site Scripting\n\nBody text.".to_string(),
            ),
            (
                "wstg-clnt-01".to_string(),
                "## Testing for DOM-Based Cross Site Scripting\n".to_string(),
            ),
        ]
        .into_iter()
        .collect();

        let prompt = build_test_case_prompt("create test case for xss", &selection(), &catalog);

        assert!(prompt.starts_with(
            "Create detailed security test cases for the following attack vector: create test case for xss\n"
        ));
        assert!(prompt.contains("### Primary WSTG Reference (WSTG-INPV-01)\n# Testing for Reflected"));
        assert!(prompt.contains("- **WSTG-CLNT-01**: Testing for DOM-Based Cross Site Scripting"));
        assert!(prompt.contains("- **WSTG-CLNT-03**: (secondary reference)"));
        assert!(prompt.contains("\"create test case for xss\""));
        assert!(prompt.contains("| Step | Expected-result | Example |"));
        assert!(prompt.ends_with("Start your response directly with the first **Name:** field."));
    }

    #[test]
    fn test_missing_primary_uses_placeholder() {
        let prompt =
            build_test_case_prompt("sqli", &selection(), &ReferenceCatalog::default());
        assert!(prompt.contains("(No content found for WSTG-INPV-01)"));
    }

    #[test]
    fn test_load_catalog() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"WSTG-INPV-01": "Reflected XSS"}}"#).unwrap();

        let catalog = ReferenceCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("wstg-inpv-01"), Some("Reflected XSS"));
        assert!(catalog.title("WSTG-ATHN-01").is_none());
    }
}
