//! Parsing the reference selection out of a local model's reply

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Most secondary references carried into a prompt
pub const MAX_SECONDARY: usize = 3;

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<think>.*?(</think>|\z)").expect("think regex is valid"));

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fence regex is valid")
});

static REFERENCE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bWSTG-[A-Z]{4}-\d{2}\b").expect("reference id regex is valid"));

/// References chosen for one attack vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSelection {
    pub primary: String,
    pub secondary: Vec<String>,
}

impl ReferenceSelection {
    /// Normalize ids to upper case, drop duplicates of the primary and cap
    /// the secondary list.
    pub fn new(primary: impl AsRef<str>, secondary: impl IntoIterator<Item = String>) -> Self {
        let primary = normalize(primary.as_ref());
        let mut kept: Vec<String> = Vec::new();
        for id in secondary.into_iter().map(|id| normalize(&id)) {
            if id != primary && !kept.contains(&id) && kept.len() < MAX_SECONDARY {
                kept.push(id);
            }
        }
        Self {
            primary,
            secondary: kept,
        }
    }

    /// Primary first, then secondaries
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.secondary.iter().map(String::as_str))
    }
}

#[derive(Deserialize)]
struct RawSelection {
    #[serde(alias = "primaryId", alias = "primary_id")]
    primary: Option<String>,
    #[serde(default, alias = "secondaryIds", alias = "secondary_ids")]
    secondary: Vec<String>,
}

fn normalize(id: &str) -> String {
    id.trim().to_ascii_uppercase()
}

fn is_reference_id(id: &str) -> bool {
    REFERENCE_ID
        .find(id.trim())
        .is_some_and(|m| m.len() == id.trim().len())
}

/// Remove `<think>` reasoning; an unterminated block runs to the end.
fn strip_reasoning(reply: &str) -> String {
    THINK_BLOCK.replace_all(reply, "").into_owned()
}

fn parse_json(reply: &str) -> Option<ReferenceSelection> {
    let candidate = match FENCED_JSON.captures(reply) {
        Some(caps) => caps.get(1)?.as_str(),
        None => {
            let start = reply.find('{')?;
            let end = reply.rfind('}')?;
            reply.get(start..=end)?
        }
    };

    let raw: RawSelection = match serde_json::from_str(candidate) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("Selection reply is not JSON: {}", e);
            return None;
        }
    };

    let primary = raw.primary.filter(|id| is_reference_id(id))?;
    let secondary = raw
        .secondary
        .into_iter()
        .filter(|id| {
            let valid = is_reference_id(id);
            if !valid {
                warn!("Ignoring malformed reference id: {}", id);
            }
            valid
        })
        .collect::<Vec<_>>();
    Some(ReferenceSelection::new(primary, secondary))
}

fn scan_ids(reply: &str) -> Option<ReferenceSelection> {
    let mut ids = REFERENCE_ID.find_iter(reply).map(|m| m.as_str().to_string());
    let primary = ids.next()?;
    Some(ReferenceSelection::new(primary, ids))
}

/// Extract the selection from a model reply.
///
/// A JSON object (fenced or bare) is preferred; otherwise the first
/// reference id found is primary and the rest are secondary.
pub fn parse_selection(reply: &str) -> Option<ReferenceSelection> {
    let reply = strip_reasoning(reply);
    let selection = parse_json(&reply).or_else(|| scan_ids(&reply));
    match &selection {
        Some(s) => debug!("Selected {} with {} secondary", s.primary, s.secondary.len()),
        None => warn!("No reference ids found in selection reply"),
    }
    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_fenced_json() {
        let reply = r#"Here you go:
```json
{"primaryId": "wstg-inpv-01", "secondaryIds": ["WSTG-CLNT-01", "WSTG-CLNT-03"]}
```"#;
        let selection = parse_selection(reply).unwrap();
        assert_eq!(selection.primary, "WSTG-INPV-01");
        assert_eq!(selection.secondary, vec!["WSTG-CLNT-01", "WSTG-CLNT-03"]);
    }

    #[test]
    fn test_think_block_is_ignored() {
        let reply = "<think>Maybe WSTG-ATHN-01? No.</think>\n{\"primary\": \"WSTG-INPV-05\", \"secondary\": []}";
        let selection = parse_selection(reply).unwrap();
        assert_eq!(selection.primary, "WSTG-INPV-05");
        assert!(selection.secondary.is_empty());
    }

    #[test]
    fn test_unterminated_think_block() {
        assert_eq!(parse_selection("<think>WSTG-INPV-01 looks right"), None);
    }

    #[test]
    fn test_fallback_scan_dedupes_and_caps() {
        let reply = "Primary: WSTG-INPV-01. Also WSTG-CLNT-01, wstg-clnt-01, WSTG-INPV-01, \
                     WSTG-CLNT-03, WSTG-SESS-05 and WSTG-ERRH-01.";
        let selection = parse_selection(reply).unwrap();
        assert_eq!(selection.primary, "WSTG-INPV-01");
        assert_eq!(
            selection.secondary,
            vec!["WSTG-CLNT-01", "WSTG-CLNT-03", "WSTG-SESS-05"]
        );
        assert_eq!(selection.ids().count(), 4);
    }

    #[test]
    fn test_json_without_valid_primary_falls_back() {
        let reply = r#"{"primary": "xss", "secondary": []} I would pick WSTG-CLNT-02"#;
        let selection = parse_selection(reply).unwrap();
        assert_eq!(selection.primary, "WSTG-CLNT-02");
    }

    #[test]
    fn test_nothing_found() {
        assert!(parse_selection("I don't know").is_none());
    }
}
