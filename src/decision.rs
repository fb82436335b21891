//! The decision protocol: a tagged sum type plus the parser
//! and validator for the LLM's `<decisions>` XML document.
//!
//! Grounded in `original_source/services/llm_service.py::_validate_xml_response`
//! and `core/tools.py::validate_decisions`/`parse_cluster_ids`, translated
//! from `xml.etree.ElementTree` to `quick-xml`'s event reader, following
//! `stormasm-ioxnu22july/nu_iox/Cargo.toml`'s choice of XML crate.

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::model::{CategoryId, ClusterId};

/// One LLM verdict over one or more clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    Create {
        cluster_refs: Vec<ClusterId>,
        description: String,
    },
    Assign {
        cluster_refs: Vec<ClusterId>,
        target_id: CategoryId,
        description_update: Option<String>,
    },
    Subdivide {
        cluster_ref: ClusterId,
        k_value: usize,
    },
}

use serde::{Deserialize, Serialize};

impl Decision {
    pub fn cluster_refs(&self) -> Vec<&ClusterId> {
        match self {
            Decision::Create { cluster_refs, .. } => cluster_refs.iter().collect(),
            Decision::Assign { cluster_refs, .. } => cluster_refs.iter().collect(),
            Decision::Subdivide { cluster_ref, .. } => vec![cluster_ref],
        }
    }

    /// The ref this decision is keyed under when collapsing a multi-ref
    /// decision to "apply exactly once".
    pub fn leading_ref(&self) -> &ClusterId {
        self.cluster_refs()[0]
    }
}

fn entity_escape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(?!(?:amp|lt|gt|quot|apos);)").unwrap())
}

/// Strip any text before the root `<decisions>` tag and escape bare `&`
/// characters that are not already a recognized XML entity. Mirrors
/// `llm_service.py::_validate_xml_response`'s preprocessing step exactly.
pub fn preprocess_xml(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let start = trimmed.find("<decisions>").ok_or_else(|| Error::DecisionInvalid {
        message: "no <decisions> tag found in response".to_string(),
    })?;
    let sliced = &trimmed[start..];
    Ok(entity_escape_regex().replace_all(sliced, "&amp;").into_owned())
}

/// Parse the `<decisions>` document into a list of raw `(ids, fields)`
/// records, deferring cross-batch validation to [`parse_and_validate`].
fn parse_raw_decisions(xml: &str) -> Result<Vec<RawDecision>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text = true;

    let mut decisions = Vec::new();
    let mut current: Option<RawDecision> = None;
    let mut current_field: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "decision" {
                    current = Some(RawDecision::default());
                } else if current.is_some() {
                    current_field = Some(name);
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(field), Some(decision)) = (&current_field, current.as_mut()) {
                    let text = e.unescape().map_err(|err| Error::DecisionInvalid {
                        message: format!("invalid XML text: {err}"),
                    })?;
                    decision.fields.insert(field.clone(), text.trim().to_string());
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "decision" {
                    if let Some(decision) = current.take() {
                        decisions.push(decision);
                    }
                } else if current_field.as_deref() == Some(name.as_str()) {
                    current_field = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(Error::DecisionInvalid {
                    message: format!("XML parse error: {err}"),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(decisions)
}

#[derive(Debug, Default)]
struct RawDecision {
    fields: HashMap<String, String>,
}

fn parse_cluster_ids(ids_field: &str) -> Vec<ClusterId> {
    ids_field
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ClusterId::from_raw)
        .collect()
}

/// Parse the LLM's response text, apply the preprocessing step, and
/// validate the decision set against the batch's cluster ids and the
/// current category map.
pub fn parse_and_validate(
    raw_response: &str,
    batch_ids: &HashSet<ClusterId>,
    known_categories: &HashSet<CategoryId>,
) -> Result<Vec<Decision>> {
    let xml = preprocess_xml(raw_response)?;
    let raw_decisions = parse_raw_decisions(&xml)?;

    let mut decisions = Vec::with_capacity(raw_decisions.len());
    let mut seen_ids: HashSet<ClusterId> = HashSet::new();

    for raw in raw_decisions {
        let ids_field = raw.fields.get("id").ok_or_else(|| Error::DecisionInvalid {
            message: "decision missing <id> field".to_string(),
        })?;
        let ids = parse_cluster_ids(ids_field);
        if ids.is_empty() {
            return Err(Error::DecisionInvalid {
                message: "decision has an empty <id> field".to_string(),
            });
        }
        for id in &ids {
            if !seen_ids.insert(id.clone()) {
                return Err(Error::DecisionInvalid {
                    message: format!("duplicate cluster id in decision set: {id}"),
                });
            }
            if !batch_ids.contains(id) {
                return Err(Error::DecisionInvalid {
                    message: format!("decision references unknown cluster id: {id}"),
                });
            }
        }

        let action = raw
            .fields
            .get("action")
            .ok_or_else(|| Error::DecisionInvalid {
                message: "decision missing <action> field".to_string(),
            })?
            .to_lowercase();

        let decision = match action.as_str() {
            "create" => {
                let description = raw.fields.get("description").cloned().ok_or_else(|| {
                    Error::DecisionInvalid {
                        message: "create decision missing <description>".to_string(),
                    }
                })?;
                if description.trim().is_empty() {
                    return Err(Error::DecisionInvalid {
                        message: "create decision has an empty description".to_string(),
                    });
                }
                Decision::Create {
                    cluster_refs: ids,
                    description,
                }
            }
            "assign" => {
                let target_raw = raw.fields.get("target_id").cloned().ok_or_else(|| {
                    Error::DecisionInvalid {
                        message: "assign decision missing <target_id>".to_string(),
                    }
                })?;
                let target_id = CategoryId::from_raw(target_raw);
                if !known_categories.contains(&target_id) {
                    return Err(Error::UnknownTargetId {
                        target_id: target_id.as_str().to_string(),
                    });
                }
                let description_update = raw
                    .fields
                    .get("description_update")
                    .cloned()
                    .ok_or_else(|| Error::DecisionInvalid {
                        message: "assign decision missing <description_update>".to_string(),
                    })
                    .map(|text| if text == "no_update" { None } else { Some(text) })?;
                Decision::Assign {
                    cluster_refs: ids,
                    target_id,
                    description_update,
                }
            }
            "subdivide" => {
                if ids.len() != 1 {
                    return Err(Error::DecisionInvalid {
                        message: "subdivide decision must reference exactly one cluster"
                            .to_string(),
                    });
                }
                let k_raw = raw.fields.get("k_value").ok_or_else(|| Error::DecisionInvalid {
                    message: "subdivide decision missing <k_value>".to_string(),
                })?;
                let k_value: usize = k_raw.parse().map_err(|_| Error::DecisionInvalid {
                    message: format!("k_value must be an integer, got {k_raw:?}"),
                })?;
                if k_value < 2 {
                    return Err(Error::DecisionInvalid {
                        message: format!("k_value must be >= 2, got {k_value}"),
                    });
                }
                Decision::Subdivide {
                    cluster_ref: ids.into_iter().next().unwrap(),
                    k_value,
                }
            }
            other => {
                return Err(Error::DecisionInvalid {
                    message: format!("unknown decision action: {other}"),
                })
            }
        };

        decisions.push(decision);
    }

    let missing: Vec<_> = batch_ids.difference(&seen_ids).collect();
    if !missing.is_empty() {
        return Err(Error::DecisionInvalid {
            message: format!("decision set omits cluster ids: {missing:?}"),
        });
    }

    Ok(decisions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> HashSet<ClusterId> {
        raw.iter().map(|s| ClusterId::from_raw(*s)).collect()
    }

    #[test]
    fn strips_leading_commentary_and_escapes_bare_ampersand() {
        let raw = "Sure, here you go:\n<decisions><decision><id>cluster-1</id><action>create</action><description>Tom & Jerry questions</description></decision></decisions>";
        let processed = preprocess_xml(raw).unwrap();
        assert!(processed.starts_with("<decisions>"));
        assert!(processed.contains("Tom &amp; Jerry"));
    }

    #[test]
    fn create_single_cluster() {
        let raw = "<decisions><decision><id>cluster-1</id><action>create</action><description>D</description></decision></decisions>";
        let batch = ids(&["cluster-1"]);
        let cats = HashSet::new();
        let decisions = parse_and_validate(raw, &batch, &cats).unwrap();
        assert_eq!(decisions.len(), 1);
        match &decisions[0] {
            Decision::Create { cluster_refs, description } => {
                assert_eq!(cluster_refs, &vec![ClusterId::from_raw("cluster-1")]);
                assert_eq!(description, "D");
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn create_merges_multiple_refs() {
        let raw = "<decisions><decision><id>cluster-1,cluster-2</id><action>create</action><description>D</description></decision></decisions>";
        let batch = ids(&["cluster-1", "cluster-2"]);
        let decisions = parse_and_validate(raw, &batch, &HashSet::new()).unwrap();
        match &decisions[0] {
            Decision::Create { cluster_refs, .. } => assert_eq!(cluster_refs.len(), 2),
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn assign_requires_known_target() {
        let raw = "<decisions><decision><id>cluster-7</id><action>assign</action><target_id>CAT-999</target_id><description_update>no_update</description_update></decision></decisions>";
        let batch = ids(&["cluster-7"]);
        let err = parse_and_validate(raw, &batch, &HashSet::new()).unwrap_err();
        assert!(matches!(err, Error::UnknownTargetId { .. }));
    }

    #[test]
    fn assign_no_update_parses_to_none() {
        let raw = "<decisions><decision><id>cluster-7</id><action>assign</action><target_id>CAT-001</target_id><description_update>no_update</description_update></decision></decisions>";
        let batch = ids(&["cluster-7"]);
        let mut cats = HashSet::new();
        cats.insert(CategoryId::from_raw("CAT-001"));
        let decisions = parse_and_validate(raw, &batch, &cats).unwrap();
        match &decisions[0] {
            Decision::Assign { description_update, .. } => assert!(description_update.is_none()),
            _ => panic!("expected assign"),
        }
    }

    #[test]
    fn subdivide_rejects_non_integer_k() {
        let raw = "<decisions><decision><id>cluster-3</id><action>subdivide</action><k_value>not-a-number</k_value></decision></decisions>";
        let batch = ids(&["cluster-3"]);
        let err = parse_and_validate(raw, &batch, &HashSet::new()).unwrap_err();
        assert!(matches!(err, Error::DecisionInvalid { .. }));
    }

    #[test]
    fn rejects_missing_cluster() {
        let raw = "<decisions><decision><id>cluster-1</id><action>create</action><description>D</description></decision></decisions>";
        let batch = ids(&["cluster-1", "cluster-2"]);
        let err = parse_and_validate(raw, &batch, &HashSet::new()).unwrap_err();
        assert!(matches!(err, Error::DecisionInvalid { .. }));
    }

    #[test]
    fn rejects_extra_cluster() {
        let raw = "<decisions><decision><id>cluster-1,cluster-99</id><action>create</action><description>D</description></decision></decisions>";
        let batch = ids(&["cluster-1"]);
        let err = parse_and_validate(raw, &batch, &HashSet::new()).unwrap_err();
        assert!(matches!(err, Error::DecisionInvalid { .. }));
    }

    #[test]
    fn rejects_duplicate_cluster_across_decisions() {
        let raw = "<decisions>\
            <decision><id>cluster-1</id><action>create</action><description>D</description></decision>\
            <decision><id>cluster-1</id><action>subdivide</action><k_value>2</k_value></decision>\
            </decisions>";
        let batch = ids(&["cluster-1"]);
        let err = parse_and_validate(raw, &batch, &HashSet::new()).unwrap_err();
        assert!(matches!(err, Error::DecisionInvalid { .. }));
    }

    #[test]
    fn rejects_unknown_action() {
        let raw = "<decisions><decision><id>cluster-1</id><action>delete</action></decision></decisions>";
        let batch = ids(&["cluster-1"]);
        let err = parse_and_validate(raw, &batch, &HashSet::new()).unwrap_err();
        assert!(matches!(err, Error::DecisionInvalid { .. }));
    }
}
