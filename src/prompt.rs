//! Review prompt assembly. A pure function: no I/O, no
//! mutable state, so it is trivially unit-testable in isolation from the
//! reviewer stage that sends its output over the wire.
//!
//! Grounded in `original_source/core/prompts.py::create_review_prompt`;
//! the XML section names and action-rule wording are carried over verbatim,
//! translated out of the Python f-string into a single `format!`.

use crate::model::{Category, Cluster};

const TRUNCATE_SAMPLE_AT: usize = 50;

fn truncate_sample(sample: &str) -> String {
    if sample.chars().count() > TRUNCATE_SAMPLE_AT {
        let truncated: String = sample.chars().take(TRUNCATE_SAMPLE_AT).collect();
        format!("{truncated}...")
    } else {
        sample.to_string()
    }
}

fn existing_categories_xml(categories: &[&Category]) -> String {
    if categories.is_empty() {
        return "<existing_categories>\n  <!-- none finalized yet -->\n</existing_categories>\n\n"
            .to_string();
    }
    let mut xml = String::from("<existing_categories>\n");
    for category in categories {
        xml.push_str(&format!(
            "  <category>\n    <id>{}</id>\n    <description>{}</description>\n    <query_count>{}</query_count>\n  </category>\n",
            category.id,
            category.description,
            category.query_count(),
        ));
    }
    xml.push_str("</existing_categories>\n\n");
    xml
}

fn clusters_to_review_xml(batch: &[Cluster]) -> String {
    let mut xml = String::from("<clusters_to_review>\n");
    for cluster in batch {
        let samples_str = cluster
            .samples
            .iter()
            .map(|s| truncate_sample(s))
            .collect::<Vec<_>>()
            .join(", ");
        xml.push_str(&format!(
            "  <cluster id=\"{}\">\n    <samples>{}</samples>\n    <query_count>{}</query_count>\n  </cluster>\n",
            cluster.id,
            samples_str,
            cluster.query_count(),
        ));
    }
    xml.push_str("</clusters_to_review>");
    xml
}

/// Build the full review prompt sent to the LLM for one batch of clusters.
pub fn build_review_prompt(
    categories: &[&Category],
    batch: &[Cluster],
    high_level_goal: &str,
    target_category_range: &str,
) -> String {
    format!(
        r#"<role>You are an expert data analyst. Your task is to review unlabeled query clusters and output your decisions in a structured XML format. You must ensure EVERY cluster is judged exactly once.</role>

<high_level_goal>
{high_level_goal}

Based on this objective, analyze each cluster's semantic content thoughtfully and make intelligent classification decisions. Ensure every cluster is appropriately categorized to achieve comprehensive, balanced, and meaningful classification across the entire dataset. Pay careful attention to the semantic hierarchy, consistency, and logical coherence of the overall category structure.

**Target Category Count**: Aim for {target_category_range} final categories in total. Keep this range in mind when making decisions to achieve optimal classification granularity, only the subdivide action can increase the number of categories.
</high_level_goal>

{existing_categories}<task>
  <instruction>
    Your goal is to categorize the clusters below. For each cluster, you must choose ONE of three actions: `assign`, `subdivide`, or `create`.

    **Core Principle: Granularity is Key. Focus on Specific, Actionable User Intents.**
    Your primary goal is to define categories that represent a *single, distinct, and actionable user intent*. Do not group queries by broad topics. A shared keyword is insufficient — the queries must share a common, specific goal.

    **Your Decision-Making Flow (internal — do not output this):**
    1. Analyze the cluster: what is the core, specific goal of its users? Is there one goal or several?
    2. PRIORITY 1 `assign`: does this cluster's intent perfectly match an existing category? If yes, assign it, and supply a `description_update` if the cluster enriches that category's description.
    3. PRIORITY 2 `subdivide`: does this cluster hold multiple distinct intents, or a broad topic that needs breaking down? If yes, subdivide and pick the `k_value` of distinct intents you can identify.
    4. PRIORITY 3 `create`: does this cluster represent a single, cohesive, new intent that fits no existing category? Only then create one, with a highly specific description.

    **Use query_count as a heuristic:** high counts (>100) are usually too broad for `create` — prefer `subdivide` with a larger `k_value`. Low counts (<20) are good `create` candidates if cohesive, or `assign` candidates if they match an existing category.

    **Action rules for your XML output:**
    - `assign`: provide `target_id`; provide `description_update` only if refining the description, otherwise use `no_update`.
    - `subdivide`: provide a `k_value` (integer, 2 to 5) naming the number of distinct intents identified.
    - `create`: provide a rich `description`.

    **CRITICAL**: every cluster must be judged exactly once. Your final output must be a single `<decisions>` XML block as shown below.
  </instruction>

  {clusters_to_review}
</task>

<format_requirements>
  Your entire response must be a single XML block with <decisions> as the root element:

  <decisions>
    <decision>
      <id>cluster-id(s)</id>
      <action>create|assign|subdivide</action>
      <!-- For CREATE: provide description -->
      <!-- For ASSIGN: provide target_id and description_update -->
      <!-- For SUBDIVIDE: provide k_value -->
    </decision>
    <!-- More decisions... -->
  </decisions>

  For CREATE actions, provide a rich description with this format:
  "Primary description - detailed explanation and scope
  Typical examples: example 1, example 2, example 3"
</format_requirements>

<example>
  <decisions>
    <decision>
      <id>cluster-3,cluster-5</id>
      <action>create</action>
      <description>Users seeking customer service support - contacting support, returns and refunds, issue resolution
      Typical examples: how do I contact support, I want to return this, when will my refund arrive</description>
    </decision>
    <decision>
      <id>cluster-1,cluster-7</id>
      <action>assign</action>
      <target_id>CAT-001</target_id>
      <description_update>Users tracking order and shipment status end to end - dispatch notices, carrier tracking, delivery status
      Typical examples: when will this ship, where is my order, why hasn't tracking updated</description_update>
    </decision>
    <decision>
      <id>cluster-2</id>
      <action>subdivide</action>
      <k_value>4</k_value>
    </decision>
  </decisions>
</example>

Please provide your decisions now in the required <decisions> XML format:"#,
        high_level_goal = high_level_goal,
        target_category_range = target_category_range,
        existing_categories = existing_categories_xml(categories),
        clusters_to_review = clusters_to_review_xml(batch),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClusterId, Query};

    fn sample_cluster() -> Cluster {
        Cluster::new(
            ClusterId::from_counter(1),
            vec![Query::new("q1", "how do I reset my password", vec![0.1, 0.2])],
            vec!["how do I reset my password".to_string()],
        )
    }

    #[test]
    fn empty_categories_renders_placeholder_comment() {
        let prompt = build_review_prompt(&[], &[sample_cluster()], "goal", "15");
        assert!(prompt.contains("<!-- none finalized yet -->"));
    }

    #[test]
    fn existing_category_is_rendered_with_id_and_count() {
        let category = Category::new(crate::model::CategoryId::nth(1), "Password resets");
        let prompt = build_review_prompt(&[&category], &[sample_cluster()], "goal", "15");
        assert!(prompt.contains("<id>CAT-001</id>"));
        assert!(prompt.contains("<description>Password resets</description>"));
    }

    #[test]
    fn cluster_sample_is_truncated_past_fifty_chars() {
        let long_sample = "a".repeat(80);
        let cluster = Cluster::new(ClusterId::from_counter(9), vec![], vec![long_sample.clone()]);
        let prompt = build_review_prompt(&[], &[cluster], "goal", "15");
        assert!(prompt.contains(&"a".repeat(50)));
        assert!(!prompt.contains(&"a".repeat(51)));
    }

    #[test]
    fn prompt_embeds_target_range_and_goal() {
        let prompt = build_review_prompt(&[], &[sample_cluster()], "classify support tickets", "8-12");
        assert!(prompt.contains("classify support tickets"));
        assert!(prompt.contains("8-12 final categories"));
    }
}
