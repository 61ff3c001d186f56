use chrono::Utc;
use serde::{Deserialize, Serialize};

use desklink_ai::{ChatMessage, ChatRequest, LlmClient};

use crate::context::ConversationContext;
use crate::similarity::SimilarityScorer;

const FUZZY_MATCH_THRESHOLD: f64 = 0.6;
const MAX_ASSIGNED_LABELS: usize = 5;
const STALE_AFTER_DAYS: i64 = 7;
const AI_EXCERPT_TURNS: usize = 10;
const AI_EXCERPT_CHARS: usize = 300;

/// Fixed category -> keyword table scanned against the lower-cased
/// transcript; the category name doubles as the target label name.
const KEYWORD_TABLE: &[(&str, &[&str])] = &[
    (
        "bug",
        &["bug", "error", "broken", "crash", "fail", "exception", "defect"],
    ),
    (
        "enhancement",
        &["feature", "enhancement", "improvement", "would be nice", "request"],
    ),
    (
        "question",
        &["question", "how do i", "how to", "clarify", "help me understand"],
    ),
    (
        "documentation",
        &["documentation", "docs", "readme", "guide", "typo"],
    ),
    (
        "performance",
        &["slow", "performance", "lag", "latency", "timeout"],
    ),
    (
        "security",
        &["security", "vulnerability", "exploit", "injection", "leak"],
    ),
];

/// Conversation status -> contextual label table, applied alongside the
/// age-derived `stale` label.
const STATUS_LABEL_TABLE: &[(&str, &str)] = &[("pending", "needs-feedback"), ("spam", "invalid")];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Stored `(helpdesk tag, repository)` -> GitHub label row.
pub struct MappingEntry {
    pub helpdesk_tag: String,
    pub repository: String,
    pub github_label: String,
    pub confidence_threshold: f64,
}

#[derive(Debug, Clone)]
/// Public struct `ClassifierConfig` used across DeskLink components.
pub struct ClassifierConfig {
    pub repository: String,
    pub allowed_labels: Vec<String>,
    pub ai_model: String,
}

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
/// Per-run diagnostics: every filtering step that removes labels is counted
/// here rather than silently dropping them.
pub struct ClassificationReport {
    pub tag_mapping_candidates: usize,
    pub ai_candidates: usize,
    pub keyword_candidates: usize,
    pub contextual_candidates: usize,
    pub removed_unavailable: usize,
    pub removed_by_cap: usize,
    pub removed_by_allow_list: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
/// Public struct `ClassificationOutcome` used across DeskLink components.
pub struct ClassificationOutcome {
    pub labels: Vec<String>,
    pub report: ClassificationReport,
}

/// Fixed-shape label pipeline: tag mapping, AI inference, keyword heuristics,
/// contextual defaults, then availability/cap/allow-list filtering.
///
/// Deterministic precedence and idempotent for unchanged input; an AI-side
/// failure falls through to the next stage and never surfaces as an error.
pub struct LabelClassifier<'a> {
    scorer: &'a dyn SimilarityScorer,
    ai: Option<&'a dyn LlmClient>,
    config: ClassifierConfig,
}

impl<'a> LabelClassifier<'a> {
    pub fn new(
        scorer: &'a dyn SimilarityScorer,
        ai: Option<&'a dyn LlmClient>,
        config: ClassifierConfig,
    ) -> Self {
        Self { scorer, ai, config }
    }

    pub async fn assign_labels(
        &self,
        ctx: &ConversationContext,
        available: &[String],
        mappings: &[MappingEntry],
    ) -> ClassificationOutcome {
        let mut report = ClassificationReport::default();
        let mut candidates: Vec<String> = Vec::new();

        let mapped = self.tag_mapping_candidates(ctx, available, mappings);
        report.tag_mapping_candidates = mapped.len();
        candidates.extend(mapped);

        if candidates.is_empty() {
            if let Some(ai) = self.ai {
                let inferred = self.ai_candidates(ai, ctx, available).await;
                report.ai_candidates = inferred.len();
                candidates.extend(inferred);
            }
        }

        if candidates.is_empty() {
            let heuristic = self.keyword_candidates(ctx, available);
            report.keyword_candidates = heuristic.len();
            candidates.extend(heuristic);
        }

        let contextual = self.contextual_candidates(ctx, available);
        report.contextual_candidates = contextual.len();
        candidates.extend(contextual);

        let mut labels: Vec<String> = Vec::new();
        for candidate in candidates {
            let Some(canonical) = available
                .iter()
                .find(|label| label.eq_ignore_ascii_case(&candidate))
            else {
                report.removed_unavailable += 1;
                continue;
            };
            if !labels.iter().any(|label| label == canonical) {
                labels.push(canonical.clone());
            }
        }

        if labels.len() > MAX_ASSIGNED_LABELS {
            report.removed_by_cap = labels.len() - MAX_ASSIGNED_LABELS;
            labels.truncate(MAX_ASSIGNED_LABELS);
        }

        // Empty allow-list means no restriction (backward compatibility).
        if !self.config.allowed_labels.is_empty() {
            let before = labels.len();
            labels.retain(|label| {
                self.config
                    .allowed_labels
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(label))
            });
            report.removed_by_allow_list = before - labels.len();
        }

        if report.removed_unavailable > 0
            || report.removed_by_cap > 0
            || report.removed_by_allow_list > 0
        {
            tracing::debug!(
                unavailable = report.removed_unavailable,
                capped = report.removed_by_cap,
                allow_list = report.removed_by_allow_list,
                "classification filters removed label candidates"
            );
        }

        ClassificationOutcome { labels, report }
    }

    /// Stage 1: tag mapping first. An exact tag match scores 1.0 and always
    /// wins; a fuzzy tag match must clear both the global floor and the
    /// mapping's own confidence threshold. Then fuzzy match against
    /// available labels (highest similarity, first encountered wins ties),
    /// then exact case-insensitive name match.
    fn tag_mapping_candidates(
        &self,
        ctx: &ConversationContext,
        available: &[String],
        mappings: &[MappingEntry],
    ) -> Vec<String> {
        let mut candidates = Vec::new();
        for tag in &ctx.tags {
            let mut best_mapping: Option<(&MappingEntry, f64)> = None;
            for mapping in mappings
                .iter()
                .filter(|mapping| mapping.repository == self.config.repository)
            {
                let score = if mapping.helpdesk_tag.eq_ignore_ascii_case(tag) {
                    1.0
                } else {
                    self.scorer.similarity(tag, &mapping.helpdesk_tag)
                };
                if score < FUZZY_MATCH_THRESHOLD.max(mapping.confidence_threshold) {
                    continue;
                }
                if best_mapping
                    .map(|(_, current)| score > current)
                    .unwrap_or(true)
                {
                    best_mapping = Some((mapping, score));
                }
            }
            if let Some((mapping, _)) = best_mapping {
                candidates.push(mapping.github_label.clone());
                continue;
            }

            let mut best: Option<(&String, f64)> = None;
            for label in available {
                let score = self.scorer.similarity(tag, label);
                if score >= FUZZY_MATCH_THRESHOLD
                    && best.map(|(_, current)| score > current).unwrap_or(true)
                {
                    best = Some((label, score));
                }
            }
            if let Some((label, _)) = best {
                candidates.push(label.clone());
                continue;
            }

            if let Some(label) = available
                .iter()
                .find(|label| label.eq_ignore_ascii_case(tag))
            {
                candidates.push(label.clone());
            }
        }
        candidates
    }

    /// Stage 2: bounded excerpt + available names sent to the provider; the
    /// reply must contain a JSON string array.
    async fn ai_candidates(
        &self,
        ai: &dyn LlmClient,
        ctx: &ConversationContext,
        available: &[String],
    ) -> Vec<String> {
        let excerpt = ctx.transcript_excerpt(AI_EXCERPT_TURNS, AI_EXCERPT_CHARS);
        let prompt = format!(
            "Subject: {}\n\nTranscript:\n{}\n\nAvailable labels: {}\n\nReply with a JSON array \
             of the label names (from the available list only) that fit this conversation.",
            ctx.subject,
            excerpt,
            available.join(", ")
        );
        let request = ChatRequest {
            model: self.config.ai_model.clone(),
            system: Some(
                "You classify helpdesk conversations into issue-tracker labels.".to_string(),
            ),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: Some(200),
            temperature: Some(0.0),
        };

        match ai.complete(request).await {
            Ok(reply) => match parse_label_array(&reply) {
                Some(labels) => labels,
                None => {
                    tracing::warn!("ai label reply did not contain a JSON string array");
                    Vec::new()
                }
            },
            Err(error) => {
                tracing::warn!(%error, "ai label inference failed, falling through");
                Vec::new()
            }
        }
    }

    /// Stage 3: first matching keyword per category maps to a same-named
    /// available label.
    fn keyword_candidates(&self, ctx: &ConversationContext, available: &[String]) -> Vec<String> {
        let transcript = format!(
            "{}\n{}",
            ctx.subject,
            ctx.transcript_excerpt(usize::MAX, usize::MAX)
        )
        .to_lowercase();

        let mut candidates = Vec::new();
        for (category, keywords) in KEYWORD_TABLE {
            if keywords.iter().any(|keyword| transcript.contains(keyword)) {
                if available
                    .iter()
                    .any(|label| label.eq_ignore_ascii_case(category))
                {
                    candidates.push((*category).to_string());
                }
            }
        }
        candidates
    }

    /// Stage 4: status- and age-derived labels, appended only when the label
    /// exists remotely.
    fn contextual_candidates(
        &self,
        ctx: &ConversationContext,
        available: &[String],
    ) -> Vec<String> {
        let mut candidates = Vec::new();
        if ctx.age_days(Utc::now()) > STALE_AFTER_DAYS
            && available.iter().any(|label| label.eq_ignore_ascii_case("stale"))
        {
            candidates.push("stale".to_string());
        }
        for (status, label) in STATUS_LABEL_TABLE {
            if ctx.status.eq_ignore_ascii_case(status)
                && available.iter().any(|name| name.eq_ignore_ascii_case(label))
            {
                candidates.push((*label).to_string());
            }
        }
        candidates
    }
}

/// Extracts a JSON string array from a model reply, tolerating surrounding
/// prose around the first `[` ... last `]` span.
fn parse_label_array(reply: &str) -> Option<Vec<String>> {
    let start = reply.find('[')?;
    let end = reply.rfind(']')?;
    if end <= start {
        return None;
    }
    let slice = &reply[start..=end];
    let labels: Vec<String> = serde_json::from_str(slice).ok()?;
    Some(
        labels
            .into_iter()
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect(),
    )
}
