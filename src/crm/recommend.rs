//! Next-best-action recommendations for a lead.

use log::{debug, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::score_lead::calculate_lead_score;
use crate::core::shared::models::{Lead, LeadStatus};
use crate::llm::LLMProvider;

pub const FALLBACK_RECOMMENDATION: &str = "Maintain periodic contact to nurture this relationship.";

const ENGAGED_NOTES_THRESHOLD: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Rules,
    Llm,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub text: String,
    pub source: RecommendationSource,
}

/// Rule table, first match wins.
pub fn rule_recommendation(lead: &Lead) -> &'static str {
    if lead.status == LeadStatus::Lost {
        return "Analyze rejection reason. Send a 'break-up' email to keep door open for future.";
    }
    if !lead.has_email() && !lead.has_phone() {
        return "Critical Missing Data: Use LinkedIn or company website to find contact info immediately.";
    }
    match lead.status {
        LeadStatus::New => {
            "High Priority: Send the 'Introduction Template' within the first 2 hours."
        }
        LeadStatus::FollowUp if lead.notes_len() > ENGAGED_NOTES_THRESHOLD => {
            "Deep engagement detected. Suggest a demo call to clarify specific points found in notes."
        }
        LeadStatus::FollowUp => {
            "Low engagement. Send a value-add article or case study instead of asking for a meeting."
        }
        LeadStatus::Proposal => {
            "Closing Window: Send a gentle reminder 48h after proposal sent. Focus on ROI."
        }
        _ => FALLBACK_RECOMMENDATION,
    }
}

pub fn build_prompt(lead: &Lead) -> String {
    let yes_no = |present: bool| if present { "yes" } else { "no" };
    format!(
        "You are a sales assistant for a small CRM. Suggest the single next best action \
         for this lead in one or two short sentences. Reply with the action only.\n\n\
         Name: {}\nStatus: {}\nSource: {}\nHas email: {}\nHas phone: {}\nLead score: {}/100\nNotes: {}",
        lead.name,
        lead.status,
        lead.source,
        yes_no(lead.has_email()),
        yes_no(lead.has_phone()),
        calculate_lead_score(lead),
        lead.notes.as_deref().filter(|n| !n.trim().is_empty()).unwrap_or("(none)"),
    )
}

/// Uses the LLM when one is configured, the rule table otherwise.
#[derive(Clone)]
pub struct RecommendationEngine {
    provider: Option<Arc<dyn LLMProvider>>,
    timeout: Duration,
}

impl RecommendationEngine {
    pub fn rules_only() -> Self {
        Self {
            provider: None,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_llm(provider: Arc<dyn LLMProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
        }
    }

    pub fn uses_llm(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn recommend(&self, lead: &Lead) -> Recommendation {
        let Some(provider) = &self.provider else {
            return Recommendation {
                text: rule_recommendation(lead).to_string(),
                source: RecommendationSource::Rules,
            };
        };

        let prompt = build_prompt(lead);
        debug!("Requesting recommendation for lead {} from {}", lead.id, provider.model());

        match tokio::time::timeout(self.timeout, provider.generate(&prompt)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Recommendation {
                text: text.trim().to_string(),
                source: RecommendationSource::Llm,
            },
            Ok(Ok(_)) => {
                warn!("LLM returned empty recommendation for lead {}", lead.id);
                Self::fallback()
            }
            Ok(Err(e)) => {
                warn!("LLM recommendation failed for lead {}: {e}", lead.id);
                Self::fallback()
            }
            Err(_) => {
                warn!(
                    "LLM recommendation timed out after {:?} for lead {}",
                    self.timeout, lead.id
                );
                Self::fallback()
            }
        }
    }

    fn fallback() -> Recommendation {
        Recommendation {
            text: FALLBACK_RECOMMENDATION.to_string(),
            source: RecommendationSource::Fallback,
        }
    }
}
