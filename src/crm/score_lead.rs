//! Lead scoring heuristic.
//!
//! Score = base + contact bonuses + notes depth + pipeline stage weight, clamped to 0..=100.

use serde::Serialize;

use crate::core::shared::models::{Lead, LeadStatus};

const BASE_SCORE: i64 = 10;
const EMAIL_BONUS: i64 = 15;
const PHONE_BONUS: i64 = 20;
const NOTES_BONUS: i64 = 10;
const NOTES_SHORT_THRESHOLD: usize = 20;
const NOTES_LONG_THRESHOLD: usize = 100;

pub fn status_weight(status: LeadStatus) -> i64 {
    match status {
        LeadStatus::New => 5,
        LeadStatus::FollowUp => 20,
        LeadStatus::Proposal => 45,
        LeadStatus::Converted => 50,
        LeadStatus::Lost => 0,
    }
}

/// Calculate lead score from contact completeness, notes and status
pub fn calculate_lead_score(lead: &Lead) -> i64 {
    let mut score = BASE_SCORE;

    if lead.has_email() {
        score += EMAIL_BONUS;
    }
    if lead.has_phone() {
        score += PHONE_BONUS;
    }

    let notes_len = lead.notes_len();
    if notes_len > NOTES_SHORT_THRESHOLD {
        score += NOTES_BONUS;
    }
    if notes_len > NOTES_LONG_THRESHOLD {
        score += NOTES_BONUS;
    }

    score += status_weight(lead.status);

    score.clamp(0, 100)
}

/// A missing lead scores 0.
pub fn score_optional(lead: Option<&Lead>) -> i64 {
    lead.map_or(0, calculate_lead_score)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Priority {
    Hot,
    Warm,
    Cold,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "Hot",
            Self::Warm => "Warm",
            Self::Cold => "Cold",
        }
    }
}

/// Determine priority band based on score
pub fn priority_for(score: i64) -> Priority {
    match score {
        70.. => Priority::Hot,
        40..=69 => Priority::Warm,
        _ => Priority::Cold,
    }
}
