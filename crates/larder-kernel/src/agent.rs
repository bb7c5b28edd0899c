//! Agent identities
//!
//! Every task execution in Larder belongs to exactly one logical task family.
//! The set is closed on purpose: using an enum instead of a free-form string
//! key gives exhaustiveness checking everywhere the runtime maps per-agent
//! state (circuit breakers, queue depths, health reports).

use serde::{Deserialize, Serialize};

/// The logical task family an execution belongs to.
///
/// Identity only - `AgentKind` carries no behavior and no lifecycle. It is
/// used as a map key and as a metric/log label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Classifies raw pantry items into categories
    Categorizer,
    /// Searches third-party recipe APIs
    RecipeSearch,
    /// Computes nutrition facts for items and recipes
    NutritionCheck,
    /// Scores recipes against user preferences
    PreferenceScorer,
    /// Parses receipt scans into pantry items
    ReceiptOcr,
    /// Audits the pantry for expiring stock
    ExpiryAudit,
    /// Assembles meal plans from scored recipes
    MealPlanner,
    /// Finds ingredient substitutions
    SubstitutionFinder,
}

impl AgentKind {
    /// All known agent kinds, in a stable order.
    pub const ALL: [AgentKind; 8] = [
        AgentKind::Categorizer,
        AgentKind::RecipeSearch,
        AgentKind::NutritionCheck,
        AgentKind::PreferenceScorer,
        AgentKind::ReceiptOcr,
        AgentKind::ExpiryAudit,
        AgentKind::MealPlanner,
        AgentKind::SubstitutionFinder,
    ];

    /// Stable label used for metrics and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Categorizer => "categorizer",
            AgentKind::RecipeSearch => "recipe_search",
            AgentKind::NutritionCheck => "nutrition_check",
            AgentKind::PreferenceScorer => "preference_scorer",
            AgentKind::ReceiptOcr => "receipt_ocr",
            AgentKind::ExpiryAudit => "expiry_audit",
            AgentKind::MealPlanner => "meal_planner",
            AgentKind::SubstitutionFinder => "substitution_finder",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
