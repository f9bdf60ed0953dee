use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::comparison::ComparisonTable;
use crate::domain::feature::{self, Feature};
use crate::errors::DomainError;

pub const DEFAULT_AGENT_IMAGE: &str = "🤖";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Starter,
    Pro,
    Business,
    Enterprise,
}

impl PlanTier {
    pub const ALL: [PlanTier; 4] = [Self::Starter, Self::Pro, Self::Business, Self::Enterprise];

    pub fn label(self) -> &'static str {
        match self {
            Self::Starter => "Starter",
            Self::Pro => "Pro",
            Self::Business => "Business",
            Self::Enterprise => "Enterprise",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Business => "business",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn is_most_popular(self) -> bool {
        matches!(self, Self::Pro)
    }

    fn default_price(self) -> u32 {
        match self {
            Self::Starter => 499,
            Self::Pro => 999,
            Self::Business => 1999,
            Self::Enterprise => 4999,
        }
    }
}

/// Price in rupees plus the bullet list shown on a pricing card.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPlan {
    pub price: u32,
    pub features: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub starter: TierPlan,
    pub pro: TierPlan,
    pub business: TierPlan,
    pub enterprise: TierPlan,
}

impl Default for Pricing {
    fn default() -> Self {
        let plan = |tier: PlanTier| TierPlan { price: tier.default_price(), features: Vec::new() };
        Self {
            starter: plan(PlanTier::Starter),
            pro: plan(PlanTier::Pro),
            business: plan(PlanTier::Business),
            enterprise: plan(PlanTier::Enterprise),
        }
    }
}

impl Pricing {
    pub fn plan(&self, tier: PlanTier) -> &TierPlan {
        match tier {
            PlanTier::Starter => &self.starter,
            PlanTier::Pro => &self.pro,
            PlanTier::Business => &self.business,
            PlanTier::Enterprise => &self.enterprise,
        }
    }

    fn plan_mut(&mut self, tier: PlanTier) -> &mut TierPlan {
        match tier {
            PlanTier::Starter => &mut self.starter,
            PlanTier::Pro => &mut self.pro,
            PlanTier::Business => &mut self.business,
            PlanTier::Enterprise => &mut self.enterprise,
        }
    }

    pub fn tiers(&self) -> impl Iterator<Item = (PlanTier, &TierPlan)> {
        PlanTier::ALL.into_iter().map(move |tier| (tier, self.plan(tier)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub short_description: String,
    pub description: String,
    pub image: String,
    pub pricing: Pricing,
    pub features: Vec<Feature>,
    pub comparison_table: ComparisonTable,
    pub comparison_enabled: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn create(id: AgentId, fields: AgentFields, now: DateTime<Utc>) -> Self {
        let mut agent = Self {
            id,
            name: String::new(),
            short_description: String::new(),
            description: String::new(),
            image: DEFAULT_AGENT_IMAGE.to_string(),
            pricing: Pricing::default(),
            features: Vec::new(),
            comparison_table: ComparisonTable::default(),
            comparison_enabled: false,
            is_active: true,
            created_at: now,
        };
        agent.apply_fields(fields);
        agent
    }

    pub fn apply_fields(&mut self, fields: AgentFields) {
        self.name = fields.name;
        self.short_description = fields.short_description;
        self.description = fields.description;
        self.image = fields.image;
        self.pricing = fields.pricing;
        self.is_active = fields.is_active;
    }

    pub fn apply_patch(&mut self, patch: AgentPatch) {
        match patch {
            AgentPatch::Description(description) => self.description = description,
            AgentPatch::Features(features) => self.features = features,
            AgentPatch::ComparisonTable(table) => self.comparison_table = table,
            AgentPatch::ComparisonEnabled(enabled) => self.comparison_enabled = enabled,
        }
    }

    pub fn visible_features(&self) -> Vec<&Feature> {
        feature::visible_in_order(&self.features)
    }

    /// The comparison table renders only when switched on and non-empty.
    pub fn shows_comparison(&self) -> bool {
        self.comparison_enabled && !self.comparison_table.is_empty()
    }

    pub fn starter_price(&self) -> u32 {
        self.pricing.starter.price
    }
}

/// A single-field update made from the agent detail page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentPatch {
    Description(String),
    Features(Vec<Feature>),
    ComparisonTable(ComparisonTable),
    ComparisonEnabled(bool),
}

impl AgentPatch {
    /// Storage column touched by this patch.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Description(_) => "description",
            Self::Features(_) => "features",
            Self::ComparisonTable(_) => "comparison_table",
            Self::ComparisonEnabled(_) => "comparison_enabled",
        }
    }
}

/// Validated admin-form values for an agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentFields {
    pub name: String,
    pub short_description: String,
    pub description: String,
    pub image: String,
    pub pricing: Pricing,
    pub is_active: bool,
}

/// Raw agent form as posted by the admin console. Prices stay strings until
/// [`AgentForm::parse`] so a typo re-renders the form instead of failing the
/// request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub starter_price: String,
    #[serde(default)]
    pub starter_features: String,
    #[serde(default)]
    pub pro_price: String,
    #[serde(default)]
    pub pro_features: String,
    #[serde(default)]
    pub business_price: String,
    #[serde(default)]
    pub business_features: String,
    #[serde(default)]
    pub enterprise_price: String,
    #[serde(default)]
    pub enterprise_features: String,
    #[serde(default)]
    pub is_active: Option<String>,
}

impl AgentForm {
    pub fn for_new_agent() -> Self {
        let pricing = Pricing::default();
        Self {
            image: DEFAULT_AGENT_IMAGE.to_string(),
            starter_price: pricing.starter.price.to_string(),
            pro_price: pricing.pro.price.to_string(),
            business_price: pricing.business.price.to_string(),
            enterprise_price: pricing.enterprise.price.to_string(),
            is_active: Some("on".to_string()),
            ..Self::default()
        }
    }

    pub fn from_agent(agent: &Agent) -> Self {
        let pricing = &agent.pricing;
        Self {
            name: agent.name.clone(),
            short_description: agent.short_description.clone(),
            description: agent.description.clone(),
            image: agent.image.clone(),
            starter_price: pricing.starter.price.to_string(),
            starter_features: join_feature_lines(&pricing.starter.features),
            pro_price: pricing.pro.price.to_string(),
            pro_features: join_feature_lines(&pricing.pro.features),
            business_price: pricing.business.price.to_string(),
            business_features: join_feature_lines(&pricing.business.features),
            enterprise_price: pricing.enterprise.price.to_string(),
            enterprise_features: join_feature_lines(&pricing.enterprise.features),
            is_active: agent.is_active.then(|| "on".to_string()),
        }
    }

    pub fn parse(&self) -> Result<AgentFields, DomainError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::invalid_field("name", "Agent name is required"));
        }
        let short_description = self.short_description.trim();
        if short_description.is_empty() {
            return Err(DomainError::invalid_field(
                "short_description",
                "Short description is required",
            ));
        }

        let mut pricing = Pricing::default();
        for tier in PlanTier::ALL {
            let (price, features) = self.tier_inputs(tier);
            let plan = pricing.plan_mut(tier);
            plan.price = parse_price(tier, price)?;
            plan.features = split_feature_lines(features);
        }

        let image = self.image.trim();
        Ok(AgentFields {
            name: name.to_string(),
            short_description: short_description.to_string(),
            description: self.description.trim().to_string(),
            image: if image.is_empty() { DEFAULT_AGENT_IMAGE } else { image }.to_string(),
            pricing,
            is_active: self.is_active.is_some(),
        })
    }

    fn tier_inputs(&self, tier: PlanTier) -> (&str, &str) {
        match tier {
            PlanTier::Starter => (&self.starter_price, &self.starter_features),
            PlanTier::Pro => (&self.pro_price, &self.pro_features),
            PlanTier::Business => (&self.business_price, &self.business_features),
            PlanTier::Enterprise => (&self.enterprise_price, &self.enterprise_features),
        }
    }
}

fn parse_price(tier: PlanTier, raw: &str) -> Result<u32, DomainError> {
    raw.trim().parse::<u32>().map_err(|_| {
        DomainError::invalid_field(
            format!("{}_price", tier.key()),
            format!("{} price must be a whole number of rupees", tier.label()),
        )
    })
}

/// Newline-separated bullet text to a list, dropping blank lines.
pub fn split_feature_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn join_feature_lines(features: &[String]) -> String {
    features.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{
        split_feature_lines, Agent, AgentForm, AgentId, AgentPatch, PlanTier, DEFAULT_AGENT_IMAGE,
    };
    use crate::domain::comparison::{ComparisonRow, ComparisonRowKind, ComparisonTable};
    use crate::errors::DomainError;
    use crate::ordered::{ItemId, OrderedItem};

    fn valid_form() -> AgentForm {
        AgentForm {
            name: "Support Genie".to_string(),
            short_description: "Answers tickets".to_string(),
            ..AgentForm::for_new_agent()
        }
    }

    #[test]
    fn new_agent_form_carries_default_prices() {
        let fields = valid_form().parse().expect("valid form");

        let prices: Vec<u32> = fields.pricing.tiers().map(|(_, plan)| plan.price).collect();
        assert_eq!(prices, vec![499, 999, 1999, 4999]);
        assert_eq!(fields.image, DEFAULT_AGENT_IMAGE);
        assert!(fields.is_active);
    }

    #[test]
    fn tier_feature_text_drops_blank_lines() {
        let lines = split_feature_lines("24/7 chat\n\n   \nCRM sync\r\n");

        assert_eq!(lines, vec!["24/7 chat".to_string(), "CRM sync".to_string()]);
    }

    #[test]
    fn bad_price_names_the_tier() {
        let form = AgentForm { business_price: "lots".to_string(), ..valid_form() };

        let error = form.parse().expect_err("price must be numeric");

        assert!(matches!(
            error,
            DomainError::InvalidField { ref field, .. } if field == "business_price"
        ));
    }

    #[test]
    fn missing_name_is_rejected() {
        let form = AgentForm { name: "  ".to_string(), ..valid_form() };

        assert!(form.parse().is_err());
    }

    #[test]
    fn form_round_trips_through_an_agent() {
        let mut form = valid_form();
        form.pro_features = "Voice\nAnalytics".to_string();
        let agent = Agent::create(AgentId::generate(), form.parse().expect("valid"), Utc::now());

        let again = AgentForm::from_agent(&agent);

        assert_eq!(again.pro_features, "Voice\nAnalytics");
        assert_eq!(again.name, "Support Genie");
        assert!(PlanTier::Pro.is_most_popular());
    }

    #[test]
    fn comparison_shows_only_when_enabled_and_non_empty() {
        let mut agent = Agent::create(AgentId::generate(), valid_form().parse().expect("valid"), Utc::now());
        agent.apply_patch(AgentPatch::ComparisonEnabled(true));
        assert!(!agent.shows_comparison());

        let row = ComparisonRow::with_defaults(ItemId("1".to_string()), ComparisonRowKind::Feature, 1);
        agent.apply_patch(AgentPatch::ComparisonTable(ComparisonTable {
            headers: Vec::new(),
            rows: vec![row],
        }));
        assert!(agent.shows_comparison());

        agent.apply_patch(AgentPatch::ComparisonEnabled(false));
        assert!(!agent.shows_comparison());
    }
}
