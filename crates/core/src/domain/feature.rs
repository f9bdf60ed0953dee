use serde::{Deserialize, Serialize};

use crate::ordered::{ItemId, OrderedItem};

/// A marketing card shown on an agent's detail page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: ItemId,
    pub icon: String,
    pub title: String,
    pub description: String,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    pub order: u32,
}

fn visible_by_default() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureKind {
    Card,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeatureEdit {
    Icon(String),
    Title(String),
    Description(String),
    Visible(bool),
}

impl FeatureEdit {
    /// Maps an HTML form field onto a typed edit.
    pub fn from_form_field(field: &str, value: &str) -> Option<Self> {
        match field {
            "icon" => Some(Self::Icon(value.to_string())),
            "title" => Some(Self::Title(value.to_string())),
            "description" => Some(Self::Description(value.to_string())),
            "visible" => Some(Self::Visible(matches!(value, "on" | "true" | "1"))),
            _ => None,
        }
    }
}

impl OrderedItem for Feature {
    type Kind = FeatureKind;
    type Edit = FeatureEdit;

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn order(&self) -> u32 {
        self.order
    }

    fn set_order(&mut self, order: u32) {
        self.order = order;
    }

    fn with_defaults(id: ItemId, _kind: FeatureKind, order: u32) -> Self {
        Self {
            id,
            icon: "✨".to_string(),
            title: "New Feature".to_string(),
            description: "Describe this feature...".to_string(),
            visible: true,
            order,
        }
    }

    fn apply(&mut self, edit: FeatureEdit) {
        match edit {
            FeatureEdit::Icon(icon) => self.icon = icon,
            FeatureEdit::Title(title) => self.title = title,
            FeatureEdit::Description(description) => self.description = description,
            FeatureEdit::Visible(visible) => self.visible = visible,
        }
    }

    fn save_violation(&self) -> Option<String> {
        if self.title.trim().is_empty() || self.description.trim().is_empty() {
            return Some("All features must have a title and description".to_string());
        }
        None
    }
}

/// Visible cards in display order.
pub fn visible_in_order(features: &[Feature]) -> Vec<&Feature> {
    let mut visible: Vec<&Feature> = features.iter().filter(|feature| feature.visible).collect();
    visible.sort_by_key(|feature| feature.order);
    visible
}

#[cfg(test)]
mod tests {
    use super::{visible_in_order, Feature, FeatureEdit, FeatureKind};
    use crate::ordered::{ItemId, OrderedItem};

    fn card(id: &str, order: u32, visible: bool) -> Feature {
        let mut feature = Feature::with_defaults(ItemId(id.to_string()), FeatureKind::Card, order);
        feature.visible = visible;
        feature
    }

    #[test]
    fn hidden_cards_are_skipped_and_the_rest_sorted() {
        let features = vec![card("c", 3, true), card("a", 1, false), card("b", 2, true)];

        let ids: Vec<&str> =
            visible_in_order(&features).iter().map(|feature| feature.id.as_str()).collect();

        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn form_fields_map_to_typed_edits() {
        assert_eq!(
            FeatureEdit::from_form_field("title", "Voice"),
            Some(FeatureEdit::Title("Voice".to_string()))
        );
        assert_eq!(FeatureEdit::from_form_field("visible", "on"), Some(FeatureEdit::Visible(true)));
        assert_eq!(FeatureEdit::from_form_field("order", "3"), None);
    }

    #[test]
    fn stored_json_without_visible_flag_defaults_to_visible() {
        let feature: Feature = serde_json::from_str(
            r#"{"id":"1","icon":"⚡","title":"Fast","description":"Quick replies","order":1}"#,
        )
        .expect("feature json");

        assert!(feature.visible);
    }
}
