use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::ordered::{ItemId, OrderedItem};

pub const DEFAULT_ICON: &str = "🤖";
pub const DEFAULT_ICON_BG_COLOR: &str = "#6366f1";

#[allow(clippy::expect_used)]
pub static HEX_COLOR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^#([0-9A-Fa-f]{3}|[0-9A-Fa-f]{6})$")
        .expect("HEX_COLOR_REGEX is a valid regex literal")
});

/// A selling point shown on the home page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFeature {
    pub id: ItemId,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub icon_bg_color: String,
    pub display_order: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyFeatureKind {
    Standard,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyFeatureEdit {
    Title(String),
    Description(String),
    Icon(String),
    IconBgColor(String),
    Active(bool),
}

impl OrderedItem for KeyFeature {
    type Kind = KeyFeatureKind;
    type Edit = KeyFeatureEdit;

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn order(&self) -> u32 {
        self.display_order
    }

    fn set_order(&mut self, order: u32) {
        self.display_order = order;
    }

    fn with_defaults(id: ItemId, _kind: KeyFeatureKind, order: u32) -> Self {
        Self {
            id,
            title: String::new(),
            description: String::new(),
            icon: DEFAULT_ICON.to_string(),
            icon_bg_color: DEFAULT_ICON_BG_COLOR.to_string(),
            display_order: order,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn apply(&mut self, edit: KeyFeatureEdit) {
        match edit {
            KeyFeatureEdit::Title(title) => self.title = title,
            KeyFeatureEdit::Description(description) => self.description = description,
            KeyFeatureEdit::Icon(icon) => self.icon = icon,
            KeyFeatureEdit::IconBgColor(color) => self.icon_bg_color = color,
            KeyFeatureEdit::Active(active) => self.is_active = active,
        }
    }

    fn save_violation(&self) -> Option<String> {
        if self.title.trim().is_empty() {
            return Some("Title is required".to_string());
        }
        if self.description.trim().is_empty() {
            return Some("Description is required".to_string());
        }
        if self.icon.trim().is_empty() {
            return Some("Icon is required".to_string());
        }
        if !HEX_COLOR_REGEX.is_match(self.icon_bg_color.trim()) {
            return Some(format!(
                "Icon background must be a hex colour like {DEFAULT_ICON_BG_COLOR}"
            ));
        }
        None
    }
}

/// Raw key-feature form as posted by the admin dialog.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFeatureForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub icon_bg_color: String,
    #[serde(default)]
    pub is_active: Option<String>,
}

impl KeyFeatureForm {
    pub fn for_new_feature() -> Self {
        Self {
            icon: DEFAULT_ICON.to_string(),
            icon_bg_color: DEFAULT_ICON_BG_COLOR.to_string(),
            is_active: Some("on".to_string()),
            ..Self::default()
        }
    }

    pub fn from_feature(feature: &KeyFeature) -> Self {
        Self {
            title: feature.title.clone(),
            description: feature.description.clone(),
            icon: feature.icon.clone(),
            icon_bg_color: feature.icon_bg_color.clone(),
            is_active: feature.is_active.then(|| "on".to_string()),
        }
    }

    pub fn edits(&self) -> Vec<KeyFeatureEdit> {
        vec![
            KeyFeatureEdit::Title(self.title.trim().to_string()),
            KeyFeatureEdit::Description(self.description.trim().to_string()),
            KeyFeatureEdit::Icon(self.icon.trim().to_string()),
            KeyFeatureEdit::IconBgColor(self.icon_bg_color.trim().to_string()),
            KeyFeatureEdit::Active(self.is_active.is_some()),
        ]
    }

    /// Applies the form to `feature` and checks the result is storable.
    pub fn apply_to(&self, feature: &mut KeyFeature) -> Result<(), DomainError> {
        for edit in self.edits() {
            feature.apply(edit);
        }
        match feature.save_violation() {
            Some(message) => Err(DomainError::invalid_field("key_feature", message)),
            None => Ok(()),
        }
    }
}

/// Active features for the home page, in display order.
pub fn active_in_order(features: &[KeyFeature]) -> Vec<&KeyFeature> {
    let mut active: Vec<&KeyFeature> =
        features.iter().filter(|feature| feature.is_active).collect();
    active.sort_by_key(|feature| feature.display_order);
    active
}
