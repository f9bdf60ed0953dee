use serde::{Deserialize, Serialize};

use crate::ordered::{ItemId, OrderedItem};

/// Number of plan columns every comparison row carries.
pub const PLAN_VALUE_COUNT: usize = 4;

pub const DEFAULT_HEADERS: [&str; PLAN_VALUE_COUNT + 1] =
    ["Features", "Starter", "Pro", "Business", "Enterprise"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonRowKind {
    Section,
    Feature,
}

impl ComparisonRowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Section => "section",
            Self::Feature => "feature",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "section" => Some(Self::Section),
            "feature" => Some(Self::Feature),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub id: ItemId,
    #[serde(rename = "type")]
    pub kind: ComparisonRowKind,
    pub label: String,
    #[serde(default)]
    pub values: Vec<String>,
    pub order: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComparisonRowEdit {
    Kind(ComparisonRowKind),
    Label(String),
    Value { index: usize, value: String },
}

impl ComparisonRowEdit {
    /// Maps an HTML form field (`kind`, `label`, `value_0`..`value_3`) onto a
    /// typed edit.
    pub fn from_form_field(field: &str, value: &str) -> Option<Self> {
        match field {
            "kind" => ComparisonRowKind::parse(value).map(Self::Kind),
            "label" => Some(Self::Label(value.to_string())),
            other => {
                let index = other.strip_prefix("value_")?.parse::<usize>().ok()?;
                (index < PLAN_VALUE_COUNT)
                    .then(|| Self::Value { index, value: value.to_string() })
            }
        }
    }
}

impl OrderedItem for ComparisonRow {
    type Kind = ComparisonRowKind;
    type Edit = ComparisonRowEdit;

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn order(&self) -> u32 {
        self.order
    }

    fn set_order(&mut self, order: u32) {
        self.order = order;
    }

    fn with_defaults(id: ItemId, kind: ComparisonRowKind, order: u32) -> Self {
        let label = match kind {
            ComparisonRowKind::Section => "New Section",
            ComparisonRowKind::Feature => "New Feature",
        };
        Self {
            id,
            kind,
            label: label.to_string(),
            values: vec![String::new(); PLAN_VALUE_COUNT],
            order,
        }
    }

    fn apply(&mut self, edit: ComparisonRowEdit) {
        match edit {
            ComparisonRowEdit::Kind(kind) => self.kind = kind,
            ComparisonRowEdit::Label(label) => self.label = label,
            ComparisonRowEdit::Value { index, value } => {
                if index >= PLAN_VALUE_COUNT {
                    return;
                }
                if self.values.len() < PLAN_VALUE_COUNT {
                    self.values.resize(PLAN_VALUE_COUNT, String::new());
                }
                self.values[index] = value;
            }
        }
    }

    fn save_violation(&self) -> Option<String> {
        if self.label.trim().is_empty() {
            return Some("All rows must have a label".to_string());
        }
        None
    }
}

/// How a single comparison cell renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellValue<'a> {
    Check,
    Cross,
    Text(&'a str),
}

impl<'a> CellValue<'a> {
    pub fn parse(raw: &'a str) -> Self {
        match raw {
            "check" => Self::Check,
            "cross" => Self::Cross,
            text => Self::Text(text),
        }
    }

    pub fn display(self) -> &'a str {
        match self {
            Self::Check => "✓",
            Self::Cross => "✗",
            Self::Text(text) => text,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonTable {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Stored headers, or the plan names when none were saved.
    pub fn effective_headers(&self) -> Vec<String> {
        if self.headers.is_empty() {
            return DEFAULT_HEADERS.iter().map(|header| header.to_string()).collect();
        }
        self.headers.clone()
    }

    pub fn sorted_rows(&self) -> Vec<&ComparisonRow> {
        let mut rows: Vec<&ComparisonRow> = self.rows.iter().collect();
        rows.sort_by_key(|row| row.order);
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CellValue, ComparisonRow, ComparisonRowEdit, ComparisonRowKind, ComparisonTable,
        PLAN_VALUE_COUNT,
    };
    use crate::ordered::{ItemId, OrderedItem};

    #[test]
    fn cell_values_render_marks_and_verbatim_text() {
        assert_eq!(CellValue::parse("check").display(), "✓");
        assert_eq!(CellValue::parse("cross").display(), "✗");
        assert_eq!(CellValue::parse("Unlimited").display(), "Unlimited");
        assert_eq!(CellValue::parse(""), CellValue::Text(""));
    }

    #[test]
    fn value_edits_outside_the_plan_columns_are_ignored() {
        let mut row =
            ComparisonRow::with_defaults(ItemId("1".to_string()), ComparisonRowKind::Feature, 1);
        row.values.clear();

        row.apply(ComparisonRowEdit::Value { index: 2, value: "cross".to_string() });
        row.apply(ComparisonRowEdit::Value { index: 9, value: "check".to_string() });

        assert_eq!(row.values.len(), PLAN_VALUE_COUNT);
        assert_eq!(row.values[2], "cross");
        assert!(!row.values.iter().any(|value| value == "check"));
    }

    #[test]
    fn form_value_fields_are_bounded() {
        assert_eq!(
            ComparisonRowEdit::from_form_field("value_3", "x"),
            Some(ComparisonRowEdit::Value { index: 3, value: "x".to_string() })
        );
        assert_eq!(ComparisonRowEdit::from_form_field("value_4", "x"), None);
        assert_eq!(
            ComparisonRowEdit::from_form_field("kind", "section"),
            Some(ComparisonRowEdit::Kind(ComparisonRowKind::Section))
        );
    }

    #[test]
    fn blank_label_is_a_save_violation() {
        let mut row =
            ComparisonRow::with_defaults(ItemId("1".to_string()), ComparisonRowKind::Section, 1);
        row.apply(ComparisonRowEdit::Label("  ".to_string()));

        assert_eq!(row.save_violation().as_deref(), Some("All rows must have a label"));
    }

    #[test]
    fn stored_table_uses_type_key_and_falls_back_to_plan_headers() {
        let table: ComparisonTable = serde_json::from_str(
            r#"{"rows":[{"id":"r2","type":"feature","label":"SSO","values":["cross","cross","check","check"],"order":2},
                        {"id":"r1","type":"section","label":"Security","values":["","","",""],"order":1}]}"#,
        )
        .expect("table json");

        assert_eq!(table.effective_headers()[0], "Features");
        assert_eq!(table.effective_headers().len(), 5);
        let labels: Vec<&str> = table.sorted_rows().iter().map(|row| row.label.as_str()).collect();
        assert_eq!(labels, vec!["Security", "SSO"]);
    }
}
