use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::RemoteCallError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Client-side id for an item created in an editor.
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(at.timestamp_millis().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Up,
    Down,
}

impl FromStr for MoveDirection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(format!("unsupported move direction `{other}` (expected up|down)")),
        }
    }
}

/// A record that lives in an [`OrderedList`].
pub trait OrderedItem: Clone + Send + Sync {
    /// Selector for the default field values of a newly added item.
    type Kind: Copy;
    /// A single typed field edit.
    type Edit;

    fn id(&self) -> &ItemId;
    fn order(&self) -> u32;
    fn set_order(&mut self, order: u32);
    fn with_defaults(id: ItemId, kind: Self::Kind, order: u32) -> Self;
    fn apply(&mut self, edit: Self::Edit);
    /// Message explaining why this item cannot be persisted, if it cannot.
    fn save_violation(&self) -> Option<String>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ListValidationError {
    pub item_id: ItemId,
    pub position: usize,
    pub message: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SaveError {
    #[error(transparent)]
    Validation(#[from] ListValidationError),
    #[error(transparent)]
    Remote(#[from] RemoteCallError),
}

/// Storage side of a list editor: replaces the whole collection in one call.
#[async_trait]
pub trait CollectionStore<T>: Send + Sync {
    async fn replace_collection(&self, items: Vec<T>) -> Result<(), RemoteCallError>;
}

/// Locally held, user-reorderable collection whose `order` fields always read
/// `1..=len` in position order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedList<T> {
    items: Vec<T>,
}

impl<T> Default for OrderedList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> OrderedList<T>
where
    T: OrderedItem,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from stored rows, sorting by their stored order and
    /// closing any gaps.
    pub fn from_persisted(mut items: Vec<T>) -> Self {
        items.sort_by_key(|item| item.order());
        let mut list = Self { items };
        list.renumber();
        list
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn add(&mut self, kind: T::Kind) -> &T {
        self.add_at(kind, Utc::now())
    }

    pub fn add_at(&mut self, kind: T::Kind, now: DateTime<Utc>) -> &T {
        let mut millis = now.timestamp_millis();
        let mut id = ItemId(millis.to_string());
        while self.get(&id).is_some() {
            millis += 1;
            id = ItemId(millis.to_string());
        }

        let order = order_for_position(self.items.len());
        self.items.push(T::with_defaults(id, kind, order));
        let last = self.items.len() - 1;
        &self.items[last]
    }

    /// Applies `edit` to the item with `id`. Returns `false` when absent.
    pub fn update(&mut self, id: &ItemId, edit: T::Edit) -> bool {
        match self.items.iter_mut().find(|item| item.id() == id) {
            Some(item) => {
                item.apply(edit);
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: &ItemId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id() != id);
        let removed = self.items.len() != before;
        if removed {
            self.renumber();
        }
        removed
    }

    /// Swaps the item at `index` with its neighbour. Boundary moves and
    /// out-of-range indexes leave the list untouched.
    pub fn reorder(&mut self, index: usize, direction: MoveDirection) -> bool {
        if index >= self.items.len() {
            return false;
        }
        let target = match direction {
            MoveDirection::Up => index.checked_sub(1),
            MoveDirection::Down => Some(index + 1).filter(|target| *target < self.items.len()),
        };
        let Some(target) = target else {
            return false;
        };

        self.items.swap(index, target);
        self.renumber();
        true
    }

    pub fn validate(&self) -> Result<(), ListValidationError> {
        for (position, item) in self.items.iter().enumerate() {
            if let Some(message) = item.save_violation() {
                return Err(ListValidationError { item_id: item.id().clone(), position, message });
            }
        }
        Ok(())
    }

    /// Validates, then replaces the stored collection with this list in a
    /// single call. The local list is never modified.
    pub async fn save<S>(&self, store: &S) -> Result<(), SaveError>
    where
        S: CollectionStore<T> + ?Sized,
    {
        self.validate()?;
        store.replace_collection(self.items.clone()).await?;
        Ok(())
    }

    pub fn is_densely_ordered(&self) -> bool {
        self.items
            .iter()
            .enumerate()
            .all(|(position, item)| item.order() == order_for_position(position))
    }

    fn renumber(&mut self) {
        for (position, item) in self.items.iter_mut().enumerate() {
            item.set_order(order_for_position(position));
        }
    }
}

fn order_for_position(position: usize) -> u32 {
    u32::try_from(position + 1).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::{
        CollectionStore, ItemId, MoveDirection, OrderedItem, OrderedList, SaveError,
    };
    use crate::domain::comparison::{ComparisonRow, ComparisonRowEdit, ComparisonRowKind};
    use crate::domain::feature::{Feature, FeatureEdit, FeatureKind};
    use crate::errors::RemoteCallError;

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<Vec<Feature>>>,
        fail: bool,
    }

    impl RecordingStore {
        fn failing() -> Self {
            Self { calls: Mutex::new(Vec::new()), fail: true }
        }

        fn calls(&self) -> Vec<Vec<Feature>> {
            self.calls.lock().expect("store lock").clone()
        }
    }

    #[async_trait]
    impl CollectionStore<Feature> for RecordingStore {
        async fn replace_collection(&self, items: Vec<Feature>) -> Result<(), RemoteCallError> {
            self.calls.lock().expect("store lock").push(items);
            if self.fail {
                return Err(RemoteCallError::new("agents.features", "connection reset"));
            }
            Ok(())
        }
    }

    fn list_with(count: usize) -> OrderedList<Feature> {
        let mut list = OrderedList::new();
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid time");
        for _ in 0..count {
            list.add_at(FeatureKind::Card, base);
        }
        list
    }

    fn orders(list: &OrderedList<Feature>) -> Vec<u32> {
        list.items().iter().map(OrderedItem::order).collect()
    }

    #[test]
    fn add_appends_with_next_order_and_unique_ids() {
        let list = list_with(3);

        assert_eq!(orders(&list), vec![1, 2, 3]);
        let ids: Vec<&ItemId> = list.items().iter().map(|item| item.id()).collect();
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_eq!(list.items()[0].title, "New Feature");
    }

    #[test]
    fn update_changes_only_the_matching_item() {
        let mut list = list_with(2);
        let first = list.items()[0].id().clone();

        assert!(list.update(&first, FeatureEdit::Title("Voice".to_string())));
        assert!(!list.update(&ItemId("missing".to_string()), FeatureEdit::Icon("x".to_string())));

        assert_eq!(list.items()[0].title, "Voice");
        assert_eq!(list.items()[1].title, "New Feature");
    }

    #[test]
    fn delete_renumbers_remaining_items() {
        let mut list = list_with(3);
        let middle = list.items()[1].id().clone();

        assert!(list.delete(&middle));
        assert_eq!(orders(&list), vec![1, 2]);
        assert!(!list.delete(&middle));
    }

    #[test]
    fn reorder_swaps_neighbours_and_renumbers() {
        let mut list = list_with(3);
        let ids: Vec<ItemId> = list.items().iter().map(|item| item.id().clone()).collect();

        assert!(list.reorder(2, MoveDirection::Up));

        let moved: Vec<ItemId> = list.items().iter().map(|item| item.id().clone()).collect();
        assert_eq!(moved, vec![ids[0].clone(), ids[2].clone(), ids[1].clone()]);
        assert_eq!(orders(&list), vec![1, 2, 3]);
    }

    #[test]
    fn boundary_reorders_are_no_ops() {
        let mut list = list_with(3);
        let before = list.clone();

        assert!(!list.reorder(0, MoveDirection::Up));
        assert_eq!(list, before);
        assert!(!list.reorder(2, MoveDirection::Down));
        assert_eq!(list, before);
        assert!(!list.reorder(7, MoveDirection::Up));
        assert_eq!(list, before);
    }

    #[test]
    fn mixed_operation_sequences_keep_dense_order() {
        let mut list = list_with(4);
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let base = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid time");

        for step in 0..200 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let len = list.len().max(1);
            let index = (seed as usize) % len;
            match seed % 4 {
                0 => {
                    list.add_at(FeatureKind::Card, base + chrono::Duration::milliseconds(step));
                }
                1 => {
                    if let Some(id) = list.items().get(index).map(|item| item.id().clone()) {
                        list.delete(&id);
                    }
                }
                2 => {
                    list.reorder(index, MoveDirection::Up);
                }
                _ => {
                    list.reorder(index, MoveDirection::Down);
                }
            }
            assert!(list.is_densely_ordered(), "order drifted at step {step}: {:?}", orders(&list));
        }
    }

    #[test]
    fn from_persisted_sorts_and_closes_gaps() {
        let mut list = list_with(3);
        let ids: Vec<ItemId> = list.items().iter().map(|item| item.id().clone()).collect();
        let mut rows = list.clone().into_items();
        rows[0].set_order(9);
        rows[1].set_order(2);
        rows[2].set_order(5);

        list = OrderedList::from_persisted(rows);

        let sorted: Vec<ItemId> = list.items().iter().map(|item| item.id().clone()).collect();
        assert_eq!(sorted, vec![ids[1].clone(), ids[2].clone(), ids[0].clone()]);
        assert_eq!(orders(&list), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn save_rejects_blank_titles_without_calling_store() {
        let mut list = list_with(2);
        let second = list.items()[1].id().clone();
        list.update(&second, FeatureEdit::Title("   ".to_string()));
        let store = RecordingStore::default();

        let error = list.save(&store).await.expect_err("blank title must fail validation");

        assert!(matches!(error, SaveError::Validation(ref violation) if violation.position == 1));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn save_sends_entire_list_in_one_call() {
        let list = list_with(3);
        let store = RecordingStore::default();

        list.save(&store).await.expect("save should succeed");

        let calls = store.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], list.items().to_vec());
    }

    #[tokio::test]
    async fn failed_save_leaves_local_list_unchanged() {
        let list = list_with(2);
        let before = list.clone();
        let store = RecordingStore::failing();

        let error = list.save(&store).await.expect_err("store failure surfaces");

        assert!(matches!(error, SaveError::Remote(_)));
        assert_eq!(list, before);
        assert_eq!(store.calls().len(), 1);
    }

    #[test]
    fn comparison_rows_share_the_same_ordering_rules() {
        let mut rows: OrderedList<ComparisonRow> = OrderedList::new();
        rows.add(ComparisonRowKind::Section);
        let feature_id = rows.add(ComparisonRowKind::Feature).id.clone();
        rows.update(&feature_id, ComparisonRowEdit::Value { index: 1, value: "check".to_string() });

        assert!(rows.reorder(1, MoveDirection::Up));
        assert_eq!(rows.items()[0].id, feature_id);
        assert_eq!(rows.items()[0].order, 1);
        assert_eq!(rows.items()[0].values[1], "check");
        assert_eq!(rows.items()[1].label, "New Section");
    }

    #[test]
    fn move_direction_parses_form_values() {
        assert_eq!("up".parse::<MoveDirection>(), Ok(MoveDirection::Up));
        assert_eq!(" Down ".parse::<MoveDirection>(), Ok(MoveDirection::Down));
        assert!("sideways".parse::<MoveDirection>().is_err());
    }
}
