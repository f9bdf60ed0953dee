pub mod list;

pub use list::{
    CollectionStore, ItemId, ListValidationError, MoveDirection, OrderedItem, OrderedList,
    SaveError,
};
