//! Item repository.
//!
//! Items carry caller-assigned identities, so `save` relies on
//! `Item::is_new` rather than identity presence to choose insert or merge.

use crate::model::item::Item;
use crate::repo::repository::CrudRepository;

#[derive(Debug, Default, Clone, Copy)]
pub struct ItemRepository;

impl ItemRepository {
    pub fn new() -> Self {
        Self
    }
}

impl CrudRepository for ItemRepository {
    type Entity = Item;
}
