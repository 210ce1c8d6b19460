//! Persistent data holders, one record file each.

use gd_store::persistable;
use serde::{Deserialize, Serialize};

pub const PLAYER_DATA_FILE: &str = "player-data.txt";
pub const CHARACTERS_SHOP_DATA_FILE: &str = "characters-shop-data.txt";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerData {
    pub coins: i32,
    pub selected_character_index: i32,
}

persistable!(PlayerData { coins: i32, selected_character_index: i32 });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharactersShopData {
    /// Database indexes in purchase order.
    pub purchased_characters_indexes: Vec<i32>,
}

persistable!(CharactersShopData { purchased_characters_indexes: Vec<i32> });
