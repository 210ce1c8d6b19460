//! # gd_progress - Game progress persisted through gd_store
//!
//! Coins, character selection and the character shop, held in an explicit
//! context object instead of process-wide statics.

pub mod character;
pub mod data;
pub mod error;
pub mod progress;

pub use character::{Character, CharacterShopDatabase};
pub use data::{CharactersShopData, PlayerData, CHARACTERS_SHOP_DATA_FILE, PLAYER_DATA_FILE};
pub use error::{ProgressError, Result};
pub use progress::{GameProgress, PurchaseOutcome};
