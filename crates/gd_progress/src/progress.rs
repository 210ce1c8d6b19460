//! Game progress context.
//!
//! Holds the player's coins, selected character and purchased characters.
//! Constructed once at startup with [`GameProgress::open`] and passed to
//! whatever needs it. Every mutation writes its bucket back immediately.

use gd_store::{BinaryStore, Persist, SaveOutcome};
use serde::Serialize;

use crate::character::{Character, CharacterShopDatabase};
use crate::data::{CharactersShopData, PlayerData, CHARACTERS_SHOP_DATA_FILE, PLAYER_DATA_FILE};
use crate::error::{ProgressError, Result};

/// Result of a shop purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased { price: i32 },
    AlreadyOwned,
    NotEnoughCoins { needed: i32, available: i32 },
}

#[derive(Debug)]
pub struct GameProgress {
    store: BinaryStore,
    player: PlayerData,
    shop: CharactersShopData,
}

impl GameProgress {
    /// Loads both data buckets. Missing records start from defaults.
    pub fn open(store: BinaryStore) -> Result<Self> {
        let player: PlayerData = store.load(PLAYER_DATA_FILE)?;
        log::info!("[PlayerData] Loaded.");

        let shop: CharactersShopData = store.load(CHARACTERS_SHOP_DATA_FILE)?;
        log::info!("[CharactersShopData] Loaded.");

        Ok(Self { store, player, shop })
    }

    pub fn store(&self) -> &BinaryStore {
        &self.store
    }

    pub fn player(&self) -> &PlayerData {
        &self.player
    }

    pub fn shop(&self) -> &CharactersShopData {
        &self.shop
    }

    // Player data -----------------------------------------------------------

    pub fn coins(&self) -> i32 {
        self.player.coins
    }

    pub fn add_coins(&mut self, amount: i32) -> Result<()> {
        if amount < 0 {
            return Err(ProgressError::InvalidAmount { amount });
        }
        let mut player = self.player.clone();
        player.coins = player.coins.saturating_add(amount);
        self.commit_player(player)
    }

    pub fn can_spend_coins(&self, amount: i32) -> bool {
        self.player.coins >= amount
    }

    pub fn spend_coins(&mut self, amount: i32) -> Result<()> {
        if amount < 0 {
            return Err(ProgressError::InvalidAmount { amount });
        }
        if !self.can_spend_coins(amount) {
            return Err(ProgressError::InsufficientCoins {
                needed: amount,
                available: self.player.coins,
            });
        }
        let mut player = self.player.clone();
        player.coins -= amount;
        self.commit_player(player)
    }

    pub fn selected_character_index(&self) -> i32 {
        self.player.selected_character_index
    }

    pub fn set_selected_character(&mut self, index: i32) -> Result<()> {
        let mut player = self.player.clone();
        player.selected_character_index = index;
        self.commit_player(player)
    }

    /// Selects an owned character from `database`.
    pub fn select_character<'a>(
        &mut self,
        database: &'a CharacterShopDatabase,
        index: usize,
    ) -> Result<&'a Character> {
        let character =
            database.character(index).ok_or(ProgressError::UnknownCharacter { index })?;
        if !character.is_purchased && !self.is_purchased(index) {
            return Err(ProgressError::NotOwned { index });
        }
        let stored = i32::try_from(index).map_err(|_| ProgressError::UnknownCharacter { index })?;
        self.set_selected_character(stored)?;
        Ok(character)
    }

    pub fn selected_character<'a>(&self, database: &'a CharacterShopDatabase) -> Option<&'a Character> {
        usize::try_from(self.player.selected_character_index)
            .ok()
            .and_then(|index| database.character(index))
    }

    // Characters shop data --------------------------------------------------

    pub fn purchased_characters(&self) -> &[i32] {
        &self.shop.purchased_characters_indexes
    }

    /// The `position`-th purchase, in purchase order.
    pub fn purchased_character(&self, position: usize) -> Option<i32> {
        self.shop.purchased_characters_indexes.get(position).copied()
    }

    pub fn add_purchased_character(&mut self, character_index: i32) -> Result<()> {
        let mut shop = self.shop.clone();
        shop.purchased_characters_indexes.push(character_index);
        self.commit_shop(shop)
    }

    pub fn is_purchased(&self, index: usize) -> bool {
        i32::try_from(index)
            .map(|index| self.shop.purchased_characters_indexes.contains(&index))
            .unwrap_or(false)
    }

    /// Shop purchase flow: check funds, spend, record it, mark purchased.
    ///
    /// If recording the purchase fails the coins are refunded and `database`
    /// is left untouched.
    pub fn purchase(
        &mut self,
        database: &mut CharacterShopDatabase,
        index: usize,
    ) -> Result<PurchaseOutcome> {
        let character =
            database.character(index).ok_or(ProgressError::UnknownCharacter { index })?;
        if character.is_purchased || self.is_purchased(index) {
            return Ok(PurchaseOutcome::AlreadyOwned);
        }

        let price = character.price;
        if !self.can_spend_coins(price) {
            log::debug!("Cannot buy {}: {} coins, costs {}", character.name, self.coins(), price);
            return Ok(PurchaseOutcome::NotEnoughCoins { needed: price, available: self.coins() });
        }

        let stored = i32::try_from(index).map_err(|_| ProgressError::UnknownCharacter { index })?;
        let before = self.player.clone();
        self.spend_coins(price)?;
        if let Err(err) = self.add_purchased_character(stored) {
            if let Err(refund) = self.commit_player(before) {
                log::error!("Failed to refund {} coins after a failed purchase: {}", price, refund);
            }
            return Err(err);
        }
        database.purchase_character(index)?;

        log::info!("Purchased character {} for {} coins", index, price);
        Ok(PurchaseOutcome::Purchased { price })
    }

    // Persistence -----------------------------------------------------------

    // The in-memory bucket is replaced only once its record is on disk.

    fn commit_player(&mut self, player: PlayerData) -> Result<()> {
        self.save_bucket(&player, PLAYER_DATA_FILE)?;
        self.player = player;
        log::info!("[PlayerData] Saved.");
        Ok(())
    }

    fn commit_shop(&mut self, shop: CharactersShopData) -> Result<()> {
        self.save_bucket(&shop, CHARACTERS_SHOP_DATA_FILE)?;
        self.shop = shop;
        log::info!("[CharactersShopData] Saved.");
        Ok(())
    }

    fn save_bucket<T>(&self, data: &T, filename: &str) -> Result<()>
    where
        T: Persist + Serialize + 'static,
    {
        match self.store.save(data, filename)? {
            SaveOutcome::Written { .. } => Ok(()),
            SaveOutcome::Skipped(err) => Err(ProgressError::NotPersistable(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gd_store::StoreConfig;
    use tempfile::TempDir;

    fn open_in(temp_dir: &TempDir) -> GameProgress {
        GameProgress::open(BinaryStore::new(StoreConfig::with_root(temp_dir.path()))).unwrap()
    }

    #[test]
    fn test_first_run_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let progress = open_in(&temp_dir);
        assert_eq!(progress.coins(), 0);
        assert_eq!(progress.selected_character_index(), 0);
        assert!(progress.purchased_characters().is_empty());
        assert!(!progress.store().has_saved(PLAYER_DATA_FILE));
    }

    #[test]
    fn test_coins_are_saved_on_every_change() {
        let temp_dir = TempDir::new().unwrap();
        let mut progress = open_in(&temp_dir);

        progress.add_coins(32).unwrap();
        progress.add_coins(179).unwrap();
        progress.spend_coins(11).unwrap();
        assert_eq!(progress.coins(), 200);

        let reopened = open_in(&temp_dir);
        assert_eq!(reopened.coins(), 200);
    }

    #[test]
    fn test_spending_rules() {
        let temp_dir = TempDir::new().unwrap();
        let mut progress = open_in(&temp_dir);
        progress.add_coins(10).unwrap();

        assert!(progress.can_spend_coins(10));
        assert!(!progress.can_spend_coins(11));
        assert!(matches!(
            progress.spend_coins(11),
            Err(ProgressError::InsufficientCoins { needed: 11, available: 10 })
        ));
        assert!(matches!(progress.add_coins(-1), Err(ProgressError::InvalidAmount { amount: -1 })));
        assert!(matches!(progress.spend_coins(-1), Err(ProgressError::InvalidAmount { .. })));
        assert_eq!(progress.coins(), 10);
    }

    #[test]
    fn test_add_coins_saturates() {
        let temp_dir = TempDir::new().unwrap();
        let mut progress = open_in(&temp_dir);
        progress.add_coins(i32::MAX).unwrap();
        progress.add_coins(5).unwrap();
        assert_eq!(progress.coins(), i32::MAX);
    }

    /// Occupies `filename` with a non-empty directory so saving over it fails.
    fn block_record(progress: &GameProgress, filename: &str) -> std::path::PathBuf {
        let path = progress.store().file_path(filename).unwrap();
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        path
    }

    #[test]
    fn test_failed_save_leaves_state_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let mut progress = open_in(&temp_dir);
        progress.add_coins(40).unwrap();
        block_record(&progress, PLAYER_DATA_FILE);

        assert!(matches!(progress.add_coins(10), Err(ProgressError::Store(_))));
        assert!(progress.spend_coins(5).is_err());
        assert!(progress.set_selected_character(2).is_err());
        assert_eq!(progress.coins(), 40);
        assert_eq!(progress.selected_character_index(), 0);

        block_record(&progress, CHARACTERS_SHOP_DATA_FILE);
        assert!(progress.add_purchased_character(1).is_err());
        assert!(progress.purchased_characters().is_empty());
    }

    #[test]
    fn test_failed_purchase_is_refunded() {
        let temp_dir = TempDir::new().unwrap();
        let mut db = CharacterShopDatabase::builtin().unwrap();
        let mut progress = open_in(&temp_dir);
        progress.add_coins(1000).unwrap();
        let blocked = block_record(&progress, CHARACTERS_SHOP_DATA_FILE);

        assert!(matches!(progress.purchase(&mut db, 1), Err(ProgressError::Store(_))));
        assert_eq!(progress.coins(), 1000);
        assert!(!db.character(1).unwrap().is_purchased);
        assert!(!progress.is_purchased(1));

        std::fs::remove_dir_all(blocked).unwrap();
        let reopened = open_in(&temp_dir);
        assert_eq!(reopened.coins(), 1000);
        assert!(reopened.purchased_characters().is_empty());
    }

    #[test]
    fn test_purchased_characters_keep_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut progress = open_in(&temp_dir);
        progress.add_purchased_character(3).unwrap();
        progress.add_purchased_character(1).unwrap();

        let reopened = open_in(&temp_dir);
        assert_eq!(reopened.purchased_characters(), &[3, 1]);
        assert_eq!(reopened.purchased_character(1), Some(1));
        assert_eq!(reopened.purchased_character(2), None);
        assert!(reopened.is_purchased(3));
        assert!(!reopened.is_purchased(0));
    }
}
