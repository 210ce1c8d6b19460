//! Character shop database.

use serde::{Deserialize, Serialize};

use crate::error::{ProgressError, Result};
use crate::progress::GameProgress;

/// Built-in roster shipped with the game.
const BUILTIN_DATABASE: &str = include_str!("../assets/characters.json");

/// Valid range for `speed` and `power`.
pub const STAT_RANGE: std::ops::RangeInclusive<f32> = 0.0..=100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    /// Sprite asset path.
    pub icon: String,
    pub speed: f32,
    pub power: f32,
    pub price: i32,
    #[serde(default)]
    pub is_purchased: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterShopDatabase {
    characters: Vec<Character>,
}

impl CharacterShopDatabase {
    pub fn new(characters: Vec<Character>) -> Result<Self> {
        for (index, character) in characters.iter().enumerate() {
            validate(index, character)?;
        }
        Ok(Self { characters })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let database: CharacterShopDatabase = serde_json::from_str(json)?;
        let database = Self::new(database.characters)?;
        log::debug!("Character database loaded: {} characters", database.characters_count());
        Ok(database)
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_DATABASE)
    }

    pub fn characters_count(&self) -> usize {
        self.characters.len()
    }

    pub fn character(&self, index: usize) -> Option<&Character> {
        self.characters.get(index)
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn purchase_character(&mut self, index: usize) -> Result<()> {
        let character =
            self.characters.get_mut(index).ok_or(ProgressError::UnknownCharacter { index })?;
        character.is_purchased = true;
        Ok(())
    }

    /// Marks every character recorded as purchased in `progress`.
    ///
    /// Indexes that no longer exist in the database are skipped.
    pub fn apply_purchases(&mut self, progress: &GameProgress) {
        for &recorded in progress.purchased_characters() {
            let applied = usize::try_from(recorded)
                .ok()
                .map(|index| self.purchase_character(index).is_ok())
                .unwrap_or(false);
            if !applied {
                log::warn!("Ignoring purchased character {} not present in the database", recorded);
            }
        }
    }
}

fn validate(index: usize, character: &Character) -> Result<()> {
    let reason = if character.name.trim().is_empty() {
        Some("name is empty".to_string())
    } else if !STAT_RANGE.contains(&character.speed) {
        Some(format!("speed {} is outside 0..=100", character.speed))
    } else if !STAT_RANGE.contains(&character.power) {
        Some(format!("power {} is outside 0..=100", character.power))
    } else if character.price < 0 {
        Some(format!("price {} is negative", character.price))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ProgressError::InvalidCharacter { index, reason }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(name: &str, speed: f32, power: f32, price: i32) -> Character {
        Character {
            name: name.to_string(),
            icon: format!("characters/{}.png", name.to_lowercase()),
            speed,
            power,
            price,
            is_purchased: false,
        }
    }

    #[test]
    fn test_builtin_database() {
        let db = CharacterShopDatabase::builtin().unwrap();
        assert!(db.characters_count() >= 2);
        assert!(db.character(0).unwrap().is_purchased);
        assert_eq!(db.character(0).unwrap().price, 0);
        assert!(db.characters().iter().skip(1).all(|c| !c.is_purchased));
    }

    #[test]
    fn test_purchase_character() {
        let mut db = CharacterShopDatabase::new(vec![character("Ace", 50.0, 50.0, 10)]).unwrap();
        db.purchase_character(0).unwrap();
        assert!(db.character(0).unwrap().is_purchased);
        assert!(matches!(
            db.purchase_character(3),
            Err(ProgressError::UnknownCharacter { index: 3 })
        ));
    }

    #[test]
    fn test_stat_range_validation() {
        let result = CharacterShopDatabase::new(vec![
            character("Ace", 50.0, 50.0, 10),
            character("Broken", 101.0, 50.0, 10),
        ]);
        assert!(matches!(result, Err(ProgressError::InvalidCharacter { index: 1, .. })));

        let result = CharacterShopDatabase::new(vec![character("Cheap", 10.0, 10.0, -5)]);
        assert!(matches!(result, Err(ProgressError::InvalidCharacter { index: 0, .. })));
    }

    #[test]
    fn test_malformed_json() {
        let result = CharacterShopDatabase::from_json("{\"characters\": [{\"name\": 3}]}");
        assert!(matches!(result, Err(ProgressError::Database(_))));
    }
}
