use std::collections::{HashMap, HashSet};

use crate::model::{Character, CharacterError, CharacterId, VoiceId, builtin_characters};

/// Read-only catalog of personas, listed in registration order.
#[derive(Debug, Clone)]
pub struct CharacterRegistry {
    characters: Vec<Character>,
}

impl CharacterRegistry {
    /// Freeze a set of characters into a registry.
    ///
    /// # Errors
    ///
    /// Returns `CharacterError::Duplicate` if two characters share an id.
    pub fn new(characters: Vec<Character>) -> Result<Self, CharacterError> {
        let mut seen = HashSet::with_capacity(characters.len());
        for character in &characters {
            if !seen.insert(character.id().clone()) {
                return Err(CharacterError::Duplicate(character.id().clone()));
            }
        }
        Ok(Self { characters })
    }

    /// The stock catalog with no overrides.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            characters: builtin_characters(),
        }
    }

    /// The stock catalog with per-character voice overrides applied.
    ///
    /// Overrides for ids that are not in the catalog are ignored.
    #[must_use]
    pub fn builtin_with_voices(overrides: &HashMap<CharacterId, VoiceId>) -> Self {
        let characters = builtin_characters()
            .into_iter()
            .map(|c| match overrides.get(c.id()) {
                Some(voice) => c.with_voice(voice.clone()),
                None => c,
            })
            .collect();
        Self { characters }
    }

    /// Look up a character by id.
    ///
    /// # Errors
    ///
    /// Returns `CharacterError::UnknownCharacter` if no such character is registered.
    pub fn get(&self, id: &CharacterId) -> Result<&Character, CharacterError> {
        self.characters
            .iter()
            .find(|c| c.id() == id)
            .ok_or_else(|| CharacterError::UnknownCharacter(id.clone()))
    }

    #[must_use]
    pub fn list(&self) -> &[Character] {
        &self.characters
    }

    pub fn ids(&self) -> impl Iterator<Item = &CharacterId> {
        self.characters.iter().map(Character::id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.characters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }
}
