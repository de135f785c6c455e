// Guild Wars 2 professions and elite specializations.
//
// Rosters and builds both refer to a "class", which is either a base
// profession or one of its elite specializations. Parsing is case-insensitive
// so moderators can type `firebrand` or `Firebrand` interchangeably.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Profession {
    Elementalist,
    Engineer,
    Guardian,
    Mesmer,
    Necromancer,
    Ranger,
    Revenant,
    Thief,
    Warrior,
}

impl Profession {
    pub const ALL: [Profession; 9] = [
        Profession::Elementalist,
        Profession::Engineer,
        Profession::Guardian,
        Profession::Mesmer,
        Profession::Necromancer,
        Profession::Ranger,
        Profession::Revenant,
        Profession::Thief,
        Profession::Warrior,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Profession::Elementalist => "Elementalist",
            Profession::Engineer => "Engineer",
            Profession::Guardian => "Guardian",
            Profession::Mesmer => "Mesmer",
            Profession::Necromancer => "Necromancer",
            Profession::Ranger => "Ranger",
            Profession::Revenant => "Revenant",
            Profession::Thief => "Thief",
            Profession::Warrior => "Warrior",
        }
    }

    /// Embed colour used for anything themed after this profession.
    pub fn color(&self) -> u32 {
        match self {
            Profession::Elementalist => 0xF68A35,
            Profession::Engineer => 0xB77C34,
            Profession::Guardian => 0x0C8FD6,
            Profession::Mesmer => 0xB46DFF,
            Profession::Necromancer => 0x3A9D23,
            Profession::Ranger => 0x4B8E4B,
            Profession::Revenant => 0x79236F,
            Profession::Thief => 0xA02E2D,
            Profession::Warrior => 0xC7892B,
        }
    }
}

// (name, profession) for every elite specialization.
const SPECIALIZATIONS: &[(&str, Profession)] = &[
    ("Tempest", Profession::Elementalist),
    ("Weaver", Profession::Elementalist),
    ("Catalyst", Profession::Elementalist),
    ("Evoker", Profession::Elementalist),
    ("Scrapper", Profession::Engineer),
    ("Holosmith", Profession::Engineer),
    ("Mechanist", Profession::Engineer),
    ("Amalgam", Profession::Engineer),
    ("Dragonhunter", Profession::Guardian),
    ("Firebrand", Profession::Guardian),
    ("Willbender", Profession::Guardian),
    ("Luminary", Profession::Guardian),
    ("Chronomancer", Profession::Mesmer),
    ("Mirage", Profession::Mesmer),
    ("Virtuoso", Profession::Mesmer),
    ("Troubadour", Profession::Mesmer),
    ("Reaper", Profession::Necromancer),
    ("Scourge", Profession::Necromancer),
    ("Harbinger", Profession::Necromancer),
    ("Ritualist", Profession::Necromancer),
    ("Druid", Profession::Ranger),
    ("Soulbeast", Profession::Ranger),
    ("Untamed", Profession::Ranger),
    ("Galeshot", Profession::Ranger),
    ("Herald", Profession::Revenant),
    ("Renegade", Profession::Revenant),
    ("Vindicator", Profession::Revenant),
    ("Conduit", Profession::Revenant),
    ("Daredevil", Profession::Thief),
    ("Deadeye", Profession::Thief),
    ("Specter", Profession::Thief),
    ("Antiquary", Profession::Thief),
    ("Berserker", Profession::Warrior),
    ("Spellbreaker", Profession::Warrior),
    ("Bladesworn", Profession::Warrior),
    ("Paragon", Profession::Warrior),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown class or specialization: {0}")]
pub struct UnknownClass(pub String);

/// A roster or build class: a base profession or an elite specialization.
///
/// Serialized as its display name so stored JSON stays readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum GameClass {
    Core(Profession),
    Elite {
        name: &'static str,
        profession: Profession,
    },
}

impl GameClass {
    pub fn name(&self) -> &'static str {
        match self {
            GameClass::Core(profession) => profession.name(),
            GameClass::Elite { name, .. } => name,
        }
    }

    pub fn profession(&self) -> Profession {
        match self {
            GameClass::Core(profession) => *profession,
            GameClass::Elite { profession, .. } => *profession,
        }
    }

    pub fn color(&self) -> u32 {
        self.profession().color()
    }

    /// "Firebrand (Guardian)" for elites, "Guardian" otherwise.
    pub fn display_with_profession(&self) -> String {
        match self {
            GameClass::Core(profession) => profession.name().to_string(),
            GameClass::Elite { name, profession } => format!("{} ({})", name, profession.name()),
        }
    }

    /// Every selectable class, sorted alphabetically.
    pub fn all() -> Vec<GameClass> {
        let mut classes: Vec<GameClass> = Profession::ALL
            .iter()
            .map(|p| GameClass::Core(*p))
            .chain(
                SPECIALIZATIONS
                    .iter()
                    .map(|(name, profession)| GameClass::Elite {
                        name,
                        profession: *profession,
                    }),
            )
            .collect();
        classes.sort_by_key(|c| c.name());
        classes
    }
}

impl fmt::Display for GameClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GameClass {
    type Err = UnknownClass;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let candidate = value.trim();
        if let Some(profession) = Profession::ALL
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(candidate))
        {
            return Ok(GameClass::Core(*profession));
        }

        SPECIALIZATIONS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(candidate))
            .map(|(name, profession)| GameClass::Elite {
                name,
                profession: *profession,
            })
            .ok_or_else(|| UnknownClass(candidate.to_string()))
    }
}

// Elite names borrow from the static table, so deserializing goes through an
// owned string instead of the derive.
impl<'de> Deserialize<'de> for GameClass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

impl From<GameClass> for String {
    fn from(value: GameClass) -> Self {
        value.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_professions_and_elites_case_insensitively() {
        assert_eq!(
            "guardian".parse::<GameClass>().unwrap(),
            GameClass::Core(Profession::Guardian)
        );
        let firebrand: GameClass = " FIREBRAND ".parse().unwrap();
        assert_eq!(firebrand.name(), "Firebrand");
        assert_eq!(firebrand.profession(), Profession::Guardian);
        assert_eq!(firebrand.display_with_profession(), "Firebrand (Guardian)");
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "Paladin".parse::<GameClass>().unwrap_err();
        assert_eq!(err, UnknownClass("Paladin".to_string()));
    }

    #[test]
    fn serializes_as_display_name() {
        let druid: GameClass = "druid".parse().unwrap();
        let json = serde_json::to_string(&druid).unwrap();
        assert_eq!(json, "\"Druid\"");
        let back: GameClass = serde_json::from_str(&json).unwrap();
        assert_eq!(back, druid);
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Slot {
        class: GameClass,
        count: u32,
    }

    fn load_owned<T: serde::de::DeserializeOwned>(raw: String) -> T {
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn loads_from_owned_buffers() {
        // Stored files are read into a buffer that is dropped after parsing.
        let raw = r#"[{"class":"firebrand","count":2},{"class":"Necromancer","count":1}]"#.to_string();
        let slots: Vec<Slot> = load_owned(raw);
        assert_eq!(slots[0].class.name(), "Firebrand");
        assert_eq!(slots[0].count, 2);
        assert_eq!(slots[1].class, GameClass::Core(Profession::Necromancer));

        let bad = serde_json::from_str::<Slot>(r#"{"class":"Paladin","count":1}"#).unwrap_err();
        assert!(bad.to_string().contains("Unknown class or specialization: Paladin"));
    }

    #[test]
    fn all_lists_every_class_once() {
        let all = GameClass::all();
        assert_eq!(all.len(), 9 + 36);
        assert!(all.windows(2).all(|w| w[0].name() < w[1].name()));
    }
}
