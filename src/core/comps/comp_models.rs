use crate::core::professions::GameClass;
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One selectable role in a composition. `capacity: None` is unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSlot {
    pub class: GameClass,
    #[serde(default)]
    pub capacity: Option<u32>,
}

/// Ordered list of class slots. The slot index is the signup key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RosterDefinition {
    pub slots: Vec<ClassSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterParseError {
    #[error("'{count}' is not a valid number for {name}.")]
    BadCount { name: String, count: String },
    #[error("Unknown class '{0}'. Check the spelling against the GW2 class names.")]
    UnknownClass(String),
    #[error("{0} is listed more than once.")]
    Duplicate(String),
    #[error("A composition can have at most {0} classes.")]
    TooMany(usize),
}

/// Discord allows 25 select options; one is reserved for "leave".
pub const MAX_SLOTS: usize = 24;

impl RosterDefinition {
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// One slot per line, `Name` or `Name=count`. Blank lines are skipped, as
    /// is an empty count.
    pub fn parse(text: &str) -> Result<Self, RosterParseError> {
        let mut slots: Vec<ClassSlot> = Vec::new();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let (name, capacity) = match line.split_once('=') {
                Some((name, count)) => {
                    let name = name.trim();
                    let count = count.trim();
                    if name.is_empty() {
                        continue;
                    }
                    let capacity = if count.is_empty() {
                        None
                    } else {
                        Some(count.parse::<u32>().map_err(|_| RosterParseError::BadCount {
                            name: name.to_string(),
                            count: count.to_string(),
                        })?)
                    };
                    (name, capacity)
                }
                None => (line, None),
            };

            let class: GameClass = name
                .parse()
                .map_err(|_| RosterParseError::UnknownClass(name.to_string()))?;
            if slots.iter().any(|slot| slot.class == class) {
                return Err(RosterParseError::Duplicate(class.name().to_string()));
            }
            slots.push(ClassSlot { class, capacity });
        }

        if slots.len() > MAX_SLOTS {
            return Err(RosterParseError::TooMany(MAX_SLOTS));
        }
        Ok(Self { slots })
    }
}

/// Inverse of `parse`, used to pre-fill edit prompts and in listings.
impl fmt::Display for RosterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self
            .slots
            .iter()
            .map(|slot| match slot.capacity {
                Some(count) => format!("{}={}", slot.class.name(), count),
                None => slot.class.name().to_string(),
            })
            .collect();
        f.write_str(&lines.join("\n"))
    }
}

/// A recurring or one-off rule that produces composition posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionSchedule {
    pub id: u32,
    pub name: String,
    pub guild_id: u64,
    pub channel_id: u64,
    /// Monday-first and free of duplicates. Empty only for one-off
    /// schedules, which then fire at the next `time_of_day` on any day.
    #[serde(default)]
    pub days: Vec<Weekday>,
    pub time_of_day: NaiveTime,
    /// Canonical IANA name, resolved when the schedule is created or edited.
    pub timezone: String,
    pub repeat: bool,
    pub active: bool,
    #[serde(default)]
    pub roster: RosterDefinition,
    #[serde(default)]
    pub overview: Option<String>,
    /// Set by applying a preset, cleared by any direct roster edit.
    #[serde(default)]
    pub active_preset: Option<String>,
    #[serde(default)]
    pub next_fire_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_fired_at: Option<DateTime<Utc>>,
    /// Why the schedule stopped firing (e.g. its channel disappeared). A
    /// flagged schedule is skipped by the loop until a moderator fixes it.
    #[serde(default)]
    pub attention: Option<String>,
}

impl CompositionSchedule {
    pub fn days_label(&self) -> String {
        if self.days.is_empty() {
            return "Next occurrence".to_string();
        }
        if self.days.len() == 7 {
            return "Every day".to_string();
        }
        self.days
            .iter()
            .map(|day| weekday_name(*day))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A named roster snapshot. Names are unique per guild, ignoring case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub roster: RosterDefinition,
    #[serde(default)]
    pub overview: Option<String>,
    pub saved_by: u64,
    pub saved_at: DateTime<Utc>,
}

/// A live signup message. Holds its own roster copy so later schedule edits
/// never reshuffle signups on a message people already answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostedComposition {
    pub message_id: u64,
    pub channel_id: u64,
    pub schedule_id: u32,
    pub roster: RosterDefinition,
    #[serde(default)]
    pub overview: Option<String>,
    /// Slot index -> user ids in signup order.
    #[serde(default)]
    pub signups: BTreeMap<usize, Vec<u64>>,
    pub posted_at: DateTime<Utc>,
    /// The occurrence this post was made for; `None` for manual posts.
    #[serde(default)]
    pub occurrence: Option<DateTime<Utc>>,
}

/// Everything stored in a guild's `comps.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompState {
    #[serde(default)]
    pub next_schedule_id: u32,
    #[serde(default)]
    pub schedules: Vec<CompositionSchedule>,
    #[serde(default)]
    pub presets: Vec<Preset>,
    #[serde(default)]
    pub posts: Vec<PostedComposition>,
}

impl CompState {
    pub fn schedule(&self, schedule_id: u32) -> Option<&CompositionSchedule> {
        self.schedules.iter().find(|s| s.id == schedule_id)
    }

    pub fn schedule_mut(&mut self, schedule_id: u32) -> Option<&mut CompositionSchedule> {
        self.schedules.iter_mut().find(|s| s.id == schedule_id)
    }

    pub fn schedule_by_name(&self, name: &str) -> Option<&CompositionSchedule> {
        let name = name.trim();
        self.schedules
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn preset(&self, name: &str) -> Option<&Preset> {
        let name = name.trim();
        self.presets.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn post_mut(&mut self, message_id: u64) -> Option<&mut PostedComposition> {
        self.posts.iter_mut().find(|p| p.message_id == message_id)
    }

    pub fn allocate_schedule_id(&mut self) -> u32 {
        self.next_schedule_id += 1;
        self.next_schedule_id
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_counts_and_blank_lines() {
        let roster = RosterDefinition::parse("Firebrand=2\n\n mechanist \nChronomancer=3\nScourge=").unwrap();
        assert_eq!(roster.len(), 4);
        assert_eq!(roster.slots[0].capacity, Some(2));
        assert_eq!(roster.slots[1].class.name(), "Mechanist");
        assert_eq!(roster.slots[1].capacity, None);
        assert_eq!(roster.slots[3].capacity, None);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let text = "Firebrand=2\nMechanist";
        let roster = RosterDefinition::parse(text).unwrap();
        assert_eq!(roster.to_string(), text);
    }

    #[test]
    fn rejects_bad_counts_and_unknown_classes() {
        assert!(matches!(
            RosterDefinition::parse("Firebrand=two"),
            Err(RosterParseError::BadCount { .. })
        ));
        assert!(matches!(
            RosterDefinition::parse("Bard"),
            Err(RosterParseError::UnknownClass(_))
        ));
        assert!(matches!(
            RosterDefinition::parse("Firebrand\nfirebrand=1"),
            Err(RosterParseError::Duplicate(_))
        ));
    }

    #[test]
    fn signups_survive_json_with_integer_keys() {
        let mut signups = BTreeMap::new();
        signups.insert(2usize, vec![10u64, 11]);
        let post = PostedComposition {
            message_id: 1,
            channel_id: 2,
            schedule_id: 3,
            roster: RosterDefinition::parse("Firebrand\nScrapper\nDruid").unwrap(),
            overview: None,
            signups,
            posted_at: Utc::now(),
            occurrence: None,
        };
        let json = serde_json::to_string(&post).unwrap();
        let back: PostedComposition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.signups.get(&2), Some(&vec![10, 11]));
    }
}
