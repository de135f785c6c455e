// Pure display model for a composition post. The Discord layer turns this
// into an embed plus a select menu; nothing here talks to Discord.

use super::comp_models::{weekday_name, CompositionSchedule, PostedComposition};
use crate::core::timezones::discord_timestamp;

pub const SIGNUP_CUSTOM_ID_PREFIX: &str = "gw2tools:comp:signup";
pub const LEAVE_VALUE: &str = "__leave";
const MAX_LISTED: usize = 15;
const EMBED_COLOR: u32 = 0x11806A;

#[derive(Debug, Clone, PartialEq)]
pub struct SlotField {
    pub title: String,
    /// At most fifteen ids; the rest are counted in `overflow`.
    pub listed: Vec<u64>,
    pub overflow: usize,
}

impl SlotField {
    /// Bullet list of names, or a zero-width space for an empty slot.
    pub fn render_value(&self, name_of: impl Fn(u64) -> String) -> String {
        if self.listed.is_empty() {
            return "\u{200b}".to_string();
        }
        let mut lines: Vec<String> = self
            .listed
            .iter()
            .map(|id| format!("• {}", name_of(*id)))
            .collect();
        if self.overflow > 0 {
            lines.push(format!("…and {} more", self.overflow));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectOptionView {
    pub label: String,
    pub value: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositionView {
    pub title: String,
    pub description: String,
    pub overview: Option<String>,
    pub fields: Vec<SlotField>,
    pub footer: String,
    pub color: u32,
    pub custom_id: String,
    pub placeholder: String,
    pub options: Vec<SelectOptionView>,
}

/// What a select-menu value asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Slot(usize),
    Leave,
}

impl CompositionView {
    pub fn build(post: &PostedComposition, schedule: &CompositionSchedule) -> Self {
        let mut description = match schedule.days.as_slice() {
            [] => format!(
                "Scheduled at **{}** {}.",
                schedule.time_of_day.format("%H:%M"),
                schedule.timezone
            ),
            days => format!(
                "Scheduled for **{}** at **{}** {}.",
                days.iter().map(|d| weekday_name(*d)).collect::<Vec<_>>().join(", "),
                schedule.time_of_day.format("%H:%M"),
                schedule.timezone
            ),
        };
        if let Some(occurrence) = post.occurrence {
            description.push_str(&format!("\nThis signup: {}", discord_timestamp(occurrence)));
        }
        description.push_str("\nSelect your class using the dropdown below.");

        let fields = post
            .roster
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let occupants = post.occupants(index);
                let title = match slot.capacity {
                    Some(capacity) => {
                        format!("{} ({}/{})", slot.class.name(), occupants.len(), capacity)
                    }
                    None => format!("{} ({})", slot.class.name(), occupants.len()),
                };
                SlotField {
                    title,
                    listed: occupants.iter().take(MAX_LISTED).copied().collect(),
                    overflow: occupants.len().saturating_sub(MAX_LISTED),
                }
            })
            .collect();

        let mut options: Vec<SelectOptionView> = post
            .roster
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| SelectOptionView {
                label: slot.class.name().to_string(),
                value: index.to_string(),
                description: match slot.capacity {
                    Some(capacity) => format!("{capacity} needed"),
                    None => "Sign up for this class".to_string(),
                },
            })
            .collect();
        options.push(SelectOptionView {
            label: "Leave composition".to_string(),
            value: LEAVE_VALUE.to_string(),
            description: "Remove yourself from your current class".to_string(),
        });

        Self {
            title: format!("Guild Composition Signup: {}", schedule.name),
            description,
            overview: post.overview.clone().filter(|o| !o.trim().is_empty()),
            fields,
            footer: "Pick \"Leave composition\" to remove yourself.".to_string(),
            color: post
                .roster
                .slots
                .first()
                .map(|slot| slot.class.color())
                .unwrap_or(EMBED_COLOR),
            custom_id: signup_custom_id(post.schedule_id),
            placeholder: "Select a class to sign up".to_string(),
            options,
        }
    }
}

pub fn signup_custom_id(schedule_id: u32) -> String {
    format!("{SIGNUP_CUSTOM_ID_PREFIX}:{schedule_id}")
}

/// Schedule id encoded in a signup select's custom id.
pub fn parse_signup_custom_id(custom_id: &str) -> Option<u32> {
    custom_id
        .strip_prefix(SIGNUP_CUSTOM_ID_PREFIX)?
        .strip_prefix(':')?
        .parse()
        .ok()
}

pub fn parse_selection(value: &str) -> Option<Selection> {
    if value == LEAVE_VALUE {
        return Some(Selection::Leave);
    }
    value.parse().ok().map(Selection::Slot)
}
