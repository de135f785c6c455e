use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;
use std::collections::HashMap;

const CATEGORY_ORDER: &[&str] = &[
    "Compositions",
    "Builds",
    "Accounts",
    "Feeds",
    "Server Setup",
    "Utilities",
];

fn get_category_emoji(category: &str) -> &'static str {
    match category {
        "Compositions" => "⚔️",
        "Builds" => "🛠️",
        "Accounts" => "🔑",
        "Feeds" => "📰",
        "Server Setup" => "⚙️",
        "Utilities" => "🧰",
        _ => "•",
    }
}

struct CommandMetadata {
    category: &'static str,
    priority: i32,
    description: Option<&'static str>,
    note: Option<&'static str>,
}

fn get_command_metadata(name: &str) -> CommandMetadata {
    match name {
        "comp" => CommandMetadata {
            category: "Compositions",
            priority: 100,
            description: Some("Schedule squad composition signups and manage roster presets."),
            note: Some("Groups: schedule (create, edit, roster, post_now...), preset (save, apply...)"),
        },
        "builds" => CommandMetadata {
            category: "Builds",
            priority: 90,
            description: Some("Browse the server's builds, or share a new one."),
            note: Some("Subcommands: list, show, add, edit, delete"),
        },
        "apikey" => CommandMetadata {
            category: "Accounts",
            priority: 80,
            description: Some("Link your GW2 account with an API key. Replies are private."),
            note: Some("Subcommands: add, list, refresh, remove"),
        },
        "rss" => CommandMetadata {
            category: "Feeds",
            priority: 70,
            description: Some("Post new entries from RSS or Atom feeds to a channel."),
            note: Some("Subcommands: set, delete, list"),
        },
        "update_notes" => CommandMetadata {
            category: "Feeds",
            priority: 60,
            description: Some("Game update notes are posted automatically to the configured channel."),
            note: None,
        },
        "config" => CommandMetadata {
            category: "Server Setup",
            priority: 50,
            description: Some("Moderator roles and the build, update notes and audit channels."),
            note: None,
        },
        "audit" => CommandMetadata {
            category: "Server Setup",
            priority: 40,
            description: Some("Browse the audit log and set up GW2 guild log syncing."),
            note: Some("Subcommands: recent, query, gw2_query, gw2_key, gw2_guild"),
        },
        _ => CommandMetadata {
            category: "Utilities",
            priority: 0,
            description: None,
            note: None,
        },
    }
}

/// Show a categorized list of commands.
#[poise::command(slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let mut categories: HashMap<&str, Vec<(i32, String)>> = HashMap::new();

    for command in &ctx.framework().options().commands {
        if command.hide_in_help || command.name == "help" {
            continue;
        }

        let metadata = get_command_metadata(&command.name);
        let description = metadata
            .description
            .or(command.description.as_deref())
            .or(command.help_text.as_deref())
            .unwrap_or("No description provided.");

        let mut entry = format!("• **/{0}**: {1}", command.name, description);
        if let Some(note) = metadata.note {
            entry.push_str(&format!("\n  ⤷ {}", note));
        }

        categories
            .entry(metadata.category)
            .or_default()
            .push((metadata.priority, entry));
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("GW2 Tools Command Guide")
        .description(
            "Use slash commands with `/`. Commands that change server settings need \
            Administrator or a moderator role set with `/config moderator_add`.",
        )
        .color(serenity::Colour::from_rgb(192, 57, 43))
        .timestamp(serenity::Timestamp::now());

    if let Ok(user) = ctx.framework().bot_id.to_user(&ctx).await {
        embed = embed.thumbnail(user.face());
    }

    let mut sorted_categories: Vec<_> = categories.keys().cloned().collect();
    sorted_categories.sort_by(|a, b| {
        let pos_a = CATEGORY_ORDER.iter().position(|&x| x == *a).unwrap_or(999);
        let pos_b = CATEGORY_ORDER.iter().position(|&x| x == *b).unwrap_or(999);
        pos_a.cmp(&pos_b).then(a.cmp(b))
    });

    for category in sorted_categories {
        if let Some(entries) = categories.get_mut(category) {
            // Priority descending, then name.
            entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            let title = format!("{} {}", get_category_emoji(category), category);
            let formatted_entries: Vec<String> = entries.iter().map(|(_, s)| s.clone()).collect();

            for (i, chunk) in chunk_entries(&formatted_entries).iter().enumerate() {
                let field_name = if i == 0 {
                    title.clone()
                } else {
                    format!("{} (cont.)", title)
                };
                embed = embed.field(field_name, chunk.join("\n"), false);
            }
        }
    }

    embed = embed.footer(serenity::CreateEmbedFooter::new(
        "Need a hand? Ping a moderator.",
    ));

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;

    Ok(())
}

fn chunk_entries(entries: &[String]) -> Vec<Vec<String>> {
    let mut chunks = Vec::new();
    let mut current_chunk = Vec::new();
    let mut current_length = 0;

    for entry in entries {
        let entry_len = entry.chars().count();
        // Field values cap at 1024 characters.
        if current_length + entry_len + 1 > 1000 && !current_chunk.is_empty() {
            chunks.push(current_chunk);
            current_chunk = Vec::new();
            current_length = 0;
        }

        current_chunk.push(entry.clone());
        current_length += entry_len + 1;
    }

    if !current_chunk.is_empty() {
        chunks.push(current_chunk);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_stay_under_field_limit() {
        let entries: Vec<String> = (0..30).map(|i| format!("{i:03} {}", "x".repeat(96))).collect();
        let chunks = chunk_entries(&entries);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.join("\n").chars().count() <= 1024);
        }
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), 30);
    }

    #[test]
    fn unknown_commands_fall_into_utilities() {
        let metadata = get_command_metadata("something_else");
        assert_eq!(metadata.category, "Utilities");
        assert!(metadata.description.is_none());
    }
}
