// Bot presence. Discord-layer glue only.

use poise::serenity_prelude as serenity;

pub fn reset_status(ctx: &serenity::Context) {
    let activity = serenity::ActivityData::playing("Guild Wars 2");
    ctx.set_presence(Some(activity), serenity::OnlineStatus::Online);
}

pub fn on_ready(ctx: &serenity::Context) {
    reset_status(ctx);
}
