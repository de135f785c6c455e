use super::comp_models::{CompState, CompositionSchedule, PostedComposition, Preset, RosterDefinition};
use super::comp_poster::{CompPoster, PostError};
use super::comp_store::CompStore;
use super::render::CompositionView;
use super::schedule::{evaluate, next_occurrence, parse_days, parse_time, ScheduleState};
use super::signups::{SignupError, SignupOutcome};
use crate::core::store::{GuildLocks, StoreError};
use crate::core::timezones::resolve_timezone;
use chrono::{DateTime, Utc, Weekday};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

const NAME_MAX_CHARS: usize = 100;
/// Embed field value limit.
const OVERVIEW_MAX_CHARS: usize = 1024;
const AUTOCOMPLETE_LIMIT: usize = 25;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Error)]
pub enum CompError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{class} is already full.")]
    SlotFull { class: String },
    #[error("This composition is no longer accepting signups.")]
    Closed,
    #[error("Channel <#{0}> is unavailable. The schedule is paused until its channel is changed.")]
    ChannelUnavailable(u64),
    #[error("Discord error: {0}")]
    Platform(String),
}

/// Raw moderator input for a new schedule; parsed and validated by the service.
#[derive(Debug, Clone)]
pub struct ScheduleInput {
    pub name: String,
    pub channel_id: u64,
    pub days: String,
    pub time: String,
    pub timezone: String,
    pub repeat: bool,
    pub preset: Option<String>,
}

/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub name: Option<String>,
    pub channel_id: Option<u64>,
    pub days: Option<String>,
    pub time: Option<String>,
    pub timezone: Option<String>,
    pub repeat: Option<bool>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupResult {
    pub outcome: SignupOutcome,
    pub class_name: Option<String>,
}

impl SignupResult {
    /// Ephemeral reply shown to the member who used the dropdown.
    pub fn message(&self) -> String {
        let class = self.class_name.as_deref().unwrap_or("that class");
        match self.outcome {
            SignupOutcome::Joined { .. } => format!("You're signed up as **{class}**."),
            SignupOutcome::Switched { .. } => format!("Switched your signup to **{class}**."),
            SignupOutcome::Unchanged { .. } => format!("You're already signed up as **{class}**."),
            SignupOutcome::Left { .. } => format!("Removed you from **{class}**."),
            SignupOutcome::NotSignedUp => "You weren't signed up for this composition.".to_string(),
        }
    }
}

/// One schedule the tick acted on. Idle schedules are not reported.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub guild_id: u64,
    pub schedule_id: u32,
    pub state: ScheduleState,
    pub failure: Option<String>,
}

/// The composition engine: schedules, presets, posts and signups. All
/// mutations of a guild's composition state run under that guild's lock,
/// including the Discord calls that render the result.
pub struct CompService<S: CompStore, P: CompPoster> {
    store: S,
    poster: P,
    locks: GuildLocks,
    clock: Clock,
}

impl<S: CompStore, P: CompPoster> CompService<S, P> {
    pub fn new(store: S, poster: P) -> Self {
        Self {
            store,
            poster,
            locks: GuildLocks::new(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    // --- posting -----------------------------------------------------------

    /// Post a fresh signup message for the schedule right away. Does not touch
    /// the schedule's timing.
    pub async fn post(&self, guild_id: u64, schedule_id: u32) -> Result<PostedComposition, CompError> {
        let _guard = self.locks.lock(guild_id).await;
        let mut state = self.store.load_state(guild_id).await?;

        let result = self.publish(guild_id, &mut state, schedule_id, None).await;
        if matches!(result, Ok(_) | Err(CompError::ChannelUnavailable(_))) {
            self.store.save_state(guild_id, &state).await?;
        }
        result
    }

    async fn publish(
        &self,
        guild_id: u64,
        state: &mut CompState,
        schedule_id: u32,
        occurrence: Option<DateTime<Utc>>,
    ) -> Result<PostedComposition, CompError> {
        let schedule = state
            .schedule(schedule_id)
            .cloned()
            .ok_or_else(schedule_not_found)?;
        if schedule.roster.is_empty() {
            return Err(CompError::Validation(format!(
                "**{}** has no roster yet. Set one or apply a preset first.",
                schedule.name
            )));
        }

        let mut post = PostedComposition {
            message_id: 0,
            channel_id: schedule.channel_id,
            schedule_id,
            roster: schedule.roster.clone(),
            overview: schedule.overview.clone(),
            signups: BTreeMap::new(),
            posted_at: self.now(),
            occurrence,
        };
        let view = CompositionView::build(&post, &schedule);

        match self.poster.send(schedule.channel_id, &view).await {
            Ok(message_id) => post.message_id = message_id,
            Err(PostError::ChannelUnavailable(channel_id)) => {
                warn!(guild_id, schedule_id, channel_id, "Composition channel unavailable; pausing schedule");
                if let Some(target) = state.schedule_mut(schedule_id) {
                    target.attention = Some(format!("Channel <#{channel_id}> is unavailable."));
                }
                return Err(CompError::ChannelUnavailable(channel_id));
            }
            Err(e) => return Err(CompError::Platform(e.to_string())),
        }

        let (superseded, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.posts)
            .into_iter()
            .partition(|p| p.schedule_id == schedule_id);
        state.posts = kept;
        for previous in superseded {
            self.retire(guild_id, &previous).await;
        }
        state.posts.push(post.clone());

        // A successful post proves the channel works again.
        if let Some(target) = state.schedule_mut(schedule_id) {
            if target.attention.take().is_some() && target.active {
                target.next_fire_at = next_after(target, self.now());
            }
        }

        info!(
            guild_id,
            schedule_id,
            channel_id = post.channel_id,
            message_id = post.message_id,
            "Posted composition"
        );
        Ok(post)
    }

    async fn retire(&self, guild_id: u64, post: &PostedComposition) {
        match self.poster.retire(post.channel_id, post.message_id).await {
            Ok(()) | Err(PostError::MessageUnavailable) | Err(PostError::ChannelUnavailable(_)) => {}
            Err(e) => warn!(
                guild_id,
                message_id = post.message_id,
                error = %e,
                "Failed to strip signup control from superseded composition"
            ),
        }
    }

    // --- signups -----------------------------------------------------------

    pub async fn on_select(
        &self,
        guild_id: u64,
        message_id: u64,
        user_id: u64,
        slot: usize,
    ) -> Result<SignupResult, CompError> {
        self.apply_signup(guild_id, message_id, move |post| post.select_slot(user_id, slot))
            .await
    }

    pub async fn on_deselect(
        &self,
        guild_id: u64,
        message_id: u64,
        user_id: u64,
    ) -> Result<SignupResult, CompError> {
        self.apply_signup(guild_id, message_id, move |post| Ok(post.leave(user_id)))
            .await
    }

    async fn apply_signup<F>(&self, guild_id: u64, message_id: u64, change: F) -> Result<SignupResult, CompError>
    where
        F: FnOnce(&mut PostedComposition) -> Result<SignupOutcome, SignupError> + Send,
    {
        let _guard = self.locks.lock(guild_id).await;
        let mut state = self.store.load_state(guild_id).await?;
        let post = state.post_mut(message_id).ok_or(CompError::Closed)?;

        let outcome = match change(post) {
            Ok(outcome) => outcome,
            Err(SignupError::SlotFull { slot }) => {
                return Err(CompError::SlotFull {
                    class: slot_name(post, slot).unwrap_or_default(),
                })
            }
            Err(e @ SignupError::InvalidSlot { .. }) => return Err(CompError::Validation(e.to_string())),
        };

        let class_name = match outcome {
            SignupOutcome::Joined { slot }
            | SignupOutcome::Switched { to: slot, .. }
            | SignupOutcome::Unchanged { slot }
            | SignupOutcome::Left { slot } => slot_name(post, slot),
            SignupOutcome::NotSignedUp => None,
        };

        if outcome.changed() {
            let post = post.clone();
            self.store.save_state(guild_id, &state).await?;

            match state.schedule(post.schedule_id) {
                Some(schedule) => {
                    let view = CompositionView::build(&post, schedule);
                    if let Err(e) = self.poster.edit(post.channel_id, post.message_id, &view).await {
                        warn!(guild_id, message_id, error = %e, "Failed to refresh composition message");
                    }
                }
                None => warn!(guild_id, message_id, "Composition post has no schedule"),
            }
        }

        Ok(SignupResult { outcome, class_name })
    }

    // --- scheduler ---------------------------------------------------------

    /// One scheduler wake. Posts due occurrences and rolls missed ones
    /// forward. Guild failures are logged and do not stop other guilds.
    /// Guilds run concurrently; each still holds its own lock.
    pub async fn tick(&self, guild_ids: &[u64], now: DateTime<Utc>) -> Vec<TickReport> {
        let results = join_all(
            guild_ids
                .iter()
                .map(|&guild_id| async move { (guild_id, self.tick_guild(guild_id, now).await) }),
        )
        .await;

        let mut reports = Vec::new();
        for (guild_id, result) in results {
            match result {
                Ok(mut guild_reports) => reports.append(&mut guild_reports),
                Err(e) => error!(guild_id, error = %e, "Composition tick failed"),
            }
        }
        reports
    }

    async fn tick_guild(&self, guild_id: u64, now: DateTime<Utc>) -> Result<Vec<TickReport>, CompError> {
        let _guard = self.locks.lock(guild_id).await;
        let mut state = self.store.load_state(guild_id).await?;
        let mut reports = Vec::new();

        let schedule_ids: Vec<u32> = state.schedules.iter().map(|s| s.id).collect();
        for schedule_id in schedule_ids {
            let Some(schedule) = state.schedule(schedule_id) else {
                continue;
            };

            match evaluate(schedule, now) {
                ScheduleState::Idle | ScheduleState::Posted(_) => {}
                ScheduleState::Missed(occurrence) => {
                    info!(guild_id, schedule_id, %occurrence, "Skipping missed composition occurrence");
                    if let Some(target) = state.schedule_mut(schedule_id) {
                        target.next_fire_at = next_after(target, now);
                    }
                    reports.push(TickReport {
                        guild_id,
                        schedule_id,
                        state: ScheduleState::Missed(occurrence),
                        failure: None,
                    });
                }
                ScheduleState::Due(occurrence) => {
                    let result = self
                        .publish(guild_id, &mut state, schedule_id, Some(occurrence))
                        .await;
                    let report = match result {
                        Ok(_) => {
                            if let Some(target) = state.schedule_mut(schedule_id) {
                                target.last_fired_at = Some(occurrence);
                                if target.repeat {
                                    target.next_fire_at = next_after(target, occurrence);
                                } else {
                                    target.active = false;
                                    target.next_fire_at = None;
                                }
                            }
                            TickReport {
                                guild_id,
                                schedule_id,
                                state: ScheduleState::Posted(occurrence),
                                failure: None,
                            }
                        }
                        // The schedule is flagged; it stays paused until fixed.
                        Err(e @ CompError::ChannelUnavailable(_)) => TickReport {
                            guild_id,
                            schedule_id,
                            state: ScheduleState::Due(occurrence),
                            failure: Some(e.to_string()),
                        },
                        Err(e) => {
                            warn!(guild_id, schedule_id, error = %e, "Scheduled composition post failed");
                            if let Some(target) = state.schedule_mut(schedule_id) {
                                target.next_fire_at = next_after(target, occurrence);
                            }
                            TickReport {
                                guild_id,
                                schedule_id,
                                state: ScheduleState::Due(occurrence),
                                failure: Some(e.to_string()),
                            }
                        }
                    };
                    reports.push(report);
                }
            }
        }

        if !reports.is_empty() {
            self.store.save_state(guild_id, &state).await?;
        }
        Ok(reports)
    }

    // --- schedules ---------------------------------------------------------

    pub async fn create_schedule(
        &self,
        guild_id: u64,
        input: ScheduleInput,
    ) -> Result<CompositionSchedule, CompError> {
        let name = clean_name(&input.name, "Schedule")?;
        let days = parse_days(&input.days).map_err(CompError::Validation)?;
        let time_of_day = parse_time(&input.time).map_err(CompError::Validation)?;
        let tz = resolve_timezone(&input.timezone).map_err(|e| CompError::Validation(e.to_string()))?;
        check_days(input.repeat, &days)?;

        let _guard = self.locks.lock(guild_id).await;
        let mut state = self.store.load_state(guild_id).await?;
        if state.schedule_by_name(&name).is_some() {
            return Err(duplicate_schedule(&name));
        }
        let preset = match input.preset.as_deref() {
            Some(preset_name) => Some(
                state
                    .preset(preset_name)
                    .cloned()
                    .ok_or_else(|| preset_not_found(preset_name))?,
            ),
            None => None,
        };

        let mut schedule = CompositionSchedule {
            id: state.allocate_schedule_id(),
            name,
            guild_id,
            channel_id: input.channel_id,
            days,
            time_of_day,
            timezone: tz.name().to_string(),
            repeat: input.repeat,
            active: true,
            roster: RosterDefinition::default(),
            overview: None,
            active_preset: None,
            next_fire_at: None,
            last_fired_at: None,
            attention: None,
        };
        if let Some(preset) = &preset {
            apply_preset_to(&mut schedule, preset);
        }
        schedule.next_fire_at = next_after(&schedule, self.now());

        state.schedules.push(schedule.clone());
        self.store.save_state(guild_id, &state).await?;

        info!(guild_id, schedule_id = schedule.id, name = %schedule.name, "Created composition schedule");
        Ok(schedule)
    }

    /// Changing timing recomputes the next fire time from now. Supplying a
    /// channel also clears any attention flag.
    pub async fn update_schedule(
        &self,
        guild_id: u64,
        schedule_id: u32,
        update: ScheduleUpdate,
    ) -> Result<CompositionSchedule, CompError> {
        let name = update
            .name
            .as_deref()
            .map(|n| clean_name(n, "Schedule"))
            .transpose()?;
        let days = update
            .days
            .as_deref()
            .map(parse_days)
            .transpose()
            .map_err(CompError::Validation)?;
        let time_of_day = update
            .time
            .as_deref()
            .map(parse_time)
            .transpose()
            .map_err(CompError::Validation)?;
        let tz = update
            .timezone
            .as_deref()
            .map(resolve_timezone)
            .transpose()
            .map_err(|e| CompError::Validation(e.to_string()))?;

        self.modify_schedule(guild_id, schedule_id, move |schedule, now| {
            let mut timing_changed = false;
            if let Some(name) = name {
                schedule.name = name;
            }
            if let Some(channel_id) = update.channel_id {
                schedule.channel_id = channel_id;
                schedule.attention = None;
                timing_changed = true;
            }
            if let Some(days) = days {
                schedule.days = days;
                timing_changed = true;
            }
            if let Some(time_of_day) = time_of_day {
                schedule.time_of_day = time_of_day;
                timing_changed = true;
            }
            if let Some(tz) = tz {
                schedule.timezone = tz.name().to_string();
                timing_changed = true;
            }
            if let Some(repeat) = update.repeat {
                schedule.repeat = repeat;
                timing_changed = true;
            }
            if let Some(active) = update.active {
                schedule.active = active;
                timing_changed = true;
            }
            check_days(schedule.repeat, &schedule.days)?;

            if timing_changed {
                schedule.next_fire_at = if schedule.active {
                    next_after(schedule, now)
                } else {
                    None
                };
            }
            Ok(())
        })
        .await
    }

    /// Replace the roster from moderator text. Clears the active preset.
    pub async fn set_roster(
        &self,
        guild_id: u64,
        schedule_id: u32,
        roster_text: &str,
    ) -> Result<CompositionSchedule, CompError> {
        let roster = parse_roster(roster_text)?;
        self.modify_schedule(guild_id, schedule_id, move |schedule, _| {
            schedule.roster = roster;
            schedule.active_preset = None;
            Ok(())
        })
        .await
    }

    /// `None` or blank text removes the overview. Clears the active preset.
    pub async fn set_overview(
        &self,
        guild_id: u64,
        schedule_id: u32,
        overview: Option<String>,
    ) -> Result<CompositionSchedule, CompError> {
        let overview = clean_overview(overview)?;
        self.modify_schedule(guild_id, schedule_id, move |schedule, _| {
            schedule.overview = overview;
            schedule.active_preset = None;
            Ok(())
        })
        .await
    }

    pub async fn clear_attention(&self, guild_id: u64, schedule_id: u32) -> Result<CompositionSchedule, CompError> {
        self.modify_schedule(guild_id, schedule_id, |schedule, now| {
            schedule.attention = None;
            if schedule.active {
                schedule.next_fire_at = next_after(schedule, now);
            }
            Ok(())
        })
        .await
    }

    /// Removes the schedule and retires its live post.
    pub async fn delete_schedule(&self, guild_id: u64, schedule_id: u32) -> Result<CompositionSchedule, CompError> {
        let _guard = self.locks.lock(guild_id).await;
        let mut state = self.store.load_state(guild_id).await?;
        let index = state
            .schedules
            .iter()
            .position(|s| s.id == schedule_id)
            .ok_or_else(schedule_not_found)?;
        let removed = state.schedules.remove(index);

        let (posts, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.posts)
            .into_iter()
            .partition(|p| p.schedule_id == schedule_id);
        state.posts = kept;
        self.store.save_state(guild_id, &state).await?;

        for post in posts {
            self.retire(guild_id, &post).await;
        }
        info!(guild_id, schedule_id, "Deleted composition schedule");
        Ok(removed)
    }

    /// Sorted by name.
    pub async fn list_schedules(&self, guild_id: u64) -> Result<Vec<CompositionSchedule>, CompError> {
        let mut schedules = self.store.load_state(guild_id).await?.schedules;
        schedules.sort_by_key(|s| s.name.to_lowercase());
        Ok(schedules)
    }

    pub async fn schedule_id_by_name(&self, guild_id: u64, name: &str) -> Result<u32, CompError> {
        self.store
            .load_state(guild_id)
            .await?
            .schedule_by_name(name)
            .map(|s| s.id)
            .ok_or_else(schedule_not_found)
    }

    /// Schedule names containing `partial`, for autocomplete.
    pub async fn search_schedules(&self, guild_id: u64, partial: &str) -> Result<Vec<String>, CompError> {
        let names = self
            .list_schedules(guild_id)
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect::<Vec<_>>();
        Ok(filter_names(names, partial))
    }

    async fn modify_schedule<F>(
        &self,
        guild_id: u64,
        schedule_id: u32,
        change: F,
    ) -> Result<CompositionSchedule, CompError>
    where
        F: FnOnce(&mut CompositionSchedule, DateTime<Utc>) -> Result<(), CompError> + Send,
    {
        let _guard = self.locks.lock(guild_id).await;
        let mut state = self.store.load_state(guild_id).await?;
        let index = state
            .schedules
            .iter()
            .position(|s| s.id == schedule_id)
            .ok_or_else(schedule_not_found)?;

        let mut schedule = state.schedules[index].clone();
        change(&mut schedule, self.now())?;
        if state
            .schedules
            .iter()
            .any(|s| s.id != schedule_id && s.name.eq_ignore_ascii_case(&schedule.name))
        {
            return Err(duplicate_schedule(&schedule.name));
        }

        state.schedules[index] = schedule.clone();
        self.store.save_state(guild_id, &state).await?;
        Ok(schedule)
    }

    // --- presets -----------------------------------------------------------

    /// Saves a preset, replacing any existing one whose name matches ignoring
    /// case. The stored name is the one supplied now.
    pub async fn save_preset(
        &self,
        guild_id: u64,
        actor_id: u64,
        name: &str,
        roster_text: &str,
        overview: Option<String>,
    ) -> Result<Preset, CompError> {
        let preset = Preset {
            name: clean_name(name, "Preset")?,
            roster: parse_roster(roster_text)?,
            overview: clean_overview(overview)?,
            saved_by: actor_id,
            saved_at: self.now(),
        };

        let _guard = self.locks.lock(guild_id).await;
        let mut state = self.store.load_state(guild_id).await?;
        store_preset(&mut state, preset.clone());
        self.store.save_state(guild_id, &state).await?;
        Ok(preset)
    }

    /// Snapshot a schedule's current roster and overview as a preset.
    pub async fn save_preset_from_schedule(
        &self,
        guild_id: u64,
        actor_id: u64,
        name: &str,
        schedule_id: u32,
    ) -> Result<Preset, CompError> {
        let name = clean_name(name, "Preset")?;

        let _guard = self.locks.lock(guild_id).await;
        let mut state = self.store.load_state(guild_id).await?;
        let schedule = state.schedule(schedule_id).ok_or_else(schedule_not_found)?;
        if schedule.roster.is_empty() {
            return Err(CompError::Validation(format!(
                "**{}** has no roster to save.",
                schedule.name
            )));
        }
        let preset = Preset {
            name,
            roster: schedule.roster.clone(),
            overview: schedule.overview.clone(),
            saved_by: actor_id,
            saved_at: self.now(),
        };
        store_preset(&mut state, preset.clone());
        self.store.save_state(guild_id, &state).await?;
        Ok(preset)
    }

    pub async fn load_preset(&self, guild_id: u64, name: &str) -> Result<Preset, CompError> {
        self.store
            .load_state(guild_id)
            .await?
            .preset(name)
            .cloned()
            .ok_or_else(|| preset_not_found(name))
    }

    /// Schedules that were following the preset keep their roster but lose
    /// the label.
    pub async fn delete_preset(&self, guild_id: u64, name: &str) -> Result<Preset, CompError> {
        let _guard = self.locks.lock(guild_id).await;
        let mut state = self.store.load_state(guild_id).await?;
        let index = state
            .presets
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| preset_not_found(name))?;
        let removed = state.presets.remove(index);

        for schedule in &mut state.schedules {
            if schedule
                .active_preset
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(&removed.name))
            {
                schedule.active_preset = None;
            }
        }
        self.store.save_state(guild_id, &state).await?;
        Ok(removed)
    }

    /// Sorted by name.
    pub async fn list_presets(&self, guild_id: u64) -> Result<Vec<Preset>, CompError> {
        let mut presets = self.store.load_state(guild_id).await?.presets;
        presets.sort_by_key(|p| p.name.to_lowercase());
        Ok(presets)
    }

    pub async fn search_presets(&self, guild_id: u64, partial: &str) -> Result<Vec<String>, CompError> {
        let names = self
            .list_presets(guild_id)
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect::<Vec<_>>();
        Ok(filter_names(names, partial))
    }

    /// Copy a preset's roster and overview onto a schedule.
    pub async fn apply_preset(
        &self,
        guild_id: u64,
        schedule_id: u32,
        name: &str,
    ) -> Result<CompositionSchedule, CompError> {
        let _guard = self.locks.lock(guild_id).await;
        let mut state = self.store.load_state(guild_id).await?;
        let preset = state.preset(name).cloned().ok_or_else(|| preset_not_found(name))?;
        let schedule = state.schedule_mut(schedule_id).ok_or_else(schedule_not_found)?;
        apply_preset_to(schedule, &preset);
        let updated = schedule.clone();

        self.store.save_state(guild_id, &state).await?;
        Ok(updated)
    }
}

fn apply_preset_to(schedule: &mut CompositionSchedule, preset: &Preset) {
    schedule.roster = preset.roster.clone();
    schedule.overview = preset.overview.clone();
    schedule.active_preset = Some(preset.name.clone());
}

fn store_preset(state: &mut CompState, preset: Preset) {
    match state
        .presets
        .iter_mut()
        .find(|p| p.name.eq_ignore_ascii_case(&preset.name))
    {
        Some(existing) => *existing = preset,
        None => state.presets.push(preset),
    }
}

/// Next occurrence strictly after `after`, or `None` if the stored timezone
/// no longer resolves.
fn next_after(schedule: &CompositionSchedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match resolve_timezone(&schedule.timezone) {
        Ok(tz) => next_occurrence(&schedule.days, schedule.time_of_day, tz, after),
        Err(e) => {
            warn!(schedule_id = schedule.id, error = %e, "Stored schedule timezone no longer resolves");
            None
        }
    }
}

fn slot_name(post: &PostedComposition, slot: usize) -> Option<String> {
    post.roster.slots.get(slot).map(|s| s.class.name().to_string())
}

fn check_days(repeat: bool, days: &[Weekday]) -> Result<(), CompError> {
    if repeat && days.is_empty() {
        return Err(CompError::Validation(
            "Repeating schedules need at least one day.".to_string(),
        ));
    }
    Ok(())
}

fn parse_roster(text: &str) -> Result<RosterDefinition, CompError> {
    let roster = RosterDefinition::parse(text).map_err(|e| CompError::Validation(e.to_string()))?;
    if roster.is_empty() {
        return Err(CompError::Validation(
            "List at least one class, one per line (e.g. `Firebrand=2`).".to_string(),
        ));
    }
    Ok(roster)
}

fn clean_name(raw: &str, what: &str) -> Result<String, CompError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(CompError::Validation(format!("{what} name cannot be empty.")));
    }
    if name.chars().count() > NAME_MAX_CHARS {
        return Err(CompError::Validation(format!(
            "{what} name must be at most {NAME_MAX_CHARS} characters."
        )));
    }
    Ok(name.to_string())
}

fn clean_overview(overview: Option<String>) -> Result<Option<String>, CompError> {
    let Some(text) = overview.map(|o| o.trim().to_string()).filter(|o| !o.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > OVERVIEW_MAX_CHARS {
        return Err(CompError::Validation(format!(
            "Overview must be at most {OVERVIEW_MAX_CHARS} characters."
        )));
    }
    Ok(Some(text))
}

fn filter_names(names: Vec<String>, partial: &str) -> Vec<String> {
    let needle = partial.to_lowercase();
    names
        .into_iter()
        .filter(|n| n.to_lowercase().contains(&needle))
        .take(AUTOCOMPLETE_LIMIT)
        .collect()
}

fn schedule_not_found() -> CompError {
    CompError::NotFound("No composition schedule with that name.".to_string())
}

fn preset_not_found(name: &str) -> CompError {
    CompError::NotFound(format!("No preset named **{}**.", name.trim()))
}

fn duplicate_schedule(name: &str) -> CompError {
    CompError::Validation(format!("A schedule named **{name}** already exists."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::America::Los_Angeles;
    use dashmap::DashMap;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Clone, Default)]
    struct MockCompStore {
        states: Arc<DashMap<u64, CompState>>,
    }

    #[async_trait]
    impl CompStore for MockCompStore {
        async fn load_state(&self, guild_id: u64) -> Result<CompState, StoreError> {
            // Give concurrent callers a chance to interleave.
            tokio::task::yield_now().await;
            Ok(self
                .states
                .get(&guild_id)
                .map(|s| s.clone())
                .unwrap_or_default())
        }

        async fn save_state(&self, guild_id: u64, state: &CompState) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.states.insert(guild_id, state.clone());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MockPoster {
        sent: Arc<Mutex<Vec<(u64, u64)>>>,
        edits: Arc<Mutex<Vec<(u64, CompositionView)>>>,
        retired: Arc<Mutex<Vec<u64>>>,
        unavailable: Arc<Mutex<HashSet<u64>>>,
        next_id: Arc<AtomicU64>,
        /// (held channel, releasing channel): sends to the first wait until
        /// something is sent to the second.
        gate: Arc<Mutex<Option<(u64, u64, Arc<Notify>)>>>,
    }

    #[async_trait]
    impl CompPoster for MockPoster {
        async fn send(&self, channel_id: u64, _view: &CompositionView) -> Result<u64, PostError> {
            if self.unavailable.lock().unwrap().contains(&channel_id) {
                return Err(PostError::ChannelUnavailable(channel_id));
            }
            let gate = self.gate.lock().unwrap().clone();
            if let Some((held, release, notify)) = gate {
                if channel_id == held {
                    notify.notified().await;
                } else if channel_id == release {
                    notify.notify_one();
                }
            }
            let message_id = 100 + self.next_id.fetch_add(1, Ordering::SeqCst);
            self.sent.lock().unwrap().push((channel_id, message_id));
            Ok(message_id)
        }

        async fn edit(&self, _channel_id: u64, message_id: u64, view: &CompositionView) -> Result<(), PostError> {
            self.edits.lock().unwrap().push((message_id, view.clone()));
            Ok(())
        }

        async fn retire(&self, _channel_id: u64, message_id: u64) -> Result<(), PostError> {
            self.retired.lock().unwrap().push(message_id);
            Ok(())
        }
    }

    const GUILD: u64 = 1;

    fn la(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Los_Angeles
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn service(now: DateTime<Utc>) -> (CompService<MockCompStore, MockPoster>, MockCompStore, MockPoster) {
        let store = MockCompStore::default();
        let poster = MockPoster::default();
        let service =
            CompService::new(store.clone(), poster.clone()).with_clock(Arc::new(move || now));
        (service, store, poster)
    }

    fn input(name: &str, days: &str, repeat: bool) -> ScheduleInput {
        ScheduleInput {
            name: name.to_string(),
            channel_id: 50,
            days: days.to_string(),
            time: "20:00".to_string(),
            timezone: "PT".to_string(),
            repeat,
            preset: None,
        }
    }

    async fn raid_night(service: &CompService<MockCompStore, MockPoster>, roster: &str) -> CompositionSchedule {
        let schedule = service
            .create_schedule(GUILD, input("Raid Night", "Friday", true))
            .await
            .unwrap();
        service.set_roster(GUILD, schedule.id, roster).await.unwrap()
    }

    #[tokio::test]
    async fn friday_schedule_goes_idle_due_posted() {
        let (service, _, poster) = service(la(2024, 5, 1, 12, 0));
        let schedule = raid_night(&service, "Firebrand=1\nMechanist").await;
        let fire = la(2024, 5, 3, 20, 0);

        assert_eq!(schedule.timezone, "America/Los_Angeles");
        assert_eq!(schedule.next_fire_at, Some(fire));

        assert!(service.tick(&[GUILD], la(2024, 5, 3, 19, 59)).await.is_empty());

        let stored = service.list_schedules(GUILD).await.unwrap().remove(0);
        assert_eq!(evaluate(&stored, fire), ScheduleState::Due(fire));

        let reports = service.tick(&[GUILD], fire).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].state, ScheduleState::Posted(fire));
        assert_eq!(poster.sent.lock().unwrap().as_slice(), &[(50, 100)]);

        let after = service.list_schedules(GUILD).await.unwrap().remove(0);
        assert_eq!(after.last_fired_at, Some(fire));
        assert_eq!(after.next_fire_at, Some(la(2024, 5, 10, 20, 0)));
        assert!(after.active);

        // A second wake in the same window does nothing.
        assert!(service.tick(&[GUILD], la(2024, 5, 3, 20, 1)).await.is_empty());
    }

    #[tokio::test]
    async fn slow_guild_does_not_hold_up_other_guilds() {
        let (service, _, poster) = service(la(2024, 5, 1, 12, 0));
        raid_night(&service, "Firebrand").await;
        let mut other = input("Raid Night", "Friday", true);
        other.channel_id = 60;
        let schedule = service.create_schedule(2, other).await.unwrap();
        service.set_roster(2, schedule.id, "Druid").await.unwrap();

        // Guild 1's send only completes once guild 2 has posted.
        *poster.gate.lock().unwrap() = Some((50, 60, Arc::new(Notify::new())));

        let fire = la(2024, 5, 3, 20, 0);
        let reports = tokio::time::timeout(Duration::from_secs(5), service.tick(&[GUILD, 2], fire))
            .await
            .expect("guild 1 blocked guild 2");
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.state == ScheduleState::Posted(fire)));

        let channels: Vec<u64> = poster.sent.lock().unwrap().iter().map(|(c, _)| *c).collect();
        assert_eq!(channels, vec![60, 50]);
    }

    #[tokio::test]
    async fn missed_occurrence_rolls_forward_without_posting() {
        let (service, _, poster) = service(la(2024, 5, 1, 12, 0));
        raid_night(&service, "Firebrand").await;

        let reports = service.tick(&[GUILD], la(2024, 5, 3, 20, 10)).await;
        assert_eq!(reports[0].state, ScheduleState::Missed(la(2024, 5, 3, 20, 0)));
        assert!(poster.sent.lock().unwrap().is_empty());

        let after = service.list_schedules(GUILD).await.unwrap().remove(0);
        assert_eq!(after.next_fire_at, Some(la(2024, 5, 10, 20, 0)));
    }

    #[tokio::test]
    async fn one_off_schedule_deactivates_after_posting() {
        let (service, _, _) = service(la(2024, 5, 1, 12, 0));
        let schedule = service
            .create_schedule(GUILD, input("Guild Mission", "", false))
            .await
            .unwrap();
        service.set_roster(GUILD, schedule.id, "Druid").await.unwrap();
        let fire = la(2024, 5, 1, 20, 0);
        assert_eq!(schedule.next_fire_at, Some(fire));

        service.tick(&[GUILD], fire).await;
        let after = service.list_schedules(GUILD).await.unwrap().remove(0);
        assert!(!after.active);
        assert_eq!(after.next_fire_at, None);
    }

    #[tokio::test]
    async fn repeating_schedule_needs_days() {
        let (service, _, _) = service(la(2024, 5, 1, 12, 0));
        let err = service
            .create_schedule(GUILD, input("Raid", "", true))
            .await
            .unwrap_err();
        assert!(matches!(err, CompError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_timezone_is_rejected_at_create() {
        let (service, _, _) = service(la(2024, 5, 1, 12, 0));
        let mut bad = input("Raid", "fri", true);
        bad.timezone = "Mars/Base".to_string();
        assert!(matches!(
            service.create_schedule(GUILD, bad).await,
            Err(CompError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unavailable_channel_flags_until_channel_changes() {
        let (service, _, poster) = service(la(2024, 5, 1, 12, 0));
        let schedule = raid_night(&service, "Firebrand").await;
        poster.unavailable.lock().unwrap().insert(50);

        let fire = la(2024, 5, 3, 20, 0);
        let reports = service.tick(&[GUILD], fire).await;
        assert!(reports[0].failure.is_some());

        let flagged = service.list_schedules(GUILD).await.unwrap().remove(0);
        assert!(flagged.attention.is_some());
        assert!(service.tick(&[GUILD], la(2024, 5, 3, 20, 1)).await.is_empty());

        let fixed = service
            .update_schedule(
                GUILD,
                schedule.id,
                ScheduleUpdate {
                    channel_id: Some(60),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(fixed.attention.is_none());
        assert_eq!(fixed.channel_id, 60);
        assert!(fixed.next_fire_at.is_some());
    }

    #[tokio::test]
    async fn new_post_supersedes_previous_one() {
        let (service, store, poster) = service(la(2024, 5, 1, 12, 0));
        let schedule = raid_night(&service, "Firebrand").await;

        let first = service.post(GUILD, schedule.id).await.unwrap();
        let second = service.post(GUILD, schedule.id).await.unwrap();

        assert_eq!(poster.retired.lock().unwrap().as_slice(), &[first.message_id]);
        let state = store.states.get(&GUILD).unwrap().clone();
        assert_eq!(state.posts.len(), 1);
        assert_eq!(state.posts[0].message_id, second.message_id);

        assert!(matches!(
            service.on_select(GUILD, first.message_id, 7, 0).await,
            Err(CompError::Closed)
        ));
    }

    #[tokio::test]
    async fn manual_post_leaves_timing_alone() {
        let (service, _, _) = service(la(2024, 5, 1, 12, 0));
        let schedule = raid_night(&service, "Firebrand").await;
        service.post(GUILD, schedule.id).await.unwrap();

        let after = service.list_schedules(GUILD).await.unwrap().remove(0);
        assert_eq!(after.next_fire_at, schedule.next_fire_at);
        assert_eq!(after.last_fired_at, None);
    }

    #[tokio::test]
    async fn post_without_roster_is_rejected() {
        let (service, _, _) = service(la(2024, 5, 1, 12, 0));
        let schedule = service
            .create_schedule(GUILD, input("Raid", "fri", true))
            .await
            .unwrap();
        assert!(matches!(
            service.post(GUILD, schedule.id).await,
            Err(CompError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn select_persists_and_edits_message() {
        let (service, store, poster) = service(la(2024, 5, 1, 12, 0));
        let schedule = raid_night(&service, "Firebrand=2\nMechanist").await;
        let post = service.post(GUILD, schedule.id).await.unwrap();

        let result = service.on_select(GUILD, post.message_id, 7, 1).await.unwrap();
        assert_eq!(result.outcome, SignupOutcome::Joined { slot: 1 });
        assert_eq!(result.message(), "You're signed up as **Mechanist**.");

        let state = store.states.get(&GUILD).unwrap().clone();
        assert_eq!(state.posts[0].occupants(1), &[7]);

        let edits = poster.edits.lock().unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].1.fields[1].title, "Mechanist (1)");
    }

    #[tokio::test]
    async fn reselect_and_stray_leave_do_not_edit() {
        let (service, _, poster) = service(la(2024, 5, 1, 12, 0));
        let schedule = raid_night(&service, "Firebrand").await;
        let post = service.post(GUILD, schedule.id).await.unwrap();

        let left = service.on_deselect(GUILD, post.message_id, 7).await.unwrap();
        assert_eq!(left.outcome, SignupOutcome::NotSignedUp);

        service.on_select(GUILD, post.message_id, 7, 0).await.unwrap();
        let again = service.on_select(GUILD, post.message_id, 7, 0).await.unwrap();
        assert_eq!(again.outcome, SignupOutcome::Unchanged { slot: 0 });
        assert_eq!(poster.edits.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_selects_fill_single_slot_once() {
        let (service, store, _) = service(la(2024, 5, 1, 12, 0));
        let schedule = raid_night(&service, "Firebrand=1\nMechanist").await;
        let message_id = service.post(GUILD, schedule.id).await.unwrap().message_id;

        let service = Arc::new(service);
        let handles: Vec<_> = [10u64, 11]
            .into_iter()
            .map(|user| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.on_select(GUILD, message_id, user, 0).await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(CompError::SlotFull { .. })))
                .count(),
            1
        );
        let state = store.states.get(&GUILD).unwrap().clone();
        assert_eq!(state.posts[0].occupants(0).len(), 1);
    }

    #[tokio::test]
    async fn preset_save_overwrites_ignoring_case() {
        let (service, _, _) = service(la(2024, 5, 1, 12, 0));
        service
            .save_preset(GUILD, 9, "Raid Night", "Firebrand", None)
            .await
            .unwrap();
        service
            .save_preset(GUILD, 9, "raid night", "Scrapper=2", Some("Stack on tag".into()))
            .await
            .unwrap();

        let presets = service.list_presets(GUILD).await.unwrap();
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0].name, "raid night");
        assert_eq!(presets[0].roster.to_string(), "Scrapper=2");

        let loaded = service.load_preset(GUILD, "RAID NIGHT").await.unwrap();
        assert_eq!(loaded.overview.as_deref(), Some("Stack on tag"));
        assert!(matches!(
            service.load_preset(GUILD, "missing").await,
            Err(CompError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn applied_preset_is_cleared_by_roster_edit() {
        let (service, _, _) = service(la(2024, 5, 1, 12, 0));
        let schedule = raid_night(&service, "Firebrand").await;
        service
            .save_preset(GUILD, 9, "Strike", "Chronomancer=1\nDruid=1", Some("Boons".into()))
            .await
            .unwrap();

        let applied = service.apply_preset(GUILD, schedule.id, "strike").await.unwrap();
        assert_eq!(applied.active_preset.as_deref(), Some("Strike"));
        assert_eq!(applied.roster.len(), 2);
        assert_eq!(applied.overview.as_deref(), Some("Boons"));

        let edited = service.set_roster(GUILD, schedule.id, "Mechanist").await.unwrap();
        assert_eq!(edited.active_preset, None);
        // The preset itself is untouched.
        assert_eq!(service.load_preset(GUILD, "Strike").await.unwrap().roster.len(), 2);
    }

    #[tokio::test]
    async fn delete_schedule_retires_its_post() {
        let (service, store, poster) = service(la(2024, 5, 1, 12, 0));
        let schedule = raid_night(&service, "Firebrand").await;
        let post = service.post(GUILD, schedule.id).await.unwrap();

        service.delete_schedule(GUILD, schedule.id).await.unwrap();
        let state = store.states.get(&GUILD).unwrap().clone();
        assert!(state.schedules.is_empty());
        assert!(state.posts.is_empty());
        assert_eq!(poster.retired.lock().unwrap().as_slice(), &[post.message_id]);
    }

    #[tokio::test]
    async fn schedule_names_are_unique() {
        let (service, _, _) = service(la(2024, 5, 1, 12, 0));
        raid_night(&service, "Firebrand").await;
        assert!(matches!(
            service.create_schedule(GUILD, input("raid night", "sat", true)).await,
            Err(CompError::Validation(_))
        ));
        assert_eq!(
            service.schedule_id_by_name(GUILD, "RAID NIGHT").await.unwrap(),
            1
        );
    }
}
