//! Birthday reminders — a periodic sweep over subscriptions.

use std::sync::Arc;

use chrono::{Datelike, Days, Local, NaiveDate};
use tokio::task::JoinHandle;

use crate::channels::{Channel, OutgoingResponse};
use crate::config::ReminderConfig;
use crate::error::DatabaseError;
use crate::models::ReminderTarget;
use crate::store::IdentityStore;

/// Sends "birthday coming up" messages to subscribers.
pub struct ReminderService {
    store: Arc<dyn IdentityStore>,
    channel: Arc<dyn Channel>,
    config: ReminderConfig,
}

impl ReminderService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        channel: Arc<dyn Channel>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            store,
            channel,
            config,
        }
    }

    /// Start the periodic sweep. The first sweep runs immediately.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            loop {
                interval.tick().await;
                let today = Local::now().date_naive();
                match self.run_once(today).await {
                    Ok(sent) => tracing::info!(sent, %today, "Birthday reminder sweep done"),
                    Err(e) => tracing::error!(error = %e, "Birthday reminder sweep failed"),
                }
            }
        })
    }

    /// Remind every subscriber on this channel whose target's birthday is
    /// exactly `days_before` days after `today`. Returns how many were sent.
    pub async fn run_once(&self, today: NaiveDate) -> Result<usize, DatabaseError> {
        let Some(due_date) = today.checked_add_days(Days::new(u64::from(self.config.days_before)))
        else {
            return Ok(0);
        };

        let targets = self.store.reminder_targets().await?;
        let mut sent = 0;

        for ReminderTarget { subscriber, target } in targets {
            if subscriber.channel != self.channel.name() {
                continue;
            }
            if next_birthday(target.birth_date, today) != Some(due_date) {
                continue;
            }

            let text = format!(
                "🎂 {} has a birthday on {} (in {} days)!",
                target.display_name(),
                due_date.format("%d.%m"),
                self.config.days_before
            );
            match self
                .channel
                .send_to(subscriber.chat_id, OutgoingResponse::text(text))
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(
                    chat_id = subscriber.chat_id,
                    target_id = target.id,
                    error = %e,
                    "Failed to send birthday reminder"
                ),
            }
        }

        Ok(sent)
    }
}

/// The birthday's date in `year`. 29 February falls on 28 February in
/// non-leap years.
fn birthday_in(birth: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, birth.month(), birth.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, birth.month(), birth.day() - 1))
}

/// First birthday on or after `today`.
pub fn next_birthday(birth: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    let this_year = birthday_in(birth, today.year())?;
    if this_year >= today {
        Some(this_year)
    } else {
        birthday_in(birth, today.year() + 1)
    }
}
