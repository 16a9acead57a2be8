use chrono::Utc;
use clap::Subcommand;
use waypoint_core::{
    Config, Database, DeliveryScheduler, MuteDuration, NotificationPayload, SnoozeDuration,
};

use super::ConsoleSender;

#[derive(Subcommand)]
pub enum NotifyAction {
    /// Deliver a notification (prints to stdout as the push target)
    Send {
        /// Notification id
        #[arg(long)]
        notification_id: String,
        /// Owning task id
        #[arg(long)]
        task_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        /// Qualified geofence event this notification came from
        #[arg(long)]
        event_id: Option<String>,
    },
    /// Snooze a notification (15m, 1h, today, custom:N)
    Snooze {
        #[arg(long)]
        task_id: String,
        #[arg(long)]
        notification_id: String,
        duration: String,
    },
    /// Extend an active snooze
    ExtendSnooze {
        #[arg(long)]
        notification_id: String,
        duration: String,
    },
    /// Cancel an active snooze
    CancelSnooze {
        #[arg(long)]
        notification_id: String,
    },
    /// Mute a task (1h, 4h, 8h, 24h, until-tomorrow, permanent)
    Mute {
        #[arg(long)]
        task_id: String,
        duration: String,
    },
    /// Cancel the active mute on a task
    CancelMute {
        #[arg(long)]
        task_id: String,
    },
    /// List retry records, newest first
    Retries {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: NotifyAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let config = Config::load()?;
    let scheduler = DeliveryScheduler::new(config.retry);
    let now = Utc::now();

    match action {
        NotifyAction::Send {
            notification_id,
            task_id,
            title,
            body,
            event_id,
        } => {
            let payload = NotificationPayload {
                title,
                body,
                event_id,
            };
            let (outcome, events) =
                scheduler.deliver(&db, &ConsoleSender, &notification_id, &task_id, &payload, now)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        NotifyAction::Snooze {
            task_id,
            notification_id,
            duration,
        } => {
            let duration = SnoozeDuration::parse_token(&duration)
                .ok_or_else(|| format!("unknown snooze duration: {duration}"))?;
            let (snooze, event) =
                scheduler.snooze(&db, &task_id, &notification_id, duration, now)?;
            println!("{}", serde_json::to_string_pretty(&snooze)?);
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        NotifyAction::ExtendSnooze {
            notification_id,
            duration,
        } => {
            let duration = SnoozeDuration::parse_token(&duration)
                .ok_or_else(|| format!("unknown snooze duration: {duration}"))?;
            let (snooze, event) = scheduler.extend_snooze(&db, &notification_id, duration, now)?;
            println!("{}", serde_json::to_string_pretty(&snooze)?);
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        NotifyAction::CancelSnooze { notification_id } => {
            let event = scheduler.cancel_snooze(&db, &notification_id, now)?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        NotifyAction::Mute { task_id, duration } => {
            let duration = MuteDuration::parse_token(&duration)
                .ok_or_else(|| format!("unknown mute duration: {duration}"))?;
            let (mute, event) = scheduler.mute(&db, &task_id, duration, now)?;
            println!("{}", serde_json::to_string_pretty(&mute)?);
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        NotifyAction::CancelMute { task_id } => {
            let event = scheduler.cancel_mute(&db, &task_id, now)?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        NotifyAction::Retries { limit } => {
            let retries = db.list_retries(limit)?;
            println!("{}", serde_json::to_string_pretty(&retries)?);
        }
    }
    Ok(())
}
