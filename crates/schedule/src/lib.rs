pub mod activity;
pub mod error;
pub mod keys;
pub mod notify;
pub mod timeline;
pub mod worker;

pub use activity::{Activity, ActivityEvent, ActivityKind, Recurring, RecurringSpan, MAX_DURATION};
pub use error::{ActivityError, TimelineError};
pub use notify::{Notification, NotificationKind, NotificationType};
pub use timeline::Timeline;
pub use worker::ScheduleWorker;
