//! convoy-alert — debounced service availability alerts.
//!
//! # Architecture
//!
//! ```text
//! machine::evaluate(alerts, service, ready, policy, now)
//!   ├── first sight → baseline record, no notification
//!   ├── desired ↑   → open startup-grace suppression
//!   ├── desired = 0 → SCALED, suppression cleared
//!   ├── status change → pending → (confirm window) → commit → attempt
//!   └── suppression expired, still DOWN → one forced DOWN
//!        │
//!        ▼ Vec<Notification>
//! delivery::dispatch(snapshot, &dyn Notifier, notifications)
//!   ├── "Service UP|DOWN" event
//!   ├── Notifier::send (WebhookNotifier | DisabledNotifier)
//!   └── failure → WARN event
//! ```
//!
//! Attempts are dropped while suppressed; non-forced attempts are also
//! dropped inside the cooldown window or when the status was already the
//! last one notified. Only UP and DOWN are ever notified.

pub mod delivery;
pub mod error;
pub mod machine;
pub mod message;
pub mod notifier;

pub use delivery::{dispatch, notification_event};
pub use error::{NotifyError, NotifyResult};
pub use machine::{AlertPolicy, Notification, evaluate};
pub use message::{AlertMessage, format_duration, format_timestamp, render};
pub use notifier::{
    Delivery, DisabledNotifier, Notifier, NotifierCache, NotifierConfig, WebhookNotifier,
    build_notifier,
};
