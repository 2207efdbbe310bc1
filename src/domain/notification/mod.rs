//! Admin notifications
//!
//! Events the service reports to administrators, and the sink trait that
//! delivers them. Delivery is best effort: a failing sink never fails the
//! operation that produced the event.

mod event;
mod format;
mod sink;

pub use event::{Audience, Notification, NotificationAction, MAX_CALLBACK_DATA_BYTES};
pub use format::escape_html;
pub use sink::NotificationSink;

#[cfg(test)]
pub use sink::mock;
