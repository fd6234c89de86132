//! Remote control over MQTT: topics, discovery, command parsing and application.

pub mod command;
pub mod discovery;
pub mod handler;
pub mod topics;

pub use command::Command;
pub use discovery::{announcements, Announcement};
pub use handler::{apply, reading_updates, retained_state, StateUpdate};
pub use topics::{CommandTopic, StateTopic, Topics};
