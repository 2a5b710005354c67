//! Canonical event topic constants shared by the supervisor services.
//!
//! Every event published on the bus uses one of these names so the GUI shell
//! and the services agree on what they subscribe to. Keep this list
//! alphabetized within sections and favor dot.case names.

// Settings
pub const TOPIC_GAME_SETTINGS_UPDATED: &str = "settings.game.updated";
pub const TOPIC_GENERAL_SETTINGS_UPDATED: &str = "settings.general.updated";
pub const TOPIC_SERVER_ADDRESS_CHANGED: &str = "settings.server_address.changed";

// Task lifecycle
pub const TOPIC_LOG_MESSAGE: &str = "task.log.message";
pub const TOPIC_TASK_STOPPED: &str = "task.stopped";
pub const TOPIC_WRITE_SUMMARY_TO_LOG: &str = "task.summary.write";

// Updates
pub const TOPIC_DOWNLOAD_PROGRESS: &str = "update.download.progress";
pub const TOPIC_QUIT_REQUESTED: &str = "app.quit.requested";

/// All topics, in declaration order.
pub const ALL_TOPICS: &[&str] = &[
    TOPIC_GAME_SETTINGS_UPDATED,
    TOPIC_GENERAL_SETTINGS_UPDATED,
    TOPIC_SERVER_ADDRESS_CHANGED,
    TOPIC_LOG_MESSAGE,
    TOPIC_TASK_STOPPED,
    TOPIC_WRITE_SUMMARY_TO_LOG,
    TOPIC_DOWNLOAD_PROGRESS,
    TOPIC_QUIT_REQUESTED,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn topics_are_unique_and_dot_case() {
        let mut seen = HashSet::new();
        for topic in ALL_TOPICS {
            assert!(seen.insert(*topic), "duplicate topic {topic}");
            assert!(topic.contains('.'), "{topic} is not dot.case");
            assert!(!topic.contains('-'));
        }
    }
}
