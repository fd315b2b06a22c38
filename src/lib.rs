pub mod adapter;
pub mod api;
pub mod config;
pub mod error;
pub mod generator;
pub mod init;
pub mod model;
pub mod pacing;
pub mod persistence;
pub mod planner;
pub mod prompt;
pub mod retry;
pub mod server;
pub mod service;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!(target: "ai_story_sets", "[{}] {}", tag, message),
        _ => tracing::info!(target: "ai_story_sets", "[{}] {}", tag, message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
