//! Per-user preferences, kept in memory.

use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadMode {
    #[default]
    Ask,
    Media,
    Files,
}

impl DownloadMode {
    /// Unknown values fall back to [`DownloadMode::Ask`].
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "media" => DownloadMode::Media,
            "files" => DownloadMode::Files,
            _ => DownloadMode::Ask,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadMode::Ask => "ask",
            DownloadMode::Media => "media",
            DownloadMode::Files => "files",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    En,
    Ru,
}

impl Language {
    /// Unknown values fall back to English.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "ru" => Language::Ru,
            _ => Language::En,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
        }
    }
}

pub trait PreferenceStore: Send + Sync {
    fn mode(&self, user_id: u64) -> DownloadMode;
    fn set_mode(&self, user_id: u64, mode: DownloadMode);
    fn language(&self, user_id: u64) -> Language;
    fn set_language(&self, user_id: u64, language: Language);
}

#[derive(Debug, Clone, Copy, Default)]
struct UserPrefs {
    mode: DownloadMode,
    language: Language,
}

/// Preferences held for the lifetime of the process.
#[derive(Default)]
pub struct MemoryPreferences {
    by_user: RwLock<HashMap<u64, UserPrefs>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, user_id: u64) -> UserPrefs {
        self.by_user
            .read()
            .get(&user_id)
            .copied()
            .unwrap_or_default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn mode(&self, user_id: u64) -> DownloadMode {
        self.get(user_id).mode
    }

    fn set_mode(&self, user_id: u64, mode: DownloadMode) {
        self.by_user.write().entry(user_id).or_default().mode = mode;
    }

    fn language(&self, user_id: u64) -> Language {
        self.get(user_id).language
    }

    fn set_language(&self, user_id: u64, language: Language) {
        self.by_user.write().entry(user_id).or_default().language = language;
    }
}
