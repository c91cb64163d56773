use crate::error::Notice;
use crate::prefs::{DownloadMode, Language};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Msg {
    Start,
    Help,
    About,
    RequestPost,
    Working,
    NoMediaFound,
    SelectQuality,
    AlbumAsk,
    AlbumMedia,
    AlbumFile,
    Audio,
    Photo,
    File,
    ResendLink,
    Generic,
    Internal,
    BrokenCallback,
    SettingsTitle,
    CurrentMode,
    CurrentLanguage,
    ChooseMode,
    ChooseLanguage,
    Back,
    ModeCaption,
    ModeSaved,
    LanguageCaption,
    LanguageSaved,
    ModeAsk,
    ModeMedia,
    ModeFiles,
}

pub fn text(lang: Language, msg: Msg) -> &'static str {
    match lang {
        Language::En => en(msg),
        Language::Ru => ru(msg),
    }
}

pub fn notice(lang: Language, notice: Notice) -> &'static str {
    let msg = match notice {
        Notice::ResendLink => Msg::ResendLink,
        Notice::Generic => Msg::Generic,
        Notice::Internal => Msg::Internal,
        Notice::BrokenCallback => Msg::BrokenCallback,
    };
    text(lang, msg)
}

/// Name and version of the running bot.
pub fn about(lang: Language) -> String {
    format!("{} {}", text(lang, Msg::About), env!("CARGO_PKG_VERSION"))
}

pub fn mode_name(lang: Language, mode: DownloadMode) -> &'static str {
    let msg = match mode {
        DownloadMode::Ask => Msg::ModeAsk,
        DownloadMode::Media => Msg::ModeMedia,
        DownloadMode::Files => Msg::ModeFiles,
    };
    text(lang, msg)
}

pub fn language_name(lang: Language) -> &'static str {
    match lang {
        Language::En => "English",
        Language::Ru => "Русский",
    }
}

fn en(msg: Msg) -> &'static str {
    match msg {
        Msg::Start => "Welcome! This bot downloads media from Reddit posts. Just send me a link, for example:\nhttps://www.reddit.com/r/TheCatternet/comments/1nrw9xt/she_grow_up/\n\nCommands:\n/download: download a post\n/settings: settings\n/help: help",
        Msg::Help => "Send a Reddit link. Text posts come back as text; images and videos are uploaded with the title and link.",
        Msg::About => "postgrab",
        Msg::RequestPost => "Please send a link to a Reddit post.",
        Msg::Working => "Fetching the post...",
        Msg::NoMediaFound => "No media found.",
        Msg::SelectQuality => "Please select the quality.",
        Msg::AlbumAsk => "Download album as media or files?",
        Msg::AlbumMedia => "Media",
        Msg::AlbumFile => "Files",
        Msg::Audio => "Audio",
        Msg::Photo => "Photo",
        Msg::File => "File",
        Msg::ResendLink => "Please resend the link.",
        Msg::Generic => "Cannot download this post.",
        Msg::Internal => "Internal error.",
        Msg::BrokenCallback => "Broken button data.",
        Msg::SettingsTitle => "⚙️ Settings",
        Msg::CurrentMode => "Download mode",
        Msg::CurrentLanguage => "Language",
        Msg::ChooseMode => "Choose download mode",
        Msg::ChooseLanguage => "Choose language",
        Msg::Back => "⬅️ Back",
        Msg::ModeCaption => "Pick how to save albums:",
        Msg::ModeSaved => "✅ Mode saved",
        Msg::LanguageCaption => "Pick your language:",
        Msg::LanguageSaved => "✅ Language saved",
        Msg::ModeAsk => "ask",
        Msg::ModeMedia => "media",
        Msg::ModeFiles => "files",
    }
}

fn ru(msg: Msg) -> &'static str {
    match msg {
        Msg::Start => "Добро пожаловать! Бот умеет скачивать медиа из постов Reddit, просто пришлите мне ссылку, например:\nhttps://www.reddit.com/r/TheCatternet/comments/1nrw9xt/she_grow_up/\n\nКоманды:\n/download: скачать пост\n/settings: настройки\n/help: помощь",
        Msg::Help => "Пришлите ссылку на Reddit. Текст придёт текстом, картинки и видео загружу с заголовком и ссылкой.",
        Msg::About => "postgrab",
        Msg::RequestPost => "Пришлите ссылку на пост в Reddit.",
        Msg::Working => "Загружаю пост...",
        Msg::NoMediaFound => "Медиа не найдено.",
        Msg::SelectQuality => "Выберите качество.",
        Msg::AlbumAsk => "Скачать альбом как медиа или файлы?",
        Msg::AlbumMedia => "Медиа",
        Msg::AlbumFile => "Файлы",
        Msg::Audio => "Аудио",
        Msg::Photo => "Фото",
        Msg::File => "Файл",
        Msg::ResendLink => "Пожалуйста, пришлите ссылку заново.",
        Msg::Generic => "Не удалось скачать этот пост.",
        Msg::Internal => "Внутренняя ошибка.",
        Msg::BrokenCallback => "Некорректные данные кнопки.",
        Msg::SettingsTitle => "⚙️ Настройки",
        Msg::CurrentMode => "Режим скачивания",
        Msg::CurrentLanguage => "Язык",
        Msg::ChooseMode => "Выбрать режим скачивания",
        Msg::ChooseLanguage => "Выбрать язык",
        Msg::Back => "⬅️ Назад",
        Msg::ModeCaption => "Как сохранять альбомы:",
        Msg::ModeSaved => "✅ Режим сохранён",
        Msg::LanguageCaption => "Выберите язык:",
        Msg::LanguageSaved => "✅ Язык сохранён",
        Msg::ModeAsk => "спрашивать",
        Msg::ModeMedia => "медиа",
        Msg::ModeFiles => "файлы",
    }
}
