use super::messages::{self, Msg};
use super::uploader::DiscordUploader;
use crate::config::Config;
use crate::error::{GrabError, Notice};
use crate::media::{ffmpeg_available, PostFetcher, RedditFetcher};
use crate::prefs::{DownloadMode, Language, MemoryPreferences, PreferenceStore};
use crate::selection::{
    CallbackPayload, FetchOutcome, OptionLabel, Prompt, PromptKind, RequestContext,
    SelectionDispatcher, SettingsAction, SettingsCallback,
};
use crate::utils::{extract_urls, is_url, truncate};
use anyhow::{Context, Result};
use std::{env, sync::Arc};
use tracing::{debug, error, info, warn};
use twilight_cache_inmemory::InMemoryCache;
use twilight_gateway::{Event, EventTypeFlags, Intents, Shard, ShardId, StreamExt};
use twilight_http::Client as HttpClient;
use twilight_model::{
    application::{
        command::CommandType,
        interaction::{
            application_command::{CommandData, CommandOptionValue},
            Interaction, InteractionData, InteractionType,
        },
    },
    channel::message::{
        component::{ActionRow, Button, ButtonStyle},
        Component, MessageFlags,
    },
    gateway::payload::incoming::MessageCreate,
    http::{
        attachment::Attachment,
        interaction::{InteractionResponse, InteractionResponseType},
    },
    id::{
        marker::{ApplicationMarker, ChannelMarker},
        Id,
    },
};
use twilight_util::builder::{
    command::{CommandBuilder, StringBuilder},
    InteractionResponseDataBuilder,
};

const MESSAGE_LIMIT: usize = 2000;
const BUTTON_LABEL_LIMIT: usize = 80;
const BUTTONS_PER_ROW: usize = 5;
const MAX_ROWS: usize = 5;

pub struct DiscordBot {
    cache: InMemoryCache,
    shard: Shard,
    handler: Arc<Handler>,
}

/// Everything needed to handle a single event. Shared between the tasks
/// spawned per event.
struct Handler {
    http: Arc<HttpClient>,
    application_id: Id<ApplicationMarker>,
    fetcher: Arc<dyn PostFetcher>,
    dispatcher: SelectionDispatcher,
    prefs: Arc<dyn PreferenceStore>,
    config: Config,
}

/// Where to report a failure of an event handler.
#[derive(Debug, Clone, Copy)]
struct EventOrigin {
    channel_id: Id<ChannelMarker>,
    user_id: u64,
}

impl EventOrigin {
    fn of(event: &Event) -> Option<Self> {
        match event {
            Event::MessageCreate(msg) => Some(Self {
                channel_id: msg.channel_id,
                user_id: msg.author.id.get(),
            }),
            Event::InteractionCreate(interaction) => Some(Self {
                channel_id: interaction.channel.as_ref()?.id,
                user_id: interaction.author_id()?.get(),
            }),
            _ => None,
        }
    }
}

impl DiscordBot {
    pub async fn new(token: String, config: Config) -> Result<Self> {
        let http = Arc::new(HttpClient::new(token.clone()));
        let cache = InMemoryCache::new();

        let intents = Intents::GUILD_MESSAGES | Intents::DIRECT_MESSAGES | Intents::MESSAGE_CONTENT;
        let shard = Shard::new(ShardId::ONE, token, intents);

        let fetch_client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(config.fetch.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;
        let download_timeout = config.download_timeout();
        let download_client = reqwest::Client::builder()
            .timeout(download_timeout)
            .user_agent(config.fetch.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        if !ffmpeg_available().await {
            warn!("ffmpeg not found, videos will be sent without their audio track");
        }

        let prefs: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferences::new());
        let uploader = Arc::new(DiscordUploader::new(
            Arc::clone(&http),
            download_client,
            config.upload.max_file_size_mb,
            download_timeout,
        ));
        let dispatcher = SelectionDispatcher::new(
            uploader,
            Arc::clone(&prefs),
            config.selection_ttl(),
            config.selection.max_capacity,
        );
        let fetcher = Arc::new(RedditFetcher::new(
            fetch_client,
            config.upload.max_thumbnail_dimension,
        ));

        // Get application ID
        let application_id = {
            let response = http.current_user_application().await?;
            response.model().await?.id
        };

        let handler = Handler {
            http,
            application_id,
            fetcher,
            dispatcher,
            prefs,
            config,
        };

        // Register slash commands
        handler.register_commands().await?;

        Ok(Self {
            cache,
            shard,
            handler: Arc::new(handler),
        })
    }

    pub async fn run(mut self) -> Result<()> {
        info!("Discord bot starting...");

        loop {
            let event = match self.shard.next_event(EventTypeFlags::all()).await {
                Some(Ok(event)) => event,
                Some(Err(source)) => {
                    error!(?source, "Error receiving event");
                    continue;
                }
                None => {
                    info!("Shard stream ended");
                    return Ok(());
                }
            };

            self.cache.update(&event);

            match event {
                Event::Ready(_) => {
                    info!("Discord bot is ready!");
                }
                Event::MessageCreate(_) | Event::InteractionCreate(_) => {
                    tokio::spawn(Arc::clone(&self.handler).handle_event_guarded(event));
                }
                _ => {}
            }
        }
    }
}

impl Handler {
    async fn register_commands(&self) -> Result<()> {
        info!("Registering Discord slash commands...");

        let download_command = CommandBuilder::new(
            "download".to_string(),
            "Download media from a Reddit post".to_string(),
            CommandType::ChatInput,
        )
        .option(StringBuilder::new("url", "Link to the post").required(true))
        .build();

        let interaction = self.http.interaction(self.application_id);

        interaction
            .create_global_command()
            .chat_input(&download_command.name, &download_command.description)
            .command_options(&download_command.options)
            .await?;

        for (name, description) in [
            ("settings", "Choose download mode and language"),
            ("start", "Start the bot"),
            ("help", "How to use the bot"),
            ("about", "Show the bot version"),
        ] {
            interaction
                .create_global_command()
                .chat_input(name, description)
                .await?;
        }

        info!("Successfully registered slash commands");
        Ok(())
    }

    /// Runs one event in its own task so that a panic only fails that event.
    async fn handle_event_guarded(self: Arc<Self>, event: Event) {
        let origin = EventOrigin::of(&event);
        let handler = Arc::clone(&self);
        let task = tokio::spawn(async move { handler.handle_event(event).await });

        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to handle event: {:#}", e),
            Err(e) if e.is_panic() => {
                error!("Recovering from panic while handling event: {}", e);
                if let Some(origin) = origin {
                    let lang = self.prefs.language(origin.user_id);
                    let text = messages::notice(lang, Notice::Internal);
                    if let Err(e) = self.send_text(origin.channel_id, text).await {
                        error!("Failed to report panic: {:#}", e);
                    }
                }
            }
            Err(e) => warn!("Event handler was cancelled: {}", e),
        }
    }

    async fn handle_event(&self, event: Event) -> Result<()> {
        match event {
            Event::MessageCreate(msg) => self.handle_message(&msg).await,
            Event::InteractionCreate(interaction) => self.handle_interaction(&interaction).await,
            _ => Ok(()),
        }
    }

    async fn handle_message(&self, msg: &MessageCreate) -> Result<()> {
        // Skip bot messages
        if msg.author.bot {
            return Ok(());
        }

        let user_id = msg.author.id.get();
        if !self.config.is_allowed(user_id) {
            debug!("Ignoring message from user {} not on the allow list", user_id);
            return Ok(());
        }

        let is_direct = msg.guild_id.is_none();
        let urls: Vec<String> = extract_urls(&msg.content)
            .into_iter()
            .filter(|url| is_direct || self.fetcher.supports(url))
            .collect();

        if urls.is_empty() {
            if is_direct {
                let lang = self.prefs.language(user_id);
                self.send_text(msg.channel_id, messages::text(lang, Msg::RequestPost))
                    .await?;
            }
            return Ok(());
        }

        let ctx = RequestContext {
            user_id,
            chat_id: msg.channel_id.get(),
        };
        for url in urls {
            self.process_link(ctx, msg.channel_id, &url).await?;
        }

        Ok(())
    }

    /// Fetches a post and hands it to the dispatcher.
    async fn process_link(
        &self,
        ctx: RequestContext,
        channel_id: Id<ChannelMarker>,
        url: &str,
    ) -> Result<()> {
        let lang = self.prefs.language(ctx.user_id);

        let fetched = match self.fetcher.fetch(url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Cannot fetch the post {}: {}", url, e);
                return self
                    .send_text(channel_id, messages::notice(lang, e.notice()))
                    .await;
            }
        };

        match self
            .dispatcher
            .handle_fetched(ctx, fetched.result, &fetched.link)
            .await
        {
            Ok(FetchOutcome::Text(text)) => self.send_long_text(channel_id, &text).await,
            Ok(FetchOutcome::NoMedia) => {
                self.send_text(channel_id, messages::text(lang, Msg::NoMediaFound))
                    .await
            }
            Ok(FetchOutcome::Dispatched) => Ok(()),
            Ok(FetchOutcome::AwaitingChoice(prompt)) => {
                self.send_prompt(channel_id, lang, &prompt).await
            }
            Err(e) => self.report(channel_id, lang, &e).await,
        }
    }

    async fn handle_interaction(&self, interaction: &Interaction) -> Result<()> {
        let user_id = interaction.author_id().map(|id| id.get()).unwrap_or_default();
        if !self.config.is_allowed(user_id) {
            debug!("Ignoring interaction from user {} not on the allow list", user_id);
            return Ok(());
        }

        match interaction.kind {
            InteractionType::ApplicationCommand => {
                if let Some(InteractionData::ApplicationCommand(data)) = &interaction.data {
                    match data.name.as_str() {
                        "download" => {
                            self.handle_download_command(interaction, data, user_id)
                                .await?;
                        }
                        "settings" => {
                            let (content, components) = self.settings_root(user_id, None);
                            self.respond(
                                interaction,
                                InteractionResponseType::ChannelMessageWithSource,
                                Some(content),
                                Some(components),
                                true,
                            )
                            .await?;
                        }
                        name => match command_reply(name, self.prefs.language(user_id)) {
                            Some(reply) => {
                                self.respond(
                                    interaction,
                                    InteractionResponseType::ChannelMessageWithSource,
                                    Some(reply),
                                    None,
                                    true,
                                )
                                .await?;
                            }
                            None => info!("Unknown command: {}", name),
                        },
                    }
                }
            }
            InteractionType::MessageComponent => {
                if let Some(InteractionData::MessageComponent(data)) = &interaction.data {
                    self.handle_component(interaction, &data.custom_id, user_id)
                        .await?;
                }
            }
            _ => {}
        }

        Ok(())
    }

    async fn handle_download_command(
        &self,
        interaction: &Interaction,
        data: &CommandData,
        user_id: u64,
    ) -> Result<()> {
        let lang = self.prefs.language(user_id);

        // Extract URL from command options
        let url = data
            .options
            .iter()
            .find(|opt| opt.name == "url")
            .and_then(|opt| match &opt.value {
                CommandOptionValue::String(s) => Some(s.trim()),
                _ => None,
            })
            .unwrap_or("");

        if !is_url(url) {
            return self
                .respond(
                    interaction,
                    InteractionResponseType::ChannelMessageWithSource,
                    Some(messages::text(lang, Msg::RequestPost).to_string()),
                    None,
                    true,
                )
                .await;
        }

        let channel_id = interaction
            .channel
            .as_ref()
            .map(|channel| channel.id)
            .context("No channel information in interaction")?;

        // Acknowledge the interaction first
        self.respond(
            interaction,
            InteractionResponseType::ChannelMessageWithSource,
            Some(messages::text(lang, Msg::Working).to_string()),
            None,
            true,
        )
        .await?;

        let ctx = RequestContext {
            user_id,
            chat_id: channel_id.get(),
        };
        self.process_link(ctx, channel_id, url).await
    }

    async fn handle_component(
        &self,
        interaction: &Interaction,
        custom_id: &str,
        user_id: u64,
    ) -> Result<()> {
        let lang = self.prefs.language(user_id);

        let payload = match CallbackPayload::decode(custom_id) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Rejecting button press: {}", e);
                return self
                    .respond(
                        interaction,
                        InteractionResponseType::ChannelMessageWithSource,
                        Some(messages::notice(lang, e.notice()).to_string()),
                        None,
                        true,
                    )
                    .await;
            }
        };

        let request = match payload {
            CallbackPayload::Settings(callback) => {
                let (content, components) = self.apply_settings(user_id, &callback);
                return self
                    .respond(
                        interaction,
                        InteractionResponseType::UpdateMessage,
                        Some(content),
                        Some(components),
                        false,
                    )
                    .await;
            }
            CallbackPayload::Selection(request) => request,
        };

        self.respond(
            interaction,
            InteractionResponseType::DeferredUpdateMessage,
            None,
            None,
            false,
        )
        .await?;

        // The prompt is spent either way
        if let Some(message) = &interaction.message {
            if let Err(e) = self.http.delete_message(message.channel_id, message.id).await {
                debug!("Failed to delete prompt message: {}", e);
            }
        }

        let channel_id = interaction
            .channel
            .as_ref()
            .map(|channel| channel.id)
            .context("No channel information in interaction")?;
        let ctx = RequestContext {
            user_id,
            chat_id: channel_id.get(),
        };

        match self.dispatcher.handle_callback(ctx, request).await {
            Ok(resolution) => {
                debug!("Selection resolved: {:?}", resolution);
                Ok(())
            }
            Err(e) => self.report(channel_id, lang, &e).await,
        }
    }

    fn apply_settings(
        &self,
        user_id: u64,
        callback: &SettingsCallback,
    ) -> (String, Vec<Component>) {
        match callback.action {
            SettingsAction::OpenRoot => self.settings_root(user_id, None),
            SettingsAction::OpenMode => self.settings_mode(user_id, None),
            SettingsAction::SetMode => {
                let mode = DownloadMode::parse(&callback.value);
                self.prefs.set_mode(user_id, mode);
                let lang = self.prefs.language(user_id);
                let saved = format!(
                    "{}: {}",
                    messages::text(lang, Msg::ModeSaved),
                    messages::mode_name(lang, mode)
                );
                self.settings_mode(user_id, Some(saved))
            }
            SettingsAction::OpenLanguage => self.settings_language(user_id, None),
            SettingsAction::SetLanguage => {
                let lang = Language::parse(&callback.value);
                self.prefs.set_language(user_id, lang);
                let saved = format!(
                    "{}: {}",
                    messages::text(lang, Msg::LanguageSaved),
                    messages::language_name(lang)
                );
                self.settings_language(user_id, Some(saved))
            }
        }
    }

    fn settings_root(
        &self,
        user_id: u64,
        header: Option<String>,
    ) -> (String, Vec<Component>) {
        let lang = self.prefs.language(user_id);
        let mode = self.prefs.mode(user_id);

        let mut content = header.map(|h| format!("{h}\n\n")).unwrap_or_default();
        content.push_str(&format!(
            "{}\n\n• {}: **{}**\n• {}: {}",
            messages::text(lang, Msg::SettingsTitle),
            messages::text(lang, Msg::CurrentMode),
            messages::mode_name(lang, mode),
            messages::text(lang, Msg::CurrentLanguage),
            messages::language_name(lang),
        ));

        let buttons = vec![
            settings_button(messages::text(lang, Msg::ChooseMode), SettingsAction::OpenMode, ""),
            settings_button(
                messages::text(lang, Msg::ChooseLanguage),
                SettingsAction::OpenLanguage,
                "",
            ),
        ];
        (content, button_rows(&buttons))
    }

    fn settings_mode(
        &self,
        user_id: u64,
        header: Option<String>,
    ) -> (String, Vec<Component>) {
        let lang = self.prefs.language(user_id);
        let current = self.prefs.mode(user_id);

        let content = header.unwrap_or_else(|| messages::text(lang, Msg::ModeCaption).to_string());
        let modes = [DownloadMode::Media, DownloadMode::Files, DownloadMode::Ask];
        let mut buttons: Vec<(String, String)> = modes
            .into_iter()
            .map(|mode| {
                settings_button(
                    &mark_active(messages::mode_name(lang, mode), mode == current),
                    SettingsAction::SetMode,
                    mode.as_str(),
                )
            })
            .collect();
        buttons.push(settings_button(
            messages::text(lang, Msg::Back),
            SettingsAction::OpenRoot,
            "",
        ));

        (content, button_rows(&buttons))
    }

    fn settings_language(
        &self,
        user_id: u64,
        header: Option<String>,
    ) -> (String, Vec<Component>) {
        let current = self.prefs.language(user_id);

        let content =
            header.unwrap_or_else(|| messages::text(current, Msg::LanguageCaption).to_string());
        let mut buttons: Vec<(String, String)> = [Language::En, Language::Ru]
            .into_iter()
            .map(|lang| {
                settings_button(
                    &mark_active(messages::language_name(lang), lang == current),
                    SettingsAction::SetLanguage,
                    lang.code(),
                )
            })
            .collect();
        buttons.push(settings_button(
            messages::text(current, Msg::Back),
            SettingsAction::OpenRoot,
            "",
        ));

        (content, button_rows(&buttons))
    }

    async fn send_prompt(
        &self,
        channel_id: Id<ChannelMarker>,
        lang: Language,
        prompt: &Prompt,
    ) -> Result<()> {
        let content = match prompt.kind {
            PromptKind::Quality => messages::text(lang, Msg::SelectQuality),
            PromptKind::AlbumMode => messages::text(lang, Msg::AlbumAsk),
        };
        let buttons: Vec<(String, String)> = prompt
            .options
            .iter()
            .map(|option| {
                (
                    option_label(lang, &option.label),
                    CallbackPayload::from(option.request.clone()).encode(),
                )
            })
            .collect();

        self.http
            .create_message(channel_id)
            .content(content)
            .components(&button_rows(&buttons))
            .await?;
        Ok(())
    }

    /// Logs `error` and tells the user what went wrong, without detail.
    async fn report(
        &self,
        channel_id: Id<ChannelMarker>,
        lang: Language,
        error: &GrabError,
    ) -> Result<()> {
        if error.is_internal() {
            error!("Internal error while handling request: {}", error);
        } else {
            warn!("Request failed: {}", error);
        }
        self.send_text(channel_id, messages::notice(lang, error.notice()))
            .await
    }

    async fn respond(
        &self,
        interaction: &Interaction,
        kind: InteractionResponseType,
        content: Option<String>,
        components: Option<Vec<Component>>,
        ephemeral: bool,
    ) -> Result<()> {
        let data = if content.is_none() && components.is_none() {
            None
        } else {
            let mut builder = InteractionResponseDataBuilder::new();
            if let Some(content) = content {
                builder = builder.content(content);
            }
            if let Some(components) = components {
                builder = builder.components(components);
            }
            if ephemeral {
                builder = builder.flags(MessageFlags::EPHEMERAL);
            }
            Some(builder.build())
        };

        let response = InteractionResponse { kind, data };

        self.http
            .interaction(self.application_id)
            .create_response(interaction.id, &interaction.token, &response)
            .await?;

        Ok(())
    }

    async fn send_text(&self, channel_id: Id<ChannelMarker>, content: &str) -> Result<()> {
        self.http.create_message(channel_id).content(content).await?;
        Ok(())
    }

    /// Sends text that may be over the message limit as a text file.
    async fn send_long_text(&self, channel_id: Id<ChannelMarker>, content: &str) -> Result<()> {
        if content.chars().count() <= MESSAGE_LIMIT {
            return self.send_text(channel_id, content).await;
        }

        let attachment =
            Attachment::from_bytes("post.txt".to_string(), content.as_bytes().to_vec(), 0);
        self.http
            .create_message(channel_id)
            .attachments(&[attachment])
            .await?;
        Ok(())
    }
}

/// Reply to a command that only answers with fixed text.
fn command_reply(name: &str, lang: Language) -> Option<String> {
    match name {
        "start" => Some(messages::text(lang, Msg::Start).to_string()),
        "help" => Some(messages::text(lang, Msg::Help).to_string()),
        "about" => Some(messages::about(lang)),
        _ => None,
    }
}

fn settings_button(label: &str, action: SettingsAction, value: &str) -> (String, String) {
    (
        label.to_string(),
        CallbackPayload::from(SettingsCallback::new(action, value)).encode(),
    )
}

fn mark_active(label: &str, active: bool) -> String {
    if active {
        format!("• {label} ✅")
    } else {
        label.to_string()
    }
}

fn option_label(lang: Language, label: &OptionLabel) -> String {
    match label {
        OptionLabel::Quality(quality) if quality.chars().all(|c| c.is_ascii_digit()) => {
            format!("{quality}p")
        }
        OptionLabel::Quality(quality) => quality.clone(),
        OptionLabel::Audio => messages::text(lang, Msg::Audio).to_string(),
        OptionLabel::Photo(quality) => format!("{} {}", messages::text(lang, Msg::Photo), quality),
        OptionLabel::PhotoFile(quality) => {
            format!("{} {}", messages::text(lang, Msg::File), quality)
        }
        OptionLabel::AlbumMedia => messages::text(lang, Msg::AlbumMedia).to_string(),
        OptionLabel::AlbumFiles => messages::text(lang, Msg::AlbumFile).to_string(),
    }
}

/// Lays `(label, custom_id)` pairs out as rows of buttons.
fn button_rows(buttons: &[(String, String)]) -> Vec<Component> {
    if buttons.len() > BUTTONS_PER_ROW * MAX_ROWS {
        warn!(
            "Prompt has {} options, only the first {} are shown",
            buttons.len(),
            BUTTONS_PER_ROW * MAX_ROWS
        );
    }

    buttons
        .chunks(BUTTONS_PER_ROW)
        .take(MAX_ROWS)
        .map(|chunk| {
            Component::ActionRow(ActionRow {
                id: None,
                components: chunk
                    .iter()
                    .map(|(label, custom_id)| {
                        Component::Button(Button {
                            id: None,
                            custom_id: Some(custom_id.clone()),
                            disabled: false,
                            emoji: None,
                            label: Some(truncate(label, BUTTON_LABEL_LIMIT)),
                            style: ButtonStyle::Primary,
                            url: None,
                            sku_id: None,
                        })
                    })
                    .collect(),
            })
        })
        .collect()
}

pub async fn run(config: Config) -> Result<()> {
    let token = match config.get_discord_token() {
        Some(token) => token.to_string(),
        None => env::var("DISCORD_TOKEN")
            .context("DISCORD_TOKEN environment variable is required")?,
    };

    let bot = DiscordBot::new(token, config).await?;
    bot.run().await
}
