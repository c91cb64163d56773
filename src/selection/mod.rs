mod cache;
mod callback;
mod dispatcher;

pub use callback::{CallbackPayload, SettingsAction, SettingsCallback};
pub use dispatcher::{
    FetchOutcome, OptionLabel, Prompt, PromptKind, RequestContext, SelectionDispatcher,
};
