//! Localized reply and button texts.
//!
//! Layout: `{"response": {key: {lang: text}}, "button": {key: {lang: text}}}`.
//! Templates use positional `{}` placeholders.

use std::{collections::HashMap, fmt::Display, fs, path::Path};

use serde::Deserialize;

use crate::{errors::Error, Result};

const BUILTIN: &str = include_str!("../assets/bot_text.json");
const FALLBACK_LANG: &str = "en";

/// A keyboard caption, recognized in any catalog language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Start,
    Back,
    CurrentSettings,
    RemoveGroup,
    AddMessageJson,
    AddMessage,
    DeleteMessage,
    ChangeInterval,
    Run24x7,
    TurnOn,
    TurnOff,
    Yes,
    No,
    DeleteAll,
}

impl Action {
    const CAPTIONED: [Action; 13] = [
        Action::Back,
        Action::CurrentSettings,
        Action::RemoveGroup,
        Action::AddMessageJson,
        Action::AddMessage,
        Action::DeleteMessage,
        Action::ChangeInterval,
        Action::Run24x7,
        Action::TurnOn,
        Action::TurnOff,
        Action::Yes,
        Action::No,
        Action::DeleteAll,
    ];

    /// Catalog key of the caption. `/start` has no caption.
    pub fn key(self) -> Option<&'static str> {
        Some(match self {
            Action::Start => return None,
            Action::Back => "back",
            Action::CurrentSettings => "get_current_setting",
            Action::RemoveGroup => "remove_group",
            Action::AddMessageJson => "add_msg_json",
            Action::AddMessage => "add_message",
            Action::DeleteMessage => "delete_message",
            Action::ChangeInterval => "change_interval",
            Action::Run24x7 => "run_24x7",
            Action::TurnOn => "turn_on",
            Action::TurnOff => "turn_off",
            Action::Yes => "yes",
            Action::No => "no",
            Action::DeleteAll => "delete_all",
        })
    }

    /// Menu entries work from any conversation state; the rest only mean
    /// something inside a particular flow.
    pub fn is_menu_entry(self) -> bool {
        !matches!(
            self,
            Action::TurnOn | Action::TurnOff | Action::Yes | Action::No | Action::DeleteAll
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    Welcome,
    NoBotAccess,
    CurrentSetting,
    StatusOn,
    StatusOff,
    Groups,
    EnterGroupNumber,
    NoGroupsToRemove,
    UploadJson,
    EnterMessageText,
    EnterMsgId,
    Messages,
    NoMessages,
    SetInterval,
    SelectOption,
    MaxGroupCountExceeded,
    BotAdded,
    IncorrectGroupNumber,
    GroupRemoved,
    MessagesAdded,
    JsonFormatError,
    UploadMessageMedia,
    DoYouWannaAddButton,
    AddButtonName,
    AddButtonLink,
    AddAnotherButton,
    MessageAdded,
    MessageDeleted,
    IncorrectMsgId,
    ButtonInputError,
    MessageSendTimeSet,
    PleaseAddMessage,
    PleaseAddGroups,
    BroadcastTurnedOn,
    BroadcastTurnedOff,
    AlreadyRunning,
    UnexpectedError,
}

impl Reply {
    pub fn key(self) -> &'static str {
        match self {
            Reply::Welcome => "welcome",
            Reply::NoBotAccess => "no_bot_access",
            Reply::CurrentSetting => "current_setting",
            Reply::StatusOn => "status_on",
            Reply::StatusOff => "status_off",
            Reply::Groups => "groups",
            Reply::EnterGroupNumber => "enter_group_number",
            Reply::NoGroupsToRemove => "no_groups_to_remove",
            Reply::UploadJson => "upload_json",
            Reply::EnterMessageText => "enter_message_text",
            Reply::EnterMsgId => "enter_msg_id",
            Reply::Messages => "messages",
            Reply::NoMessages => "no_messages",
            Reply::SetInterval => "set_interval",
            Reply::SelectOption => "select_option",
            Reply::MaxGroupCountExceeded => "max_group_count_exceeded",
            Reply::BotAdded => "bot_added_msg",
            Reply::IncorrectGroupNumber => "incorrect_group_number",
            Reply::GroupRemoved => "group_removed",
            Reply::MessagesAdded => "messages_added",
            Reply::JsonFormatError => "json_format_error",
            Reply::UploadMessageMedia => "upload_message_media",
            Reply::DoYouWannaAddButton => "do_you_wanna_add_button",
            Reply::AddButtonName => "add_button_name",
            Reply::AddButtonLink => "add_button_link",
            Reply::AddAnotherButton => "add_another_button",
            Reply::MessageAdded => "message_added",
            Reply::MessageDeleted => "message_deleted",
            Reply::IncorrectMsgId => "incorrect_msg_id",
            Reply::ButtonInputError => "button_input_error",
            Reply::MessageSendTimeSet => "message_send_time_set",
            Reply::PleaseAddMessage => "pls_add_message",
            Reply::PleaseAddGroups => "pls_add_groups",
            Reply::BroadcastTurnedOn => "message_send_time_updated_24x7",
            Reply::BroadcastTurnedOff => "message_sending_turned_off",
            Reply::AlreadyRunning => "already_running",
            Reply::UnexpectedError => "unexpected_error",
        }
    }
}

type Table = HashMap<String, HashMap<String, String>>;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    response: Table,
    #[serde(default)]
    button: Table,
}

#[derive(Debug)]
pub struct Catalog {
    lang: String,
    file: CatalogFile,
    captions: HashMap<String, Action>,
}

impl Catalog {
    /// The compiled-in English/Russian catalog.
    pub fn builtin(lang: &str) -> Result<Self> {
        Self::from_json(BUILTIN, lang)
    }

    /// Load an override file when given, else the built-in catalog.
    pub fn load(path: Option<&Path>, lang: &str) -> Result<Self> {
        match path {
            Some(p) => {
                let raw = fs::read_to_string(p)?;
                Self::from_json(&raw, lang)
            }
            None => Self::builtin(lang),
        }
    }

    pub fn from_json(raw: &str, lang: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(raw)?;

        let known = file
            .response
            .values()
            .chain(file.button.values())
            .any(|by_lang| by_lang.contains_key(lang));
        if !known {
            return Err(Error::Config(format!(
                "language {lang:?} is not present in the text catalog"
            )));
        }

        let mut captions = HashMap::new();
        for action in Action::CAPTIONED {
            let Some(key) = action.key() else { continue };
            if let Some(by_lang) = file.button.get(key) {
                for caption in by_lang.values() {
                    captions.insert(caption.trim().to_string(), action);
                }
            }
        }

        Ok(Self {
            lang: lang.to_string(),
            file,
            captions,
        })
    }

    pub fn text(&self, reply: Reply) -> String {
        lookup(&self.file.response, reply.key(), &self.lang)
    }

    /// Reply text with positional `{}` placeholders filled from `args`.
    pub fn format(&self, reply: Reply, args: &[&dyn Display]) -> String {
        fill(&self.text(reply), args)
    }

    /// Caption in the active language.
    pub fn button(&self, action: Action) -> String {
        match action.key() {
            Some(key) => lookup(&self.file.button, key, &self.lang),
            None => "/start".to_string(),
        }
    }

    /// Resolve an inbound text to the caption it was sent from, in any language.
    pub fn action_for(&self, text: &str) -> Option<Action> {
        let text = text.trim();
        if text == "/start" || text.starts_with("/start@") || text.starts_with("/start ") {
            return Some(Action::Start);
        }
        self.captions.get(text).copied()
    }
}

fn lookup(table: &Table, key: &str, lang: &str) -> String {
    table
        .get(key)
        .and_then(|by_lang| by_lang.get(lang).or_else(|| by_lang.get(FALLBACK_LANG)))
        .cloned()
        .unwrap_or_else(|| key.to_string())
}

fn fill(template: &str, args: &[&dyn Display]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut parts = template.split("{}");
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    for part in parts {
        match args.next() {
            Some(arg) => out.push_str(&arg.to_string()),
            None => out.push_str("{}"),
        }
        out.push_str(part);
    }
    out
}
