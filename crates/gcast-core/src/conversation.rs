//! Per-admin conversation state machine driving the reply-keyboard menu.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::Arc,
};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    batch::parse_batch,
    broadcast::{BroadcastSnapshot, RunState, StartOutcome},
    catalog::{Action, Reply},
    context::AppContext,
    domain::{Button, ChatId, NewMessage, UserId},
    errors::Error,
    interval::IntervalDelta,
    messaging::types::{MediaRef, ReplyKeyboard},
    utils::{media_extension, remove_file_quietly, sanitize_filename, truncate_text},
    Result,
};

const INTERVAL_STEPS: [u64; 3] = [1, 10, 100];
const PREVIEW_CHARS: usize = 40;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChatState {
    #[default]
    BotStarted,
    WaitingForDelGroupId,
    WaitingForMessageJson,
    WaitingForMessageText,
    WaitingForMessageMedia,
    DoYouWannaAddButton,
    WaitingForMessageButtonName,
    WaitingForMessageButtonLink,
    WaitingForDelMsgId,
    WaitingForIntervalButtonInput,
    SetRun24x7State,
}

/// A private message from a (possibly non-admin) user.
#[derive(Clone, Debug)]
pub struct Inbound {
    pub chat_id: ChatId,
    pub user_id: Option<UserId>,
    pub text: Option<String>,
    pub media: Option<MediaRef>,
}

#[derive(Clone, Debug, Default)]
struct Draft {
    text: String,
    file_path: Option<String>,
    buttons: Vec<Button>,
    pending_name: Option<String>,
}

#[derive(Clone, Debug, Default)]
struct Session {
    state: ChatState,
    draft: Draft,
}

impl Session {
    fn enter(&mut self, state: ChatState) {
        self.state = state;
        self.draft = Draft::default();
    }
}

pub struct Conversation {
    app: Arc<AppContext>,
    sessions: Mutex<HashMap<i64, Session>>,
}

impl Conversation {
    pub fn new(app: Arc<AppContext>) -> Self {
        Self {
            app,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn app(&self) -> &Arc<AppContext> {
        &self.app
    }

    pub async fn state(&self, user_id: UserId) -> ChatState {
        self.sessions
            .lock()
            .await
            .get(&user_id.0)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    /// Process one inbound private message.
    ///
    /// Failures are reported to the admin as a generic message; the session is
    /// left as it was before the message arrived.
    pub async fn handle(&self, msg: Inbound) -> Result<()> {
        let action = msg
            .text
            .as_deref()
            .and_then(|t| self.app.catalog.action_for(t));

        if !self.app.is_admin(msg.user_id) {
            if action == Some(Action::Start) {
                self.say(msg.chat_id, Reply::NoBotAccess, None).await?;
            }
            return Ok(());
        }
        let Some(user_id) = msg.user_id else {
            return Ok(());
        };

        let mut session = self
            .sessions
            .lock()
            .await
            .remove(&user_id.0)
            .unwrap_or_default();
        let before = session.clone();

        let outcome = self.step(&mut session, user_id, &msg, action).await;
        if let Err(e) = &outcome {
            tracing::error!(user_id = user_id.0, state = ?before.state, "conversation step failed: {e}");
            self.app
                .error_log
                .record(&format!("admin {} in {:?}", user_id.0, before.state), &format!("{e:?}"));
            session = before;
        }

        self.sessions.lock().await.insert(user_id.0, session);

        if outcome.is_err() {
            self.say(msg.chat_id, Reply::UnexpectedError, None).await?;
        }
        Ok(())
    }

    async fn step(
        &self,
        session: &mut Session,
        user_id: UserId,
        msg: &Inbound,
        action: Option<Action>,
    ) -> Result<()> {
        if let Some(action) = action.filter(|a| a.is_menu_entry()) {
            return self.on_menu(session, msg.chat_id, action).await;
        }

        let chat = msg.chat_id;
        let text = msg.text.as_deref().map(str::trim).unwrap_or_default();

        match session.state {
            ChatState::BotStarted => Ok(()),

            ChatState::WaitingForDelGroupId => {
                let removed = match parse_index(text) {
                    Some(n) => self.app.groups.remove_at(n).await?,
                    None => None,
                };
                match removed {
                    Some(group) => {
                        tracing::info!(chat_id = group.chat_id.0, group = %group.username, "group removed by admin");
                        session.enter(ChatState::BotStarted);
                        self.confirm(chat, Reply::GroupRemoved, Some(self.main_menu()))
                            .await
                    }
                    None => self.say(chat, Reply::IncorrectGroupNumber, None).await,
                }
            }

            ChatState::WaitingForMessageJson => match msg.media.as_ref() {
                Some(media) if media.is_json() => {
                    self.ingest_batch(session, chat, user_id, media).await
                }
                _ => self.say(chat, Reply::UploadJson, None).await,
            },

            ChatState::WaitingForMessageText => {
                if text.is_empty() {
                    return self.say(chat, Reply::EnterMessageText, None).await;
                }
                session.draft.text = text.to_string();
                session.state = ChatState::WaitingForMessageMedia;
                self.say(chat, Reply::UploadMessageMedia, None).await
            }

            ChatState::WaitingForMessageMedia => {
                let Some(media) = msg.media.as_ref() else {
                    return self.say(chat, Reply::UploadMessageMedia, None).await;
                };
                let ext = media_extension(media.file_name.as_deref(), media.kind);
                let dest = self
                    .app
                    .cfg
                    .files_dir
                    .join(format!("{}.{ext}", Uuid::new_v4()));
                if let Err(e) = self.app.messenger.download_media(media, &dest).await {
                    remove_file_quietly(&dest).await;
                    return Err(e);
                }

                session.draft.file_path = Some(dest.to_string_lossy().into_owned());
                session.state = ChatState::DoYouWannaAddButton;
                self.say(chat, Reply::DoYouWannaAddButton, Some(self.yes_no()))
                    .await
            }

            ChatState::DoYouWannaAddButton => match action {
                Some(Action::Yes) => {
                    session.state = ChatState::WaitingForMessageButtonName;
                    self.say(chat, Reply::AddButtonName, Some(self.back_only()))
                        .await
                }
                Some(Action::No) => self.commit_draft(session, chat).await,
                _ => self.say(chat, Reply::DoYouWannaAddButton, None).await,
            },

            ChatState::WaitingForMessageButtonName => {
                if text.is_empty() {
                    return self.say(chat, Reply::AddButtonName, None).await;
                }
                session.draft.pending_name = Some(text.to_string());
                session.state = ChatState::WaitingForMessageButtonLink;
                self.say(chat, Reply::AddButtonLink, Some(self.back_only()))
                    .await
            }

            ChatState::WaitingForMessageButtonLink => {
                if text.is_empty() {
                    return self.say(chat, Reply::AddButtonLink, None).await;
                }
                let name = session.draft.pending_name.take().unwrap_or_default();
                session.draft.buttons.push(Button {
                    name,
                    link: text.to_string(),
                });
                session.state = ChatState::DoYouWannaAddButton;
                self.say(chat, Reply::AddAnotherButton, Some(self.yes_no()))
                    .await
            }

            ChatState::WaitingForDelMsgId => {
                let detached: Vec<String> = if action == Some(Action::DeleteAll) {
                    let links = self.app.messages.delete_all().await?;
                    tracing::info!(count = links.len(), "all messages deleted");
                    links
                } else if let Some(id) = parse_msg_id(text) {
                    let link = self.app.messages.delete(id).await?;
                    tracing::info!(msg_id = id, existed = link.is_some(), "message deleted");
                    link.into_iter().collect()
                } else {
                    return self.say(chat, Reply::IncorrectMsgId, None).await;
                };
                session.enter(ChatState::BotStarted);
                self.discard_media(detached).await;
                self.confirm(chat, Reply::MessageDeleted, Some(self.main_menu()))
                    .await
            }

            ChatState::WaitingForIntervalButtonInput => match IntervalDelta::parse(text) {
                Ok(delta) => {
                    let secs = self.app.interval.apply(delta);
                    tracing::info!(interval_secs = secs, "broadcast interval changed");
                    let reply = self.app.catalog.format(Reply::MessageSendTimeSet, &[&secs]);
                    self.confirm_text(chat, &reply, None).await
                }
                Err(_) => self.say(chat, Reply::ButtonInputError, None).await,
            },

            ChatState::SetRun24x7State => match action {
                Some(Action::TurnOn) => self.turn_on(session, chat).await,
                Some(Action::TurnOff) => {
                    self.app.broadcaster.stop().await;
                    self.confirm(chat, Reply::BroadcastTurnedOff, None).await
                }
                _ => Ok(()),
            },
        }
    }

    async fn on_menu(&self, session: &mut Session, chat: ChatId, action: Action) -> Result<()> {
        match action {
            Action::Start | Action::Back => {
                session.enter(ChatState::BotStarted);
                self.say(chat, Reply::Welcome, Some(self.main_menu())).await
            }

            Action::CurrentSettings => {
                let groups = self.app.groups.list().await?;
                let handles = groups
                    .iter()
                    .map(|g| format!("@{}", g.username))
                    .collect::<Vec<_>>()
                    .join(" ");
                let status = match self.app.broadcaster.run_state().await {
                    RunState::Started => self.app.catalog.text(Reply::StatusOn),
                    RunState::Stopped => self.app.catalog.text(Reply::StatusOff),
                };
                let secs = self.app.interval.get();
                let reply = self
                    .app
                    .catalog
                    .format(Reply::CurrentSetting, &[&handles, &status, &secs]);
                self.app.messenger.send_text(chat, &reply, None).await
            }

            Action::RemoveGroup => {
                let groups = self.app.groups.list().await?;
                if groups.is_empty() {
                    return self.say(chat, Reply::NoGroupsToRemove, None).await;
                }
                let mut reply = self.app.catalog.text(Reply::Groups);
                for (i, group) in groups.iter().enumerate() {
                    reply.push_str(&format!("\n{} ➖ {}", i + 1, group.username));
                }
                reply.push('\n');
                reply.push_str(&self.app.catalog.text(Reply::EnterGroupNumber));

                session.enter(ChatState::WaitingForDelGroupId);
                self.app
                    .messenger
                    .send_text(chat, &reply, Some(self.back_only()))
                    .await
            }

            Action::AddMessageJson => {
                session.enter(ChatState::WaitingForMessageJson);
                self.say(chat, Reply::UploadJson, Some(self.back_only()))
                    .await
            }

            Action::AddMessage => {
                session.enter(ChatState::WaitingForMessageText);
                self.say(chat, Reply::EnterMessageText, Some(self.back_only()))
                    .await
            }

            Action::DeleteMessage => {
                let messages = self.app.messages.list().await?;
                let mut reply = if messages.is_empty() {
                    self.app.catalog.text(Reply::NoMessages)
                } else {
                    let mut s = self.app.catalog.text(Reply::Messages);
                    for m in &messages {
                        let first_line = m.text.lines().next().unwrap_or_default();
                        s.push_str(&format!(
                            "\n{} ➖ {}",
                            m.msg_id,
                            truncate_text(first_line, PREVIEW_CHARS)
                        ));
                    }
                    s
                };
                reply.push('\n');
                reply.push_str(&self.app.catalog.text(Reply::EnterMsgId));

                session.enter(ChatState::WaitingForDelMsgId);
                let keyboard = ReplyKeyboard::new(vec![vec![
                    self.app.catalog.button(Action::DeleteAll),
                    self.app.catalog.button(Action::Back),
                ]]);
                self.app
                    .messenger
                    .send_text(chat, &reply, Some(keyboard))
                    .await
            }

            Action::ChangeInterval => {
                session.enter(ChatState::WaitingForIntervalButtonInput);
                let reply = self
                    .app
                    .catalog
                    .format(Reply::SetInterval, &[&self.app.interval.get()]);
                self.app
                    .messenger
                    .send_text(chat, &reply, Some(self.interval_keyboard()))
                    .await
            }

            Action::Run24x7 => {
                session.enter(ChatState::SetRun24x7State);
                let keyboard = ReplyKeyboard::new(vec![
                    vec![
                        self.app.catalog.button(Action::TurnOn),
                        self.app.catalog.button(Action::TurnOff),
                    ],
                    vec![self.app.catalog.button(Action::Back)],
                ]);
                self.say(chat, Reply::SelectOption, Some(keyboard)).await
            }

            Action::TurnOn | Action::TurnOff | Action::Yes | Action::No | Action::DeleteAll => {
                Err(Error::External(format!("{action:?} is not a menu entry")))
            }
        }
    }

    async fn ingest_batch(
        &self,
        session: &mut Session,
        chat: ChatId,
        user_id: UserId,
        media: &MediaRef,
    ) -> Result<()> {
        let original = media.file_name.as_deref().unwrap_or("messages.json");
        let dest = self.app.cfg.uploads_dir.join(format!(
            "{}_{}_{}",
            user_id.0,
            Uuid::new_v4(),
            sanitize_filename(original)
        ));

        match self.load_batch(media, &dest).await {
            Ok(ids) => {
                tracing::info!(user_id = user_id.0, count = ids.len(), "message batch stored");
                session.enter(ChatState::BotStarted);
                self.confirm(chat, Reply::MessagesAdded, Some(self.main_menu()))
                    .await
            }
            Err(e) => {
                tracing::warn!(user_id = user_id.0, file = %original, "message batch rejected: {e}");
                self.app.error_log.record(
                    &format!("message batch {original} from admin {}", user_id.0),
                    &format!("{e:?}"),
                );
                self.say(chat, Reply::JsonFormatError, None).await
            }
        }
    }

    async fn load_batch(&self, media: &MediaRef, dest: &Path) -> Result<Vec<i64>> {
        if let Err(e) = self.app.messenger.download_media(media, dest).await {
            remove_file_quietly(dest).await;
            return Err(e);
        }
        let read = tokio::fs::read(dest).await;
        remove_file_quietly(dest).await;
        let batch = parse_batch(&read?)?;
        self.app.messages.insert_batch(batch).await
    }

    async fn commit_draft(&self, session: &mut Session, chat: ChatId) -> Result<()> {
        let draft = std::mem::take(&mut session.draft);
        let Some(file_link) = draft.file_path else {
            // Media is staged before the button question, so this means a lost draft.
            session.enter(ChatState::BotStarted);
            return self.say(chat, Reply::UploadMessageMedia, None).await;
        };

        let msg_id = self
            .app
            .messages
            .insert(NewMessage {
                text: draft.text,
                file_link,
                buttons: draft.buttons,
            })
            .await?;
        tracing::info!(msg_id, "message authored");

        session.enter(ChatState::BotStarted);
        self.confirm(chat, Reply::MessageAdded, Some(self.main_menu()))
            .await
    }

    async fn turn_on(&self, session: &mut Session, chat: ChatId) -> Result<()> {
        let messages = self.app.messages.list().await?;
        if messages.is_empty() {
            session.enter(ChatState::BotStarted);
            return self
                .say(chat, Reply::PleaseAddMessage, Some(self.main_menu()))
                .await;
        }
        let groups = self.app.groups.list().await?;
        if groups.is_empty() {
            session.enter(ChatState::BotStarted);
            return self
                .say(chat, Reply::PleaseAddGroups, Some(self.main_menu()))
                .await;
        }

        let reply = match self
            .app
            .broadcaster
            .start(BroadcastSnapshot { messages, groups })
            .await
        {
            StartOutcome::Started => Reply::BroadcastTurnedOn,
            StartOutcome::AlreadyRunning => Reply::AlreadyRunning,
        };
        self.confirm(chat, reply, None).await
    }

    /// Remove downloaded media that no remaining message points at.
    async fn discard_media(&self, links: Vec<String>) {
        if links.is_empty() {
            return;
        }
        let in_use: HashSet<String> = match self.app.messages.list().await {
            Ok(messages) => messages.into_iter().map(|m| m.file_link).collect(),
            Err(e) => {
                tracing::warn!("media cleanup skipped: {e}");
                return;
            }
        };
        for link in links {
            let path = Path::new(&link);
            if path.parent() == Some(self.app.cfg.files_dir.as_path()) && !in_use.contains(&link) {
                remove_file_quietly(path).await;
            }
        }
    }

    async fn say(&self, chat: ChatId, reply: Reply, keyboard: Option<ReplyKeyboard>) -> Result<()> {
        let text = self.app.catalog.text(reply);
        self.app.messenger.send_text(chat, &text, keyboard).await
    }

    /// Acknowledge a step whose write already committed.
    ///
    /// A failed send is logged and the step stands, so a retry cannot apply it twice.
    async fn confirm(
        &self,
        chat: ChatId,
        reply: Reply,
        keyboard: Option<ReplyKeyboard>,
    ) -> Result<()> {
        let text = self.app.catalog.text(reply);
        self.confirm_text(chat, &text, keyboard).await
    }

    async fn confirm_text(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<ReplyKeyboard>,
    ) -> Result<()> {
        if let Err(e) = self.app.messenger.send_text(chat, text, keyboard).await {
            tracing::warn!(chat_id = chat.0, "confirmation not delivered: {e}");
            self.app
                .error_log
                .record(&format!("confirmation to chat {}", chat.0), &format!("{e:?}"));
        }
        Ok(())
    }

    fn main_menu(&self) -> ReplyKeyboard {
        let c = &self.app.catalog;
        ReplyKeyboard::new(vec![
            vec![c.button(Action::CurrentSettings), c.button(Action::RemoveGroup)],
            vec![
                c.button(Action::AddMessageJson),
                c.button(Action::AddMessage),
                c.button(Action::DeleteMessage),
            ],
            vec![c.button(Action::ChangeInterval), c.button(Action::Run24x7)],
        ])
    }

    fn back_only(&self) -> ReplyKeyboard {
        ReplyKeyboard::single(self.app.catalog.button(Action::Back))
    }

    fn yes_no(&self) -> ReplyKeyboard {
        let c = &self.app.catalog;
        ReplyKeyboard::new(vec![vec![
            c.button(Action::Yes),
            c.button(Action::No),
            c.button(Action::Back),
        ]])
    }

    fn interval_keyboard(&self) -> ReplyKeyboard {
        ReplyKeyboard::new(vec![
            INTERVAL_STEPS.iter().map(|n| format!("➕{n}")).collect(),
            INTERVAL_STEPS.iter().map(|n| format!("➖{n}")).collect(),
            vec![self.app.catalog.button(Action::Back)],
        ])
    }
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// 1-based position typed by the admin.
fn parse_index(text: &str) -> Option<usize> {
    if !is_digits(text) {
        return None;
    }
    text.parse().ok()
}

fn parse_msg_id(text: &str) -> Option<i64> {
    if !is_digits(text) {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::{
        context::test_context,
        domain::Group,
        messaging::types::MediaKind,
        testing::FakeMessenger,
    };

    const ADMIN: UserId = UserId(1);
    const CHAT: ChatId = ChatId(1);

    struct Harness {
        conv: Conversation,
        messenger: Arc<FakeMessenger>,
        root: PathBuf,
    }

    impl Harness {
        fn new(prefix: &str) -> Self {
            let messenger = Arc::new(FakeMessenger::new());
            let (app, root) = test_context(prefix, messenger.clone());
            Self {
                conv: Conversation::new(app),
                messenger,
                root,
            }
        }

        fn app(&self) -> &Arc<AppContext> {
            self.conv.app()
        }

        fn caption(&self, action: Action) -> String {
            self.app().catalog.button(action)
        }

        fn reply(&self, reply: Reply) -> String {
            self.app().catalog.text(reply)
        }

        async fn text(&self, text: &str) {
            self.conv
                .handle(Inbound {
                    chat_id: CHAT,
                    user_id: Some(ADMIN),
                    text: Some(text.to_string()),
                    media: None,
                })
                .await
                .unwrap();
        }

        async fn press(&self, action: Action) {
            let caption = self.caption(action);
            self.text(&caption).await;
        }

        async fn media(&self, media: MediaRef) {
            self.conv
                .handle(Inbound {
                    chat_id: CHAT,
                    user_id: Some(ADMIN),
                    text: None,
                    media: Some(media),
                })
                .await
                .unwrap();
        }

        async fn state(&self) -> ChatState {
            self.conv.state(ADMIN).await
        }

        fn last(&self) -> String {
            self.messenger.last_text().unwrap_or_default()
        }

        async fn add_groups(&self, n: i64) {
            for i in 1..=n {
                self.app()
                    .groups
                    .add(Group::new(ChatId(-100 - i), Some(&format!("group{i}"))))
                    .await
                    .unwrap();
            }
        }
    }

    fn photo() -> MediaRef {
        MediaRef {
            file_id: "photo-file-id".to_string(),
            file_name: None,
            mime_type: None,
            kind: MediaKind::Photo,
        }
    }

    fn json_doc() -> MediaRef {
        MediaRef {
            file_id: "doc-file-id".to_string(),
            file_name: Some("batch.json".to_string()),
            mime_type: Some("application/json".to_string()),
            kind: MediaKind::Document,
        }
    }

    #[tokio::test]
    async fn non_admins_only_get_the_no_access_reply() {
        let h = Harness::new("gcast-conv-auth");
        let stranger = |text: &str| Inbound {
            chat_id: ChatId(42),
            user_id: Some(UserId(42)),
            text: Some(text.to_string()),
            media: None,
        };

        h.conv.handle(stranger("/start")).await.unwrap();
        assert_eq!(h.last(), h.reply(Reply::NoBotAccess));

        let caption = h.caption(Action::AddMessage);
        h.conv.handle(stranger(&caption)).await.unwrap();
        assert_eq!(h.messenger.texts.lock().unwrap().len(), 1);
        assert_eq!(h.conv.state(UserId(42)).await, ChatState::BotStarted);
    }

    #[tokio::test]
    async fn start_shows_the_main_menu() {
        let h = Harness::new("gcast-conv-start");
        h.text("/start").await;
        assert_eq!(h.last(), h.reply(Reply::Welcome));
        let keyboard = h.messenger.last_keyboard().unwrap();
        assert_eq!(keyboard.rows.len(), 3);
        assert_eq!(keyboard.rows[1][1], h.caption(Action::AddMessage));
    }

    #[tokio::test]
    async fn authoring_flow_stores_a_message_with_buttons() {
        let h = Harness::new("gcast-conv-author");
        h.press(Action::AddMessage).await;
        assert_eq!(h.state().await, ChatState::WaitingForMessageText);

        h.text("   ").await;
        assert_eq!(h.last(), h.reply(Reply::EnterMessageText));
        assert_eq!(h.state().await, ChatState::WaitingForMessageText);

        h.text("Big sale today").await;
        assert_eq!(h.state().await, ChatState::WaitingForMessageMedia);

        h.text("no media here").await;
        assert_eq!(h.last(), h.reply(Reply::UploadMessageMedia));
        assert_eq!(h.state().await, ChatState::WaitingForMessageMedia);

        h.media(photo()).await;
        assert_eq!(h.state().await, ChatState::DoYouWannaAddButton);
        {
            let downloads = h.messenger.downloads.lock().unwrap();
            assert_eq!(downloads.len(), 1);
            assert_eq!(downloads[0].file_id, "photo-file-id");
        }

        h.text("maybe").await;
        assert_eq!(h.last(), h.reply(Reply::DoYouWannaAddButton));
        assert_eq!(h.state().await, ChatState::DoYouWannaAddButton);

        h.press(Action::Yes).await;
        assert_eq!(h.state().await, ChatState::WaitingForMessageButtonName);
        h.text("Shop").await;
        assert_eq!(h.state().await, ChatState::WaitingForMessageButtonLink);
        h.text("").await;
        assert_eq!(h.state().await, ChatState::WaitingForMessageButtonLink);
        h.text("https://shop.example.com").await;
        assert_eq!(h.last(), h.reply(Reply::AddAnotherButton));
        assert_eq!(h.state().await, ChatState::DoYouWannaAddButton);

        h.press(Action::No).await;
        assert_eq!(h.last(), h.reply(Reply::MessageAdded));
        assert_eq!(h.state().await, ChatState::BotStarted);

        let stored = h.app().messages.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].msg_id, 1);
        assert_eq!(stored[0].text, "Big sale today");
        assert!(stored[0].file_link.ends_with(".jpg"));
        assert!(stored[0]
            .file_link
            .starts_with(h.root.join("files").to_string_lossy().as_ref()));
        assert!(Path::new(&stored[0].file_link).exists());
        assert_eq!(
            stored[0].buttons,
            vec![Button {
                name: "Shop".to_string(),
                link: "https://shop.example.com".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn menu_command_discards_the_draft() {
        let h = Harness::new("gcast-conv-cancel");
        h.press(Action::AddMessage).await;
        h.text("draft text").await;
        h.media(photo()).await;
        assert_eq!(h.state().await, ChatState::DoYouWannaAddButton);

        h.press(Action::Back).await;
        assert_eq!(h.state().await, ChatState::BotStarted);
        h.press(Action::No).await;
        assert_eq!(h.app().messages.count().await.unwrap(), 0);

        h.press(Action::AddMessage).await;
        h.press(Action::ChangeInterval).await;
        assert_eq!(h.state().await, ChatState::WaitingForIntervalButtonInput);
    }

    #[tokio::test]
    async fn json_batch_is_stored_with_sequential_ids() {
        let h = Harness::new("gcast-conv-json");
        h.press(Action::AddMessageJson).await;
        assert_eq!(h.state().await, ChatState::WaitingForMessageJson);

        h.text("not a file").await;
        assert_eq!(h.last(), h.reply(Reply::UploadJson));
        h.media(photo()).await;
        assert_eq!(h.last(), h.reply(Reply::UploadJson));
        assert_eq!(h.state().await, ChatState::WaitingForMessageJson);

        h.messenger.set_payload(
            br#"{"messages": [
                {"text": ["a1", "a2"], "file": "files/a.jpg",
                 "buttons": [{"name": "1", "link": "https://1"}, {"name": "2", "link": "https://2"}]},
                {"text": ["b"], "file": "files/b.mp4", "buttons": []},
                {"text": ["c"], "file": "files/c.gif", "buttons": []}
            ]}"#,
        );
        h.media(json_doc()).await;
        assert_eq!(h.last(), h.reply(Reply::MessagesAdded));
        assert_eq!(h.state().await, ChatState::BotStarted);

        let stored = h.app().messages.list().await.unwrap();
        let ids: Vec<_> = stored.iter().map(|m| m.msg_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(stored[0].text, "a1\na2");
        let names: Vec<_> = stored[0].buttons.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["1", "2"]);

        let leftovers = std::fs::read_dir(h.root.join("uploads")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn malformed_batch_inserts_nothing_and_keeps_waiting() {
        let h = Harness::new("gcast-conv-badjson");
        h.press(Action::AddMessageJson).await;

        h.messenger
            .set_payload(br#"{"messages": [{"text": ["ok"], "file": "x"}, {"text": "flat"}]}"#);
        h.media(json_doc()).await;

        assert_eq!(h.last(), h.reply(Reply::JsonFormatError));
        assert_eq!(h.state().await, ChatState::WaitingForMessageJson);
        assert_eq!(h.app().messages.count().await.unwrap(), 0);

        let log = std::fs::read_to_string(h.root.join("log.txt")).unwrap();
        assert!(log.contains("message batch batch.json from admin 1"));
    }

    #[tokio::test]
    async fn interval_buttons_adjust_and_keep_state() {
        let h = Harness::new("gcast-conv-interval");
        h.press(Action::ChangeInterval).await;
        let keyboard = h.messenger.last_keyboard().unwrap();
        assert_eq!(keyboard.rows[0], vec!["➕1", "➕10", "➕100"]);

        h.text("➖100").await;
        assert_eq!(h.app().interval.get(), 0);
        assert_eq!(h.last(), "Interval set to 0 sec.");

        h.text("➕10").await;
        h.text("➖3").await;
        assert_eq!(h.app().interval.get(), 7);

        h.text("➕+5").await;
        assert_eq!(h.last(), h.reply(Reply::ButtonInputError));
        h.text("➕abc").await;
        assert_eq!(h.last(), h.reply(Reply::ButtonInputError));
        assert_eq!(h.app().interval.get(), 7);
        assert_eq!(h.state().await, ChatState::WaitingForIntervalButtonInput);
    }

    #[tokio::test]
    async fn remove_group_by_display_number() {
        let h = Harness::new("gcast-conv-groups");
        h.press(Action::RemoveGroup).await;
        assert_eq!(h.last(), h.reply(Reply::NoGroupsToRemove));
        assert_eq!(h.state().await, ChatState::BotStarted);

        h.add_groups(2).await;
        h.press(Action::RemoveGroup).await;
        assert!(h.last().contains("2 ➖ group2"));
        assert_eq!(h.state().await, ChatState::WaitingForDelGroupId);

        for bad in ["5", "0", "two"] {
            h.text(bad).await;
            assert_eq!(h.last(), h.reply(Reply::IncorrectGroupNumber));
            assert_eq!(h.state().await, ChatState::WaitingForDelGroupId);
        }

        h.text("1").await;
        assert_eq!(h.last(), h.reply(Reply::GroupRemoved));
        assert_eq!(h.state().await, ChatState::BotStarted);
        let left = h.app().groups.list().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].username, "group2");
    }

    #[tokio::test]
    async fn delete_flow_handles_single_ids_and_delete_all() {
        let h = Harness::new("gcast-conv-delete");
        for t in ["first\nsecond line", "other"] {
            h.app()
                .messages
                .insert(NewMessage {
                    text: t.to_string(),
                    file_link: "files/x.jpg".to_string(),
                    buttons: vec![],
                })
                .await
                .unwrap();
        }

        h.press(Action::DeleteMessage).await;
        assert!(h.last().contains("1 ➖ first"));
        assert!(!h.last().contains("second line"));

        h.text("abc").await;
        assert_eq!(h.last(), h.reply(Reply::IncorrectMsgId));
        assert_eq!(h.state().await, ChatState::WaitingForDelMsgId);

        h.text("1").await;
        assert_eq!(h.last(), h.reply(Reply::MessageDeleted));
        assert_eq!(h.app().messages.count().await.unwrap(), 1);

        h.press(Action::DeleteMessage).await;
        h.press(Action::DeleteAll).await;
        assert_eq!(h.app().messages.count().await.unwrap(), 0);
        assert_eq!(h.state().await, ChatState::BotStarted);

        let id = h
            .app()
            .messages
            .insert(NewMessage {
                text: "fresh".to_string(),
                file_link: "files/y.jpg".to_string(),
                buttons: vec![],
            })
            .await
            .unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn turning_on_requires_messages_then_groups() {
        let h = Harness::new("gcast-conv-preconditions");
        h.press(Action::Run24x7).await;
        assert_eq!(h.state().await, ChatState::SetRun24x7State);

        h.press(Action::TurnOn).await;
        assert_eq!(h.last(), h.reply(Reply::PleaseAddMessage));
        assert_eq!(h.state().await, ChatState::BotStarted);
        assert_eq!(h.app().broadcaster.run_state().await, RunState::Stopped);

        h.app()
            .messages
            .insert(NewMessage {
                text: "m".to_string(),
                file_link: "files/m.jpg".to_string(),
                buttons: vec![],
            })
            .await
            .unwrap();
        h.press(Action::Run24x7).await;
        h.press(Action::TurnOn).await;
        assert_eq!(h.last(), h.reply(Reply::PleaseAddGroups));
        assert_eq!(h.app().broadcaster.run_state().await, RunState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn turn_on_then_off_controls_the_broadcaster() {
        let h = Harness::new("gcast-conv-run");
        h.add_groups(2).await;
        h.app()
            .messages
            .insert(NewMessage {
                text: "hello".to_string(),
                file_link: "files/h.jpg".to_string(),
                buttons: vec![],
            })
            .await
            .unwrap();

        h.press(Action::Run24x7).await;
        h.press(Action::TurnOn).await;
        assert_eq!(h.last(), h.reply(Reply::BroadcastTurnedOn));
        assert_eq!(h.app().broadcaster.run_state().await, RunState::Started);

        h.press(Action::TurnOn).await;
        assert_eq!(h.last(), h.reply(Reply::AlreadyRunning));

        h.press(Action::CurrentSettings).await;
        assert_eq!(
            h.last(),
            "Groups: @group1 @group2\nStatus: Turned On\nInterval: 60 sec."
        );
        assert_eq!(h.state().await, ChatState::SetRun24x7State);

        h.press(Action::TurnOff).await;
        assert_eq!(h.last(), h.reply(Reply::BroadcastTurnedOff));
        assert_eq!(h.app().broadcaster.run_state().await, RunState::Stopped);

        h.text("something else").await;
        assert_eq!(h.last(), h.reply(Reply::BroadcastTurnedOff));
    }

    #[tokio::test]
    async fn store_failures_get_a_generic_reply_and_keep_state() {
        let h = Harness::new("gcast-conv-failure");
        h.press(Action::AddMessage).await;
        h.text("text").await;
        h.media(photo()).await;

        // Swap the database file for a directory so the next store call fails.
        let db = h.app().cfg.database_path.clone();
        std::fs::remove_file(&db).unwrap();
        std::fs::create_dir_all(&db).unwrap();

        h.press(Action::No).await;
        assert_eq!(h.last(), h.reply(Reply::UnexpectedError));
        assert_eq!(h.state().await, ChatState::DoYouWannaAddButton);
    }

    #[tokio::test]
    async fn lost_confirmation_does_not_store_the_draft_twice() {
        let h = Harness::new("gcast-conv-lost-reply");
        h.press(Action::AddMessage).await;
        h.text("once only").await;
        h.media(photo()).await;

        h.messenger.fail_next_texts(1);
        h.press(Action::No).await;
        assert_eq!(h.state().await, ChatState::BotStarted);
        assert_eq!(h.app().messages.count().await.unwrap(), 1);

        h.press(Action::No).await;
        assert_eq!(h.app().messages.count().await.unwrap(), 1);

        let log = std::fs::read_to_string(h.root.join("log.txt")).unwrap();
        assert!(log.contains("confirmation to chat 1"));
    }

    #[tokio::test]
    async fn lost_confirmation_does_not_store_the_batch_twice() {
        let h = Harness::new("gcast-conv-lost-batch-reply");
        h.press(Action::AddMessageJson).await;
        h.messenger
            .set_payload(br#"{"messages": [{"text": ["a"], "file": "files/a.jpg"}, {"text": ["b"], "file": "files/b.jpg"}]}"#);

        h.messenger.fail_next_texts(1);
        h.media(json_doc()).await;
        assert_eq!(h.state().await, ChatState::BotStarted);
        assert_eq!(h.app().messages.count().await.unwrap(), 2);

        h.media(json_doc()).await;
        assert_eq!(h.app().messages.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_download_leaves_no_partial_file() {
        let h = Harness::new("gcast-conv-partial");
        h.press(Action::AddMessage).await;
        h.text("text").await;

        h.messenger.set_payload(b"half a jpeg");
        h.messenger.fail_downloads();
        h.media(photo()).await;

        assert_eq!(h.last(), h.reply(Reply::UnexpectedError));
        assert_eq!(h.state().await, ChatState::WaitingForMessageMedia);
        let leftovers = std::fs::read_dir(h.root.join("files")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn deleting_messages_removes_their_downloaded_media() {
        let h = Harness::new("gcast-conv-media-cleanup");
        for text in ["first", "second"] {
            h.press(Action::AddMessage).await;
            h.text(text).await;
            h.media(photo()).await;
            h.press(Action::No).await;
        }
        let stored = h.app().messages.list().await.unwrap();
        let first = PathBuf::from(&stored[0].file_link);
        let second = PathBuf::from(&stored[1].file_link);
        assert!(first.exists() && second.exists());

        h.press(Action::DeleteMessage).await;
        h.text("1").await;
        assert!(!first.exists());
        assert!(second.exists());

        h.press(Action::DeleteMessage).await;
        h.press(Action::DeleteAll).await;
        assert!(!second.exists());
        assert_eq!(std::fs::read_dir(h.root.join("files")).unwrap().count(), 0);
    }
}
