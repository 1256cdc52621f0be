//! Allow-list stores and the access gate.
//!
//! Each store is a flat text file with one identifier per line,
//! append-only. Membership checks re-read the file on every call so
//! they observe appends made after startup. Appends are not locked
//! against each other and duplicates are not deduplicated; both are
//! harmless for a membership scan and match expected single-operator
//! usage.

use std::fs::OpenOptions;
use std::io::{self, Write as _};
use std::path::PathBuf;

use tracing::warn;

use crate::error::{BotError, BotResult};

/// One append-only identifier list backed by a flat file.
#[derive(Debug, Clone)]
pub struct AllowListStore {
    path: PathBuf,
}

impl AllowListStore {
    /// Create a store backed by `path`. The file is created lazily on
    /// the first append; until then it reads as empty.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Whether `id` appears in the list. Reads the whole file fresh.
    pub fn contains(&self, id: &str) -> io::Result<bool> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(contents.lines().any(|line| line.trim() == id))
    }

    /// Append `id` as a newline-terminated entry.
    pub fn append(&self, id: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{id}")
    }
}

/// Kind of chat a command was issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    /// One-to-one chat.
    Private,
    /// Group or supergroup.
    Group,
}

/// Resolved target of a `/allow` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantTarget {
    /// Grant a user identifier.
    User(String),
    /// Grant the current chat as a group.
    Group(String),
}

/// Resolve the target of a grant command.
///
/// Priority order: the author of the replied-to message, then the
/// literal argument `group` (current chat, multi-user chats only),
/// then any other argument as a literal identifier.
pub fn resolve_grant_target(
    reply_author: Option<&str>,
    arg: Option<&str>,
    chat_kind: ChatKind,
    chat_id: i64,
) -> BotResult<GrantTarget> {
    if let Some(author) = reply_author {
        return Ok(GrantTarget::User(author.to_string()));
    }
    match arg {
        Some("group") => match chat_kind {
            ChatKind::Group => Ok(GrantTarget::Group(chat_id.to_string())),
            ChatKind::Private => Err(BotError::NotAGroup),
        },
        Some(id) => Ok(GrantTarget::User(id.to_string())),
        None => Err(BotError::MissingArgument),
    }
}

/// Decides whether a sender or chat may use the bot, and records grants.
#[derive(Debug, Clone)]
pub struct AccessGate {
    users: AllowListStore,
    groups: AllowListStore,
    enforce: bool,
    owner_id: i64,
}

impl AccessGate {
    /// Create a gate over the two stores.
    #[must_use]
    pub fn new(users: AllowListStore, groups: AllowListStore, enforce: bool, owner_id: i64) -> Self {
        Self {
            users,
            groups,
            enforce,
            owner_id,
        }
    }

    /// Whether `user_id` in `chat_id` may use the bot.
    ///
    /// Always true when enforcement is off. Otherwise both stores are
    /// re-read so grants issued since the last call are honored. A
    /// store that cannot be read counts as "not listed".
    #[must_use]
    pub fn is_allowed(&self, user_id: i64, chat_id: i64) -> bool {
        if !self.enforce {
            return true;
        }
        self.listed(&self.users, &user_id.to_string())
            || self.listed(&self.groups, &chat_id.to_string())
    }

    fn listed(&self, store: &AllowListStore, id: &str) -> bool {
        match store.contains(id) {
            Ok(listed) => listed,
            Err(e) => {
                warn!(path = ?store.path, error = %e, "failed to read allow-list; denying");
                false
            },
        }
    }

    /// Check that `actor_id` may issue grant commands at all.
    ///
    /// Checked before the grant target is even resolved, so an
    /// unauthorized caller gets `Unauthorized` rather than a complaint
    /// about their arguments.
    pub fn authorize_grant(&self, actor_id: i64) -> BotResult<()> {
        if !self.enforce {
            return Err(BotError::FeatureDisabled);
        }
        if actor_id != self.owner_id {
            return Err(BotError::Unauthorized);
        }
        Ok(())
    }

    /// Record a grant. Only the owner may do this, and only while
    /// enforcement is on.
    pub fn grant(&self, actor_id: i64, target: &GrantTarget) -> BotResult<()> {
        self.authorize_grant(actor_id)?;
        match target {
            GrantTarget::User(id) => self.users.append(id)?,
            GrantTarget::Group(id) => self.groups.append(id)?,
        }
        Ok(())
    }
}
