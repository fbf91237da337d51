use thiserror::Error;

/// Failures the HTTP layer needs to branch on, plus opaque store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    UserNotFound,
    #[error("conversation not found")]
    ConversationNotFound,
    #[error("message not found")]
    MessageNotFound,
    #[error("comment not found")]
    CommentNotFound,
    #[error("group not found")]
    GroupNotFound,
    #[error("user is not a member of this conversation")]
    NotMember,
    #[error("only the sender may delete this message")]
    NotSender,
    #[error("name is already taken")]
    NameTaken,
    #[error("user already reacted to this message")]
    DuplicateReaction,
    #[error("database lock poisoned")]
    LockPoisoned,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// UNIQUE or PRIMARY KEY constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}
