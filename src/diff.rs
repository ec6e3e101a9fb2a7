//! Pure change detection between the stored state and a fresh fetch.
//!
//! Nothing here does I/O. Output order is deterministic: it follows the
//! iteration order of the fetched (or first) input.

use std::collections::{BTreeSet, HashSet};

use crate::source::{Account, Identified, ProfileAttributes};
use crate::store::ProfileRecord;

/// Items of `fetched` whose id is not in `seen`, in fetch order.
///
/// Only `seen` is consulted: an id repeated inside `fetched` is returned at
/// every position.
pub fn new_items<T: Identified>(seen: &[String], fetched: Vec<T>) -> Vec<T> {
    let known: HashSet<&str> = seen.iter().map(String::as_str).collect();
    fetched
        .into_iter()
        .filter(|item| !known.contains(item.id()))
        .collect()
}

/// Names present in `a` with no same-named account in `b`, in `a`'s order.
///
/// With `a = following` and `b = followers` this is "following but not
/// followed back".
pub fn set_difference(a: &[Account], b: &[Account]) -> Vec<String> {
    let b_names: HashSet<&str> = b.iter().map(|account| account.name.as_str()).collect();
    a.iter()
        .filter(|account| !b_names.contains(account.name.as_str()))
        .map(|account| account.name.clone())
        .collect()
}

/// Added and removed ids between two lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Set delta from `old` to `new`. Used for logging only.
pub fn log_delta<S: AsRef<str>>(old: &[S], new: &[S]) -> Delta {
    let old: BTreeSet<&str> = old.iter().map(AsRef::as_ref).collect();
    let new: BTreeSet<&str> = new.iter().map(AsRef::as_ref).collect();
    Delta {
        added: new.difference(&old).map(|s| (*s).to_owned()).collect(),
        removed: old.difference(&new).map(|s| (*s).to_owned()).collect(),
    }
}

/// Names of the accounts in a list, for [`log_delta`].
pub fn account_names(accounts: &[Account]) -> Vec<&str> {
    accounts.iter().map(|account| account.name.as_str()).collect()
}

/// A scalar profile attribute that differs from the previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeChange {
    FollowersCount { from: u64, to: u64 },
    FollowingCount { from: u64, to: u64 },
    Bio { from: String, to: String },
    AvatarUrl { from: Option<String>, to: Option<String> },
}

impl std::fmt::Display for AttributeChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FollowersCount { from, to } => write!(f, "followers {from} -> {to}"),
            Self::FollowingCount { from, to } => write!(f, "following {from} -> {to}"),
            Self::Bio { from, to } => write!(f, "bio {from:?} -> {to:?}"),
            Self::AvatarUrl { .. } => f.write_str("profile picture changed"),
        }
    }
}

/// Scalar changes between the latest stored record and fresh attributes.
pub fn attribute_changes(
    previous: &ProfileRecord,
    current: &ProfileAttributes,
) -> Vec<AttributeChange> {
    let mut changes = Vec::new();
    if previous.followers_count != current.followers_count {
        changes.push(AttributeChange::FollowersCount {
            from: previous.followers_count,
            to: current.followers_count,
        });
    }
    if previous.following_count != current.following_count {
        changes.push(AttributeChange::FollowingCount {
            from: previous.following_count,
            to: current.following_count,
        });
    }
    if previous.bio != current.bio {
        changes.push(AttributeChange::Bio {
            from: previous.bio.clone(),
            to: current.bio.clone(),
        });
    }
    if previous.profile_pic_url != current.avatar_url {
        changes.push(AttributeChange::AvatarUrl {
            from: previous.profile_pic_url.clone(),
            to: current.avatar_url.clone(),
        });
    }
    changes
}

/// Snapshot record for one cycle.
pub fn profile_record(attributes: &ProfileAttributes) -> ProfileRecord {
    ProfileRecord {
        followers_count: attributes.followers_count,
        following_count: attributes.following_count,
        bio: attributes.bio.clone(),
        profile_pic_url: attributes.avatar_url.clone(),
        followers: attributes.followers.clone(),
        following: attributes.following.clone(),
        not_following_back: set_difference(&attributes.following, &attributes.followers),
    }
}
