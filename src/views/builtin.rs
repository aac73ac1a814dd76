//! The fixed views the application queries.

use super::definition::ViewDefinition;
use super::key::IndexKey;
use crate::types::{Event, KIND_ENCRYPTED_DM, KIND_METADATA, KIND_TEXT_NOTE, TAG_EVENT, TAG_PUBKEY};

/// Profile metadata keyed by author.
pub const PROFILES: &str = "profiles";

/// Public notes keyed by timestamp.
pub const HOMEFEED: &str = "homefeed";

/// Notes keyed by `(referenced pubkey or event id, timestamp)`.
pub const MENTIONS: &str = "mentions";

/// Direct messages keyed by `(party, timestamp)` for each party.
pub const MESSAGES: &str = "messages";

fn map_profiles(event: &Event, emit: &mut Vec<IndexKey>) {
    if event.kind == KIND_METADATA {
        emit.push(IndexKey::from(&event.pubkey));
    }
}

fn map_homefeed(event: &Event, emit: &mut Vec<IndexKey>) {
    if event.kind == KIND_TEXT_NOTE {
        emit.push(IndexKey::Int(event.created_at));
    }
}

fn map_mentions(event: &Event, emit: &mut Vec<IndexKey>) {
    if event.kind != KIND_TEXT_NOTE {
        return;
    }
    for tag in &event.tags {
        if let (Some(name), Some(value)) = (tag.name(), tag.value()) {
            if name == TAG_PUBKEY || name == TAG_EVENT {
                emit.push(IndexKey::pair(value, event.created_at));
            }
        }
    }
}

fn map_messages(event: &Event, emit: &mut Vec<IndexKey>) {
    if event.kind != KIND_ENCRYPTED_DM {
        return;
    }
    for recipient in event.tag_values(TAG_PUBKEY) {
        emit.push(IndexKey::pair(recipient, event.created_at));
    }
    emit.push(IndexKey::pair(&event.pubkey, event.created_at));
}

/// The four views every store maintains.
pub fn default_views() -> [ViewDefinition; 4] {
    [
        ViewDefinition::new(PROFILES, 1, map_profiles),
        ViewDefinition::new(HOMEFEED, 1, map_homefeed),
        ViewDefinition::new(MENTIONS, 1, map_mentions),
        ViewDefinition::new(MESSAGES, 1, map_messages),
    ]
}
