//! Source adapters and per-domain normalization.
//!
//! The chat client owns five interaction logs with different shapes. An
//! implementation of [`SourceAdapter`] hands them over in their native form;
//! [`fetch_interactions`] flattens the one a pass asks for into the shared
//! [`Interaction`] model, ordered by time.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::core::errors::MemoryResult;
use crate::memory::core::ids::EntityRef;
use crate::memory::core::interaction::{Actor, Interaction, InteractionKind};
use crate::memory::core::kinds::SourceDomain;

/// Boxed future type for source adapter calls.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Characters kept from the subject's own post bodies.
const OWN_POST_PREVIEW_CHARS: usize = 100;
/// Characters kept from other people's post bodies.
const OTHER_POST_PREVIEW_CHARS: usize = 50;

/// Which side sent a private chat message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    /// Sent by the counterpart (the human user).
    Sent,
    /// Received from the subject (the character).
    Received,
}

/// Non-text content attached to a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
    /// Photo or image.
    Photo,
    /// Voice note.
    Voice {
        /// Transcript, when available.
        #[serde(default)]
        transcript: Option<String>,
    },
    /// Shared location.
    Location {
        /// Place name, when known.
        #[serde(default)]
        name: Option<String>,
    },
    /// Money transfer.
    Transfer {
        /// Amount transferred.
        amount: f64,
    },
    /// Couple-space activity.
    CoupleSpace {
        /// Activity label.
        #[serde(default)]
        activity: Option<String>,
    },
}

/// One private chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Send time.
    pub timestamp: DateTime<Utc>,
    /// Which side sent it.
    pub direction: MessageDirection,
    /// Text body, if any.
    #[serde(default)]
    pub content: Option<String>,
    /// Non-text payload, if any.
    #[serde(default)]
    pub attachment: Option<Attachment>,
    /// System/meta marker.
    #[serde(default)]
    pub is_system: bool,
}

/// One group chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupMessage {
    /// Send time.
    pub timestamp: DateTime<Utc>,
    /// Sender entity id.
    pub sender_id: String,
    /// Text body, if any.
    #[serde(default)]
    pub content: Option<String>,
    /// Non-text payload, if any.
    #[serde(default)]
    pub attachment: Option<Attachment>,
    /// System/meta marker.
    #[serde(default)]
    pub is_system: bool,
}

/// A comment or reply under a post or thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Author entity id.
    pub author_id: String,
    /// Reply body.
    pub content: String,
}

/// One social-feed post with its reactions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedPost {
    /// Post time.
    pub timestamp: DateTime<Utc>,
    /// Author entity id.
    pub author_id: String,
    /// Author display name.
    pub author_name: String,
    /// Post body.
    pub content: String,
    /// Comments under the post.
    #[serde(default)]
    pub comments: Vec<Reply>,
    /// Ids of entities that liked the post.
    #[serde(default)]
    pub likes: Vec<String>,
}

/// One forum thread with its replies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForumThread {
    /// Thread creation time.
    pub timestamp: DateTime<Utc>,
    /// Author entity id.
    pub author_id: String,
    /// Author display name.
    pub author_name: String,
    /// Thread title.
    pub title: String,
    /// Opening post body.
    pub content: String,
    /// Replies in the thread.
    #[serde(default)]
    pub replies: Vec<Reply>,
    /// Ids of entities that liked the thread.
    #[serde(default)]
    pub likes: Vec<String>,
}

/// A titled summary of an offline session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OfflineRecord {
    /// Session time.
    pub timestamp: DateTime<Utc>,
    /// Short title.
    pub title: String,
    /// Free-text account of the session.
    pub summary: String,
}

/// Access to the chat client's interaction logs for one entity.
///
/// Every method defaults to an empty log, so an implementation only needs to
/// provide the domains it actually has.
pub trait SourceAdapter: Send + Sync {
    /// Private chat between the entity and the user, oldest first.
    ///
    /// # Errors
    /// Returns an error if the log cannot be read.
    fn chat_messages<'a>(
        &'a self,
        _entity: &'a EntityRef,
    ) -> SourceFuture<'a, MemoryResult<Vec<ChatMessage>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    /// Group chat messages from every group the entity is in.
    ///
    /// # Errors
    /// Returns an error if the log cannot be read.
    fn group_messages<'a>(
        &'a self,
        _entity: &'a EntityRef,
    ) -> SourceFuture<'a, MemoryResult<Vec<GroupMessage>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    /// Social-feed posts.
    ///
    /// # Errors
    /// Returns an error if the feed cannot be read.
    fn feed_posts<'a>(
        &'a self,
        _entity: &'a EntityRef,
    ) -> SourceFuture<'a, MemoryResult<Vec<FeedPost>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    /// Forum threads.
    ///
    /// # Errors
    /// Returns an error if the forum cannot be read.
    fn forum_threads<'a>(
        &'a self,
        _entity: &'a EntityRef,
    ) -> SourceFuture<'a, MemoryResult<Vec<ForumThread>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    /// Offline-session records.
    ///
    /// # Errors
    /// Returns an error if the records cannot be read.
    fn offline_records<'a>(
        &'a self,
        _entity: &'a EntityRef,
    ) -> SourceFuture<'a, MemoryResult<Vec<OfflineRecord>>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

/// Read one domain's log and normalize it, oldest first.
///
/// # Errors
/// Propagates the adapter's error.
pub async fn fetch_interactions(
    adapter: &dyn SourceAdapter,
    entity: &EntityRef,
    domain: SourceDomain,
) -> MemoryResult<Vec<Interaction>> {
    let mut interactions = match domain {
        SourceDomain::Chat => normalize_chat(adapter.chat_messages(entity).await?),
        SourceDomain::GroupChat => {
            normalize_group(&entity.id, adapter.group_messages(entity).await?)
        }
        SourceDomain::SocialFeed => normalize_feed(&entity.id, adapter.feed_posts(entity).await?),
        SourceDomain::Forum => normalize_forum(&entity.id, adapter.forum_threads(entity).await?),
        SourceDomain::Offline => normalize_offline(adapter.offline_records(entity).await?),
    };
    interactions.sort_by_key(|interaction| interaction.timestamp);
    Ok(interactions)
}

/// Private chat: `Sent` is the counterpart, `Received` the subject.
#[must_use]
pub fn normalize_chat(messages: Vec<ChatMessage>) -> Vec<Interaction> {
    messages
        .into_iter()
        .map(|msg| {
            let actor = match msg.direction {
                MessageDirection::Sent => Actor::Counterpart,
                MessageDirection::Received => Actor::Subject,
            };
            Interaction {
                actor,
                timestamp: msg.timestamp,
                kind: message_kind(msg.content, msg.attachment, msg.is_system),
            }
        })
        .collect()
}

/// Group chat, reduced to the subject's own contributions.
#[must_use]
pub fn normalize_group(entity_id: &str, messages: Vec<GroupMessage>) -> Vec<Interaction> {
    messages
        .into_iter()
        .filter(|msg| msg.sender_id == entity_id)
        .map(|msg| Interaction {
            actor: Actor::Subject,
            timestamp: msg.timestamp,
            kind: message_kind(msg.content, msg.attachment, msg.is_system),
        })
        .collect()
}

/// Social feed: the subject's posts, plus posts the subject liked or commented on.
#[must_use]
pub fn normalize_feed(entity_id: &str, posts: Vec<FeedPost>) -> Vec<Interaction> {
    posts
        .into_iter()
        .filter_map(|post| {
            let text = if post.author_id == entity_id {
                format!(
                    "[feed] I posted: \"{}\"",
                    preview(&post.content, OWN_POST_PREVIEW_CHARS)
                )
            } else {
                let mut text = format!(
                    "[feed] {} posted: \"{}\"",
                    post.author_name,
                    preview(&post.content, OTHER_POST_PREVIEW_CHARS)
                );
                if !append_reactions(&mut text, entity_id, &post.comments, &post.likes, "commented") {
                    return None;
                }
                text
            };
            Some(Interaction::subject(post.timestamp, text))
        })
        .collect()
}

/// Forum: the subject's threads, plus threads the subject replied to or liked.
#[must_use]
pub fn normalize_forum(entity_id: &str, threads: Vec<ForumThread>) -> Vec<Interaction> {
    threads
        .into_iter()
        .filter_map(|thread| {
            let text = if thread.author_id == entity_id {
                format!(
                    "[forum] I started \"{}\": \"{}\"",
                    thread.title,
                    preview(&thread.content, OWN_POST_PREVIEW_CHARS)
                )
            } else {
                let mut text = format!(
                    "[forum] {} started \"{}\": \"{}\"",
                    thread.author_name,
                    thread.title,
                    preview(&thread.content, OTHER_POST_PREVIEW_CHARS)
                );
                if !append_reactions(&mut text, entity_id, &thread.replies, &thread.likes, "replied") {
                    return None;
                }
                text
            };
            Some(Interaction::subject(thread.timestamp, text))
        })
        .collect()
}

/// Offline sessions: one summary line per record.
#[must_use]
pub fn normalize_offline(records: Vec<OfflineRecord>) -> Vec<Interaction> {
    records
        .into_iter()
        .map(|record| {
            let text = match (record.title.trim(), record.summary.trim()) {
                ("", summary) => summary.to_string(),
                (title, "") => title.to_string(),
                (title, summary) => format!("{title}: {summary}"),
            };
            Interaction::subject(record.timestamp, text)
        })
        .collect()
}

/// Content first, then attachment; no derivable content means a system marker.
fn message_kind(
    content: Option<String>,
    attachment: Option<Attachment>,
    is_system: bool,
) -> InteractionKind {
    if let Some(text) = content.filter(|text| !text.trim().is_empty()) {
        return InteractionKind::Text { text };
    }
    if is_system {
        return InteractionKind::System;
    }
    match attachment {
        Some(Attachment::Photo) => InteractionKind::Photo,
        Some(Attachment::Voice { transcript }) => InteractionKind::Voice { transcript },
        Some(Attachment::Location { name }) => InteractionKind::Location { name },
        Some(Attachment::Transfer { amount }) => InteractionKind::Transfer { amount },
        Some(Attachment::CoupleSpace { activity }) => InteractionKind::CoupleSpace { activity },
        None => InteractionKind::System,
    }
}

/// Append the subject's reactions; returns false when there were none.
fn append_reactions(
    text: &mut String,
    entity_id: &str,
    replies: &[Reply],
    likes: &[String],
    verb: &str,
) -> bool {
    let own: Vec<&str> = replies
        .iter()
        .filter(|reply| reply.author_id == entity_id)
        .map(|reply| reply.content.as_str())
        .collect();
    let liked = likes.iter().any(|id| id == entity_id);

    if !own.is_empty() {
        text.push_str(&format!("\nI {verb}: {}", own.join("; ")));
    }
    if liked {
        text.push_str("\nI liked it");
    }
    !own.is_empty() || liked
}

fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let mut out: String = trimmed.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn post(author: &str, likes: &[&str], comments: &[(&str, &str)]) -> FeedPost {
        FeedPost {
            timestamp: ts(1_000),
            author_id: author.to_string(),
            author_name: format!("name-{author}"),
            content: "Sunset at the pier".to_string(),
            comments: comments
                .iter()
                .map(|(author_id, content)| Reply {
                    author_id: (*author_id).to_string(),
                    content: (*content).to_string(),
                })
                .collect(),
            likes: likes.iter().map(|id| (*id).to_string()).collect(),
        }
    }

    #[test]
    fn test_chat_direction_maps_to_actor() {
        let messages = vec![
            ChatMessage {
                timestamp: ts(1),
                direction: MessageDirection::Sent,
                content: Some("hi".to_string()),
                attachment: None,
                is_system: false,
            },
            ChatMessage {
                timestamp: ts(2),
                direction: MessageDirection::Received,
                content: None,
                attachment: Some(Attachment::Photo),
                is_system: false,
            },
        ];
        let out = normalize_chat(messages);
        assert_eq!(out[0].actor, Actor::Counterpart);
        assert_eq!(out[1].actor, Actor::Subject);
        assert_eq!(out[1].kind, InteractionKind::Photo);
    }

    #[test]
    fn test_system_message_without_content_is_system() {
        let kind = message_kind(None, None, true);
        assert_eq!(kind, InteractionKind::System);
        let kind = message_kind(Some("  ".to_string()), None, false);
        assert_eq!(kind, InteractionKind::System);
    }

    #[test]
    fn test_group_keeps_only_subject_messages() {
        let messages = vec![
            GroupMessage {
                timestamp: ts(1),
                sender_id: "other".to_string(),
                content: Some("hello all".to_string()),
                attachment: None,
                is_system: false,
            },
            GroupMessage {
                timestamp: ts(2),
                sender_id: "me".to_string(),
                content: Some("hey!".to_string()),
                attachment: None,
                is_system: false,
            },
        ];
        let out = normalize_group("me", messages);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].render_text().as_deref(), Some("hey!"));
    }

    #[test]
    fn test_feed_filters_unrelated_posts() {
        let posts = vec![
            post("me", &[], &[]),
            post("other", &[], &[]),
            post("other", &["me"], &[("me", "Gorgeous!")]),
        ];
        let out = normalize_feed("me", posts);
        assert_eq!(out.len(), 2);
        let own = out[0].render_text().unwrap();
        assert!(own.starts_with("[feed] I posted"));
        let reacted = out[1].render_text().unwrap();
        assert!(reacted.contains("I commented: Gorgeous!"));
        assert!(reacted.contains("I liked it"));
    }

    #[test]
    fn test_forum_reply_is_kept() {
        let threads = vec![ForumThread {
            timestamp: ts(5),
            author_id: "other".to_string(),
            author_name: "Kai".to_string(),
            title: "Best ramen".to_string(),
            content: "Where do you all go?".to_string(),
            replies: vec![Reply {
                author_id: "me".to_string(),
                content: "The place on 5th".to_string(),
            }],
            likes: Vec::new(),
        }];
        let out = normalize_forum("me", threads);
        assert_eq!(out.len(), 1);
        assert!(out[0].render_text().unwrap().contains("I replied: The place on 5th"));
    }

    #[test]
    fn test_offline_joins_title_and_summary() {
        let out = normalize_offline(vec![OfflineRecord {
            timestamp: ts(9),
            title: "Museum".to_string(),
            summary: "Spent the afternoon at the museum.".to_string(),
        }]);
        assert_eq!(
            out[0].render_text().as_deref(),
            Some("Museum: Spent the afternoon at the museum.")
        );
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "x".repeat(120);
        let short = preview(&long, 100);
        assert_eq!(short.chars().count(), 103);
        assert!(short.ends_with("..."));
    }

    struct ChatOnly;

    impl SourceAdapter for ChatOnly {
        fn chat_messages<'a>(
            &'a self,
            _entity: &'a EntityRef,
        ) -> SourceFuture<'a, MemoryResult<Vec<ChatMessage>>> {
            Box::pin(async {
                Ok(vec![
                    ChatMessage {
                        timestamp: ts(20),
                        direction: MessageDirection::Received,
                        content: Some("later".to_string()),
                        attachment: None,
                        is_system: false,
                    },
                    ChatMessage {
                        timestamp: ts(10),
                        direction: MessageDirection::Sent,
                        content: Some("earlier".to_string()),
                        attachment: None,
                        is_system: false,
                    },
                ])
            })
        }
    }

    #[tokio::test]
    async fn test_fetch_sorts_by_time_and_defaults_empty() {
        let entity = EntityRef::new("me", "Mira");
        let chat = fetch_interactions(&ChatOnly, &entity, SourceDomain::Chat)
            .await
            .unwrap();
        assert_eq!(chat[0].timestamp, ts(10));
        let forum = fetch_interactions(&ChatOnly, &entity, SourceDomain::Forum)
            .await
            .unwrap();
        assert!(forum.is_empty());
    }
}
