//! Lazy domain entities.
//!
//! Every entity wraps a [`ThingData`]: the attribute map the server supplied,
//! the kind tag, a populated flag, and a back-reference to the owning
//! session. Attributes missing from the map can be fetched on demand with
//! `load`, which issues the entity's `about` request through the pipeline
//! and merges the result.
//!
//! Entities serialise as their raw attribute map; the session reference is
//! dropped and must be re-bound with `bind` before any lazy load. Neither
//! serialising nor deserialising touches the network.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::RedditClient;
use crate::errors::RedditError;

/// Shared core of every domain entity.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ThingData {
    #[serde(skip)]
    client: Option<RedditClient>,
    kind: String,
    attrs: Map<String, Value>,
    populated: bool,
    /// The undecoded server envelope, retained when `store_json_result` is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<Value>,
}

impl ThingData {
    pub fn new(kind: &str, attrs: Map<String, Value>, client: Option<&RedditClient>) -> Self {
        Self {
            client: client.cloned(),
            kind: kind.to_string(),
            attrs,
            populated: false,
            raw: None,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }

    pub fn populated(&self) -> bool {
        self.populated
    }

    pub fn set_raw(&mut self, raw: Value) {
        self.raw = Some(raw);
    }

    pub fn raw(&self) -> Option<&Value> {
        self.raw.as_ref()
    }

    /// Attach a session after deserialisation.
    pub fn bind(&mut self, client: &RedditClient) {
        self.client = Some(client.clone());
    }

    pub fn client(&self) -> Result<&RedditClient, RedditError> {
        self.client.as_ref().ok_or_else(|| {
            RedditError::Client(
                "entity is not bound to a session; call bind() first".to_string(),
            )
        })
    }

    /// An attribute as supplied by the server, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(Value::as_str)
    }

    /// The id36 of this thing.
    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    /// The stable `kind_id36` identity, when enough is known to form it.
    pub fn fullname(&self) -> Option<String> {
        if let Some(id) = self.get_str("id") {
            return Some(format!("{}_{}", self.kind, id));
        }
        // Some envelopes carry only the fullname.
        match self.get_str("name") {
            Some(name) if name.starts_with(&format!("{}_", self.kind)) => Some(name.to_string()),
            _ => None,
        }
    }

    /// Fill in attributes absent from the map. Used by lazy loads.
    pub fn merge(&mut self, attrs: Map<String, Value>) {
        for (key, value) in attrs {
            self.attrs.entry(key).or_insert(value);
        }
        self.populated = true;
    }

    /// Replace the attribute map wholesale. Used by refresh.
    pub fn replace(&mut self, attrs: Map<String, Value>) {
        self.attrs = attrs;
        self.populated = true;
    }

    /// An attribute that must exist once the entity is populated, fetching
    /// from `about_path` at most once.
    pub async fn demand(&mut self, name: &str, about_path: &str) -> Result<Value, RedditError> {
        if let Some(value) = self.attrs.get(name) {
            return Ok(value.clone());
        }
        if !self.populated {
            self.load_about(about_path).await?;
            if let Some(value) = self.attrs.get(name) {
                return Ok(value.clone());
            }
        }
        Err(RedditError::Client(format!(
            "'{}' object has no attribute '{}'",
            self.kind, name
        )))
    }

    /// Fetch `about_path` and merge the returned attributes.
    pub async fn load_about(&mut self, about_path: &str) -> Result<(), RedditError> {
        let client = self.client()?.clone();
        debug!("Lazy-loading {} via {}", self.kind, about_path);
        let value = client.get_value(about_path, &[]).await?;
        self.merge(extract_data(&self.kind, value)?);
        Ok(())
    }

    /// Fetch `about_path` and replace the attributes wholesale.
    pub async fn refresh_about(&mut self, about_path: &str) -> Result<(), RedditError> {
        let client = self.client()?.clone();
        let value = client.get_value(about_path, &[]).await?;
        self.replace(extract_data(&self.kind, value)?);
        Ok(())
    }

    fn identity_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        match self.fullname() {
            Some(fullname) => fullname.hash(&mut hasher),
            None => self.kind.hash(&mut hasher),
        }
        hasher.finish()
    }
}

// Equality is by fullname when both sides have one; otherwise the attribute
// maps decide.
impl PartialEq for ThingData {
    fn eq(&self, other: &Self) -> bool {
        match (self.fullname(), other.fullname()) {
            (Some(a), Some(b)) => a == b,
            _ => self.kind == other.kind && self.attrs == other.attrs,
        }
    }
}

impl Hash for ThingData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.identity_hash());
    }
}

/// Pull the `data` map out of an about-style response. Handles bare
/// `{"kind": .., "data": {..}}` envelopes, single-child listings, and the
/// two-part array a comments page returns.
pub(crate) fn extract_data(
    kind: &str,
    value: Value,
) -> Result<Map<String, Value>, RedditError> {
    let value = match value {
        Value::Array(mut parts) if !parts.is_empty() => parts.remove(0),
        other => other,
    };
    let value = match value {
        Value::Object(mut map) => {
            if map.get("kind").and_then(Value::as_str) == Some("Listing") {
                // /api/info and message lookups return a one-child listing.
                let child = map
                    .get_mut("data")
                    .and_then(|d| d.get_mut("children"))
                    .and_then(|c| c.get_mut(0))
                    .map(Value::take);
                match child {
                    Some(child) => child,
                    None => {
                        return Err(RedditError::Client(format!(
                            "empty listing while loading a {}",
                            kind
                        )))
                    }
                }
            } else {
                Value::Object(map)
            }
        }
        other => other,
    };

    match value {
        Value::Object(mut map) => {
            if let Some(Value::Object(data)) = map.remove("data") {
                Ok(data)
            } else {
                Ok(map)
            }
        }
        other => Err(RedditError::Client(format!(
            "expected an object while loading a {}, got {}",
            kind, other
        ))),
    }
}

macro_rules! common_entity_methods {
    () => {
        pub fn data(&self) -> &ThingData {
            &self.data
        }

        pub fn data_mut(&mut self) -> &mut ThingData {
            &mut self.data
        }

        /// Re-attach a session after deserialisation.
        pub fn bind(&mut self, client: &RedditClient) {
            self.data.bind(client);
        }

        pub fn fullname(&self) -> Option<String> {
            self.data.fullname()
        }

        pub fn get(&self, name: &str) -> Option<&Value> {
            self.data.get(name)
        }

        /// Fetch any missing attributes from the server, at most once.
        pub async fn load(&mut self) -> Result<(), RedditError> {
            let path = self.about_path()?;
            self.data.load_about(&path).await
        }

        /// Re-fetch this entity, replacing its attributes wholesale. Evicts
        /// the cached about response first so the fetch is fresh.
        pub async fn refresh(&mut self) -> Result<(), RedditError> {
            let path = self.about_path()?;
            {
                let client = self.data.client()?;
                client.evict_path(&path);
            }
            self.data.refresh_about(&path).await
        }

        /// An attribute that must exist once populated; lazily loads once.
        pub async fn attr(&mut self, name: &str) -> Result<Value, RedditError> {
            let path = self.about_path()?;
            self.data.demand(name, &path).await
        }
    };
}

/// A comment on a submission or another comment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub(crate) data: ThingData,
}

impl Comment {
    common_entity_methods!();

    pub fn new(data: ThingData) -> Self {
        Self { data }
    }

    fn about_path(&self) -> Result<String, RedditError> {
        let fullname = self.fullname().ok_or_else(|| {
            RedditError::Client("comment has neither id nor fullname".to_string())
        })?;
        Ok(format!("/api/info?id={}", fullname))
    }

    /// The comment author, lazily constructed from the server's name string.
    pub fn author(&self) -> Option<Redditor> {
        promote_redditor(&self.data)
    }

    /// The subreddit this comment lives in.
    pub fn subreddit(&self) -> Option<Subreddit> {
        promote_subreddit(&self.data)
    }

    /// Fullname of the submission this comment belongs to.
    pub fn link_id(&self) -> Option<&str> {
        self.data.get_str("link_id")
    }

    /// Fullname of the direct parent (a comment or the submission).
    pub fn parent_id(&self) -> Option<&str> {
        self.data.get_str("parent_id")
    }

    pub fn body(&self) -> Option<&str> {
        self.data.get_str("body")
    }

    /// The raw replies envelope. The server sends an empty string instead of
    /// an empty listing for leaf comments.
    pub fn replies_value(&self) -> Option<&Value> {
        self.data.get("replies")
    }

    /// Normalise `replies` to a listing-shaped value, never the empty-string
    /// sentinel. Returns the envelope that was present, if any.
    pub(crate) fn take_replies(&mut self) -> Option<Value> {
        let current = self.data.attrs.remove("replies");
        self.data
            .attrs
            .insert("replies".to_string(), Value::Array(Vec::new()));
        match current {
            Some(Value::String(_)) | None => None,
            Some(value) => Some(value),
        }
    }

    /// Reply to this comment.
    pub async fn reply(&self, text: &str) -> Result<super::Thing, RedditError> {
        let client = self.data.client()?.clone();
        let parent = self.fullname().ok_or_else(|| {
            RedditError::Client("cannot reply to a comment without a fullname".to_string())
        })?;
        client
            .post(
                "/api/comment",
                &[
                    ("thing_id".to_string(), parent),
                    ("text".to_string(), text.to_string()),
                ],
            )
            .await
    }
}

/// A private message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub(crate) data: ThingData,
}

impl Message {
    common_entity_methods!();

    pub fn new(data: ThingData) -> Self {
        Self { data }
    }

    fn about_path(&self) -> Result<String, RedditError> {
        let id = self
            .data
            .id()
            .ok_or_else(|| RedditError::Client("message has no id".to_string()))?;
        Ok(format!("/message/messages/{}", id))
    }

    pub fn author(&self) -> Option<Redditor> {
        promote_redditor(&self.data)
    }

    pub fn subject(&self) -> Option<&str> {
        self.data.get_str("subject")
    }

    pub fn body(&self) -> Option<&str> {
        self.data.get_str("body")
    }
}

/// A reddit account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Redditor {
    pub(crate) data: ThingData,
}

impl Redditor {
    common_entity_methods!();

    pub fn new(data: ThingData) -> Self {
        Self { data }
    }

    /// A lazy redditor known only by username.
    pub fn from_name(client: &RedditClient, name: &str) -> Self {
        let mut attrs = Map::new();
        attrs.insert("name".to_string(), Value::String(name.to_string()));
        Self {
            data: ThingData::new(&client.config().kinds.redditor, attrs, Some(client)),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.data.get_str("name")
    }

    fn about_path(&self) -> Result<String, RedditError> {
        let name = self
            .name()
            .ok_or_else(|| RedditError::Client("redditor has no name".to_string()))?;
        Ok(format!("/user/{}/about", name))
    }

    /// New items this redditor has posted, newest first.
    pub fn overview(&self) -> Result<crate::listing::ListingGenerator, RedditError> {
        let client = self.data.client()?.clone();
        let name = self
            .name()
            .ok_or_else(|| RedditError::Client("redditor has no name".to_string()))?;
        Ok(client.listing(&format!("/user/{}/overview", name), &[]))
    }
}

/// A submission, optionally carrying its resolved comment forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub(crate) data: ThingData,
    #[serde(skip)]
    pub(crate) comment_forest: Option<crate::comments::CommentForest>,
}

impl Submission {
    common_entity_methods!();

    pub fn new(data: ThingData) -> Self {
        Self {
            data,
            comment_forest: None,
        }
    }

    fn about_path(&self) -> Result<String, RedditError> {
        let id = self
            .data
            .id()
            .ok_or_else(|| RedditError::Client("submission has no id".to_string()))?;
        Ok(format!("/comments/{}", id))
    }

    pub fn title(&self) -> Option<&str> {
        self.data.get_str("title")
    }

    pub fn url(&self) -> Option<&str> {
        self.data.get_str("url")
    }

    pub fn permalink(&self) -> Option<&str> {
        self.data.get_str("permalink")
    }

    pub fn author(&self) -> Option<Redditor> {
        promote_redditor(&self.data)
    }

    pub fn subreddit(&self) -> Option<Subreddit> {
        promote_subreddit(&self.data)
    }

    /// The short link for this submission, if the site has a short domain.
    pub fn short_link(&self) -> Result<String, RedditError> {
        let client = self.data.client()?;
        let id = self
            .data
            .id()
            .ok_or_else(|| RedditError::Client("submission has no id".to_string()))?;
        Ok(format!("{}/{}", client.config().short_url()?, id))
    }

    /// The comment forest for this submission, fetching it on first access.
    pub async fn comments(&mut self) -> Result<&mut crate::comments::CommentForest, RedditError> {
        if self.comment_forest.is_none() {
            let client = self.data.client()?.clone();
            let path = self.about_path()?;
            let value = client.get_value(&path, &[]).await?;

            // The comments endpoint returns [submission listing, comment listing].
            let mut parts = match value {
                Value::Array(parts) if parts.len() == 2 => parts,
                other => {
                    return Err(RedditError::Client(format!(
                        "expected a two-part comments response, got {}",
                        other
                    )))
                }
            };
            let comments_part = parts.pop().expect("length checked above");
            let submission_part = parts.pop().expect("length checked above");

            self.data
                .merge(extract_data(&self.data.kind.clone(), submission_part)?);
            let fullname = self.fullname().ok_or_else(|| {
                RedditError::Client("submission has no fullname after load".to_string())
            })?;
            self.comment_forest = Some(crate::comments::CommentForest::from_value(
                &client,
                &fullname,
                comments_part,
            )?);
        }
        Ok(self.comment_forest.as_mut().expect("populated above"))
    }

    /// Reply to this submission with a top-level comment.
    pub async fn reply(&self, text: &str) -> Result<super::Thing, RedditError> {
        let client = self.data.client()?.clone();
        let parent = self.fullname().ok_or_else(|| {
            RedditError::Client("cannot reply to a submission without a fullname".to_string())
        })?;
        client
            .post(
                "/api/comment",
                &[
                    ("thing_id".to_string(), parent),
                    ("text".to_string(), text.to_string()),
                ],
            )
            .await
    }
}

impl PartialEq for Submission {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

/// A subreddit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subreddit {
    pub(crate) data: ThingData,
}

impl Subreddit {
    common_entity_methods!();

    pub fn new(data: ThingData) -> Self {
        Self { data }
    }

    /// A lazy subreddit known only by display name.
    pub fn from_name(client: &RedditClient, name: &str) -> Self {
        let mut attrs = Map::new();
        attrs.insert(
            "display_name".to_string(),
            Value::String(name.to_string()),
        );
        Self {
            data: ThingData::new(&client.config().kinds.subreddit, attrs, Some(client)),
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.data.get_str("display_name")
    }

    fn about_path(&self) -> Result<String, RedditError> {
        let name = self.display_name().ok_or_else(|| {
            RedditError::Client("subreddit has no display_name".to_string())
        })?;
        Ok(format!("/r/{}/about", name))
    }

    fn name_for_path(&self) -> Result<&str, RedditError> {
        self.display_name().ok_or_else(|| {
            RedditError::Client("subreddit has no display_name".to_string())
        })
    }

    /// Newest submissions, paginated lazily.
    pub fn new_listing(&self) -> Result<crate::listing::ListingGenerator, RedditError> {
        let client = self.data.client()?.clone();
        Ok(client.listing(&format!("/r/{}/new", self.name_for_path()?), &[]))
    }

    /// Hottest submissions, paginated lazily.
    pub fn hot(&self) -> Result<crate::listing::ListingGenerator, RedditError> {
        let client = self.data.client()?.clone();
        Ok(client.listing(&format!("/r/{}/hot", self.name_for_path()?), &[]))
    }

    /// Top submissions for a period ("day", "week", "all", ...).
    pub fn top(&self, period: &str) -> Result<crate::listing::ListingGenerator, RedditError> {
        let client = self.data.client()?.clone();
        Ok(client
            .listing(&format!("/r/{}/top", self.name_for_path()?), &[])
            .with_param("t", period))
    }

    /// Submit a self post.
    pub async fn submit(&self, title: &str, text: &str) -> Result<super::Thing, RedditError> {
        self.submit_inner(title, &[("kind", "self"), ("text", text)])
            .await
    }

    /// Submit a link post. Set `resubmit` to force through ALREADY_SUBMITTED.
    pub async fn submit_link(
        &self,
        title: &str,
        url: &str,
        resubmit: bool,
    ) -> Result<super::Thing, RedditError> {
        let resubmit = if resubmit { "true" } else { "false" };
        self.submit_inner(title, &[("kind", "link"), ("url", url), ("resubmit", resubmit)])
            .await
    }

    async fn submit_inner(
        &self,
        title: &str,
        extra: &[(&str, &str)],
    ) -> Result<super::Thing, RedditError> {
        let client = self.data.client()?.clone();
        let mut form = vec![
            ("sr".to_string(), self.name_for_path()?.to_string()),
            ("title".to_string(), title.to_string()),
        ];
        for (key, value) in extra {
            form.push((key.to_string(), value.to_string()));
        }
        client.post("/api/submit", &form).await
    }

    fn flairlist_path(&self) -> Result<String, RedditError> {
        Ok(format!("/r/{}/api/flairlist", self.name_for_path()?))
    }

    /// The subreddit's flair assignments. Responses are cached like any
    /// other safe request.
    pub async fn flair_list(&self) -> Result<Value, RedditError> {
        let client = self.data.client()?.clone();
        client.get_value(&self.flairlist_path()?, &[]).await
    }

    /// Assign a user's flair, then evict the cached flair list so the next
    /// read re-fetches.
    pub async fn set_flair(
        &self,
        user: &str,
        text: &str,
        css_class: &str,
    ) -> Result<super::Thing, RedditError> {
        let client = self.data.client()?.clone();
        let result = client
            .post(
                &format!("/r/{}/api/flair", self.name_for_path()?),
                &[
                    ("name".to_string(), user.to_string()),
                    ("text".to_string(), text.to_string()),
                    ("css_class".to_string(), css_class.to_string()),
                ],
            )
            .await?;
        client.evict_path(&self.flairlist_path()?);
        Ok(result)
    }
}

/// Placeholder for unfetched descendants within a comment forest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoreComments {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl MoreComments {
    pub fn from_data(data: &Map<String, Value>) -> Self {
        serde_json::from_value(Value::Object(data.clone())).unwrap_or(Self {
            count: 0,
            parent_id: String::new(),
            children: Vec::new(),
            id: String::new(),
            name: String::new(),
        })
    }
}

// Hashing follows ThingData: by fullname when known.
macro_rules! entity_hash {
    ($($entity:ty),+) => {$(
        impl Hash for $entity {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.data.hash(state);
            }
        }
    )+};
}
entity_hash!(Comment, Message, Redditor, Submission, Subreddit);

fn promote_redditor(data: &ThingData) -> Option<Redditor> {
    let name = data.get_str("author")?;
    if name == "[deleted]" {
        return None;
    }
    let client = data.client().ok()?;
    Some(Redditor::from_name(client, name))
}

fn promote_subreddit(data: &ThingData) -> Option<Subreddit> {
    let name = data.get_str("subreddit")?;
    let client = data.client().ok()?;
    Some(Subreddit::from_name(client, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn fullname_prefers_kind_and_id() {
        let data = ThingData::new(
            "t3",
            attrs(json!({"id": "abc123", "name": "t3_abc123", "title": "hi"})),
            None,
        );
        assert_eq!(data.fullname().as_deref(), Some("t3_abc123"));

        let name_only = ThingData::new("t1", attrs(json!({"name": "t1_def"})), None);
        assert_eq!(name_only.fullname().as_deref(), Some("t1_def"));

        let neither = ThingData::new("t1", attrs(json!({"body": "text"})), None);
        assert_eq!(neither.fullname(), None);
    }

    #[test]
    fn equality_is_by_fullname_when_known() {
        let a = ThingData::new("t3", attrs(json!({"id": "abc", "score": 1})), None);
        let b = ThingData::new("t3", attrs(json!({"id": "abc", "score": 999})), None);
        assert_eq!(a, b);

        let c = ThingData::new("t3", attrs(json!({"title": "x"})), None);
        let d = ThingData::new("t3", attrs(json!({"title": "x"})), None);
        let e = ThingData::new("t3", attrs(json!({"title": "y"})), None);
        assert_eq!(c, d);
        assert_ne!(c, e);
    }

    #[test]
    fn merge_fills_only_absent_attributes() {
        let mut data = ThingData::new("t5", attrs(json!({"display_name": "python"})), None);
        assert!(!data.populated());

        data.merge(attrs(json!({"display_name": "SHOUTING", "subscribers": 100})));
        assert!(data.populated());
        assert_eq!(data.get_str("display_name"), Some("python"));
        assert_eq!(data.get("subscribers"), Some(&json!(100)));
    }

    #[test]
    fn replace_swaps_the_map_wholesale() {
        let mut data = ThingData::new("t5", attrs(json!({"display_name": "python", "old": 1})), None);
        data.replace(attrs(json!({"display_name": "python", "subscribers": 5})));
        assert!(data.populated());
        assert!(data.get("old").is_none());
        assert_eq!(data.get("subscribers"), Some(&json!(5)));
    }

    #[test]
    fn serde_round_trip_preserves_attrs_and_drops_session() {
        let comment = Comment::new(ThingData::new(
            "t1",
            attrs(json!({"id": "c1", "body": "nice", "author": "spez"})),
            None,
        ));
        let encoded = serde_json::to_string(&comment).unwrap();
        let decoded: Comment = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, comment);
        assert_eq!(decoded.body(), Some("nice"));
        // No session after decode; lazy loads must fail rather than hit the
        // network.
        assert!(decoded.data().client().is_err());
    }

    #[test]
    fn take_replies_normalises_the_empty_string_sentinel() {
        let mut leaf = Comment::new(ThingData::new(
            "t1",
            attrs(json!({"id": "c1", "replies": ""})),
            None,
        ));
        assert!(leaf.take_replies().is_none());
        assert_eq!(leaf.replies_value(), Some(&json!([])));

        let mut parent = Comment::new(ThingData::new(
            "t1",
            attrs(json!({"id": "c2", "replies": {"kind": "Listing", "data": {"children": []}}})),
            None,
        ));
        assert!(parent.take_replies().is_some());
        assert_eq!(parent.replies_value(), Some(&json!([])));
    }

    #[test]
    fn more_comments_decodes_from_data() {
        let more = MoreComments::from_data(&attrs(json!({
            "count": 42,
            "parent_id": "t3_abc",
            "children": ["d1", "d2"],
            "id": "d1",
            "name": "t1_d1",
        })));
        assert_eq!(more.count, 42);
        assert_eq!(more.children.len(), 2);
    }

    #[test]
    fn extract_data_unwraps_single_child_listings() {
        let listing = json!({
            "kind": "Listing",
            "data": {"children": [{"kind": "t1", "data": {"id": "c9", "body": "hi"}}]}
        });
        let data = extract_data("t1", listing).unwrap();
        assert_eq!(data.get("id"), Some(&json!("c9")));

        let plain = json!({"kind": "t2", "data": {"name": "spez", "id": "1w72"}});
        let data = extract_data("t2", plain).unwrap();
        assert_eq!(data.get("name"), Some(&json!("spez")));
    }
}
