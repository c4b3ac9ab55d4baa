//! Polymorphic JSON decoding.
//!
//! Reddit tags every object with a `kind` and nests its payload under
//! `data`. The [`Registry`] is a tagged-union parser over those envelopes:
//! recognised kinds become typed entities, listings become [`Listing`]
//! holders, write-result `{"json": ...}` wrappers are unwrapped, and
//! anything else falls through as a raw mapping.

pub mod thing;

use log::warn;
use serde_json::{Map, Value};

pub use thing::{
    Comment, Message, MoreComments, Redditor, Submission, Subreddit, ThingData,
};

use crate::client::RedditClient;
use crate::config::Config;

/// Reddit's paginated collection envelope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Listing {
    pub after: Option<String>,
    pub before: Option<String>,
    pub modhash: Option<String>,
    pub children: Vec<Thing>,
}

/// Any decoded reddit object.
#[derive(Debug, Clone, PartialEq)]
pub enum Thing {
    Comment(Comment),
    Message(Message),
    Redditor(Redditor),
    Submission(Submission),
    Subreddit(Subreddit),
    More(MoreComments),
    Listing(Listing),
    /// Several top-level values, e.g. the two listings of a comments page.
    List(Vec<Thing>),
    /// Anything without a recognised envelope.
    Raw(Value),
}

impl Thing {
    pub fn fullname(&self) -> Option<String> {
        match self {
            Thing::Comment(c) => c.fullname(),
            Thing::Message(m) => m.fullname(),
            Thing::Redditor(r) => r.fullname(),
            Thing::Submission(s) => s.fullname(),
            Thing::Subreddit(s) => s.fullname(),
            Thing::More(m) => {
                if m.name.is_empty() {
                    None
                } else {
                    Some(m.name.clone())
                }
            }
            _ => None,
        }
    }

    pub fn into_listing(self) -> Option<Listing> {
        match self {
            Thing::Listing(listing) => Some(listing),
            _ => None,
        }
    }

    pub fn into_submission(self) -> Option<Submission> {
        match self {
            Thing::Submission(submission) => Some(submission),
            _ => None,
        }
    }

    pub fn into_comment(self) -> Option<Comment> {
        match self {
            Thing::Comment(comment) => Some(comment),
            _ => None,
        }
    }

    pub fn into_subreddit(self) -> Option<Subreddit> {
        match self {
            Thing::Subreddit(subreddit) => Some(subreddit),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&Value> {
        match self {
            Thing::Raw(value) => Some(value),
            _ => None,
        }
    }
}

/// Maps `kind` tags to entity constructors. Owned by the session.
#[derive(Debug, Clone)]
pub struct Registry {
    kinds: crate::config::KindMap,
    decode_html: bool,
    store_raw: bool,
}

impl Registry {
    pub fn new(config: &Config) -> Self {
        Self {
            kinds: config.kinds.clone(),
            decode_html: config.decode_html_entities,
            store_raw: config.store_json_result,
        }
    }

    /// Decode a JSON value into the object graph. Construction is shallow:
    /// entity attribute maps keep their nested values as-is; only listing
    /// children and write-result wrappers recurse.
    pub fn objectify(&self, client: Option<&RedditClient>, value: Value) -> Thing {
        match value {
            Value::Array(items) => Thing::List(
                items
                    .into_iter()
                    .map(|item| self.objectify(client, item))
                    .collect(),
            ),
            Value::Object(map) => self.objectify_map(client, map),
            other => Thing::Raw(other),
        }
    }

    fn objectify_map(&self, client: Option<&RedditClient>, mut map: Map<String, Value>) -> Thing {
        if map.contains_key("json") {
            return self.unwrap_json(client, map);
        }

        let kind = match map.get("kind").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => return Thing::Raw(Value::Object(map)),
        };

        if kind == "Listing" {
            return match map.remove("data") {
                Some(Value::Object(data)) => Thing::Listing(self.listing_from(client, data)),
                _ => Thing::Raw(Value::Object(map)),
            };
        }

        let data = match map.remove("data") {
            Some(Value::Object(data)) => data,
            Some(other) => {
                map.insert("data".to_string(), other);
                return Thing::Raw(Value::Object(map));
            }
            None => return Thing::Raw(Value::Object(map)),
        };

        if kind == "more" {
            return Thing::More(MoreComments::from_data(&data));
        }

        if kind == "UserList" {
            // data.children is a plain array of account records.
            let children = match data.get("children") {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Object(user) => Some(Thing::Redditor(Redditor::new(
                            self.build_data(&self.kinds.redditor.clone(), user.clone(), client),
                        ))),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            return Thing::Listing(Listing {
                after: None,
                before: None,
                modhash: None,
                children,
            });
        }

        if kind == "LabeledMulti" || kind == "wikipage" {
            return Thing::Raw(Value::Object(data));
        }

        match self.kinds.name_for(&kind) {
            Some("comment") => Thing::Comment(Comment::new(self.build_data(&kind, data, client))),
            Some("message") => Thing::Message(Message::new(self.build_data(&kind, data, client))),
            Some("redditor") => {
                Thing::Redditor(Redditor::new(self.build_data(&kind, data, client)))
            }
            Some("submission") => {
                Thing::Submission(Submission::new(self.build_data(&kind, data, client)))
            }
            Some("subreddit") => {
                Thing::Subreddit(Subreddit::new(self.build_data(&kind, data, client)))
            }
            _ => {
                // Reassemble the envelope we partially consumed.
                map.insert("data".to_string(), Value::Object(data));
                Thing::Raw(Value::Object(map))
            }
        }
    }

    /// Unwrap the API's `{"json": {...}}` envelope around write responses.
    fn unwrap_json(&self, client: Option<&RedditClient>, mut map: Map<String, Value>) -> Thing {
        if map.len() > 1 {
            let extras: Vec<&String> = map.keys().filter(|k| *k != "json").collect();
            warn!("Unexpected siblings alongside 'json' wrapper: {:?}", extras);
        }
        let inner = map.remove("json").expect("checked by caller");

        if let Some(things) = inner
            .get("data")
            .and_then(|data| data.get("things"))
            .and_then(Value::as_array)
        {
            let mut decoded: Vec<Thing> = things
                .iter()
                .map(|item| self.objectify(client, item.clone()))
                .collect();
            if decoded.len() == 1 {
                return decoded.remove(0);
            }
            return Thing::List(decoded);
        }

        Thing::Raw(inner)
    }

    fn listing_from(&self, client: Option<&RedditClient>, mut data: Map<String, Value>) -> Listing {
        let after = data.get("after").and_then(Value::as_str).map(str::to_string);
        let before = data
            .get("before")
            .and_then(Value::as_str)
            .map(str::to_string);
        let modhash = data
            .get("modhash")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        let children = match data.remove("children") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| self.objectify(client, item))
                .collect(),
            _ => Vec::new(),
        };
        Listing {
            after,
            before,
            modhash,
            children,
        }
    }

    fn build_data(
        &self,
        kind: &str,
        mut attrs: Map<String, Value>,
        client: Option<&RedditClient>,
    ) -> ThingData {
        let raw = if self.store_raw {
            Some(Value::Object(attrs.clone()))
        } else {
            None
        };
        if self.decode_html {
            decode_entities(&mut attrs);
        }
        let mut data = ThingData::new(kind, attrs, client);
        if let Some(raw) = raw {
            data.set_raw(raw);
        }
        data
    }
}

/// Decode HTML entities in every string field of the map, in place.
fn decode_entities(attrs: &mut Map<String, Value>) {
    for value in attrs.values_mut() {
        decode_entities_value(value);
    }
}

fn decode_entities_value(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains('&') {
                *s = unescape_html(s);
            }
        }
        Value::Array(items) => {
            for item in items {
                decode_entities_value(item);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                decode_entities_value(item);
            }
        }
        _ => {}
    }
}

/// Resolve the named and numeric HTML entities reddit emits in body text.
pub fn unescape_html(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('&') {
        output.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let end = match rest.find(';') {
            Some(end) if end <= 10 => end,
            _ => {
                output.push('&');
                rest = &rest[1..];
                continue;
            }
        };

        let entity = &rest[1..end];
        let replacement = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| {
                    entity
                        .strip_prefix('#')
                        .and_then(|dec| dec.parse::<u32>().ok())
                })
                .and_then(char::from_u32),
        };

        match replacement {
            Some(c) => {
                output.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                output.push('&');
                rest = &rest[1..];
            }
        }
    }
    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Registry {
        let mut config = Config::default();
        config.user_agent = "test".to_string();
        Registry::new(&config)
    }

    #[test]
    fn recognised_kind_builds_a_matching_entity() {
        let thing = registry().objectify(
            None,
            json!({"kind": "t3", "data": {"id": "abc", "title": "hello"}}),
        );
        match thing {
            Thing::Submission(submission) => {
                assert_eq!(submission.fullname().as_deref(), Some("t3_abc"));
                assert_eq!(submission.title(), Some("hello"));
            }
            other => panic!("expected submission, got {:?}", other),
        }
    }

    #[test]
    fn listings_wrap_decoded_children() {
        let thing = registry().objectify(
            None,
            json!({
                "kind": "Listing",
                "data": {
                    "after": "t3_xyz",
                    "before": null,
                    "modhash": "mh123",
                    "children": [
                        {"kind": "t3", "data": {"id": "a"}},
                        {"kind": "t1", "data": {"id": "b"}},
                    ],
                }
            }),
        );
        let listing = thing.into_listing().expect("listing");
        assert_eq!(listing.after.as_deref(), Some("t3_xyz"));
        assert_eq!(listing.before, None);
        assert_eq!(listing.modhash.as_deref(), Some("mh123"));
        assert_eq!(listing.children.len(), 2);
        assert!(matches!(listing.children[0], Thing::Submission(_)));
        assert!(matches!(listing.children[1], Thing::Comment(_)));
    }

    #[test]
    fn more_placeholders_decode_typed() {
        let thing = registry().objectify(
            None,
            json!({"kind": "more", "data": {"count": 7, "parent_id": "t3_x", "children": ["a", "b"], "id": "a", "name": "t1_a"}}),
        );
        match thing {
            Thing::More(more) => {
                assert_eq!(more.count, 7);
                assert_eq!(more.parent_id, "t3_x");
            }
            other => panic!("expected more, got {:?}", other),
        }
    }

    #[test]
    fn json_wrapper_is_unwrapped() {
        let thing = registry().objectify(
            None,
            json!({"json": {"errors": [], "data": {"things": [
                {"kind": "t1", "data": {"id": "c1", "body": "reply"}}
            ]}}}),
        );
        match thing {
            Thing::Comment(comment) => assert_eq!(comment.body(), Some("reply")),
            other => panic!("expected comment, got {:?}", other),
        }
    }

    #[test]
    fn json_wrapper_without_things_stays_raw() {
        let thing = registry().objectify(
            None,
            json!({"json": {"errors": [], "data": {"url": "https://redd.it/abc"}}}),
        );
        let raw = thing.as_raw().expect("raw");
        assert_eq!(raw["data"]["url"], json!("https://redd.it/abc"));
    }

    #[test]
    fn unknown_kinds_fall_back_to_raw() {
        let value = json!({"kind": "t9", "data": {"id": "zzz"}});
        let thing = registry().objectify(None, value.clone());
        assert_eq!(thing.as_raw(), Some(&value));
    }

    #[test]
    fn userlist_becomes_a_listing_of_redditors() {
        let thing = registry().objectify(
            None,
            json!({"kind": "UserList", "data": {"children": [
                {"name": "spez", "id": "t2_1w72"},
                {"name": "kn0thing", "id": "t2_1w73"},
            ]}}),
        );
        let listing = thing.into_listing().expect("listing");
        assert_eq!(listing.children.len(), 2);
        assert!(matches!(listing.children[0], Thing::Redditor(_)));
    }

    #[test]
    fn two_part_responses_decode_elementwise() {
        let thing = registry().objectify(
            None,
            json!([
                {"kind": "Listing", "data": {"children": [{"kind": "t3", "data": {"id": "s"}}]}},
                {"kind": "Listing", "data": {"children": [{"kind": "t1", "data": {"id": "c"}}]}},
            ]),
        );
        match thing {
            Thing::List(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[0], Thing::Listing(_)));
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn unescape_handles_named_and_numeric_entities() {
        assert_eq!(unescape_html("a &amp; b"), "a & b");
        assert_eq!(unescape_html("&lt;p&gt;hi&lt;/p&gt;"), "<p>hi</p>");
        assert_eq!(unescape_html("it&#39;s"), "it's");
        assert_eq!(unescape_html("&#x27;quoted&#x27;"), "'quoted'");
        assert_eq!(unescape_html("no entities"), "no entities");
        assert_eq!(unescape_html("dangling & ampersand"), "dangling & ampersand");
        assert_eq!(unescape_html("&bogus;"), "&bogus;");
    }

    #[test]
    fn decode_flag_rewrites_string_fields() {
        let mut config = Config::default();
        config.decode_html_entities = true;
        let registry = Registry::new(&config);

        let thing = registry.objectify(
            None,
            json!({"kind": "t1", "data": {"id": "c", "body": "a &gt; b"}}),
        );
        match thing {
            Thing::Comment(comment) => assert_eq!(comment.body(), Some("a > b")),
            other => panic!("expected comment, got {:?}", other),
        }
    }

    #[test]
    fn store_raw_keeps_the_server_envelope() {
        let mut config = Config::default();
        config.store_json_result = true;
        let registry = Registry::new(&config);

        let thing = registry.objectify(
            None,
            json!({"kind": "t5", "data": {"id": "sr", "display_name": "rust"}}),
        );
        match thing {
            Thing::Subreddit(subreddit) => {
                let raw = subreddit.data().raw().expect("raw envelope");
                assert_eq!(raw["display_name"], json!("rust"));
            }
            other => panic!("expected subreddit, got {:?}", other),
        }
    }
}
