//! Comment forests and `more`-placeholder expansion.
//!
//! A submission's comments arrive as a forest of comment nodes interleaved
//! with [`MoreComments`] placeholders. The forest is stored arena-style:
//! the submission's forest owns every node, comments reference each other
//! by index, and a fullname index supports re-parenting when placeholder
//! expansions return comments out of order.

use std::collections::HashMap;

use log::debug;
use serde_json::Value;

use crate::client::RedditClient;
use crate::errors::RedditError;
use crate::models::{Comment, MoreComments, Thing};

/// Most child ids the server accepts in one morechildren call.
const MORECHILDREN_CHUNK: usize = 100;

#[derive(Debug, Clone)]
enum ForestItem {
    Comment(Comment),
    More(MoreComments),
}

#[derive(Debug, Clone)]
struct Node {
    /// `None` marks a node that has been expanded or skipped away.
    item: Option<ForestItem>,
    children: Vec<usize>,
}

/// The comment tree of one submission.
#[derive(Debug, Clone)]
pub struct CommentForest {
    client: RedditClient,
    link_fullname: String,
    nodes: Vec<Node>,
    roots: Vec<usize>,
    /// Comment fullname to arena index.
    index: HashMap<String, usize>,
    /// Orphans waiting for their parent, keyed by parent fullname.
    pending: HashMap<String, Vec<usize>>,
}

impl CommentForest {
    /// Build a forest from the comment listing of a comments-page response.
    pub fn from_value(
        client: &RedditClient,
        link_fullname: &str,
        value: Value,
    ) -> Result<Self, RedditError> {
        let mut forest = Self {
            client: client.clone(),
            link_fullname: link_fullname.to_string(),
            nodes: Vec::new(),
            roots: Vec::new(),
            index: HashMap::new(),
            pending: HashMap::new(),
        };

        let decoded = client.registry().objectify(Some(client), value);
        let listing = decoded.into_listing().ok_or_else(|| {
            RedditError::Client("expected a comment listing".to_string())
        })?;
        for child in listing.children {
            forest.insert(child, None);
        }
        Ok(forest)
    }

    fn insert(&mut self, thing: Thing, parent: Option<usize>) {
        match thing {
            Thing::Comment(mut comment) => {
                let replies = comment.take_replies();
                let idx = self.push(ForestItem::Comment(comment), parent);
                if let Some(replies_value) = replies {
                    let decoded = self
                        .client
                        .registry()
                        .objectify(Some(&self.client), replies_value);
                    if let Some(listing) = decoded.into_listing() {
                        for child in listing.children {
                            self.insert(child, Some(idx));
                        }
                    }
                }
            }
            Thing::More(more) => {
                self.push(ForestItem::More(more), parent);
            }
            // Anything else has no place in a comment tree.
            _ => {}
        }
    }

    fn push(&mut self, item: ForestItem, parent: Option<usize>) -> usize {
        let idx = self.nodes.len();
        let fullname = match &item {
            ForestItem::Comment(comment) => comment.fullname(),
            ForestItem::More(_) => None,
        };
        self.nodes.push(Node {
            item: Some(item),
            children: Vec::new(),
        });
        match parent {
            Some(parent_idx) => self.nodes[parent_idx].children.push(idx),
            None => self.roots.push(idx),
        }
        if let Some(fullname) = fullname {
            self.index.insert(fullname.clone(), idx);
            // A waiting orphan's parent just arrived.
            if let Some(orphans) = self.pending.remove(&fullname) {
                for orphan in orphans {
                    self.roots.retain(|r| *r != orphan);
                    self.nodes[idx].children.push(orphan);
                }
            }
        }
        idx
    }

    /// Attach comments and placeholders returned by a morechildren call,
    /// re-parenting through the fullname index and holding orphans until
    /// their parent shows up.
    fn attach(&mut self, things: Vec<Thing>) {
        for thing in things {
            let parent_fullname = match &thing {
                Thing::Comment(comment) => comment.parent_id().map(str::to_string),
                Thing::More(more) => Some(more.parent_id.clone()),
                _ => None,
            };
            let parent_idx = match parent_fullname.as_deref() {
                Some(parent) if parent == self.link_fullname => None,
                Some(parent) => match self.index.get(parent) {
                    Some(idx) => Some(*idx),
                    None => {
                        // Parent not seen yet; park at the roots and record
                        // the debt.
                        let idx = match thing {
                            Thing::Comment(mut comment) => {
                                comment.take_replies();
                                self.push(ForestItem::Comment(comment), None)
                            }
                            Thing::More(more) => self.push(ForestItem::More(more), None),
                            _ => continue,
                        };
                        self.pending
                            .entry(parent.to_string())
                            .or_default()
                            .push(idx);
                        continue;
                    }
                },
                None => None,
            };
            match thing {
                Thing::Comment(mut comment) => {
                    comment.take_replies();
                    self.push(ForestItem::Comment(comment), parent_idx);
                }
                Thing::More(more) => {
                    self.push(ForestItem::More(more), parent_idx);
                }
                _ => {}
            }
        }
    }

    /// Expand `more`-placeholders breadth-first through batched
    /// morechildren calls.
    ///
    /// `limit` bounds how many placeholders are expanded (`None` for all);
    /// placeholders with fewer than `threshold` children are skipped.
    /// Skipped and over-budget placeholders are detached and returned for
    /// inspection.
    pub async fn replace_more(
        &mut self,
        limit: Option<u32>,
        threshold: u64,
    ) -> Result<Vec<MoreComments>, RedditError> {
        let mut skipped = Vec::new();
        let mut budget = limit;

        loop {
            let candidate = self.next_more_bfs();
            let idx = match candidate {
                Some(idx) => idx,
                None => break,
            };
            let more = match self.nodes[idx].item.take() {
                Some(ForestItem::More(more)) => more,
                _ => continue,
            };
            self.detach(idx);

            let below_threshold = more.count < threshold || more.count == 0;
            let out_of_budget = budget == Some(0);
            if below_threshold || out_of_budget {
                debug!(
                    "Skipping placeholder with {} children ({})",
                    more.count,
                    if out_of_budget { "budget exhausted" } else { "below threshold" }
                );
                skipped.push(more);
                continue;
            }
            if let Some(remaining) = budget {
                budget = Some(remaining - 1);
            }

            for chunk in more.children.chunks(MORECHILDREN_CHUNK) {
                let form = vec![
                    ("link_id".to_string(), self.link_fullname.clone()),
                    ("children".to_string(), chunk.join(",")),
                ];
                let result = self.client.post("/api/morechildren", &form).await?;
                let things = match result {
                    Thing::List(things) => things,
                    single => vec![single],
                };
                debug!(
                    "morechildren returned {} things for {} requested ids",
                    things.len(),
                    chunk.len()
                );
                self.attach(things);
            }
        }

        // Parents that never arrived: surface their orphans at the top
        // level rather than losing them.
        if !self.pending.is_empty() {
            debug!(
                "{} orphan groups still unparented after expansion",
                self.pending.len()
            );
            self.pending.clear();
        }

        Ok(skipped)
    }

    /// Index of the first live placeholder in breadth-first order.
    fn next_more_bfs(&self) -> Option<usize> {
        let mut queue: Vec<usize> = self.roots.clone();
        let mut cursor = 0;
        while cursor < queue.len() {
            let idx = queue[cursor];
            cursor += 1;
            match &self.nodes[idx].item {
                Some(ForestItem::More(_)) => return Some(idx),
                Some(ForestItem::Comment(_)) => queue.extend(self.nodes[idx].children.iter()),
                None => {}
            }
        }
        None
    }

    fn detach(&mut self, idx: usize) {
        self.roots.retain(|r| *r != idx);
        for node in &mut self.nodes {
            node.children.retain(|c| *c != idx);
        }
    }

    /// Top-level comments, in order.
    pub fn top_level(&self) -> Vec<&Comment> {
        self.roots
            .iter()
            .filter_map(|idx| match &self.nodes[*idx].item {
                Some(ForestItem::Comment(comment)) => Some(comment),
                _ => None,
            })
            .collect()
    }

    /// Every comment in the forest, breadth-first.
    pub fn flatten(&self) -> Vec<&Comment> {
        let mut comments = Vec::new();
        let mut queue: Vec<usize> = self.roots.clone();
        let mut cursor = 0;
        while cursor < queue.len() {
            let idx = queue[cursor];
            cursor += 1;
            if let Some(ForestItem::Comment(comment)) = &self.nodes[idx].item {
                comments.push(comment);
                queue.extend(self.nodes[idx].children.iter());
            }
        }
        comments
    }

    /// Placeholders still reachable in the forest.
    pub fn more_placeholders(&self) -> Vec<&MoreComments> {
        let mut mores = Vec::new();
        let mut queue: Vec<usize> = self.roots.clone();
        let mut cursor = 0;
        while cursor < queue.len() {
            let idx = queue[cursor];
            cursor += 1;
            match &self.nodes[idx].item {
                Some(ForestItem::More(more)) => mores.push(more),
                Some(ForestItem::Comment(_)) => queue.extend(self.nodes[idx].children.iter()),
                None => {}
            }
        }
        mores
    }

    /// Direct replies to a comment, looked up through the forest rather
    /// than through pointers.
    pub fn replies_of(&self, comment: &Comment) -> Vec<&Comment> {
        let fullname = match comment.fullname() {
            Some(fullname) => fullname,
            None => return Vec::new(),
        };
        let idx = match self.index.get(&fullname) {
            Some(idx) => *idx,
            None => return Vec::new(),
        };
        self.nodes[idx]
            .children
            .iter()
            .filter_map(|child| match &self.nodes[*child].item {
                Some(ForestItem::Comment(comment)) => Some(comment),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.flatten().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flatten().is_empty()
    }
}
