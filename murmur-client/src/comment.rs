use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use crate::api::{Comment, CommentId};

/// A direct child of a node, as seen from its parent
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    pub comment: Comment,
    pub is_new: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TreeNode {
    pub comment: Comment,

    /// Direct children only, each of which also has its own node
    pub replies: HashMap<CommentId, Reply>,

    /// Inserted by a local action (or live fetch) during this session
    pub is_new: bool,

    /// The server refused to confirm this comment
    pub failed: bool,
}

impl TreeNode {
    fn new(comment: Comment, is_new: bool) -> TreeNode {
        TreeNode {
            comment,
            replies: HashMap::new(),
            is_new,
            failed: false,
        }
    }
}

/// Outcome of `CommentTree::insert`
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InsertReport {
    pub inserted: usize,

    /// Replies dropped because their parent is not in the tree yet
    pub skipped: Vec<Comment>,
}

impl InsertReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn missing_parents(&self) -> BTreeSet<CommentId> {
        self.skipped.iter().filter_map(|c| c.parent_id).collect()
    }
}

/// Comments split between the ones fetched from the server and the ones that arrived during
/// this session
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Partitioned<'a> {
    /// Oldest first
    pub confirmed: Vec<&'a Comment>,

    /// Newest first
    pub new: Vec<&'a Comment>,
}

impl<'a> Partitioned<'a> {
    fn split<I: Iterator<Item = (&'a Comment, bool)>>(it: I) -> Partitioned<'a> {
        let mut res = Partitioned::default();
        for (c, is_new) in it {
            match is_new {
                true => res.new.push(c),
                false => res.confirmed.push(c),
            }
        }
        res.confirmed.sort_unstable_by_key(|c| (c.created_at, c.id));
        res.new
            .sort_unstable_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        res
    }

    pub fn len(&self) -> usize {
        self.confirmed.len() + self.new.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Id-indexed forest of comments and their reply chains.
///
/// Cloning is cheap, and mutating a clone never affects the original.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommentTree {
    nodes: Arc<HashMap<CommentId, Arc<TreeNode>>>,
}

impl CommentTree {
    pub fn new() -> CommentTree {
        CommentTree::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &CommentId) -> Option<&TreeNode> {
        self.nodes.get(id).map(|n| &**n)
    }

    pub fn contains(&self, id: &CommentId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CommentId, &TreeNode)> {
        self.nodes.iter().map(|(id, n)| (id, &**n))
    }

    /// Insert `comments` in order.
    ///
    /// A reply whose parent is not in the tree is skipped without touching the tree, and
    /// reported back so that the parent can be fetched.
    pub fn insert<I>(&mut self, comments: I, is_newly_added: bool) -> InsertReport
    where
        I: IntoIterator<Item = Comment>,
    {
        let mut report = InsertReport::default();
        for c in comments {
            match c.parent_id {
                Some(parent_id) if !self.nodes.contains_key(&parent_id) => {
                    tracing::debug!(comment=?c.id, parent=?parent_id, "skipping reply to unknown parent");
                    report.skipped.push(c);
                }
                Some(parent_id) => {
                    let nodes = Arc::make_mut(&mut self.nodes);
                    if let Some(parent) = nodes.get_mut(&parent_id) {
                        Arc::make_mut(parent).replies.insert(
                            c.id,
                            Reply {
                                comment: c.clone(),
                                is_new: is_newly_added,
                            },
                        );
                    }
                    Self::upsert_node(nodes, c, is_newly_added);
                    report.inserted += 1;
                }
                None => {
                    Self::upsert_node(Arc::make_mut(&mut self.nodes), c, is_newly_added);
                    report.inserted += 1;
                }
            }
        }
        report
    }

    // An already-known node keeps its replies, so that re-fetching a page does not detach the
    // replies loaded below it
    fn upsert_node(
        nodes: &mut HashMap<CommentId, Arc<TreeNode>>,
        c: Comment,
        is_newly_added: bool,
    ) {
        match nodes.get_mut(&c.id) {
            Some(node) => {
                let node = Arc::make_mut(node);
                node.comment = c;
                node.is_new = is_newly_added;
            }
            None => {
                nodes.insert(c.id, Arc::new(TreeNode::new(c, is_newly_added)));
            }
        }
    }

    /// Remove a comment along with all its descendants, returning the removed ids
    pub fn remove(&mut self, id: &CommentId) -> Vec<CommentId> {
        let parent_id = match self.nodes.get(id) {
            None => return Vec::new(),
            Some(n) => n.comment.parent_id,
        };
        let nodes = Arc::make_mut(&mut self.nodes);
        if let Some(parent) = parent_id.and_then(|p| nodes.get_mut(&p)) {
            Arc::make_mut(parent).replies.remove(id);
        }
        let mut removed = Vec::new();
        let mut stack = vec![*id];
        while let Some(next) = stack.pop() {
            // removing before walking the children makes cycles harmless
            if let Some(node) = nodes.remove(&next) {
                removed.push(next);
                stack.extend(node.replies.keys().copied());
            }
        }
        removed
    }

    /// Returns false if there is no such comment
    pub fn mark_failed(&mut self, id: &CommentId) -> bool {
        if !self.nodes.contains_key(id) {
            return false;
        }
        if let Some(node) = Arc::make_mut(&mut self.nodes).get_mut(id) {
            Arc::make_mut(node).failed = true;
        }
        true
    }

    /// Swap a pending comment for the version the server confirmed
    pub fn replace(&mut self, temporary_id: &CommentId, confirmed: Comment) -> InsertReport {
        self.remove(temporary_id);
        self.insert(std::iter::once(confirmed), true)
    }

    /// Update the stored value of a comment (eg. after a vote), keeping its flags and replies
    pub fn update(&mut self, comment: Comment) -> bool {
        if !self.nodes.contains_key(&comment.id) {
            return false;
        }
        let nodes = Arc::make_mut(&mut self.nodes);
        if let Some(parent) = comment.parent_id.and_then(|p| nodes.get_mut(&p)) {
            if let Some(reply) = Arc::make_mut(parent).replies.get_mut(&comment.id) {
                reply.comment = comment.clone();
            }
        }
        if let Some(node) = nodes.get_mut(&comment.id) {
            Arc::make_mut(node).comment = comment;
        }
        true
    }

    pub fn clear(&mut self) {
        self.nodes = Arc::new(HashMap::new());
    }

    /// The node and all its descendants, every node listed after its parent
    pub fn subtree(&self, id: &CommentId) -> Vec<TreeNode> {
        let mut res = Vec::new();
        let mut seen = BTreeSet::new();
        let mut queue = std::collections::VecDeque::from([*id]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            if let Some(node) = self.nodes.get(&next) {
                let mut children = node.replies.values().map(|r| &r.comment).collect::<Vec<_>>();
                children.sort_unstable_by_key(|c| (c.created_at, c.id));
                queue.extend(children.into_iter().map(|c| c.id));
                res.push((**node).clone());
            }
        }
        res
    }

    pub fn roots(&self) -> Partitioned<'_> {
        Partitioned::split(
            self.nodes
                .values()
                .filter(|n| n.comment.parent_id.is_none())
                .map(|n| (&n.comment, n.is_new)),
        )
    }

    /// Returns an empty partition for an unknown comment
    pub fn replies_of(&self, id: &CommentId) -> Partitioned<'_> {
        match self.nodes.get(id) {
            None => Partitioned::default(),
            Some(n) => Partitioned::split(n.replies.values().map(|r| (&r.comment, r.is_new))),
        }
    }
}
