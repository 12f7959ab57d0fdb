//! Insertion-ordered JSON tree store.
//!
//! The remote data model is a single JSON tree addressed by
//! [`RemotePath`]s. Children of every node keep insertion order, which is
//! what gives subscribers their "backlog in original write order"
//! guarantee. Children are held in a `Vec` and scanned linearly; every
//! collection here is UI-bound and small.
//!
//! Writing an object value decomposes it into child nodes, so a later
//! write to `users/{uid}/starred/{ch}` composes with an earlier write of
//! the whole `users/{uid}` profile object.

use devchat_shared::paths::RemotePath;
use serde_json::{Map, Value};

#[derive(Debug, Default)]
struct Node {
    /// Scalar payload. `None` for interior nodes.
    leaf: Option<Value>,
    children: Vec<(String, Node)>,
}

impl Node {
    fn is_empty(&self) -> bool {
        self.leaf.is_none() && self.children.is_empty()
    }

    fn child(&self, key: &str) -> Option<&Node> {
        self.children
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, n)| n)
    }

    fn child_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.children
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, n)| n)
    }

    /// Replace this node's contents with `value`, decomposing objects.
    fn set(&mut self, value: Value) {
        self.leaf = None;
        self.children.clear();
        match value {
            Value::Object(map) => {
                for (key, child_value) in map {
                    let mut child = Node::default();
                    child.set(child_value);
                    if !child.is_empty() {
                        self.children.push((key, child));
                    }
                }
            }
            Value::Null => {}
            scalar => self.leaf = Some(scalar),
        }
    }

    /// Reassemble the subtree as a JSON value.
    fn assemble(&self) -> Value {
        if let Some(scalar) = &self.leaf {
            return scalar.clone();
        }
        if self.children.is_empty() {
            return Value::Null;
        }
        let mut map = Map::new();
        for (key, child) in &self.children {
            map.insert(key.clone(), child.assemble());
        }
        Value::Object(map)
    }
}

/// A child node that came into existence during a write, reported so the
/// backend can fan out `ChildAdded` events to subscribers of `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedChild {
    pub parent: RemotePath,
    pub key: String,
}

/// An element removed from the tree, reported so the backend can fan out
/// `ChildRemoved` to subscribers of `parent`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedChild {
    pub parent: RemotePath,
    pub key: String,
    pub value: Value,
}

/// The whole remote tree.
#[derive(Debug, Default)]
pub struct TreeStore {
    root: Node,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` at `path`, replacing any existing subtree. Returns
    /// the nodes created along the way, shallowest first: subscribers of
    /// each reported parent see a new direct child.
    ///
    /// Writing `Null` is equivalent to [`TreeStore::remove`] and reports
    /// nothing here.
    pub fn write(&mut self, path: &RemotePath, value: Value) -> Vec<CreatedChild> {
        if value.is_null() {
            self.remove(path);
            return Vec::new();
        }

        let mut created = Vec::new();
        let mut node = &mut self.root;
        let mut walked = RemotePath::root();
        for segment in path.segments() {
            if node.child(segment).is_none() {
                node.children.push((segment.clone(), Node::default()));
                created.push(CreatedChild {
                    parent: walked.clone(),
                    key: segment.clone(),
                });
            }
            walked = walked.child(segment);
            // Present by construction
            node = match node.child_mut(segment) {
                Some(n) => n,
                None => return created,
            };
        }
        node.set(value);
        created
    }

    /// Snapshot of the subtree at `path`, or `None` for paths that do not
    /// exist (read-once semantics).
    pub fn read(&self, path: &RemotePath) -> Option<Value> {
        let mut node = &self.root;
        for segment in path.segments() {
            node = node.child(segment)?;
        }
        if node.is_empty() {
            None
        } else {
            Some(node.assemble())
        }
    }

    /// Direct children of `path` in insertion order, for backlog replay.
    pub fn children(&self, path: &RemotePath) -> Vec<(String, Value)> {
        let mut node = &self.root;
        for segment in path.segments() {
            match node.child(segment) {
                Some(n) => node = n,
                None => return Vec::new(),
            }
        }
        node.children
            .iter()
            .map(|(key, child)| (key.clone(), child.assemble()))
            .collect()
    }

    /// Remove the subtree at `path`. Emptied interior ancestors are pruned
    /// silently; only the removal of the addressed node is reported.
    pub fn remove(&mut self, path: &RemotePath) -> Option<RemovedChild> {
        let (parent_path, key) = match (path.parent(), path.key()) {
            (Some(parent), Some(key)) => (parent, key.to_string()),
            _ => return None,
        };

        let removed = remove_at(&mut self.root, path.segments())?;
        Some(RemovedChild {
            parent: parent_path,
            key,
            value: removed,
        })
    }
}

/// Recursive removal helper: descends to the target, removes it, and lets
/// each level prune a child that became empty on the way back up.
fn remove_at(node: &mut Node, segments: &[String]) -> Option<Value> {
    let (head, rest) = segments.split_first()?;
    let index = node.children.iter().position(|(k, _)| k == head)?;

    if rest.is_empty() {
        let (_, removed) = node.children.remove(index);
        return Some(removed.assemble());
    }

    let removed = remove_at(&mut node.children[index].1, rest)?;
    if node.children[index].1.is_empty() {
        node.children.remove(index);
    }
    Some(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(s: &str) -> RemotePath {
        RemotePath::parse(s)
    }

    #[test]
    fn test_write_then_read() {
        let mut tree = TreeStore::new();
        tree.write(&p("users/u1"), json!({"name": "Alice", "avatar": "a.png"}));

        let value = tree.read(&p("users/u1")).unwrap();
        assert_eq!(value["name"], "Alice");
        assert_eq!(tree.read(&p("users/u1/name")).unwrap(), json!("Alice"));
        assert!(tree.read(&p("users/u2")).is_none());
    }

    #[test]
    fn test_write_reports_created_children_shallowest_first() {
        let mut tree = TreeStore::new();
        let created = tree.write(&p("typing/general/u1"), json!("Alice"));

        let parents: Vec<String> = created.iter().map(|c| c.parent.to_string()).collect();
        assert_eq!(parents, vec!["", "typing", "typing/general"]);
        assert_eq!(created[2].key, "u1");
    }

    #[test]
    fn test_rewrite_existing_path_reports_nothing() {
        let mut tree = TreeStore::new();
        tree.write(&p("typing/general/u1"), json!("Alice"));
        let created = tree.write(&p("typing/general/u1"), json!("Alice"));
        assert!(created.is_empty());
    }

    #[test]
    fn test_children_preserve_insertion_order() {
        let mut tree = TreeStore::new();
        tree.write(&p("messages/c1/k3"), json!({"content": "third"}));
        tree.write(&p("messages/c1/k1"), json!({"content": "first"}));
        tree.write(&p("messages/c1/k2"), json!({"content": "second"}));

        let keys: Vec<String> = tree
            .children(&p("messages/c1"))
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        // Insertion order, not key order
        assert_eq!(keys, vec!["k3", "k1", "k2"]);
    }

    #[test]
    fn test_remove_reports_parent_and_value() {
        let mut tree = TreeStore::new();
        tree.write(&p("presence/u1"), json!(true));

        let removed = tree.remove(&p("presence/u1")).unwrap();
        assert_eq!(removed.parent, p("presence"));
        assert_eq!(removed.key, "u1");
        assert_eq!(removed.value, json!(true));
        assert!(tree.read(&p("presence/u1")).is_none());
    }

    #[test]
    fn test_remove_prunes_empty_ancestors() {
        let mut tree = TreeStore::new();
        tree.write(&p("typing/general/u1"), json!("Alice"));
        tree.remove(&p("typing/general/u1"));

        assert!(tree.read(&p("typing/general")).is_none());
        assert!(tree.read(&p("typing")).is_none());
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut tree = TreeStore::new();
        assert!(tree.remove(&p("nope/nothing")).is_none());
    }

    #[test]
    fn test_object_write_composes_with_deep_write() {
        let mut tree = TreeStore::new();
        tree.write(&p("users/u1"), json!({"name": "Alice", "avatar": "a.png"}));
        tree.write(&p("users/u1/starred/c1"), json!({"name": "general"}));

        let profile = tree.read(&p("users/u1")).unwrap();
        assert_eq!(profile["name"], "Alice");
        assert_eq!(profile["starred"]["c1"]["name"], "general");
    }

    #[test]
    fn test_write_null_removes() {
        let mut tree = TreeStore::new();
        tree.write(&p("presence/u1"), json!(true));
        tree.write(&p("presence/u1"), Value::Null);
        assert!(tree.read(&p("presence/u1")).is_none());
    }
}
