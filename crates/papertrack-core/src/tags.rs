//! Per-paper tag assignments and the session's copy of the tag taxonomy.
//!
//! Both are caches of server state: they are only ever mutated after the
//! server has confirmed a change, and can be rebuilt from scratch at any time.

use std::collections::HashMap;

use crate::{CustomTag, PaperId, TagRef};

/// Map from paper to its assigned tags, in assignment order, unique by id.
#[derive(Debug, Default, Clone)]
pub struct PaperTagCache {
    entries: HashMap<PaperId, Vec<TagRef>>,
}

impl PaperTagCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for `paper_id`. Later duplicates of an id are dropped.
    pub fn seed(&mut self, paper_id: PaperId, tags: Vec<TagRef>) {
        let mut unique: Vec<TagRef> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !unique.iter().any(|t| t.id == tag.id) {
                unique.push(tag);
            }
        }
        self.entries.insert(paper_id, unique);
    }

    /// Append `tag` unless a tag with the same id is already assigned.
    /// Returns whether the entry changed.
    pub fn insert(&mut self, paper_id: &PaperId, tag: TagRef) -> bool {
        let tags = self.entries.entry(paper_id.clone()).or_default();
        if tags.iter().any(|t| t.id == tag.id) {
            return false;
        }
        tags.push(tag);
        true
    }

    /// Drop the tag with `tag_id`. Returns whether the entry changed.
    pub fn remove(&mut self, paper_id: &PaperId, tag_id: i64) -> bool {
        match self.entries.get_mut(paper_id) {
            Some(tags) => {
                let before = tags.len();
                tags.retain(|t| t.id != tag_id);
                tags.len() != before
            }
            None => false,
        }
    }

    /// Tags of `paper_id`; empty if the paper has no entry.
    pub fn get(&self, paper_id: &PaperId) -> &[TagRef] {
        self.entries.get(paper_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the paper's assignments have been loaded at all.
    pub fn contains(&self, paper_id: &PaperId) -> bool {
        self.entries.contains_key(paper_id)
    }
}

/// The tag tree as fetched from `/tags`.
#[derive(Debug, Default, Clone)]
pub struct TagTaxonomy {
    roots: Vec<CustomTag>,
}

impl TagTaxonomy {
    pub fn new(roots: Vec<CustomTag>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[CustomTag] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Find a tag by id anywhere in the tree.
    pub fn find(&self, id: i64) -> Option<&CustomTag> {
        fn walk(tags: &[CustomTag], id: i64) -> Option<&CustomTag> {
            for tag in tags {
                if tag.id == id {
                    return Some(tag);
                }
                if let Some(found) = walk(&tag.children, id) {
                    return Some(found);
                }
            }
            None
        }
        walk(&self.roots, id)
    }

    /// Depth-first listing with nesting depth (roots at 0), in tree order.
    pub fn flatten(&self) -> Vec<(usize, &CustomTag)> {
        fn walk<'a>(tags: &'a [CustomTag], depth: usize, out: &mut Vec<(usize, &'a CustomTag)>) {
            for tag in tags {
                out.push((depth, tag));
                walk(&tag.children, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.roots, 0, &mut out);
        out
    }

    /// Names from the root down to the tag with `id`, e.g. `["CS", "AI", "ML"]`.
    pub fn path_to(&self, id: i64) -> Option<Vec<&str>> {
        fn walk<'a>(tags: &'a [CustomTag], id: i64, path: &mut Vec<&'a str>) -> bool {
            for tag in tags {
                path.push(&tag.name);
                if tag.id == id || walk(&tag.children, id, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        walk(&self.roots, id, &mut path).then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: i64, name: &str) -> CustomTag {
        CustomTag {
            id,
            name: name.into(),
            children: vec![],
        }
    }

    fn sample_tree() -> TagTaxonomy {
        TagTaxonomy::new(vec![
            CustomTag {
                id: 1,
                name: "CS".into(),
                children: vec![CustomTag {
                    id: 2,
                    name: "AI".into(),
                    children: vec![leaf(3, "ML")],
                }],
            },
            leaf(4, "Math"),
        ])
    }

    // ── PaperTagCache ──────────────────────────────────────────────────

    #[test]
    fn insert_is_idempotent_by_id() {
        let mut cache = PaperTagCache::new();
        let p = PaperId::from("https://x/p");
        assert!(cache.insert(&p, TagRef::new(5, "NLP")));
        assert!(!cache.insert(&p, TagRef::new(5, "NLP")));
        assert_eq!(cache.get(&p), &[TagRef::new(5, "NLP")]);
    }

    #[test]
    fn insert_keeps_assignment_order() {
        let mut cache = PaperTagCache::new();
        let p = PaperId::from("p");
        cache.insert(&p, TagRef::new(9, "Z"));
        cache.insert(&p, TagRef::new(1, "A"));
        let ids: Vec<i64> = cache.get(&p).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![9, 1]);
    }

    #[test]
    fn remove_filters_by_id() {
        let mut cache = PaperTagCache::new();
        let p = PaperId::from("p");
        cache.seed(p.clone(), vec![TagRef::new(1, "A"), TagRef::new(2, "B")]);
        assert!(cache.remove(&p, 1));
        assert!(!cache.remove(&p, 1));
        assert_eq!(cache.get(&p), &[TagRef::new(2, "B")]);
    }

    #[test]
    fn remove_unknown_paper_is_noop() {
        let mut cache = PaperTagCache::new();
        assert!(!cache.remove(&PaperId::from("nope"), 1));
        assert!(!cache.contains(&PaperId::from("nope")));
    }

    #[test]
    fn seed_drops_duplicate_ids() {
        let mut cache = PaperTagCache::new();
        let p = PaperId::from("p");
        cache.seed(
            p.clone(),
            vec![TagRef::new(1, "A"), TagRef::new(1, "A again"), TagRef::new(2, "B")],
        );
        assert_eq!(cache.get(&p), &[TagRef::new(1, "A"), TagRef::new(2, "B")]);
    }

    #[test]
    fn seed_empty_marks_paper_loaded() {
        let mut cache = PaperTagCache::new();
        let p = PaperId::from("p");
        cache.seed(p.clone(), vec![]);
        assert!(cache.contains(&p));
        assert!(cache.get(&p).is_empty());
    }

    // ── TagTaxonomy ────────────────────────────────────────────────────

    #[test]
    fn find_nested_tag() {
        let tree = sample_tree();
        assert_eq!(tree.find(3).unwrap().name, "ML");
        assert_eq!(tree.find(4).unwrap().name, "Math");
        assert!(tree.find(99).is_none());
    }

    #[test]
    fn flatten_depth_first() {
        let tree = sample_tree();
        let flat: Vec<(usize, i64)> = tree.flatten().iter().map(|(d, t)| (*d, t.id)).collect();
        assert_eq!(flat, vec![(0, 1), (1, 2), (2, 3), (0, 4)]);
    }

    #[test]
    fn path_to_nested_tag() {
        let tree = sample_tree();
        assert_eq!(tree.path_to(3).unwrap(), vec!["CS", "AI", "ML"]);
        assert_eq!(tree.path_to(4).unwrap(), vec!["Math"]);
        assert!(tree.path_to(42).is_none());
    }

    #[test]
    fn empty_taxonomy() {
        let tree = TagTaxonomy::default();
        assert!(tree.is_empty());
        assert!(tree.flatten().is_empty());
    }
}
