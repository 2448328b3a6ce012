//! The page tree.
//!
//! When a document is opened, the tree isn't walked. Only the root node is
//! known, covering all pages, and a page reference is looked up the first
//! time the page is needed. Looking up a page splits the node covering it
//! into its children until a node is reached whose kids are all pages. The
//! nodes reached that way form the frontier, which is kept sorted by the
//! index of the first page each of them covers.
//!
//! Pages added to a new document are collected in leaves of a fixed size,
//! and the upper levels of the tree are only built when the document is
//! closed.

use crate::error::{Error, Result};
use crate::state::Lifecycle;
use crate::store::ObjectStore;
use crate::xref::Location;
use log::{debug, error, warn};
use quire_syntax::object::keys::{COUNT, KIDS, MEDIA_BOX, PAGE, PAGES, PARENT};
use quire_syntax::object::{Array, Dict, ObjRef, Object, ObjectFlags};
use rustc_hash::FxHashSet;

/// The size of a blank page, in points (A4).
const BLANK_PAGE_SIZE: [i64; 4] = [0, 0, 595, 842];

/// A handle to a page of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Page {
    id: ObjRef,
}

impl Page {
    /// The id of the page dictionary.
    pub fn id(&self) -> ObjRef {
        self.id
    }
}

type NodeId = usize;

/// An intermediate node of the page tree.
#[derive(Debug, Clone)]
struct PagesNode {
    reference: ObjRef,
    /// The index of the first page covered by this node.
    from: usize,
    /// The number of pages covered by this node.
    count: usize,
    parent: Option<NodeId>,
}

#[derive(Debug)]
pub(crate) struct PageTree {
    nodes: Vec<PagesNode>,
    /// The frontier of the tree, ordered by `from`.
    parents: Vec<NodeId>,
    page_refs: Vec<Option<ObjRef>>,
    pages: Vec<Option<Page>>,
    root: Option<NodeId>,
    leaf_size: usize,
    generated: bool,
}

impl PageTree {
    /// An empty tree for a new document.
    pub(crate) fn new(leaf_size: usize) -> Self {
        Self {
            nodes: vec![],
            parents: vec![],
            page_refs: vec![],
            pages: vec![],
            root: None,
            leaf_size: leaf_size.max(2),
            generated: false,
        }
    }

    /// The tree rooted at the existing node `root`.
    ///
    /// Only the page count of the root is read, the rest of the tree is
    /// loaded on demand.
    pub(crate) fn open(
        store: &mut ObjectStore,
        root: ObjRef,
        leaf_size: usize,
        max_pages: usize,
    ) -> Result<Self> {
        let declared = store
            .get(root)?
            .and_then(|o| o.as_dict())
            .ok_or(Error::InvalidStructure("the page tree root is not a dictionary"))?
            .get_i64(COUNT)
            .unwrap_or_else(|| {
                warn!("page tree root has no /Count");

                0
            });

        let count = usize::try_from(declared).unwrap_or(0);

        if count > max_pages {
            error!("page tree declares {count} pages");

            return Err(Error::ResourceLimit {
                requested: count,
                limit: max_pages,
            });
        }

        let mut tree = Self::new(leaf_size);
        tree.nodes.push(PagesNode {
            reference: root,
            from: 0,
            count,
            parent: None,
        });
        tree.parents.push(0);
        tree.root = Some(0);
        tree.page_refs = vec![None; count];
        tree.pages = vec![None; count];

        Ok(tree)
    }

    /// The number of pages.
    pub(crate) fn count(&self) -> usize {
        self.page_refs.len()
    }

    /// The root of the tree, if it exists already.
    pub(crate) fn root(&self) -> Option<ObjRef> {
        self.root.map(|r| self.nodes[r].reference)
    }

    /// Return the page with the given 1-based number.
    pub(crate) fn get_page(&mut self, store: &mut ObjectStore, number: usize) -> Result<Page> {
        let index = self.check_number(number)?;
        self.load_page(store, index)?;

        if let Some(page) = self.pages[index] {
            return Ok(page);
        }

        let id = self.page_refs[index].ok_or(Error::InvalidPageStructure(number))?;
        store.insert_flags(id, ObjectFlags::FORBID_RELEASE);

        let page = Page { id };
        self.pages[index] = Some(page);

        Ok(page)
    }

    /// Drop the handle of an unmodified page, so that the page dictionary
    /// can be released.
    pub(crate) fn release_page(&mut self, store: &mut ObjectStore, number: usize) -> Result<()> {
        let index = self.check_number(number)?;

        let Some(id) = self.page_refs[index] else {
            return Ok(());
        };

        let Some(entry) = store.xref().lookup(id) else {
            return Ok(());
        };

        let from_source = matches!(
            entry.location(),
            Location::ByteOffset(_) | Location::InObjectStream { .. }
        );

        if entry.is_flushed() || entry.is_modified() || !from_source {
            debug!("page {number} is kept in memory");

            return Ok(());
        }

        self.pages[index] = None;
        store.remove_flags(id, ObjectFlags::FORBID_RELEASE);
        store.release(id);

        Ok(())
    }

    /// Append a page at the end of the document.
    pub(crate) fn add_page(&mut self, store: &mut ObjectStore, id: ObjRef) -> Result<()> {
        let node = if self.root.is_some() {
            if let Some(last) = self.count().checked_sub(1) {
                self.load_page(store, last)?;
            }

            self.parents
                .last()
                .copied()
                .ok_or(Error::InvalidStructure("the page tree has no leaves"))?
        } else {
            match self.parents.last().copied() {
                Some(last) if self.nodes[last].count % self.leaf_size != 0 => last,
                Some(last) if self.nodes[last].count == 0 => last,
                last => {
                    let from = last.map_or(0, |l| self.nodes[l].from + self.nodes[l].count);
                    let leaf = self.new_node(store, from)?;
                    self.parents.push(leaf);

                    leaf
                }
            }
        };

        let position = self.nodes[node].count;
        self.insert_kid(store, node, position, id)?;

        self.page_refs.push(Some(id));
        self.pages.push(Some(Page { id }));
        store.insert_flags(id, ObjectFlags::FORBID_RELEASE);

        Ok(())
    }

    /// Insert a page so that it gets the 1-based number `number`.
    pub(crate) fn insert_page(
        &mut self,
        store: &mut ObjectStore,
        number: usize,
        id: ObjRef,
    ) -> Result<()> {
        if number == 0 || number > self.count() + 1 {
            return Err(Error::PageOutOfBounds {
                page: number,
                count: self.count(),
            });
        }

        if number == self.count() + 1 {
            return self.add_page(store, id);
        }

        let index = number - 1;
        self.load_page(store, index)?;

        let parent_index = self
            .find_page_parent(index)
            .ok_or(Error::InvalidPageStructure(number))?;
        let node = self.parents[parent_index];
        let position = index - self.nodes[node].from;

        self.insert_kid(store, node, position, id)?;
        self.correct_from(parent_index + 1, 1);

        self.page_refs.insert(index, Some(id));
        self.pages.insert(index, Some(Page { id }));
        store.insert_flags(id, ObjectFlags::FORBID_RELEASE);

        Ok(())
    }

    /// Remove the page with the given 1-based number and return its id.
    pub(crate) fn remove_page(&mut self, store: &mut ObjectStore, number: usize) -> Result<ObjRef> {
        let page = self.get_page(store, number)?;
        let index = number - 1;

        if store.lifecycle(page.id) == Some(Lifecycle::Flushed) {
            warn!("removing page {number}, which was already flushed");
        }

        let mut parent_index = self
            .find_page_parent(index)
            .ok_or(Error::InvalidPageStructure(number))?;
        let node = self.parents[parent_index];
        let position = index - self.nodes[node].from;

        let node_ref = self.nodes[node].reference;
        edit_dict(store, node_ref, |dict| {
            if let Some(kids) = dict.get_array_mut(KIDS)
                && position < kids.len()
            {
                kids.remove(position);
            }
        })?;
        self.change_count(store, node, -1)?;

        if self.nodes[node].count == 0 {
            self.parents.remove(parent_index);
            self.remove_from_parent(store, node)?;
        } else {
            parent_index += 1;
        }

        if self.parents.is_empty() {
            self.root = None;
        } else {
            self.correct_from(parent_index, -1);
        }

        self.page_refs.remove(index);
        self.pages.remove(index);

        Ok(page.id)
    }

    /// Build the upper levels of the tree, if necessary, and return its root.
    ///
    /// A blank page is added if the document has no pages.
    pub(crate) fn generate_tree(&mut self, store: &mut ObjectStore) -> Result<ObjRef> {
        if self.count() == 0 {
            debug!("adding a blank page to an empty document");

            let mut page = Dict::with_type(PAGE);
            page.insert(
                MEDIA_BOX,
                BLANK_PAGE_SIZE
                    .iter()
                    .map(|v| Object::from(*v))
                    .collect::<Array>(),
            );
            let id = store.allocate(Object::Dict(page))?;
            self.add_page(store, id)?;
        }

        if let Some(root) = self.root
            && self.generated
        {
            return Ok(self.nodes[root].reference);
        }

        if self.root.is_none() {
            while self.parents.len() > 1 {
                let mut next_parents = vec![];
                let mut dynamic_leaf_size = self.leaf_size;
                let mut current = None;

                for (i, node) in self.parents.clone().into_iter().enumerate() {
                    if i % dynamic_leaf_size == 0 {
                        // Avoid intermediate nodes with a single page.
                        if self.nodes[node].count <= 1 && current.is_some() {
                            dynamic_leaf_size += 1;
                        } else {
                            let from = self.nodes[node].from;
                            let parent = self.new_node(store, from)?;
                            next_parents.push(parent);
                            current = Some(parent);
                            dynamic_leaf_size = self.leaf_size;
                        }
                    }

                    if let Some(parent) = current {
                        self.adopt(store, parent, node)?;
                    }
                }

                self.parents = next_parents;
            }

            self.root = self.parents.first().copied();
        }

        self.generated = true;

        self.root()
            .ok_or(Error::InvalidStructure("the page tree has no root"))
    }

    fn check_number(&self, number: usize) -> Result<usize> {
        if number == 0 || number > self.count() {
            return Err(Error::PageOutOfBounds {
                page: number,
                count: self.count(),
            });
        }

        Ok(number - 1)
    }

    /// The position in the frontier of the node covering the page at `index`.
    fn find_page_parent(&self, index: usize) -> Option<usize> {
        let position = self
            .parents
            .partition_point(|n| self.nodes[*n].from <= index)
            .checked_sub(1)?;
        let node = &self.nodes[self.parents[position]];

        (index < node.from + node.count).then_some(position)
    }

    /// Make sure the reference of the page at `index` is known.
    fn load_page(&mut self, store: &mut ObjectStore, index: usize) -> Result<()> {
        let number = index + 1;
        let mut visited = FxHashSet::default();

        while self.page_refs[index].is_none() {
            let parent_index = self
                .find_page_parent(index)
                .ok_or(Error::InvalidPageStructure(number))?;
            let node = self.parents[parent_index];
            let node_ref = self.nodes[node].reference;

            if !visited.insert(node_ref) {
                error!("the page tree contains a cycle through {node_ref}");

                return Err(Error::InvalidPageStructure(number));
            }

            let kids = self.kid_refs(store, node, number)?;
            let mut has_nodes = false;

            for kid in &kids {
                let dict = store
                    .get(*kid)?
                    .and_then(|o| o.as_dict())
                    .ok_or(Error::InvalidPageStructure(number))?;

                match dict.get(KIDS) {
                    Some(Object::Array(_)) => has_nodes = true,
                    Some(_) => {
                        error!("/Kids of {kid} is not an array");

                        return Err(Error::InvalidPageStructure(number));
                    }
                    None => {}
                }
            }

            if has_nodes {
                self.split(store, parent_index, kids)?;
            } else {
                let from = self.nodes[node].from;

                for i in 0..self.nodes[node].count {
                    let kid = kids.get(i).copied().ok_or_else(|| {
                        error!("page tree node {node_ref} has fewer kids than its /Count");

                        Error::InvalidPageStructure(number)
                    })?;

                    self.page_refs[from + i] = Some(kid);
                }
            }
        }

        Ok(())
    }

    /// The kids of a node as references. Direct dictionaries are moved into
    /// objects of their own.
    fn kid_refs(&self, store: &mut ObjectStore, node: NodeId, number: usize) -> Result<Vec<ObjRef>> {
        let node_ref = self.nodes[node].reference;
        let kids = store
            .get(node_ref)?
            .and_then(|o| o.as_dict())
            .and_then(|d| d.get_array(KIDS))
            .cloned()
            .ok_or_else(|| {
                error!("page tree node {node_ref} has no /Kids");

                Error::InvalidPageStructure(number)
            })?;

        let mut refs = Vec::with_capacity(kids.len());
        let mut promoted = false;

        for kid in kids {
            match kid {
                Object::Reference(r) => refs.push(r),
                Object::Dict(dict) => {
                    refs.push(store.allocate(Object::Dict(dict))?);
                    promoted = true;
                }
                _ => {
                    error!("page tree node {node_ref} has an invalid kid");

                    return Err(Error::InvalidPageStructure(number));
                }
            }
        }

        if promoted {
            let array = refs.iter().map(|r| Object::Reference(*r)).collect::<Array>();
            edit_dict(store, node_ref, |dict| {
                dict.insert(KIDS, array);
            })?;
        }

        Ok(refs)
    }

    /// Replace the frontier node at `parent_index` by its children.
    ///
    /// Pages that are kids of the node next to intermediate nodes are grouped
    /// under new intermediate nodes, so that all kids of a node are of the
    /// same kind.
    fn split(&mut self, store: &mut ObjectStore, parent_index: usize, kids: Vec<ObjRef>) -> Result<()> {
        let parent = self.parents[parent_index];
        let parent_ref = self.nodes[parent].reference;
        let mut remaining = self.nodes[parent].count;
        let mut next_from = self.nodes[parent].from;

        let mut new_parents = vec![];
        let mut new_kids = vec![];
        let mut run: Option<NodeId> = None;
        let mut regrouped = false;

        let mut kids = kids.into_iter();

        for kid in kids.by_ref() {
            let declared = store
                .get(kid)?
                .and_then(|o| o.as_dict())
                .filter(|d| d.get(KIDS).is_some())
                .map(|d| d.get_i64(COUNT).unwrap_or(0));

            match declared {
                Some(declared) => {
                    run = None;

                    let count = usize::try_from(declared).unwrap_or(0).min(remaining);
                    let node = self.push_node(kid, next_from, count, Some(parent));
                    new_parents.push(node);
                    new_kids.push(kid);

                    next_from += count;
                    remaining -= count;
                }
                None => {
                    let synthesized = match run {
                        Some(node) => node,
                        None => {
                            let node = self.new_node(store, next_from)?;
                            self.nodes[node].parent = Some(parent);

                            let node_ref = self.nodes[node].reference;
                            edit_dict(store, node_ref, |dict| {
                                dict.insert(PARENT, parent_ref);
                            })?;

                            new_parents.push(node);
                            new_kids.push(node_ref);
                            run = Some(node);
                            regrouped = true;

                            node
                        }
                    };

                    let position = self.nodes[synthesized].count;
                    self.attach_page(store, synthesized, position, kid)?;
                    self.nodes[synthesized].count += 1;
                    self.sync_count(store, synthesized)?;

                    next_from += 1;
                    remaining -= 1;
                }
            }

            if remaining == 0 {
                break;
            }
        }

        // Only a regrouped node changes. Otherwise its /Kids are left as read.
        if regrouped {
            // Kids beyond the declared count stay where they are.
            new_kids.extend(kids);

            let array = new_kids.iter().map(|r| Object::Reference(*r)).collect::<Array>();
            edit_dict(store, parent_ref, |dict| {
                dict.insert(KIDS, array);
            })?;
        }

        self.parents.splice(parent_index..=parent_index, new_parents);

        Ok(())
    }

    fn push_node(&mut self, reference: ObjRef, from: usize, count: usize, parent: Option<NodeId>) -> NodeId {
        self.nodes.push(PagesNode {
            reference,
            from,
            count,
            parent,
        });

        self.nodes.len() - 1
    }

    /// Create a new, empty intermediate node.
    fn new_node(&mut self, store: &mut ObjectStore, from: usize) -> Result<NodeId> {
        let mut dict = Dict::with_type(PAGES);
        dict.insert(KIDS, Array::new());
        dict.insert(COUNT, 0);
        let reference = store.allocate(Object::Dict(dict))?;

        Ok(self.push_node(reference, from, 0, None))
    }

    /// Make `child` the last kid of `parent`.
    fn adopt(&mut self, store: &mut ObjectStore, parent: NodeId, child: NodeId) -> Result<()> {
        let parent_ref = self.nodes[parent].reference;
        let child_ref = self.nodes[child].reference;

        edit_dict(store, parent_ref, |dict| {
            if let Some(kids) = dict.get_array_mut(KIDS) {
                kids.push(child_ref);
            }
        })?;
        edit_dict(store, child_ref, |dict| {
            dict.insert(PARENT, parent_ref);
        })?;

        self.nodes[child].parent = Some(parent);
        let count = self.nodes[child].count;
        self.change_count(store, parent, count as isize)
    }

    /// Put the page `id` at `position` among the kids of `node`, and count it.
    fn insert_kid(&mut self, store: &mut ObjectStore, node: NodeId, position: usize, id: ObjRef) -> Result<()> {
        self.attach_page(store, node, position, id)?;
        self.change_count(store, node, 1)
    }

    /// Put the page `id` at `position` among the kids of `node` without
    /// touching any counts.
    fn attach_page(&self, store: &mut ObjectStore, node: NodeId, position: usize, id: ObjRef) -> Result<()> {
        let node_ref = self.nodes[node].reference;

        edit_dict(store, node_ref, |dict| {
            if let Some(kids) = dict.get_array_mut(KIDS) {
                kids.insert(position.min(kids.len()), id);
            } else {
                dict.insert(KIDS, Array::from(vec![Object::Reference(id)]));
            }
        })?;
        edit_dict(store, id, |dict| {
            dict.insert(PARENT, node_ref);
        })
    }

    /// Add `delta` to the count of `node` and all of its ancestors.
    fn change_count(&mut self, store: &mut ObjectStore, node: NodeId, delta: isize) -> Result<()> {
        let mut current = Some(node);

        while let Some(node) = current {
            let count = self.nodes[node].count.saturating_add_signed(delta);
            self.nodes[node].count = count;
            self.sync_count(store, node)?;

            current = self.nodes[node].parent;
        }

        Ok(())
    }

    fn sync_count(&self, store: &mut ObjectStore, node: NodeId) -> Result<()> {
        let count = self.nodes[node].count;

        edit_dict(store, self.nodes[node].reference, |dict| {
            dict.insert(COUNT, count);
        })
    }

    /// Unlink an empty node from its parent, and the parent from its own
    /// parent if that leaves it empty.
    fn remove_from_parent(&mut self, store: &mut ObjectStore, node: NodeId) -> Result<()> {
        let mut current = node;

        while let Some(parent) = self.nodes[current].parent {
            let child_ref = self.nodes[current].reference;

            edit_dict(store, self.nodes[parent].reference, |dict| {
                if let Some(kids) = dict.get_array_mut(KIDS)
                    && let Some(position) = kids.position_of_ref(child_ref)
                {
                    kids.remove(position);
                }
            })?;

            if self.nodes[parent].count != 0 {
                break;
            }

            current = parent;
        }

        Ok(())
    }

    /// Shift the first page index of all frontier nodes starting at `start`.
    fn correct_from(&mut self, start: usize, correction: isize) {
        for node in self.parents.iter().skip(start) {
            let node = &mut self.nodes[*node];
            node.from = node.from.saturating_add_signed(correction);
        }
    }
}

/// Change a dictionary of the page tree. Dictionaries that were already
/// written are left alone.
fn edit_dict(store: &mut ObjectStore, id: ObjRef, f: impl FnOnce(&mut Dict)) -> Result<()> {
    if store.lifecycle(id) == Some(Lifecycle::Flushed) {
        warn!("object {id} of the page tree was already flushed, not updating it");

        return Ok(());
    }

    let dict = store
        .get_mut(id)?
        .and_then(|o| o.as_dict_mut())
        .ok_or(Error::InvalidStructure("page tree entry is not a dictionary"))?;
    f(dict);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::PageTree;
    use crate::error::Error;
    use crate::store::ObjectStore;
    use quire_syntax::object::keys::{COUNT, KIDS, PAGE, PAGES, PARENT};
    use quire_syntax::object::{Array, Dict, ObjRef, Object, ObjectFlags};

    fn page(store: &mut ObjectStore) -> ObjRef {
        store.allocate(Object::Dict(Dict::with_type(PAGE))).unwrap()
    }

    fn dict(store: &mut ObjectStore, id: ObjRef) -> Dict {
        store.get(id).unwrap().unwrap().as_dict().unwrap().clone()
    }

    fn kid_counts(store: &mut ObjectStore, node: ObjRef) -> Vec<i64> {
        let kids = dict(store, node).get_array(KIDS).unwrap().clone();

        kids.iter()
            .map(|k| {
                let id = k.as_reference().unwrap();
                dict(store, id).get_i64(COUNT).unwrap()
            })
            .collect()
    }

    fn new_tree(store: &mut ObjectStore, pages: usize) -> (PageTree, Vec<ObjRef>) {
        let mut tree = PageTree::new(10);
        let ids: Vec<_> = (0..pages).map(|_| page(store)).collect();

        for id in &ids {
            tree.add_page(store, *id).unwrap();
        }

        (tree, ids)
    }

    /// Build a node from a list of kids, as it would appear in a file.
    fn node(store: &mut ObjectStore, kids: &[ObjRef], count: i64) -> ObjRef {
        let mut dict = Dict::with_type(PAGES);
        dict.insert(KIDS, kids.iter().map(|k| Object::Reference(*k)).collect::<Array>());
        dict.insert(COUNT, count);

        store.allocate(Object::Dict(dict)).unwrap()
    }

    /// Check that the `/Count` of `id` and of every node below it matches
    /// its kids, and return the number of pages under `id`.
    fn check_counts(store: &mut ObjectStore, id: ObjRef) -> i64 {
        let node = dict(store, id);
        let Some(kids) = node.get_array(KIDS) else {
            return 1;
        };

        let sum = kids
            .iter()
            .map(|k| check_counts(store, k.as_reference().unwrap()))
            .sum();
        assert_eq!(node.get_i64(COUNT), Some(sum), "/Count of {id}");

        sum
    }

    #[test]
    fn generated_tree_shape() {
        let mut store = ObjectStore::new(1000);
        let (mut tree, ids) = new_tree(&mut store, 25);

        let root = tree.generate_tree(&mut store).unwrap();
        assert_eq!(kid_counts(&mut store, root), vec![10, 10, 5]);
        assert_eq!(dict(&mut store, root).get_i64(COUNT), Some(25));

        for (i, id) in ids.iter().enumerate() {
            assert_eq!(tree.get_page(&mut store, i + 1).unwrap().id(), *id);
        }
    }

    #[test]
    fn remove_from_last_leaf() {
        let mut store = ObjectStore::new(1000);
        let (mut tree, ids) = new_tree(&mut store, 25);
        let root = tree.generate_tree(&mut store).unwrap();
        let froms: Vec<_> = tree.parents.iter().map(|n| tree.nodes[*n].from).collect();

        assert_eq!(tree.remove_page(&mut store, 21).unwrap(), ids[20]);

        assert_eq!(kid_counts(&mut store, root), vec![10, 10, 4]);
        assert_eq!(dict(&mut store, root).get_i64(COUNT), Some(24));
        assert_eq!(
            tree.parents.iter().map(|n| tree.nodes[*n].from).collect::<Vec<_>>(),
            froms
        );
        assert_eq!(tree.get_page(&mut store, 21).unwrap().id(), ids[21]);
    }

    #[test]
    fn insert_shifts_later_leaves() {
        let mut store = ObjectStore::new(1000);
        let (mut tree, ids) = new_tree(&mut store, 25);
        let root = tree.generate_tree(&mut store).unwrap();

        let inserted = page(&mut store);
        tree.insert_page(&mut store, 5, inserted).unwrap();

        assert_eq!(kid_counts(&mut store, root), vec![11, 10, 5]);
        assert_eq!(tree.count(), 26);
        assert_eq!(tree.get_page(&mut store, 5).unwrap().id(), inserted);
        assert_eq!(tree.get_page(&mut store, 6).unwrap().id(), ids[4]);
        assert_eq!(tree.get_page(&mut store, 12).unwrap().id(), ids[10]);
        assert_eq!(tree.get_page(&mut store, 26).unwrap().id(), ids[24]);
    }

    #[test]
    fn emptied_leaf_is_unlinked() {
        let mut store = ObjectStore::new(1000);
        let (mut tree, ids) = new_tree(&mut store, 11);
        let root = tree.generate_tree(&mut store).unwrap();

        tree.remove_page(&mut store, 11).unwrap();

        assert_eq!(kid_counts(&mut store, root), vec![10]);
        assert_eq!(tree.get_page(&mut store, 10).unwrap().id(), ids[9]);
        assert!(matches!(
            tree.get_page(&mut store, 11),
            Err(Error::PageOutOfBounds { page: 11, count: 10 })
        ));
    }

    #[test]
    fn single_page_leaf_joins_its_neighbors() {
        let mut store = ObjectStore::new(1000);
        let (mut tree, _) = new_tree(&mut store, 101);

        let root = tree.generate_tree(&mut store).unwrap();
        let mut counts = vec![10; 10];
        counts.push(1);

        // No intermediate node is created just for the last leaf.
        assert_eq!(kid_counts(&mut store, root), counts);
        assert_eq!(dict(&mut store, root).get_i64(COUNT), Some(101));
    }

    #[test]
    fn empty_document_gets_a_page() {
        let mut store = ObjectStore::new(1000);
        let mut tree = PageTree::new(10);

        let root = tree.generate_tree(&mut store).unwrap();
        assert_eq!(tree.count(), 1);
        assert_eq!(dict(&mut store, root).get_i64(COUNT), Some(1));
    }

    #[test]
    fn lazy_loading_of_mixed_kids() {
        let mut store = ObjectStore::new(1000);
        let pages: Vec<_> = (0..4).map(|_| page(&mut store)).collect();
        let inner = node(&mut store, &[pages[1], pages[2]], 2);
        let root = node(&mut store, &[pages[0], inner, pages[3]], 4);

        let mut tree = PageTree::open(&mut store, root, 10, 100).unwrap();
        assert_eq!(tree.count(), 4);
        assert!(tree.page_refs.iter().all(|p| p.is_none()));

        assert_eq!(tree.get_page(&mut store, 4).unwrap().id(), pages[3]);
        assert_eq!(tree.parents.len(), 3);

        // The last page was moved under a new node.
        let root_kids = dict(&mut store, root).get_array(KIDS).unwrap().clone();
        assert_eq!(root_kids.len(), 3);
        assert_eq!(root_kids[1], Object::Reference(inner));
        let synthesized = root_kids[2].as_reference().unwrap();
        assert_eq!(dict(&mut store, pages[3]).get_ref(PARENT), Some(synthesized));

        assert_eq!(tree.get_page(&mut store, 2).unwrap().id(), pages[1]);
        assert_eq!(tree.get_page(&mut store, 3).unwrap().id(), pages[2]);
        assert_eq!(tree.get_page(&mut store, 1).unwrap().id(), pages[0]);
        assert_eq!(kid_counts(&mut store, root), vec![1, 2, 1]);
    }

    #[test]
    fn loading_leaves_regular_nodes_unmodified() {
        let mut store = ObjectStore::new(1000);
        let pages: Vec<_> = (0..5).map(|_| page(&mut store)).collect();
        let left = node(&mut store, &pages[..2], 2);
        let right = node(&mut store, &pages[2..], 3);
        let root = node(&mut store, &[left, right], 5);

        let all: Vec<_> = pages.iter().copied().chain([left, right, root]).collect();
        for id in &all {
            store.remove_flags(*id, ObjectFlags::MODIFIED);
        }

        let mut tree = PageTree::open(&mut store, root, 10, 100).unwrap();
        for (i, id) in pages.iter().enumerate() {
            assert_eq!(tree.get_page(&mut store, i + 1).unwrap().id(), *id);
        }

        for id in all {
            assert!(!store.flags(id).unwrap().contains(ObjectFlags::MODIFIED), "{id}");
        }
    }

    #[test]
    fn counts_follow_edits_of_an_opened_tree() {
        let mut store = ObjectStore::new(1000);
        let pages: Vec<_> = (0..12).map(|_| page(&mut store)).collect();
        let inner = node(&mut store, &pages[1..6], 5);
        let mut kids = vec![pages[0], inner];
        kids.extend_from_slice(&pages[6..]);
        let root = node(&mut store, &kids, 12);

        let mut tree = PageTree::open(&mut store, root, 10, 100).unwrap();

        let inserted = page(&mut store);
        tree.insert_page(&mut store, 4, inserted).unwrap();
        assert_eq!(check_counts(&mut store, root), 13);

        assert_eq!(tree.remove_page(&mut store, 12).unwrap(), pages[10]);
        assert_eq!(check_counts(&mut store, root), 12);

        // Empties the node created for the first page.
        assert_eq!(tree.remove_page(&mut store, 1).unwrap(), pages[0]);
        assert_eq!(check_counts(&mut store, root), 11);

        let added = page(&mut store);
        tree.add_page(&mut store, added).unwrap();
        assert_eq!(check_counts(&mut store, root), 12);

        let mut expected = vec![pages[1], pages[2], inserted];
        expected.extend_from_slice(&pages[3..10]);
        expected.extend([pages[11], added]);

        for (i, id) in expected.iter().enumerate() {
            assert_eq!(tree.get_page(&mut store, i + 1).unwrap().id(), *id);
        }
    }

    #[test]
    fn cycles_are_rejected() {
        let mut store = ObjectStore::new(1000);
        let root = store.reserve().unwrap();
        let child = node(&mut store, &[root], 1);

        let mut dict = Dict::with_type(PAGES);
        dict.insert(KIDS, Array::from(vec![Object::Reference(child)]));
        dict.insert(COUNT, 1);
        store.install(root, Object::Dict(dict)).unwrap();

        let mut tree = PageTree::open(&mut store, root, 10, 100).unwrap();

        assert!(matches!(
            tree.get_page(&mut store, 1),
            Err(Error::InvalidPageStructure(1))
        ));
    }

    #[test]
    fn null_kids_are_rejected() {
        let mut store = ObjectStore::new(1000);
        let mut dict = Dict::with_type(PAGES);
        dict.insert(KIDS, Array::from(vec![Object::from(1i64)]));
        dict.insert(COUNT, 1);
        let root = store.allocate(Object::Dict(dict)).unwrap();

        let mut tree = PageTree::open(&mut store, root, 10, 100).unwrap();

        assert!(matches!(
            tree.get_page(&mut store, 1),
            Err(Error::InvalidPageStructure(1))
        ));
    }

    #[test]
    fn declared_count_is_limited() {
        let mut store = ObjectStore::new(1000);
        let root = node(&mut store, &[], 1_000_000);

        assert!(matches!(
            PageTree::open(&mut store, root, 10, 1000),
            Err(Error::ResourceLimit { .. })
        ));
    }
}
