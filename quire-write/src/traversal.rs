//! Flushing or releasing a page together with everything it references.
//!
//! The walk doesn't follow every key. Which keys are followed depends on
//! the kind of dictionary the walk is in, which is described by a small,
//! fixed graph of contexts. Back-references, such as the `/Parent` of a
//! page or the `/P` of an annotation, are never followed. Cycles that the
//! contexts don't anticipate are broken by tracking the objects on the
//! current path.

use crate::error::{Error, Result};
use crate::pages::PageTree;
use crate::state::Lifecycle;
use crate::store::ObjectStore;
use crate::writer::Writer;
use log::trace;
use quire_syntax::object::keys::{
    A, AA, ANNOTS, B, D, DEST, DPART, NEXT, P, PA, PARENT, POPUP, SD, V,
};
use quire_syntax::object::{Dict, ObjRef, Object, ObjectFlags};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::io::Write;
use std::sync::LazyLock;

/// What happens to the objects reached from a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Write every object.
    FlushAll,
    /// Don't write anything, only release objects that are unmodified.
    ReleaseOnly,
    /// Write modified objects and release all others.
    FlushModified,
}

type ContextId = usize;
type Children = SmallVec<[(ObjRef, ContextId); 8]>;

/// Keys are descended without restrictions.
const UNRESTRICTED: ContextId = 0;
const PAGE_CONTEXT: ContextId = 1;
const ANNOTATION: ContextId = 2;
const ADDITIONAL_ACTIONS: ContextId = 3;
const ACTION: ContextId = 4;
/// No key is descended.
const OPAQUE: ContextId = 5;

#[derive(Debug, Default)]
struct Context {
    blacklist: FxHashSet<&'static [u8]>,
    all_blacklisted: bool,
    children: FxHashMap<&'static [u8], ContextId>,
    /// The context of keys that don't have one of their own.
    fallback: Option<ContextId>,
}

impl Context {
    fn blacklisting(keys: &[&'static [u8]]) -> Self {
        Self {
            blacklist: keys.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn with_child(mut self, key: &'static [u8], child: ContextId) -> Self {
        self.children.insert(key, child);
        self
    }
}

static CONTEXTS: LazyLock<Vec<Context>> = LazyLock::new(|| {
    let mut contexts = Vec::with_capacity(6);

    contexts.push(Context::default());
    contexts.push(
        Context::blacklisting(&[PARENT, DPART])
            .with_child(ANNOTS, ANNOTATION)
            .with_child(AA, ADDITIONAL_ACTIONS)
            .with_child(B, OPAQUE),
    );
    contexts.push(
        Context::blacklisting(&[P, POPUP, DEST, PARENT, V])
            .with_child(A, ACTION)
            .with_child(PA, ACTION)
            .with_child(AA, ADDITIONAL_ACTIONS),
    );
    contexts.push(Context {
        fallback: Some(ACTION),
        ..Context::default()
    });
    contexts.push(Context::blacklisting(&[D, SD, DEST]).with_child(NEXT, ACTION));
    contexts.push(Context {
        all_blacklisted: true,
        ..Context::default()
    });

    contexts
});

/// The context of the value of `key` in a dictionary in context `context`, or
/// `None` if the value is not visited.
fn descend(context: ContextId, key: &[u8]) -> Option<ContextId> {
    let context = &CONTEXTS[context];

    if context.all_blacklisted || context.blacklist.contains(key) {
        return None;
    }

    Some(
        context
            .children
            .get(key)
            .copied()
            .or(context.fallback)
            .unwrap_or(UNRESTRICTED),
    )
}

/// Collect the indirect objects referenced from `object` together with the
/// context they are reached in.
fn collect_children(object: &Object, context: ContextId, out: &mut Children) {
    match object {
        Object::Reference(r) => out.push((*r, context)),
        Object::Array(array) => {
            for item in array.iter() {
                collect_children(item, context, out);
            }
        }
        Object::Dict(dict) => collect_entries(dict, context, out),
        Object::Stream(stream) => collect_entries(stream.dict(), context, out),
        _ => {}
    }
}

fn collect_entries(dict: &Dict, context: ContextId, out: &mut Children) {
    for (key, value) in dict.iter() {
        if let Some(child) = descend(context, key) {
            collect_children(value, child, out);
        }
    }
}

enum Task {
    Enter(ObjRef, ContextId),
    Exit(ObjRef),
}

/// Apply `policy` to page `number` and everything it references.
///
/// Children are handled before the objects referencing them. Objects that
/// are not in memory are skipped, since there is nothing to write or drop.
pub(crate) fn process_page<W: Write>(
    store: &mut ObjectStore,
    pages: &mut PageTree,
    mut writer: Option<&mut Writer<W>>,
    number: usize,
    policy: Policy,
) -> Result<()> {
    if policy != Policy::ReleaseOnly && writer.is_none() {
        return Err(Error::NoWriter);
    }

    let page = pages.get_page(store, number)?.id();

    match store.lifecycle(page) {
        Some(Lifecycle::Flushed | Lifecycle::Free) | None => return Ok(()),
        Some(Lifecycle::Unloaded | Lifecycle::Released) if policy == Policy::ReleaseOnly => {
            return Ok(());
        }
        _ => {
            store.load(page)?;
        }
    }

    let mut path = FxHashSet::default();
    let mut finished = FxHashSet::default();
    let mut tasks = vec![Task::Enter(page, PAGE_CONTEXT)];

    while let Some(task) = tasks.pop() {
        match task {
            Task::Enter(id, context) => {
                if path.contains(&id) || finished.contains(&id) {
                    continue;
                }

                let Some(object) = store
                    .xref()
                    .lookup(id)
                    .filter(|e| e.lifecycle() == Lifecycle::Loaded)
                    .and_then(|e| e.payload())
                else {
                    continue;
                };

                let mut children = Children::new();
                collect_children(object, context, &mut children);

                path.insert(id);
                tasks.push(Task::Exit(id));
                tasks.extend(
                    children
                        .into_iter()
                        .rev()
                        .map(|(child, context)| Task::Enter(child, context)),
                );
            }
            Task::Exit(id) => {
                path.remove(&id);
                finished.insert(id);

                if id != page {
                    apply(store, writer.as_deref_mut(), id, policy)?;
                }
            }
        }
    }

    let modified = store
        .flags(page)
        .is_some_and(|f| f.contains(ObjectFlags::MODIFIED));

    match (policy, writer) {
        (Policy::FlushAll, Some(writer)) => writer.flush_object(store, page, true),
        (Policy::FlushModified, Some(writer)) if modified => writer.flush_object(store, page, true),
        _ => pages.release_page(store, number),
    }
}

fn apply<W: Write>(
    store: &mut ObjectStore,
    writer: Option<&mut Writer<W>>,
    id: ObjRef,
    policy: Policy,
) -> Result<()> {
    let flags = store.flags(id).unwrap_or_default();
    let modified = flags.contains(ObjectFlags::MODIFIED);

    match (policy, writer) {
        (Policy::FlushAll, Some(writer)) => writer.flush_object(store, id, true),
        (Policy::FlushModified, Some(writer)) if modified => writer.flush_object(store, id, true),
        _ => {
            if modified || flags.contains(ObjectFlags::FORBID_RELEASE) {
                trace!("keeping object {id} in memory");
            } else {
                store.release(id);
            }

            Ok(())
        }
    }
}
