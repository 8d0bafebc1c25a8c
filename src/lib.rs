//! # pathmap-rs
//!
//! A trie map from hierarchical paths to values, where a path element may be
//! a wildcard that matches any single element.
//!
//! Registrations are exact: [`PathMap::get`] and [`PathMap::delete`] only
//! match a stored wildcard with a wildcard. Queries are patterns:
//! [`PathMap::visit`] reports every registration whose pattern matches a
//! concrete path, and [`PathMap::visit_prefixes`] every registration whose
//! pattern matches a prefix of it.
//!
//! ## Example
//!
//! ```rust
//! use pathmap_rs::Element::{Key, Wildcard};
//! use pathmap_rs::PathMap;
//!
//! let mut map: PathMap<&str, u32> = PathMap::new();
//! map.set(&[Key("foo"), Key("bar")], 1);
//! map.set(&[Wildcard, Key("bar")], 2);
//!
//! assert_eq!(map.get(&[Key("foo"), Key("bar")]), Some(&1));
//! assert_eq!(map.get(&[Key("foo"), Wildcard]), None);
//!
//! // Wildcard branches are reported before concrete ones.
//! assert_eq!(map.matches(&["foo", "bar"]), vec![&2, &1]);
//! ```
//!
//! ## Concurrency
//!
//! Mutation takes `&mut self` and visitors only ever see `&V`, so a visitor
//! cannot modify the map it is traversing. Sharing a map across threads
//! requires an external lock around it.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::hash::{BuildHasher, Hash};

use tracing::trace;

// =============================================================================
// Path elements
// =============================================================================

const WILDCARD_LABEL: &str = "*";

/// One segment of a path: either a concrete key or the wildcard.
///
/// The wildcard is its own variant, so it can never collide with a key and
/// only ever equals another wildcard. It orders before every key, which is
/// also the order in which traversals report wildcard matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Element<K> {
    /// Matches any single element when visiting.
    Wildcard,
    /// A concrete element.
    Key(K),
}

impl<K> Element<K> {
    /// Returns `true` for [`Element::Wildcard`].
    #[inline]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Element::Wildcard)
    }

    /// The concrete key, or `None` for the wildcard.
    #[inline]
    pub fn key(&self) -> Option<&K> {
        match self {
            Element::Wildcard => None,
            Element::Key(key) => Some(key),
        }
    }

    /// Converts from `&Element<K>` to `Element<&K>`.
    #[inline]
    pub fn as_ref(&self) -> Element<&K> {
        match self {
            Element::Wildcard => Element::Wildcard,
            Element::Key(key) => Element::Key(key),
        }
    }
}

impl<K: Clone> Element<&K> {
    /// Maps an `Element<&K>` to an `Element<K>` by cloning the key.
    #[inline]
    pub fn cloned(self) -> Element<K> {
        match self {
            Element::Wildcard => Element::Wildcard,
            Element::Key(key) => Element::Key(key.clone()),
        }
    }
}

impl<K> From<K> for Element<K> {
    fn from(key: K) -> Self {
        Element::Key(key)
    }
}

impl<K: fmt::Display> fmt::Display for Element<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Wildcard => f.write_str(WILDCARD_LABEL),
            Element::Key(key) => key.fmt(f),
        }
    }
}

// =============================================================================
// Trie node
// =============================================================================

/// Invariant: every node below the root holds a value or at least one child.
#[derive(Clone)]
struct Node<K, V, S> {
    value: Option<V>,
    wildcard: Option<Box<Node<K, V, S>>>,
    children: HashMap<K, Node<K, V, S>, S>,
}

impl<K, V, S> Node<K, V, S> {
    fn with_hasher(hash_builder: S) -> Self {
        Self {
            value: None,
            wildcard: None,
            children: HashMap::with_hasher(hash_builder),
        }
    }

    #[inline]
    fn branch_count(&self) -> usize {
        usize::from(self.wildcard.is_some()) + self.children.len()
    }

    #[inline]
    fn is_vacant(&self) -> bool {
        self.value.is_none() && self.wildcard.is_none() && self.children.is_empty()
    }

    fn clear(&mut self) {
        self.value = None;
        self.wildcard = None;
        self.children.clear();
    }
}

// Deep paths would otherwise overflow the stack through recursive drops.
impl<K, V, S> Drop for Node<K, V, S> {
    fn drop(&mut self) {
        let mut stack: Vec<Self> = Vec::new();
        stack.extend(self.wildcard.take().map(|child| *child));
        stack.extend(self.children.drain().map(|(_, child)| child));
        while let Some(mut node) = stack.pop() {
            stack.extend(node.wildcard.take().map(|child| *child));
            stack.extend(node.children.drain().map(|(_, child)| child));
        }
    }
}

impl<K: Eq + Hash, V, S: BuildHasher> Node<K, V, S> {
    /// Exact step: a wildcard only follows the wildcard branch.
    #[inline]
    fn descend<Q>(&self, element: &Element<Q>) -> Option<&Self>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        match element {
            Element::Wildcard => self.wildcard.as_deref(),
            Element::Key(key) => self.children.get(key),
        }
    }

    #[inline]
    fn descend_mut<Q>(&mut self, element: &Element<Q>) -> Option<&mut Self>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        match element {
            Element::Wildcard => self.wildcard.as_deref_mut(),
            Element::Key(key) => self.children.get_mut(key),
        }
    }

    fn find<Q>(&self, path: &[Element<Q>]) -> Option<&Self>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        path.iter().try_fold(self, |node, element| node.descend(element))
    }

    fn find_mut<Q>(&mut self, path: &[Element<Q>]) -> Option<&mut Self>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let mut node = self;
        for element in path {
            node = node.descend_mut(element)?;
        }
        Some(node)
    }

    /// Takes the branch reached through `element` out of this node.
    fn detach<Q>(&mut self, element: &Element<Q>) -> Option<Self>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        match element {
            Element::Wildcard => self.wildcard.take().map(|child| *child),
            Element::Key(key) => self.children.remove(key),
        }
    }

    /// Clears the value at exactly `path` and detaches the nodes this leaves
    /// vacant. Returns `None` if the path does not exist, otherwise the
    /// cleared value (if there was one) and the number of nodes pruned.
    fn clear_path<Q>(&mut self, path: &[Element<Q>]) -> Option<(Option<V>, usize)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        // Record the chain of nodes from the root down to the target.
        let mut chain: Vec<&Self> = Vec::with_capacity(path.len() + 1);
        let mut node = &*self;
        chain.push(node);
        for element in path {
            node = node.descend(element)?;
            chain.push(node);
        }

        // Walk the chain back up. `cut` is the shallowest depth that becomes
        // vacant once the target value is gone; the root is never cut.
        let mut cut = path.len() + 1;
        for depth in (1..=path.len()).rev() {
            let node = chain[depth];
            let kept = if depth == path.len() {
                node.branch_count() > 0
            } else {
                node.value.is_some() || node.branch_count() > 1
            };
            if kept {
                break;
            }
            cut = depth;
        }
        let pruned = path.len() + 1 - cut;

        let value = if pruned == 0 {
            self.find_mut(path)?.value.take()
        } else {
            let parent = self.find_mut(&path[..cut - 1])?;
            let mut detached = parent.detach(&path[cut - 1])?;
            detached.find_mut(&path[cut..])?.value.take()
        };
        Some((value, pruned))
    }

    fn visit<'a, Q, E, F>(&'a self, path: &[Q], visitor: &mut F) -> Result<(), E>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
        F: FnMut(&'a V) -> Result<(), E>,
    {
        let mut node = self;
        for (i, element) in path.iter().enumerate() {
            if let Some(wildcard) = &node.wildcard {
                wildcard.visit(&path[i + 1..], visitor)?;
            }
            match node.children.get(element) {
                Some(next) => node = next,
                None => return Ok(()),
            }
        }
        match &node.value {
            Some(value) => visitor(value),
            None => Ok(()),
        }
    }

    fn visit_prefixes<'a, Q, E, F>(&'a self, path: &[Q], visitor: &mut F) -> Result<(), E>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
        F: FnMut(&'a V) -> Result<(), E>,
    {
        let mut node = self;
        for (i, element) in path.iter().enumerate() {
            if let Some(value) = &node.value {
                visitor(value)?;
            }
            if let Some(wildcard) = &node.wildcard {
                wildcard.visit_prefixes(&path[i + 1..], visitor)?;
            }
            match node.children.get(element) {
                Some(next) => node = next,
                None => return Ok(()),
            }
        }
        match &node.value {
            Some(value) => visitor(value),
            None => Ok(()),
        }
    }
}

impl<K: fmt::Display, V: fmt::Display, S> Node<K, V, S> {
    fn write(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        if let Some(value) = &self.value {
            writeln!(f, "{:indent$}Val: {value}", "")?;
        }
        if let Some(wildcard) = &self.wildcard {
            writeln!(f, "{:indent$}Child {WILDCARD_LABEL:?}:", "")?;
            wildcard.write(f, indent + 2)?;
        }

        // Sorted by rendered key so the dump does not depend on hash order.
        let mut children: Vec<(String, &Self)> = self
            .children
            .iter()
            .map(|(key, child)| (key.to_string(), child))
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));

        for (label, child) in children {
            writeln!(f, "{:indent$}Child {label:?}:", "")?;
            child.write(f, indent + 2)?;
        }
        Ok(())
    }
}

// =============================================================================
// PathMap
// =============================================================================

/// A map from paths of `K` to values of `V`, with wildcard path elements.
///
/// Each node of the trie holds an optional value, an optional wildcard
/// child, and a hash map of concrete children built with `S`.
#[derive(Clone)]
pub struct PathMap<K, V, S = RandomState> {
    root: Node<K, V, S>,
    hash_builder: S,
    count: usize,
}

impl<K, V> PathMap<K, V, RandomState> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<K, V, S: Clone> PathMap<K, V, S> {
    /// Creates an empty map whose nodes hash keys with `hash_builder`.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            root: Node::with_hasher(hash_builder.clone()),
            hash_builder,
            count: 0,
        }
    }
}

impl<K, V, S> PathMap<K, V, S> {
    /// Number of paths holding a value.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if no path holds a value.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Removes every value, keeping the hasher.
    pub fn clear(&mut self) {
        self.root.clear();
        self.count = 0;
    }

    /// Iterates over every registered pattern and its value.
    ///
    /// A node's own value comes before anything below it, and its wildcard
    /// subtree before its concrete children. Concrete siblings come in
    /// unspecified order.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter {
            stack: vec![(Vec::new(), &self.root)],
        }
    }
}

impl<K, V, S> PathMap<K, V, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher + Clone,
{
    /// Registers `value` at `path`, returning the value it replaced.
    ///
    /// Wildcard elements create or follow the wildcard branch; they are not
    /// expanded.
    pub fn set(&mut self, path: &[Element<K>], value: V) -> Option<V> {
        let hash_builder = &self.hash_builder;
        let mut node = &mut self.root;
        for element in path {
            node = match element {
                Element::Wildcard => &mut **node
                    .wildcard
                    .get_or_insert_with(|| Box::new(Node::with_hasher(hash_builder.clone()))),
                Element::Key(key) => {
                    if !node.children.contains_key(key) {
                        node.children
                            .insert(key.clone(), Node::with_hasher(hash_builder.clone()));
                    }
                    node.children
                        .get_mut(key)
                        .expect("child exists or was just inserted")
                }
            };
        }

        let old = node.value.replace(value);
        if old.is_none() {
            self.count += 1;
        }
        trace!(depth = path.len(), replaced = old.is_some(), "set path");
        old
    }
}

impl<K, V, S> PathMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Returns the value registered at exactly `path`.
    ///
    /// A wildcard in `path` only matches a wildcard registration, and a key
    /// never matches one.
    pub fn get<Q>(&self, path: &[Element<Q>]) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.root.find(path)?.value.as_ref()
    }

    /// Mutable form of [`PathMap::get`].
    pub fn get_mut<Q>(&mut self, path: &[Element<Q>]) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.root.find_mut(path)?.value.as_mut()
    }

    /// Returns `true` if a value is registered at exactly `path`.
    pub fn contains_path<Q>(&self, path: &[Element<Q>]) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.get(path).is_some()
    }

    fn clear_path<Q>(&mut self, path: &[Element<Q>]) -> Option<Option<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let (old, pruned) = self.root.clear_path(path)?;
        if old.is_some() {
            self.count -= 1;
        }
        trace!(depth = path.len(), removed = old.is_some(), pruned, "cleared path");
        Some(old)
    }

    /// Unregisters exactly `path` and returns its value.
    ///
    /// Nodes left without a value or children are pruned up to the first
    /// ancestor that still holds something.
    pub fn remove<Q>(&mut self, path: &[Element<Q>]) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.clear_path(path).flatten()
    }

    /// Unregisters exactly `path`, pruning as [`PathMap::remove`] does.
    ///
    /// Returns `false` only when `path` does not exist in the trie. A path
    /// ending on an intermediate node without a value still exists, so this
    /// returns `true` and leaves the registrations below it in place.
    pub fn delete<Q>(&mut self, path: &[Element<Q>]) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.clear_path(path).is_some()
    }

    /// Calls `visitor` with every value whose pattern matches `path`.
    ///
    /// At each position both the wildcard branch and the branch keyed by the
    /// path element are followed, wildcard first, depth first. The first
    /// error returned by `visitor` stops the traversal and is returned as is.
    ///
    /// This is linear in the length of `path` in the common case, but can
    /// reach `O(2^len)` when many wildcard patterns are registered.
    ///
    /// ```rust
    /// use pathmap_rs::Element::{Key, Wildcard};
    /// use pathmap_rs::PathMap;
    ///
    /// let mut map = PathMap::new();
    /// map.set(&[Key("foo"), Wildcard], "any child of foo");
    /// map.set(&[Key("foo"), Key("bar")], "foo/bar");
    ///
    /// let mut seen = Vec::new();
    /// map.visit(&["foo", "bar"], |v| {
    ///     seen.push(*v);
    ///     Ok::<_, std::fmt::Error>(())
    /// })
    /// .unwrap();
    /// assert_eq!(seen, ["any child of foo", "foo/bar"]);
    /// ```
    pub fn visit<'a, Q, E, F>(&'a self, path: &[Q], mut visitor: F) -> Result<(), E>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
        F: FnMut(&'a V) -> Result<(), E>,
    {
        self.root.visit(path, &mut visitor)
    }

    /// Calls `visitor` with every value whose pattern matches a prefix of
    /// `path`, the empty prefix included.
    ///
    /// Values are reported as soon as the walk reaches them, so shorter
    /// prefixes come before longer ones along the same branch. Errors abort
    /// the traversal exactly as in [`PathMap::visit`].
    pub fn visit_prefixes<'a, Q, E, F>(&'a self, path: &[Q], mut visitor: F) -> Result<(), E>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
        F: FnMut(&'a V) -> Result<(), E>,
    {
        self.root.visit_prefixes(path, &mut visitor)
    }

    /// Collects the values [`PathMap::visit`] would report, in order.
    pub fn matches<Q>(&self, path: &[Q]) -> Vec<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let mut out = Vec::new();
        if let Err(never) = self.visit(path, |value| {
            out.push(value);
            Ok::<(), Infallible>(())
        }) {
            match never {}
        }
        out
    }

    /// Collects the values [`PathMap::visit_prefixes`] would report, in order.
    pub fn prefix_matches<Q>(&self, path: &[Q]) -> Vec<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let mut out = Vec::new();
        if let Err(never) = self.visit_prefixes(path, |value| {
            out.push(value);
            Ok::<(), Infallible>(())
        }) {
            match never {}
        }
        out
    }
}

impl<K, V, S: Clone + Default> Default for PathMap<K, V, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> Extend<(Vec<Element<K>>, V)> for PathMap<K, V, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher + Clone,
{
    fn extend<I: IntoIterator<Item = (Vec<Element<K>>, V)>>(&mut self, iter: I) {
        for (path, value) in iter {
            self.set(&path, value);
        }
    }
}

impl<K, V, S> FromIterator<(Vec<Element<K>>, V)> for PathMap<K, V, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher + Clone + Default,
{
    fn from_iter<I: IntoIterator<Item = (Vec<Element<K>>, V)>>(iter: I) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

/// Indented dump of the trie: each node's value, then its wildcard child,
/// then its concrete children sorted by their rendered key.
impl<K: fmt::Display, V: fmt::Display, S> fmt::Display for PathMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.write(f, 0)
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for PathMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

// =============================================================================
// Iteration
// =============================================================================

/// Iterator over the patterns and values of a [`PathMap`].
pub struct Iter<'a, K, V, S = RandomState> {
    stack: Vec<(Vec<Element<&'a K>>, &'a Node<K, V, S>)>,
}

impl<'a, K, V, S> Iterator for Iter<'a, K, V, S> {
    type Item = (Vec<Element<&'a K>>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((path, node)) = self.stack.pop() {
            for (key, child) in &node.children {
                let mut child_path = path.clone();
                child_path.push(Element::Key(key));
                self.stack.push((child_path, child));
            }
            // Pushed last so it is popped before the concrete children.
            if let Some(wildcard) = &node.wildcard {
                let mut child_path = path.clone();
                child_path.push(Element::Wildcard);
                self.stack.push((child_path, wildcard));
            }

            if let Some(value) = &node.value {
                return Some((path, value));
            }
        }
        None
    }
}

impl<'a, K, V, S> IntoIterator for &'a PathMap<K, V, S> {
    type Item = (Vec<Element<&'a K>>, &'a V);
    type IntoIter = Iter<'a, K, V, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}


#[cfg(test)]
mod proptests;
