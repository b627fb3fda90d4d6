//! Ordered element tree for a StructureDefinition under construction
//!
//! Elements live in an arena and are addressed by [`ElementIdx`]. A separate
//! order vector gives the snapshot order, and an id index gives O(1) lookup.
//! The tree also tracks the original state of every element that has been
//! touched, which is what the differential is computed against.
//!
//! Element ids follow the FHIR convention: `Parent.child`, slices as
//! `Parent.child:slice`, reslices as `Parent.child:slice/reslice`.

use crate::fhir::ElementDefinition;
use std::collections::HashMap;

/// Handle to an element in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementIdx(usize);

#[derive(Debug, Clone, Default)]
pub struct ElementTree {
    arena: Vec<ElementDefinition>,
    order: Vec<ElementIdx>,
    by_id: HashMap<String, ElementIdx>,
    originals: HashMap<ElementIdx, ElementDefinition>,
}

/// Id of the slice `name` on the element with id `element_id`
pub fn slice_id(element_id: &str, name: &str) -> String {
    let last = element_id.rsplit('.').next().unwrap_or(element_id);
    if last.contains(':') {
        format!("{element_id}/{name}")
    } else {
        format!("{element_id}:{name}")
    }
}

/// `Observation.component:sys.code` -> `Observation.component.code`
pub fn unsliced_id(id: &str) -> String {
    id.split('.')
        .map(|segment| segment.split(':').next().unwrap_or(segment))
        .collect::<Vec<_>>()
        .join(".")
}

fn is_within(id: &str, ancestor: &str) -> bool {
    id.len() > ancestor.len()
        && id.starts_with(ancestor)
        && matches!(id.as_bytes()[ancestor.len()], b'.' | b':' | b'/')
}

impl ElementTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from snapshot elements (no originals are captured)
    pub fn from_elements(elements: Vec<ElementDefinition>) -> Self {
        let mut tree = Self::new();
        for element in elements {
            let idx = ElementIdx(tree.arena.len());
            tree.by_id.insert(element.id.clone(), idx);
            tree.arena.push(element);
            tree.order.push(idx);
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn root(&self) -> Option<ElementIdx> {
        self.order.first().copied()
    }

    pub fn get(&self, idx: ElementIdx) -> &ElementDefinition {
        &self.arena[idx.0]
    }

    /// Mutable access; the first mutable access captures the original
    pub fn get_mut(&mut self, idx: ElementIdx) -> &mut ElementDefinition {
        if !self.originals.contains_key(&idx) {
            let original = self.arena[idx.0].clone();
            self.originals.insert(idx, original);
        }
        &mut self.arena[idx.0]
    }

    pub fn original(&self, idx: ElementIdx) -> Option<&ElementDefinition> {
        self.originals.get(&idx)
    }

    pub fn find(&self, id: &str) -> Option<ElementIdx> {
        self.by_id.get(id).copied()
    }

    /// Elements in snapshot order
    pub fn iter(&self) -> impl Iterator<Item = (ElementIdx, &ElementDefinition)> {
        self.order.iter().map(|&idx| (idx, &self.arena[idx.0]))
    }

    pub fn elements(&self) -> Vec<ElementDefinition> {
        self.iter().map(|(_, element)| element.clone()).collect()
    }

    fn position(&self, idx: ElementIdx) -> Option<usize> {
        self.order.iter().position(|&i| i == idx)
    }

    /// Direct children (not slices) of an element
    pub fn children(&self, idx: ElementIdx) -> Vec<ElementIdx> {
        let prefix = format!("{}.", self.get(idx).id);
        self.iter()
            .filter(|(_, e)| {
                e.id.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('.'))
            })
            .map(|(i, _)| i)
            .collect()
    }

    pub fn has_children(&self, idx: ElementIdx) -> bool {
        let prefix = format!("{}.", self.get(idx).id);
        self.by_id.keys().any(|id| id.starts_with(&prefix))
    }

    /// All descendants (children, grandchildren, ...) excluding slices of the element itself
    pub fn descendants(&self, idx: ElementIdx) -> Vec<ElementIdx> {
        let prefix = format!("{}.", self.get(idx).id);
        self.iter()
            .filter(|(_, e)| e.id.starts_with(&prefix))
            .map(|(i, _)| i)
            .collect()
    }

    /// Direct slices of an element (reslices of a slice included for a slice)
    pub fn slices(&self, idx: ElementIdx) -> Vec<ElementIdx> {
        let id = &self.get(idx).id;
        let probe = slice_id(id, "");
        self.iter()
            .filter(|(_, e)| {
                e.id.strip_prefix(&probe).is_some_and(|rest| {
                    !rest.is_empty() && !rest.contains('.') && !rest.contains('/')
                })
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Parent element by id (a slice's parent is the parent of the sliced element)
    pub fn parent(&self, idx: ElementIdx) -> Option<ElementIdx> {
        let id = &self.get(idx).id;
        let (parent_id, _) = id.rsplit_once('.')?;
        self.find(parent_id)
    }

    /// The element a slice was cut from, if `idx` is a slice
    pub fn sliced_element(&self, idx: ElementIdx) -> Option<ElementIdx> {
        let id = &self.get(idx).id;
        let last_start = id.rfind('.').map(|p| p + 1).unwrap_or(0);
        let last = &id[last_start..];
        let cut = last.rfind('/').or_else(|| last.find(':'))?;
        self.find(&id[..last_start + cut])
    }

    /// Last element (in order) that belongs to the subtree of `idx`, slices included
    pub fn subtree_end(&self, idx: ElementIdx) -> ElementIdx {
        let id = self.get(idx).id.clone();
        self.iter()
            .filter(|(_, e)| is_within(&e.id, &id))
            .filter_map(|(i, _)| self.position(i).map(|p| (p, i)))
            .max_by_key(|(p, _)| *p)
            .map(|(_, i)| i)
            .unwrap_or(idx)
    }

    /// Insert an element right after `anchor` in snapshot order
    pub fn insert_after(&mut self, anchor: ElementIdx, element: ElementDefinition) -> ElementIdx {
        let idx = ElementIdx(self.arena.len());
        self.by_id.insert(element.id.clone(), idx);
        self.arena.push(element);
        let position = self
            .position(anchor)
            .map(|p| p + 1)
            .unwrap_or(self.order.len());
        self.order.insert(position, idx);
        idx
    }

    /// Insert several elements, in order, right after `anchor`
    pub fn insert_all_after(
        &mut self,
        anchor: ElementIdx,
        elements: Vec<ElementDefinition>,
    ) -> Vec<ElementIdx> {
        let mut last = anchor;
        let mut inserted = Vec::with_capacity(elements.len());
        for element in elements {
            last = self.insert_after(last, element);
            inserted.push(last);
        }
        inserted
    }

    /// Insert a newly created element whose differential baseline is `shell`
    pub fn insert_created(
        &mut self,
        anchor: ElementIdx,
        element: ElementDefinition,
        shell: ElementDefinition,
    ) -> ElementIdx {
        let idx = self.insert_after(anchor, element);
        self.originals.insert(idx, shell);
        idx
    }

    /// Remove an element together with its descendants and slices
    pub fn remove_subtree(&mut self, idx: ElementIdx) {
        let id = self.get(idx).id.clone();
        let doomed: Vec<ElementIdx> = self
            .iter()
            .filter(|(i, e)| *i == idx || is_within(&e.id, &id))
            .map(|(i, _)| i)
            .collect();
        for victim in &doomed {
            let victim_id = self.arena[victim.0].id.clone();
            self.by_id.remove(&victim_id);
            self.originals.remove(victim);
        }
        self.order.retain(|i| !doomed.contains(i));
    }

    /// Rename the leading path segment of every element (`Base` -> `MyModel`)
    pub fn rename_root(&mut self, from: &str, to: &str) {
        let rename = |value: &str| -> String {
            if value == from {
                to.to_string()
            } else if let Some(rest) = value.strip_prefix(from).filter(|r| {
                r.starts_with('.') || r.starts_with(':')
            }) {
                format!("{to}{rest}")
            } else {
                value.to_string()
            }
        };
        self.by_id.clear();
        for &idx in &self.order {
            let element = &mut self.arena[idx.0];
            element.id = rename(&element.id);
            element.path = rename(&element.path);
            self.by_id.insert(element.id.clone(), idx);
        }
    }
}
