//! In-memory directory used by `convert` and by tests.

pub mod dn;
pub mod filter;


use std::collections::BTreeMap;

use tracing::debug;
use unicase::UniCase;

use crate::directory::Connection;
use crate::error::{DirectoryError, ModelError, OperationError};
use crate::record::{
    Attribute, Change, ChangeRecord, Entry, ModOp, Modification, OBJECT_CLASS, Rename, ResultCode,
    Scope, SearchRequest, SearchResult,
};
use crate::tiny_directory::dn::{dn_to_rdns, parse_rdn_str, split_first_rdn, Rdn, RdnKey};
use crate::tiny_directory::filter::{Filter, FilterError};


/// Attributes of a stored object, in insertion order, names compared
/// case-insensitively.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct AttributeBag {
    attributes: Vec<(UniCase<String>, Vec<Vec<u8>>)>,
}
impl AttributeBag {
    fn position(&self, name: &str) -> Option<usize> {
        let name = UniCase::new(name);
        self.attributes.iter().position(|(n, _)| UniCase::new(n.as_str()) == name)
    }

    pub fn get(&self, name: &str) -> Option<&[Vec<u8>]> {
        self.position(name).map(|i| self.attributes[i].1.as_slice())
    }

    /// Adds values, failing if any of them is already present.
    pub fn add(&mut self, name: &str, values: &[Vec<u8>]) -> Result<(), DirectoryError> {
        if values.is_empty() {
            return Err(DirectoryError::new(
                ResultCode::PROTOCOL_ERROR,
                format!("no values to add to {:?}", name),
            ));
        }
        let index = match self.position(name) {
            Some(i) => i,
            None => {
                self.attributes.push((UniCase::new(name.to_owned()), Vec::new()));
                self.attributes.len() - 1
            },
        };
        let existing = &mut self.attributes[index].1;
        for value in values {
            if existing.contains(value) {
                return Err(DirectoryError::new(
                    ResultCode::ATTRIBUTE_OR_VALUE_EXISTS,
                    format!("attribute {:?} already has the value", name),
                ));
            }
            existing.push(value.clone());
        }
        Ok(())
    }

    /// Deletes the given values, or the whole attribute if none are given.
    pub fn delete(&mut self, name: &str, values: &[Vec<u8>]) -> Result<(), DirectoryError> {
        let no_such_attribute = || DirectoryError::new(
            ResultCode::NO_SUCH_ATTRIBUTE,
            format!("no such attribute or value: {:?}", name),
        );
        let index = self.position(name).ok_or_else(no_such_attribute)?;
        if values.is_empty() {
            self.attributes.remove(index);
            return Ok(());
        }

        let existing = &mut self.attributes[index].1;
        for value in values {
            let position = existing.iter()
                .position(|v| v == value)
                .ok_or_else(no_such_attribute)?;
            existing.remove(position);
        }
        if existing.is_empty() {
            self.attributes.remove(index);
        }
        Ok(())
    }

    /// Replaces all values; no values removes the attribute if present.
    pub fn replace(&mut self, name: &str, values: &[Vec<u8>]) {
        match (self.position(name), values.is_empty()) {
            (Some(i), true) => { self.attributes.remove(i); },
            (Some(i), false) => self.attributes[i].1 = values.to_vec(),
            (None, true) => {},
            (None, false) => self.attributes.push((UniCase::new(name.to_owned()), values.to_vec())),
        }
    }

    fn apply(&mut self, modification: &Modification) -> Result<(), DirectoryError> {
        let name = modification.attribute();
        match modification.op() {
            ModOp::Add => self.add(name, modification.values()),
            ModOp::Delete => self.delete(name, modification.values()),
            ModOp::Replace => {
                self.replace(name, modification.values());
                Ok(())
            },
        }
    }

    fn from_attributes(attributes: &[Attribute]) -> Self {
        let attributes = attributes
            .iter()
            .map(|a| (UniCase::new(a.name().to_owned()), a.values().to_vec()))
            .collect();
        Self { attributes }
    }

    fn to_entry(&self, dn: &str) -> Result<Entry, DirectoryError> {
        let internal = |e: ModelError| DirectoryError::new(ResultCode::OPERATIONS_ERROR, e.to_string());
        let mut attributes = Vec::with_capacity(self.attributes.len());
        for (name, values) in &self.attributes {
            attributes.push(Attribute::new(name.to_string(), values.clone()).map_err(internal)?);
        }
        Entry::new(dn, attributes).map_err(internal)
    }
}


#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct Object {
    dn: String,
    attributes: AttributeBag,
}


/// Tree node. Nodes without an object are glue above a naming context.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
struct Node {
    object: Option<Object>,
    children: BTreeMap<RdnKey, Node>,
}
impl Node {
    fn collect(&self, scope: Scope, filter: &Filter, found: &mut Vec<Object>) {
        if let (Some(object), false) = (&self.object, scope == Scope::OneLevel) {
            if filter.matches(&object.attributes) {
                found.push(object.clone());
            }
        }
        match scope {
            Scope::Base => {},
            Scope::OneLevel => {
                for child in self.children.values() {
                    child.collect(Scope::Base, filter, found);
                }
            },
            Scope::Subtree => {
                for child in self.children.values() {
                    child.collect(Scope::Subtree, filter, found);
                }
            },
        }
    }

    fn count(&self) -> usize {
        let own = if self.object.is_some() { 1 } else { 0 };
        own + self.children.values().map(|c| c.count()).sum::<usize>()
    }

    /// Rewrites the DNs below this node after it moved.
    fn rebase(&mut self, dn: &str) {
        for child in self.children.values_mut() {
            let child_dn = child.object.as_ref().map(|o| {
                let (rdn, _) = split_first_rdn(&o.dn);
                format!("{},{}", rdn, dn)
            });
            if let (Some(object), Some(child_dn)) = (child.object.as_mut(), child_dn) {
                object.dn = child_dn;
                let rebased = object.dn.clone();
                child.rebase(&rebased);
            }
        }
    }
}


/// A directory held entirely in memory.
///
/// Children are visited in order of their normalized RDN, parents before
/// children. Adding an entry whose ancestors are all missing starts a new
/// naming context.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct TinyDirectory {
    root: Node,
}
impl TinyDirectory {
    pub fn new() -> Self { Self::default() }

    /// Number of entries stored.
    pub fn len(&self) -> usize { self.root.count() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Looks up an entry by DN.
    pub fn get(&self, dn: &str) -> Option<Entry> {
        let path = path_of(dn).ok()?;
        let object = self.node(&path)?.object.as_ref()?;
        object.attributes.to_entry(&object.dn).ok()
    }

    /// All entries, parents before children.
    pub fn entries(&self) -> Vec<Entry> {
        let mut found = Vec::new();
        self.root.collect(Scope::Subtree, &Filter::Present(UniCase::new(OBJECT_CLASS.to_owned())), &mut found);
        found.into_iter()
            .filter_map(|o| o.attributes.to_entry(&o.dn).ok())
            .collect()
    }

    fn node(&self, path: &[RdnKey]) -> Option<&Node> {
        let mut node = &self.root;
        for key in path {
            node = node.children.get(key)?;
        }
        Some(node)
    }

    fn node_mut(&mut self, path: &[RdnKey]) -> Option<&mut Node> {
        let mut node = &mut self.root;
        for key in path {
            node = node.children.get_mut(key)?;
        }
        Some(node)
    }

    fn object_mut(&mut self, dn: &str, path: &[RdnKey]) -> Result<&mut Object, DirectoryError> {
        self.node_mut(path)
            .and_then(|n| n.object.as_mut())
            .ok_or_else(|| no_such_object(dn))
    }

    fn add(&mut self, dn: &str, attributes: &[Attribute]) -> Result<(), DirectoryError> {
        let path = path_of(dn)?;
        let Some((leaf, parent)) = path.split_last()
            else { return Err(invalid_dn(dn)) };

        let parent_exists = self.node(parent).map(|n| n.object.is_some()).unwrap_or(false);
        if !parent.is_empty() && !parent_exists && self.has_entry_on(parent) {
            return Err(DirectoryError::new(
                ResultCode::NO_SUCH_OBJECT,
                format!("parent of {:?} does not exist", dn),
            ));
        }

        let mut node = &mut self.root;
        for key in parent {
            node = node.children.entry(key.clone()).or_default();
        }
        let slot = node.children.entry(leaf.clone()).or_default();
        if slot.object.is_some() {
            return Err(DirectoryError::new(
                ResultCode::ENTRY_ALREADY_EXISTS,
                format!("{:?} already exists", dn),
            ));
        }
        slot.object = Some(Object {
            dn: dn.trim().to_owned(),
            attributes: AttributeBag::from_attributes(attributes),
        });
        Ok(())
    }

    /// Whether any entry exists on the path from the root down to `path`.
    fn has_entry_on(&self, path: &[RdnKey]) -> bool {
        let mut node = &self.root;
        for key in path {
            let Some(child) = node.children.get(key)
                else { return false };
            if child.object.is_some() {
                return true;
            }
            node = child;
        }
        false
    }

    fn delete(&mut self, dn: &str) -> Result<(), DirectoryError> {
        let path = path_of(dn)?;
        let Some((leaf, parent)) = path.split_last()
            else { return Err(invalid_dn(dn)) };
        let parent_node = self.node_mut(parent).ok_or_else(|| no_such_object(dn))?;
        let node = parent_node.children.get(leaf)
            .filter(|n| n.object.is_some())
            .ok_or_else(|| no_such_object(dn))?;
        if !node.children.is_empty() {
            return Err(DirectoryError::new(
                ResultCode::NOT_ALLOWED_ON_NON_LEAF,
                format!("{:?} has children", dn),
            ));
        }
        parent_node.children.remove(leaf);
        Ok(())
    }

    fn modify(&mut self, dn: &str, modifications: &[Modification]) -> Result<(), DirectoryError> {
        let path = path_of(dn)?;
        let object = self.object_mut(dn, &path)?;

        // all or nothing
        let mut attributes = object.attributes.clone();
        for modification in modifications {
            attributes.apply(modification)?;
        }
        object.attributes = attributes;
        Ok(())
    }

    fn modify_dn(&mut self, dn: &str, rename: &Rename) -> Result<(), DirectoryError> {
        let path = path_of(dn)?;
        let Some((leaf, parent)) = path.split_last()
            else { return Err(invalid_dn(dn)) };
        if self.node(&path).and_then(|n| n.object.as_ref()).is_none() {
            return Err(no_such_object(dn));
        }

        let new_rdn = parse_rdn_str(&rename.new_rdn)
            .ok_or_else(|| invalid_dn(&rename.new_rdn))?;
        let (parent_path, parent_dn) = match &rename.new_superior {
            Some(superior) => {
                let superior_path = path_of(superior)?;
                if superior_path.starts_with(&path) {
                    return Err(DirectoryError::new(
                        ResultCode::UNWILLING_TO_PERFORM,
                        format!("cannot move {:?} below itself", dn),
                    ));
                }
                let superior_exists = superior_path.is_empty()
                    || self.node(&superior_path).map(|n| n.object.is_some()).unwrap_or(false);
                if !superior_exists {
                    return Err(no_such_object(superior));
                }
                (superior_path, superior.trim().to_owned())
            },
            None => (parent.to_vec(), split_first_rdn(dn).1.unwrap_or("").to_owned()),
        };

        let new_key = new_rdn.key();
        let moves = parent_path.as_slice() != parent || &new_key != leaf;
        if moves {
            let occupied = self.node(&parent_path)
                .and_then(|n| n.children.get(&new_key))
                .map(|n| n.object.is_some())
                .unwrap_or(false);
            if occupied {
                return Err(DirectoryError::new(
                    ResultCode::ENTRY_ALREADY_EXISTS,
                    format!("{:?} already exists", rename.new_rdn),
                ));
            }
        }

        let old_rdn = dn_to_rdns(dn)
            .and_then(|rdns| rdns.into_iter().next())
            .ok_or_else(|| invalid_dn(dn))?;
        let mut node = self.node_mut(parent)
            .and_then(|p| p.children.remove(leaf))
            .ok_or_else(|| no_such_object(dn))?;

        let new_dn = if parent_dn.is_empty() {
            rename.new_rdn.trim().to_owned()
        } else {
            format!("{},{}", rename.new_rdn.trim(), parent_dn)
        };
        if let Some(object) = node.object.as_mut() {
            if rename.delete_old_rdn {
                remove_rdn_values(&mut object.attributes, &old_rdn);
            }
            add_rdn_values(&mut object.attributes, &new_rdn);
            object.dn = new_dn.clone();
        }
        node.rebase(&new_dn);

        let mut target = &mut self.root;
        for key in &parent_path {
            target = target.children.entry(key.clone()).or_default();
        }
        // keep any glue children already sitting at the new position
        let slot = target.children.entry(new_key).or_default();
        slot.object = node.object;
        slot.children.extend(node.children);
        Ok(())
    }

    fn search_objects(&self, request: &SearchRequest) -> SearchResult {
        let filter = match Filter::parse(&request.filter) {
            Ok(f) => f,
            Err(FilterError::Malformed) => return failure(ResultCode::PROTOCOL_ERROR, format!("malformed filter {:?}", request.filter)),
            Err(FilterError::Unsupported) => return failure(ResultCode::UNWILLING_TO_PERFORM, format!("unsupported filter {:?}", request.filter)),
        };
        let path = match path_of(&request.base) {
            Ok(p) => p,
            Err(e) => return failure(e.code, e.message),
        };
        let Some(base) = self.node(&path)
            else { return failure(ResultCode::NO_SUCH_OBJECT, format!("no such object: {:?}", request.base)) };

        let mut found = Vec::new();
        base.collect(request.scope, &filter, &mut found);

        let mut entries = Vec::with_capacity(found.len());
        for object in found {
            match object.attributes.to_entry(&object.dn) {
                Ok(entry) => entries.push(entry),
                Err(e) => return failure(e.code, e.message),
            }
        }
        SearchResult::success(entries)
    }
}
impl Connection for TinyDirectory {
    fn apply(&mut self, record: &ChangeRecord) -> Result<(), OperationError> {
        let dn = record.dn();
        debug!(dn, kind = record.kind(), "tiny directory applying change");
        let outcome = match record.change() {
            Change::Add(attributes) => self.add(dn, attributes),
            Change::Delete => self.delete(dn),
            Change::Modify(modifications) => self.modify(dn, modifications),
            Change::ModifyDn(rename) => self.modify_dn(dn, rename),
        };
        Ok(outcome?)
    }

    fn search(&mut self, request: &SearchRequest) -> Result<SearchResult, OperationError> {
        Ok(self.search_objects(request))
    }
}


/// Normalized RDNs of a DN, root first.
fn path_of(dn: &str) -> Result<Vec<RdnKey>, DirectoryError> {
    let rdns = dn_to_rdns(dn).ok_or_else(|| invalid_dn(dn))?;
    Ok(rdns.iter().rev().map(Rdn::key).collect())
}


fn remove_rdn_values(attributes: &mut AttributeBag, rdn: &Rdn) {
    for ava in &rdn.avas {
        let Some(values) = attributes.get(&ava.key) else { continue };
        let matching: Vec<Vec<u8>> = values.iter()
            .filter(|v| v.eq_ignore_ascii_case(&ava.value))
            .cloned()
            .collect();
        // the values were just read from the bag
        let _ = attributes.delete(&ava.key, &matching);
    }
}


fn add_rdn_values(attributes: &mut AttributeBag, rdn: &Rdn) {
    for ava in &rdn.avas {
        let present = attributes.get(&ava.key)
            .map(|values| values.iter().any(|v| v.eq_ignore_ascii_case(&ava.value)))
            .unwrap_or(false);
        if !present {
            let _ = attributes.add(&ava.key, &[ava.value.clone()]);
        }
    }
}


fn invalid_dn(dn: &str) -> DirectoryError {
    DirectoryError::new(ResultCode::INVALID_DN_SYNTAX, format!("invalid DN {:?}", dn))
}


fn no_such_object(dn: &str) -> DirectoryError {
    DirectoryError::new(ResultCode::NO_SUCH_OBJECT, format!("no such object: {:?}", dn))
}


fn failure(code: ResultCode, message: String) -> SearchResult {
    SearchResult { code, message, entries: Vec::new() }
}
