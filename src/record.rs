use std::borrow::Cow;
use std::fmt;

use unicase::UniCase;

use crate::error::ModelError;


/// Name of the attribute holding an entry's object classes.
pub const OBJECT_CLASS: &str = "objectclass";


/// Whether the attribute name denotes the object class attribute.
pub fn is_object_class(name: &str) -> bool {
    UniCase::new(name) == UniCase::new(OBJECT_CLASS)
}


/// An LDAP result code as returned by a directory.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResultCode(pub u32);
impl ResultCode {
    pub const SUCCESS: Self = Self(0);
    pub const OPERATIONS_ERROR: Self = Self(1);
    pub const PROTOCOL_ERROR: Self = Self(2);
    pub const NO_SUCH_ATTRIBUTE: Self = Self(16);
    pub const ATTRIBUTE_OR_VALUE_EXISTS: Self = Self(20);
    pub const NO_SUCH_OBJECT: Self = Self(32);
    pub const INVALID_DN_SYNTAX: Self = Self(34);
    pub const INVALID_CREDENTIALS: Self = Self(49);
    pub const INSUFFICIENT_ACCESS_RIGHTS: Self = Self(50);
    pub const UNWILLING_TO_PERFORM: Self = Self(53);
    pub const OBJECT_CLASS_VIOLATION: Self = Self(65);
    pub const NOT_ALLOWED_ON_NON_LEAF: Self = Self(66);
    pub const ENTRY_ALREADY_EXISTS: Self = Self(68);
    pub const OTHER: Self = Self(80);

    pub fn is_success(&self) -> bool { *self == Self::SUCCESS }

    fn to_name(&self) -> Cow<'static, str> {
        fn cb(s: &'static str) -> Cow<'static, str> { Cow::Borrowed(s) }

        match self.0 {
            0 => cb("success"),
            1 => cb("operationsError"),
            2 => cb("protocolError"),
            16 => cb("noSuchAttribute"),
            20 => cb("attributeOrValueExists"),
            32 => cb("noSuchObject"),
            34 => cb("invalidDNSyntax"),
            49 => cb("invalidCredentials"),
            50 => cb("insufficientAccessRights"),
            53 => cb("unwillingToPerform"),
            65 => cb("objectClassViolation"),
            66 => cb("notAllowedOnNonLeaf"),
            68 => cb("entryAlreadyExists"),
            80 => cb("other"),
            other => Cow::Owned(format!("resultCode{}", other)),
        }
    }
}
impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.to_name(), self.0)
    }
}


/// A named, non-empty, ordered collection of values.
///
/// Names compare case-insensitively.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Attribute {
    name: UniCase<String>,
    values: Vec<Vec<u8>>,
}
impl Attribute {
    pub fn new<N: Into<String>>(name: N, values: Vec<Vec<u8>>) -> Result<Self, ModelError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ModelError::EmptyAttributeName);
        }
        if values.is_empty() {
            return Err(ModelError::NoValues(name));
        }
        Ok(Self { name: UniCase::new(name), values })
    }

    /// Convenience constructor for textual values.
    pub fn from_strs<N: Into<String>>(name: N, values: &[&str]) -> Result<Self, ModelError> {
        let values = values.iter()
            .map(|v| v.as_bytes().to_vec())
            .collect();
        Self::new(name, values)
    }

    pub fn name(&self) -> &str { self.name.as_ref() }
    pub fn values(&self) -> &[Vec<u8>] { &self.values }
    pub fn is_object_class(&self) -> bool { is_object_class(self.name()) }

    pub fn into_parts(self) -> (String, Vec<Vec<u8>>) {
        (self.name.into_inner(), self.values)
    }
}


/// A DN together with its attributes.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Entry {
    dn: String,
    attributes: Vec<Attribute>,
}
impl Entry {
    pub fn new<D: Into<String>>(dn: D, attributes: Vec<Attribute>) -> Result<Self, ModelError> {
        let dn = dn.into();
        if dn.is_empty() {
            return Err(ModelError::EmptyDn);
        }
        for (i, attribute) in attributes.iter().enumerate() {
            if attributes[..i].iter().any(|a| a.name == attribute.name) {
                return Err(ModelError::DuplicateAttribute(attribute.name().to_owned()));
            }
        }
        Ok(Self { dn, attributes })
    }

    pub fn dn(&self) -> &str { &self.dn }
    pub fn attributes(&self) -> &[Attribute] { &self.attributes }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        let name = UniCase::new(name);
        self.attributes.iter()
            .find(|a| UniCase::new(a.name()) == name)
    }

    /// Object class values in their original order; empty if there are none.
    pub fn object_classes(&self) -> &[Vec<u8>] {
        self.attribute(OBJECT_CLASS)
            .map(|a| a.values())
            .unwrap_or(&[])
    }

    pub fn into_parts(self) -> (String, Vec<Attribute>) {
        (self.dn, self.attributes)
    }
}


/// Accumulates attribute values for an entry, merging repeated names.
#[derive(Clone, Debug, Default)]
pub struct EntryBuilder {
    dn: String,
    attributes: Vec<(UniCase<String>, Vec<Vec<u8>>)>,
}
impl EntryBuilder {
    pub fn new<D: Into<String>>(dn: D) -> Self {
        Self { dn: dn.into(), attributes: Vec::new() }
    }

    pub fn push_value<N: AsRef<str>>(&mut self, name: N, value: Vec<u8>) -> &mut Self {
        let key = UniCase::new(name.as_ref().to_owned());
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.attributes.push((key, vec![value])),
        }
        self
    }

    pub fn push_values<N: AsRef<str>, I: IntoIterator<Item = Vec<u8>>>(&mut self, name: N, values: I) -> &mut Self {
        for value in values {
            self.push_value(name.as_ref(), value);
        }
        self
    }

    /// Chaining form of [`push_value`](Self::push_value) for textual values.
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.push_value(name, value.as_bytes().to_vec());
        self
    }

    pub fn build(self) -> Result<Entry, ModelError> {
        let mut attributes = Vec::with_capacity(self.attributes.len());
        for (name, values) in self.attributes {
            attributes.push(Attribute::new(name.into_inner(), values)?);
        }
        Entry::new(self.dn, attributes)
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ModOp {
    Add,
    Delete,
    Replace,
}
impl ModOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Replace => "replace",
        }
    }
}


/// One step of a modify record.
///
/// `Delete` and `Replace` may carry no values: delete then removes the whole
/// attribute, replace removes it without adding anything back.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Modification {
    op: ModOp,
    attribute: UniCase<String>,
    values: Vec<Vec<u8>>,
}
impl Modification {
    pub fn new<N: Into<String>>(op: ModOp, attribute: N, values: Vec<Vec<u8>>) -> Result<Self, ModelError> {
        let attribute = attribute.into();
        if attribute.is_empty() {
            return Err(ModelError::EmptyAttributeName);
        }
        if op == ModOp::Add && values.is_empty() {
            return Err(ModelError::NoValues(attribute));
        }
        Ok(Self { op, attribute: UniCase::new(attribute), values })
    }

    pub fn op(&self) -> ModOp { self.op }
    pub fn attribute(&self) -> &str { self.attribute.as_ref() }
    pub fn values(&self) -> &[Vec<u8>] { &self.values }
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Rename {
    pub new_rdn: String,
    pub delete_old_rdn: bool,
    pub new_superior: Option<String>,
}


#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Change {
    Add(Vec<Attribute>),
    Modify(Vec<Modification>),
    Delete,
    ModifyDn(Rename),
}


/// An operation against a directory, addressed by DN.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ChangeRecord {
    dn: String,
    change: Change,
}
impl ChangeRecord {
    pub fn add(entry: Entry) -> Self {
        let (dn, attributes) = entry.into_parts();
        Self { dn, change: Change::Add(attributes) }
    }

    pub fn modify<D: Into<String>>(dn: D, modifications: Vec<Modification>) -> Result<Self, ModelError> {
        let dn = non_empty_dn(dn)?;
        if modifications.is_empty() {
            return Err(ModelError::NoModifications);
        }
        Ok(Self { dn, change: Change::Modify(modifications) })
    }

    pub fn delete<D: Into<String>>(dn: D) -> Result<Self, ModelError> {
        Ok(Self { dn: non_empty_dn(dn)?, change: Change::Delete })
    }

    pub fn modify_dn<D: Into<String>>(dn: D, rename: Rename) -> Result<Self, ModelError> {
        let dn = non_empty_dn(dn)?;
        if rename.new_rdn.is_empty() {
            return Err(ModelError::EmptyNewRdn);
        }
        if rename.new_superior.as_deref() == Some("") {
            return Err(ModelError::EmptyDn);
        }
        Ok(Self { dn, change: Change::ModifyDn(rename) })
    }

    pub fn dn(&self) -> &str { &self.dn }
    pub fn change(&self) -> &Change { &self.change }

    pub fn kind(&self) -> &'static str {
        match self.change {
            Change::Add(_) => "add",
            Change::Modify(_) => "modify",
            Change::Delete => "delete",
            Change::ModifyDn(_) => "modrdn",
        }
    }

    /// The entry carried by an add record.
    pub fn into_entry(self) -> Option<Entry> {
        match self.change {
            Change::Add(attributes) => Some(Entry { dn: self.dn, attributes }),
            _ => None,
        }
    }
}

fn non_empty_dn<D: Into<String>>(dn: D) -> Result<String, ModelError> {
    let dn = dn.into();
    if dn.is_empty() {
        Err(ModelError::EmptyDn)
    } else {
        Ok(dn)
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Scope {
    Base,
    OneLevel,
    Subtree,
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SearchRequest {
    pub base: String,
    pub filter: String,
    pub scope: Scope,
}
impl SearchRequest {
    pub fn subtree<B: Into<String>, F: Into<String>>(base: B, filter: F) -> Self {
        Self { base: base.into(), filter: filter.into(), scope: Scope::Subtree }
    }
}


#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchResult {
    pub code: ResultCode,
    pub message: String,
    pub entries: Vec<Entry>,
}
impl SearchResult {
    pub fn success(entries: Vec<Entry>) -> Self {
        Self { code: ResultCode::SUCCESS, message: String::new(), entries }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_names_are_case_insensitive() {
        let entry = EntryBuilder::new("ou=People,dc=btmatthews,dc=com")
            .with("objectClass", "organizationalUnit")
            .with("OU", "People")
            .build().unwrap();
        assert_eq!(entry.attribute("objectclass").unwrap().values(), &[b"organizationalUnit".to_vec()]);
        assert_eq!(entry.attribute("ou").unwrap().name(), "OU");
        assert_eq!(entry.object_classes().len(), 1);
    }

    #[test]
    fn test_builder_merges_repeated_names() {
        let entry = EntryBuilder::new("cn=x")
            .with("objectclass", "top")
            .with("cn", "x")
            .with("ObjectClass", "person")
            .build().unwrap();
        assert_eq!(entry.attributes().len(), 2);
        assert_eq!(entry.attributes()[0].values(), &[b"top".to_vec(), b"person".to_vec()]);
    }

    #[test]
    fn test_entry_rejects_duplicates() {
        let a = Attribute::from_strs("cn", &["a"]).unwrap();
        let b = Attribute::from_strs("CN", &["b"]).unwrap();
        assert_eq!(
            Entry::new("cn=a", vec![a, b]),
            Err(ModelError::DuplicateAttribute("CN".to_owned())),
        );
    }

    #[test]
    fn test_invariants() {
        assert_eq!(Entry::new("", vec![]), Err(ModelError::EmptyDn));
        assert_eq!(Attribute::new("cn", vec![]), Err(ModelError::NoValues("cn".to_owned())));
        assert!(Modification::new(ModOp::Delete, "cn", vec![]).is_ok());
        assert!(Modification::new(ModOp::Replace, "cn", vec![]).is_ok());
        assert!(Modification::new(ModOp::Add, "cn", vec![]).is_err());
        assert_eq!(ChangeRecord::modify("cn=a", vec![]), Err(ModelError::NoModifications));
        let rename = Rename { new_rdn: String::new(), delete_old_rdn: true, new_superior: None };
        assert_eq!(ChangeRecord::modify_dn("cn=a", rename), Err(ModelError::EmptyNewRdn));
    }

    #[test]
    fn test_add_round_trips_entry() {
        let entry = EntryBuilder::new("ou=People,dc=btmatthews,dc=com")
            .with("ou", "People")
            .build().unwrap();
        let record = ChangeRecord::add(entry.clone());
        assert_eq!(record.kind(), "add");
        assert_eq!(record.into_entry(), Some(entry));
    }

    #[test]
    fn test_result_code_display() {
        assert_eq!(ResultCode::NO_SUCH_OBJECT.to_string(), "noSuchObject (32)");
        assert_eq!(ResultCode(4711).to_string(), "resultCode4711 (4711)");
    }
}
