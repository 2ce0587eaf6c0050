use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use ldap3::{LdapConn, LdapConnSettings, LdapError, Mod, Scope, SearchEntry};
use tracing::{debug, info};
use unicase::UniCase;

use crate::directory::Connection;
use crate::error::{ConnectionError, DirectoryError, OperationError};
use crate::record::{
    is_object_class, Change, ChangeRecord, Entry, EntryBuilder, ModOp, ResultCode,
    SearchRequest, SearchResult,
};


/// A directory reached over LDAP with a synchronous `ldap3` connection.
pub struct LdapConnection {
    ldap: LdapConn,
}
impl LdapConnection {
    pub fn new(ldap: LdapConn) -> Self { Self { ldap } }

    /// Opens a connection to `url` (`ldap://`, `ldaps://` or `ldapi://`).
    pub fn connect(url: &str, timeout: Option<Duration>) -> Result<Self, ConnectionError> {
        let mut settings = LdapConnSettings::new();
        if let Some(timeout) = timeout {
            settings = settings.set_conn_timeout(timeout);
        }
        let ldap = LdapConn::with_settings(settings, url)
            .map_err(|e| ConnectionError::new(format!("failed to connect to {}: {}", url, e)))?;
        info!(url, "connected to LDAP server");
        Ok(Self::new(ldap))
    }

    /// Performs a simple bind.
    pub fn bind(&mut self, bind_dn: &str, password: &str) -> Result<(), OperationError> {
        self.ldap.simple_bind(bind_dn, password)
            .and_then(|r| r.success())
            .map_err(classify)?;
        info!(bind_dn, "bound to LDAP server");
        Ok(())
    }

    pub fn unbind(mut self) -> Result<(), ConnectionError> {
        self.ldap.unbind()
            .map_err(|e| ConnectionError::new(format!("failed to unbind: {}", e)))
    }
}
impl Connection for LdapConnection {
    fn apply(&mut self, record: &ChangeRecord) -> Result<(), OperationError> {
        let dn = record.dn();
        debug!(dn, kind = record.kind(), "sending change to LDAP server");
        let outcome = match record.change() {
            Change::Add(attributes) => {
                let ldap_attributes: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = attributes
                    .iter()
                    .map(|a| (a.name().as_bytes().to_vec(), a.values().iter().cloned().collect()))
                    .collect();
                self.ldap.add(dn, ldap_attributes)
            },
            Change::Delete => self.ldap.delete(dn),
            Change::Modify(modifications) => {
                let mods: Vec<Mod<Vec<u8>>> = modifications
                    .iter()
                    .map(|m| {
                        let name = m.attribute().as_bytes().to_vec();
                        let values: HashSet<Vec<u8>> = m.values().iter().cloned().collect();
                        match m.op() {
                            ModOp::Add => Mod::Add(name, values),
                            ModOp::Delete => Mod::Delete(name, values),
                            ModOp::Replace => Mod::Replace(name, values),
                        }
                    })
                    .collect();
                self.ldap.modify(dn, mods)
            },
            Change::ModifyDn(rename) => self.ldap.modifydn(
                dn,
                &rename.new_rdn,
                rename.delete_old_rdn,
                rename.new_superior.as_deref(),
            ),
        };
        outcome
            .and_then(|r| r.success())
            .map(|_| ())
            .map_err(classify)
    }

    fn search(&mut self, request: &SearchRequest) -> Result<SearchResult, OperationError> {
        let scope = match request.scope {
            crate::record::Scope::Base => Scope::Base,
            crate::record::Scope::OneLevel => Scope::OneLevel,
            crate::record::Scope::Subtree => Scope::Subtree,
        };
        let ldap3::SearchResult(raw_entries, result) = self.ldap
            .search(&request.base, scope, &request.filter, vec!["*"])
            .map_err(classify)?;

        let mut entries = Vec::with_capacity(raw_entries.len());
        for raw_entry in raw_entries {
            entries.push(entry_from_search(SearchEntry::construct(raw_entry))?);
        }
        debug!(base = request.base.as_str(), count = entries.len(), rc = result.rc, "search returned");
        Ok(SearchResult {
            code: ResultCode(result.rc),
            message: result.text,
            entries,
        })
    }
}


/// Directory refusals keep their result code; everything else is the
/// connection's fault.
fn classify(error: LdapError) -> OperationError {
    match error {
        LdapError::LdapResult { result } => DirectoryError::new(ResultCode(result.rc), result.text).into(),
        other => ConnectionError::new(other.to_string()).into(),
    }
}


/// Object class first, then the other attributes by name.
fn entry_from_search(search_entry: SearchEntry) -> Result<Entry, OperationError> {
    let mut attributes: BTreeMap<(bool, UniCase<String>), Vec<Vec<u8>>> = BTreeMap::new();
    for (key, string_values) in search_entry.attrs {
        let sort_key = (!is_object_class(&key), UniCase::new(key));
        attributes
            .entry(sort_key)
            .or_default()
            .extend(string_values.into_iter().map(String::into_bytes));
    }
    for (key, bytes_values) in search_entry.bin_attrs {
        let sort_key = (!is_object_class(&key), UniCase::new(key));
        attributes
            .entry(sort_key)
            .or_default()
            .extend(bytes_values);
    }

    let mut builder = EntryBuilder::new(search_entry.dn);
    for ((_, name), values) in attributes {
        builder.push_values(name.as_str(), values);
    }
    builder.build()
        .map_err(|e| DirectoryError::new(ResultCode::OTHER, e.to_string()).into())
}
