mod common;


use std::io::{BufReader, Cursor, Read};

use ldapfix::dsml::DsmlReader;
use ldapfix::ldif::LdifReader;
use ldapfix::{
    ChangeRecord, Dsml, Error, FormatHandler, FormatReader, Ldif, LoadOptions, Mode, TinyDirectory,
};

use crate::common::{bart, entry, init_test_logging, people, CountingReader, RecordingConnection};


const PEOPLE_LDIF: &str = "\
dn: ou=People,dc=btmatthews,dc=com
objectclass: organizationalUnit
ou: People
";

const BART_LDIF: &str = "\
dn: cn=Bart Simpson,ou=People,dc=btmatthews,dc=com
objectclass: inetOrgPerson
cn: Bart Simpson
sn: Simpson
givenName: Bart
uid: bsimpson
";


fn load_ldif(text: &str, options: &LoadOptions) -> (RecordingConnection, Result<ldapfix::LoadSummary, Error>) {
    init_test_logging();
    let mut connection = RecordingConnection::new();
    let mut input = Cursor::new(text.as_bytes().to_vec());
    let result = FormatHandler::new(Ldif).load(&mut connection, &mut input, options);
    (connection, result)
}


fn load_dsml(text: &str, options: &LoadOptions) -> (RecordingConnection, Result<ldapfix::LoadSummary, Error>) {
    init_test_logging();
    let mut connection = RecordingConnection::new();
    let mut input = Cursor::new(text.as_bytes().to_vec());
    let result = FormatHandler::new(Dsml).load(&mut connection, &mut input, options);
    (connection, result)
}


fn ignoring() -> LoadOptions {
    LoadOptions { ignore_errors: true, ..LoadOptions::default() }
}


#[test]
fn empty_ldif_load_applies_nothing() {
    let (connection, result) = load_ldif("", &LoadOptions::default());
    let summary = result.unwrap();
    assert!(connection.applied.is_empty());
    assert_eq!(summary.applied, 0);
    assert!(summary.complete);
}


#[test]
fn ldif_load_one_add() {
    let (connection, result) = load_ldif(PEOPLE_LDIF, &LoadOptions::default());
    assert_eq!(result.unwrap().applied, 1);
    assert_eq!(connection.applied, [ChangeRecord::add(people())]);
}


#[test]
fn ldif_load_two_records_in_order() {
    let text = format!("{}\n{}", PEOPLE_LDIF, BART_LDIF);
    let (connection, result) = load_ldif(&text, &LoadOptions::default());
    assert_eq!(result.unwrap().applied, 2);
    assert_eq!(connection.applied, [ChangeRecord::add(people()), ChangeRecord::add(bart())]);
}


#[test]
fn dsml_load_namespace_variants() {
    let prefixed = r#"<?xml version="1.0" encoding="UTF-8"?>
<dsml:dsml xmlns:dsml="http://www.dsml.org/DSML">
  <dsml:directory-entries>
    <dsml:entry dn="uid=msimpson1,ou=People,dc=btmatthews,dc=com">
      <dsml:objectclass><dsml:oc-value>inetOrgPerson</dsml:oc-value></dsml:objectclass>
      <dsml:attr name="uid"><dsml:value>msimpson1</dsml:value></dsml:attr>
    </dsml:entry>
  </dsml:directory-entries>
</dsml:dsml>"#;
    let default_namespace = r#"<?xml version="1.0" encoding="UTF-8"?>
<dsml xmlns="http://www.dsml.org/DSML">
  <directory-entries>
    <entry dn="uid=msimpson1,ou=People,dc=btmatthews,dc=com">
      <objectclass><oc-value>inetOrgPerson</oc-value></objectclass>
      <attr name="uid"><value>msimpson1</value></attr>
    </entry>
  </directory-entries>
</dsml>"#;
    let other_prefix = r#"<?xml version="1.0" encoding="UTF-8"?>
<x:dsml xmlns:x="http://www.dsml.org/DSML">
  <x:directory-entries>
    <x:entry dn="uid=msimpson1,ou=People,dc=btmatthews,dc=com">
      <x:objectclass><x:oc-value>inetOrgPerson</x:oc-value></x:objectclass>
      <x:attr name="uid"><x:value>msimpson1</x:value></x:attr>
    </x:entry>
  </x:directory-entries>
</x:dsml>"#;

    let expected = ChangeRecord::add(entry(
        "uid=msimpson1,ou=People,dc=btmatthews,dc=com",
        &[("objectclass", "inetOrgPerson"), ("uid", "msimpson1")],
    ));
    for document in [prefixed, default_namespace, other_prefix] {
        let (connection, result) = load_dsml(document, &LoadOptions::default());
        assert!(result.unwrap().complete);
        assert_eq!(connection.applied, [expected.clone()]);
    }
}


#[test]
fn malformed_ldif_record_then_valid_record() {
    let text = format!("dn: cn=broken,dc=btmatthews,dc=com\ncn:: !!!\n\n{}", PEOPLE_LDIF);

    let (connection, result) = load_ldif(&text, &ignoring());
    let summary = result.unwrap();
    assert_eq!(connection.applied_dns(), ["ou=People,dc=btmatthews,dc=com"]);
    assert_eq!((summary.applied, summary.skipped), (1, 1));

    let (connection, result) = load_ldif(&text, &LoadOptions::default());
    assert!(connection.applied.is_empty());
    assert!(!result.unwrap().complete);
}


#[test]
fn malformed_dsml_entry_then_valid_entry() {
    let document = r#"<dsml:dsml xmlns:dsml="http://www.dsml.org/DSML">
  <dsml:directory-entries>
    <dsml:entry><dsml:attr name="cn"><dsml:value>no dn</dsml:value></dsml:attr></dsml:entry>
    <dsml:entry dn="ou=People,dc=btmatthews,dc=com">
      <dsml:objectclass><dsml:oc-value>organizationalUnit</dsml:oc-value></dsml:objectclass>
      <dsml:attr name="ou"><dsml:value>People</dsml:value></dsml:attr>
    </dsml:entry>
  </dsml:directory-entries>
</dsml:dsml>"#;

    let (connection, _) = load_dsml(document, &ignoring());
    assert_eq!(connection.applied, [ChangeRecord::add(people())]);

    let (connection, _) = load_dsml(document, &LoadOptions::default());
    assert!(connection.applied.is_empty());
}


#[test]
fn strict_mode_reports_the_first_failure() {
    let options = LoadOptions { mode: Mode::Strict, ..LoadOptions::default() };
    let (_, result) = load_ldif("cn: no dn line\n", &options);
    match result {
        Err(Error::Parse(e)) => assert!(!e.may_continue),
        other => panic!("unexpected {:?}", other),
    }

    let (_, result) = load_dsml("<html/>", &options);
    assert!(matches!(result, Err(Error::Parse(_))));
}


#[test]
fn rejected_record_is_skipped_when_ignoring() {
    init_test_logging();
    let text = format!("{}\n{}", PEOPLE_LDIF, BART_LDIF);
    let mut connection = RecordingConnection::new();
    connection.reject.push("ou=People,dc=btmatthews,dc=com".to_owned());
    let mut input = Cursor::new(text.into_bytes());
    let summary = FormatHandler::new(Ldif).load(&mut connection, &mut input, &ignoring()).unwrap();
    assert_eq!(connection.applied, [ChangeRecord::add(bart())]);
    assert_eq!((summary.applied, summary.skipped, summary.complete), (1, 1, true));
}


#[test]
fn ldif_reader_pulls_records_lazily() {
    let mut text = String::new();
    for i in 0..200 {
        text.push_str(&format!("dn: cn=user{},dc=btmatthews,dc=com\ncn: user{}\n\n", i, i));
    }
    let (source, counter) = CountingReader::new(text.as_bytes());
    let mut input = BufReader::with_capacity(64, source);

    let mut reader = LdifReader::new(&mut input);
    let first = reader.next().unwrap().unwrap();
    assert_eq!(first.dn(), "cn=user0,dc=btmatthews,dc=com");
    assert!(counter.get() < text.len() / 10);
}


#[test]
fn closing_a_reader_leaves_the_stream_alone() {
    let text = format!("{}\n{}", PEOPLE_LDIF, BART_LDIF);
    let (source, counter) = CountingReader::new(text.as_bytes());
    let mut input = BufReader::with_capacity(16, source);
    {
        let mut reader = LdifReader::new(&mut input);
        reader.next().unwrap().unwrap();
        let before = counter.get();
        reader.close().unwrap();
        assert_eq!(counter.get(), before);
        assert!(reader.next().is_none());
        assert_eq!(counter.get(), before);
    }
    // still open and positioned after the first record
    let mut rest = String::new();
    input.read_to_string(&mut rest).unwrap();
    assert!(rest.contains("cn=Bart Simpson"));

    let document = r#"<dsml:dsml xmlns:dsml="http://www.dsml.org/DSML"><dsml:directory-entries/></dsml:dsml><!-- tail -->"#;
    let (source, counter) = CountingReader::new(document.as_bytes());
    let mut input = BufReader::with_capacity(16, source);
    {
        let mut reader = DsmlReader::new(&mut input).unwrap();
        let before = counter.get();
        reader.close().unwrap();
        assert_eq!(counter.get(), before);
    }
    let mut rest = String::new();
    input.read_to_string(&mut rest).unwrap();
    assert!(rest.ends_with("<!-- tail -->"));
}


#[test]
fn change_records_drive_a_directory() {
    init_test_logging();
    let text = "\
version: 1

dn: dc=btmatthews,dc=com
objectclass: domain
dc: btmatthews

dn: ou=People,dc=btmatthews,dc=com
changetype: add
objectclass: organizationalUnit
ou: People

dn: cn=Bart Simpson,ou=People,dc=btmatthews,dc=com
objectclass: inetOrgPerson
cn: Bart Simpson
sn: Simpson

dn: cn=Bart Simpson,ou=People,dc=btmatthews,dc=com
changetype: modify
add: mail
mail: bart@btmatthews.com
-
replace: sn
sn: El Barto
-

dn: cn=Bart Simpson,ou=People,dc=btmatthews,dc=com
changetype: modrdn
newrdn: cn=El Barto
deleteoldrdn: 1

dn: cn=Lisa Simpson,ou=People,dc=btmatthews,dc=com
objectclass: inetOrgPerson
cn: Lisa Simpson

dn: cn=Lisa Simpson,ou=People,dc=btmatthews,dc=com
changetype: delete
";
    let mut directory = TinyDirectory::new();
    let mut input = Cursor::new(text.as_bytes().to_vec());
    let options = LoadOptions { mode: Mode::Strict, ..LoadOptions::default() };
    let summary = FormatHandler::new(Ldif).load(&mut directory, &mut input, &options).unwrap();

    assert_eq!(summary.applied, 7);
    assert_eq!(directory.len(), 3);
    let barto = directory.get("cn=El Barto,ou=People,dc=btmatthews,dc=com").unwrap();
    assert_eq!(barto.attribute("sn").unwrap().values(), [b"El Barto".to_vec()]);
    assert_eq!(barto.attribute("mail").unwrap().values(), [b"bart@btmatthews.com".to_vec()]);
    assert_eq!(barto.attribute("cn").unwrap().values(), [b"El Barto".to_vec()]);
    assert!(directory.get("cn=Lisa Simpson,ou=People,dc=btmatthews,dc=com").is_none());
}
