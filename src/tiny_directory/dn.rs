//! Distinguished names as in RFC 4514.

use unicase::UniCase;


/// One `type=value` pair of an RDN. The value is unescaped.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Ava {
    pub key: UniCase<String>,
    pub value: Vec<u8>,
}


/// Relative distinguished name; more than one AVA when joined with `+`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Rdn {
    pub avas: Vec<Ava>,
}
impl Rdn {
    /// Comparison form: attribute types and values folded to lowercase, AVAs
    /// in sorted order.
    pub fn key(&self) -> RdnKey {
        let mut avas: Vec<(String, Vec<u8>)> = self.avas
            .iter()
            .map(|ava| (ava.key.to_lowercase(), ava.value.to_ascii_lowercase()))
            .collect();
        avas.sort_unstable();
        RdnKey(avas)
    }
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RdnKey(Vec<(String, Vec<u8>)>);


/// Parses a DN into its RDNs, leaf first.
///
/// The empty DN has no RDNs. Returns `None` if the DN is malformed.
pub fn dn_to_rdns(dn: &str) -> Option<Vec<Rdn>> {
    if dn.trim().is_empty() {
        return Some(Vec::new());
    }

    let tokens = tokenize(dn)?;
    split_at_unescaped(&tokens, ',')
        .into_iter()
        .map(parse_rdn)
        .collect()
}


/// Parses a single RDN such as the `newrdn` of a rename.
pub fn parse_rdn_str(rdn: &str) -> Option<Rdn> {
    let tokens = tokenize(rdn)?;
    parse_rdn(&tokens)
}


/// Splits off the leaf RDN, returning its text and that of the parent DN.
pub fn split_first_rdn(dn: &str) -> (&str, Option<&str>) {
    let bytes = dn.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            // the escaped byte (or first hex digit) is never a separator
            b'\\' => i += 2,
            b',' => return (dn[..i].trim(), Some(dn[i+1..].trim())),
            _ => i += 1,
        }
    }
    (dn.trim(), None)
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum Token {
    Plain(char),
    Escaped(u8),
}


/// Tokenizes the given DN string.
///
/// Used to abstract away escapes.
fn tokenize(dn: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::with_capacity(dn.len());
    let mut chars = dn.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            tokens.push(Token::Plain(c));
            continue;
        }

        // backslash at the end is invalid
        let escaped = chars.next()?;
        if [' ', '"', '#', '+', ',', ';', '<', '=', '>', '\\'].contains(&escaped) {
            tokens.push(Token::Escaped(escaped as u8));
        } else {
            // "\9" at the end or a string like "\A%" is invalid
            let high = escaped.to_digit(16)?;
            let low = chars.next()?.to_digit(16)?;
            tokens.push(Token::Escaped((high * 16 + low) as u8));
        }
    }
    Some(tokens)
}


fn split_at_unescaped(tokens: &[Token], separator: char) -> Vec<&[Token]> {
    tokens.split(|t| *t == Token::Plain(separator)).collect()
}


fn split_at_first_unescaped_equals(tokens: &[Token]) -> Option<(&[Token], &[Token])> {
    let index = tokens.iter().position(|t| *t == Token::Plain('='))?;
    Some((&tokens[..index], &tokens[index+1..]))
}


/// Drops unescaped whitespace around a token run.
fn trim(tokens: &[Token]) -> &[Token] {
    let is_space = |t: &Token| matches!(t, Token::Plain(c) if c.is_whitespace());
    let start = tokens.iter().position(|t| !is_space(t)).unwrap_or(tokens.len());
    let end = tokens.iter().rposition(|t| !is_space(t)).map(|i| i + 1).unwrap_or(start);
    &tokens[start..end]
}


fn tokens_to_bytes(tokens: &[Token]) -> Vec<u8> {
    let mut ret = Vec::with_capacity(tokens.len());
    let mut utf8 = [0u8; 4];
    for token in tokens {
        match token {
            Token::Escaped(b) => ret.push(*b),
            Token::Plain(c) => ret.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes()),
        }
    }
    ret
}


fn parse_rdn(tokens: &[Token]) -> Option<Rdn> {
    let mut avas = Vec::new();
    for piece in split_at_unescaped(tokens, '+') {
        let (key_tokens, value_tokens) = split_at_first_unescaped_equals(piece)?;
        let key_tokens = trim(key_tokens);
        if key_tokens.is_empty() || key_tokens.iter().any(|t| matches!(t, Token::Escaped(_))) {
            return None;
        }
        let key = String::from_utf8(tokens_to_bytes(key_tokens)).ok()?;
        let value = tokens_to_bytes(trim(value_tokens));
        avas.push(Ava { key: UniCase::new(key), value });
    }
    Some(Rdn { avas })
}


#[cfg(test)]
mod tests {
    use super::{dn_to_rdns, parse_rdn_str, split_first_rdn};

    #[test]
    fn test_dn_to_rdns() {
        let rdns = dn_to_rdns("").unwrap();
        assert_eq!(rdns.len(), 0);

        let rdns = dn_to_rdns("C=QQ").unwrap();
        assert_eq!(rdns.len(), 1);
        assert_eq!(rdns[0].avas[0].key.as_str(), "C");
        assert_eq!(rdns[0].avas[0].value, b"QQ");

        let rdns = dn_to_rdns("cn=Bart Simpson, ou=People ,dc=btmatthews,dc=com").unwrap();
        assert_eq!(rdns.len(), 4);
        assert_eq!(rdns[0].avas[0].value, b"Bart Simpson");
        assert_eq!(rdns[1].avas[0].key.as_str(), "ou");
        assert_eq!(rdns[1].avas[0].value, b"People");
        assert_eq!(rdns[3].avas[0].value, b"com");
    }

    #[test]
    fn test_escapes() {
        let rdns = dn_to_rdns(r"cn=Simpson\, Bart,o=a\2Bb\3dc").unwrap();
        assert_eq!(rdns.len(), 2);
        assert_eq!(rdns[0].avas[0].value, b"Simpson, Bart");
        assert_eq!(rdns[1].avas[0].value, b"a+b=c");

        let rdns = dn_to_rdns(r"cn=J\C3\BCrgen").unwrap();
        assert_eq!(rdns[0].avas[0].value, "Jürgen".as_bytes());
    }

    #[test]
    fn test_multi_valued() {
        let left = dn_to_rdns("cn=Bart+uid=bart,dc=com").unwrap();
        let right = dn_to_rdns("UID=Bart+CN=bart,DC=COM").unwrap();
        assert_eq!(left[0].avas.len(), 2);
        assert_eq!(left[0].key(), right[0].key());
        assert_eq!(left[1].key(), right[1].key());
    }

    #[test]
    fn test_malformed() {
        assert!(dn_to_rdns(r"cn=trailing\").is_none());
        assert!(dn_to_rdns(r"cn=bad\q").is_none());
        assert!(dn_to_rdns(r"cn=short\A").is_none());
        assert!(dn_to_rdns("cn=a,,dc=com").is_none());
        assert!(dn_to_rdns("noequals,dc=com").is_none());
        assert!(dn_to_rdns("=value").is_none());
        assert!(parse_rdn_str("cn=").is_some());
    }

    #[test]
    fn test_split_first_rdn() {
        assert_eq!(split_first_rdn("cn=a,dc=b,dc=c"), ("cn=a", Some("dc=b,dc=c")));
        assert_eq!(split_first_rdn(r"cn=a\,b, dc=c"), (r"cn=a\,b", Some("dc=c")));
        assert_eq!(split_first_rdn("dc=com"), ("dc=com", None));
    }
}
