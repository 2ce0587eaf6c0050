//! The subset of RFC 4515 search filters the in-memory directory evaluates.

use unicase::UniCase;

use crate::record::is_object_class;
use crate::tiny_directory::AttributeBag;


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FilterError {
    /// Not a filter at all.
    Malformed,

    /// A valid filter using a match the directory does not implement.
    Unsupported,
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(UniCase<String>),
    Equal(UniCase<String>, Vec<u8>),
}
impl Filter {
    pub fn parse(text: &str) -> Result<Self, FilterError> {
        let mut parser = Parser { input: text.trim().as_bytes(), pos: 0 };
        let filter = parser.filter()?;
        if parser.pos != parser.input.len() {
            return Err(FilterError::Malformed);
        }
        Ok(filter)
    }

    /// Evaluates the filter against an entry's attributes.
    ///
    /// Every entry is treated as having an object class, so
    /// `(objectclass=*)` matches all of them. Values compare ignoring ASCII
    /// case.
    pub fn matches(&self, attributes: &AttributeBag) -> bool {
        match self {
            Self::And(filters) => filters.iter().all(|f| f.matches(attributes)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(attributes)),
            Self::Not(filter) => !filter.matches(attributes),
            Self::Present(name) => is_object_class(name) || attributes.get(name).is_some(),
            Self::Equal(name, value) => attributes.get(name)
                .map(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value)))
                .unwrap_or(false),
        }
    }
}


struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}
impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> { self.input.get(self.pos).copied() }

    fn expect(&mut self, byte: u8) -> Result<(), FilterError> {
        if self.peek() != Some(byte) {
            return Err(FilterError::Malformed);
        }
        self.pos += 1;
        Ok(())
    }

    fn filter(&mut self) -> Result<Filter, FilterError> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            },
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            },
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            },
            Some(_) => self.item()?,
            None => return Err(FilterError::Malformed),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut filters = Vec::new();
        while self.peek() == Some(b'(') {
            filters.push(self.filter()?);
        }
        if filters.is_empty() {
            return Err(FilterError::Malformed);
        }
        Ok(filters)
    }

    fn item(&mut self) -> Result<Filter, FilterError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'=' | b'~' | b'<' | b'>' | b':' | b'(' | b')') {
                break;
            }
            self.pos += 1;
        }
        let attribute = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| FilterError::Malformed)?
            .trim();

        match self.peek() {
            // extensible match, possibly without an attribute
            Some(b':') => return Err(FilterError::Unsupported),
            Some(b'=') if !attribute.is_empty() => self.pos += 1,
            Some(b'~') | Some(b'<') | Some(b'>') if !attribute.is_empty() => {
                self.pos += 1;
                self.expect(b'=')?;
                return Err(FilterError::Unsupported);
            },
            _ => return Err(FilterError::Malformed),
        }
        let attribute = UniCase::new(attribute.to_owned());

        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'(' || b == b')' {
                break;
            }
            self.pos += 1;
        }
        let raw = &self.input[start..self.pos];
        if raw == b"*" {
            return Ok(Filter::Present(attribute));
        }
        if raw.contains(&b'*') {
            // substring match
            return Err(FilterError::Unsupported);
        }
        Ok(Filter::Equal(attribute, unescape_value(raw)?))
    }
}


fn unescape_value(raw: &[u8]) -> Result<Vec<u8>, FilterError> {
    let mut value = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != b'\\' {
            value.push(raw[i]);
            i += 1;
            continue;
        }
        let hex = raw.get(i+1..i+3).ok_or(FilterError::Malformed)?;
        let hex = std::str::from_utf8(hex).map_err(|_| FilterError::Malformed)?;
        let byte = u8::from_str_radix(hex, 16).map_err(|_| FilterError::Malformed)?;
        value.push(byte);
        i += 3;
    }
    Ok(value)
}
