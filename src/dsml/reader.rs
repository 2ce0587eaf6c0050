use std::io::{self, BufRead};

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use tracing::{debug, warn};

use crate::dsml::DSML_NAMESPACE;
use crate::enc::decode_base64;
use crate::error::{Location, ModelError, ParseError, ParseErrorKind, ReadError};
use crate::format::FormatReader;
use crate::record::{ChangeRecord, EntryBuilder, OBJECT_CLASS};


/// One XML event, detached from the reader's buffer.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum Node {
    Open {
        dsml: bool,
        name: String,
        attributes: Vec<(String, String)>,
        empty: bool,
    },
    Close,
    Text(Vec<u8>),
    Eof,
}
impl Node {
    fn is_dsml(&self, local_name: &str) -> bool {
        match self {
            Self::Open { dsml, name, .. } => *dsml && name == local_name,
            _ => false,
        }
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        match self {
            Self::Open { attributes, .. } => attributes.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum State {
    /// Inside the root element, outside `directory-entries`.
    Root,

    /// Inside `directory-entries`.
    Entries,

    Ended,
    Failed,
    Closed,
}


/// Reads a DSMLv1 `directory-entries` document as a sequence of add records.
///
/// Elements are matched by namespace URI, so any prefix (or the default
/// namespace) may be bound to the DSML namespace. Entries are parsed one at
/// a time as the iterator is advanced.
pub struct DsmlReader<R> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    state: State,
    entry_index: usize,
}
impl<R: BufRead> DsmlReader<R> {
    /// Reads up to and including the root element, which must be `dsml` in
    /// the DSML namespace.
    pub fn new(input: R) -> Result<Self, ReadError> {
        let mut reader = Self {
            reader: NsReader::from_reader(input),
            buf: Vec::new(),
            state: State::Root,
            entry_index: 0,
        };
        loop {
            let node = reader.next_node()?;
            match node {
                Node::Open { empty, .. } if node.is_dsml("dsml") => {
                    if empty {
                        reader.state = State::Ended;
                    }
                    return Ok(reader);
                },
                Node::Open { dsml, name, .. } => {
                    let found = if dsml { name } else { format!("{} outside the DSML namespace", name) };
                    return Err(ParseError::fatal(ParseErrorKind::NotDsml(found), Location::Element("/".to_owned())).into());
                },
                Node::Eof => {
                    return Err(ParseError::fatal(
                        ParseErrorKind::NotDsml("no root element".to_owned()),
                        Location::Element("/".to_owned()),
                    ).into());
                },
                Node::Close | Node::Text(_) => continue,
            }
        }
    }

    fn xml_error<E: std::fmt::Display>(&self, error: E) -> ParseError {
        ParseError::fatal(
            ParseErrorKind::Xml(error.to_string()),
            Location::Offset(self.reader.buffer_position() as u64),
        )
    }

    fn entry_location(&self) -> Location {
        Location::Element(format!("/dsml/directory-entries/entry[{}]", self.entry_index))
    }

    fn next_node(&mut self) -> Result<Node, ParseError> {
        self.buf.clear();
        let (namespace, event) = match self.reader.read_resolved_event_into(&mut self.buf) {
            Ok(pair) => pair,
            Err(e) => {
                let message = e.to_string();
                return Err(self.xml_error(message));
            },
        };
        let dsml = matches!(namespace, ResolveResult::Bound(Namespace(ns)) if ns == DSML_NAMESPACE.as_bytes());

        let node = match event {
            Event::Start(start) => open_node(dsml, &start, false),
            Event::Empty(start) => open_node(dsml, &start, true),
            Event::End(_) => Ok(Node::Close),
            Event::Text(text) => text.unescape()
                .map(|t| Node::Text(t.into_owned().into_bytes()))
                .map_err(|e| e.to_string()),
            Event::CData(data) => Ok(Node::Text(data.into_inner().into_owned())),
            Event::Eof => Ok(Node::Eof),
            _ => Ok(Node::Text(Vec::new())),
        };
        node.or_else(|message| Err(self.xml_error(message)))
    }

    /// Skips the remainder of the element whose start tag was just read.
    fn skip_element(&mut self) -> Result<(), ParseError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.next_node()? {
                Node::Open { empty: false, .. } => depth += 1,
                Node::Open { empty: true, .. } | Node::Text(_) => {},
                Node::Close => depth -= 1,
                Node::Eof => return Err(self.xml_error("unexpected end of document")),
            }
        }
        Ok(())
    }

    /// Collects the text content of the element whose start tag was just
    /// read, ignoring nested markup.
    fn read_text(&mut self) -> Result<Vec<u8>, ParseError> {
        let mut text = Vec::new();
        let mut depth = 1usize;
        while depth > 0 {
            match self.next_node()? {
                Node::Open { empty: false, .. } => depth += 1,
                Node::Open { empty: true, .. } => {},
                Node::Text(t) => text.extend_from_slice(&t),
                Node::Close => depth -= 1,
                Node::Eof => return Err(self.xml_error("unexpected end of document")),
            }
        }
        Ok(text)
    }

    /// Reads the body of an `entry` element.
    ///
    /// Problems confined to the entry are collected so that the whole entry
    /// is consumed before they are reported.
    fn read_entry(&mut self, start: &Node) -> Result<Result<ChangeRecord, ParseError>, ParseError> {
        let location = self.entry_location();
        let mut fault: Option<ParseErrorKind> = None;
        let dn = start.attribute("dn").unwrap_or("").to_owned();
        if dn.is_empty() {
            fault = Some(ParseErrorKind::InvalidRecord(ModelError::EmptyDn));
        }
        let mut builder = EntryBuilder::new(dn);

        if !matches!(start, Node::Open { empty: true, .. }) {
            loop {
                let node = self.next_node()?;
                match node {
                    Node::Close => break,
                    Node::Eof => return Err(self.xml_error("unexpected end of document")),
                    Node::Text(_) => {},
                    Node::Open { empty: true, .. } => {},
                    Node::Open { .. } if node.is_dsml("objectclass") => {
                        for value in self.read_values("oc-value", &mut fault)? {
                            builder.push_value(OBJECT_CLASS, value);
                        }
                    },
                    Node::Open { .. } if node.is_dsml("attr") => {
                        let name = node.attribute("name").map(str::to_owned);
                        let values = self.read_values("value", &mut fault)?;
                        match name {
                            Some(name) if !name.is_empty() => {
                                builder.push_values(name, values);
                            },
                            _ => {
                                warn!(location = %location, "ignoring DSML attr without a name");
                            },
                        }
                    },
                    Node::Open { .. } => self.skip_element()?,
                }
            }
        }

        if let Some(kind) = fault {
            return Ok(Err(ParseError::recoverable(kind, location)));
        }
        Ok(builder.build()
            .map(ChangeRecord::add)
            .map_err(|e| ParseError::invalid_record(e, location)))
    }

    /// Reads the `value_name` children of the current element.
    fn read_values(&mut self, value_name: &str, fault: &mut Option<ParseErrorKind>) -> Result<Vec<Vec<u8>>, ParseError> {
        let mut values = Vec::new();
        loop {
            let node = self.next_node()?;
            match node {
                Node::Close => return Ok(values),
                Node::Eof => return Err(self.xml_error("unexpected end of document")),
                Node::Text(_) => {},
                Node::Open { empty: true, .. } if node.is_dsml(value_name) => values.push(Vec::new()),
                Node::Open { .. } if node.is_dsml(value_name) => {
                    let text = self.read_text()?;
                    if node.attribute("encoding") == Some("base64") {
                        match decode_base64(&String::from_utf8_lossy(&text)) {
                            Some(decoded) => values.push(decoded),
                            None => {
                                fault.get_or_insert(ParseErrorKind::InvalidBase64);
                            },
                        }
                    } else {
                        values.push(text);
                    }
                },
                Node::Open { empty: true, .. } => {},
                Node::Open { .. } => self.skip_element()?,
            }
        }
    }

    fn advance(&mut self) -> Result<Option<ChangeRecord>, ReadError> {
        loop {
            match self.state {
                State::Ended | State::Failed | State::Closed => return Ok(None),
                State::Root => {
                    let node = self.next_node()?;
                    match node {
                        Node::Open { empty: false, .. } if node.is_dsml("directory-entries") => {
                            self.state = State::Entries;
                        },
                        Node::Open { empty: false, .. } => self.skip_element()?,
                        Node::Open { empty: true, .. } | Node::Text(_) => {},
                        Node::Close => {
                            self.finish()?;
                            return Ok(None);
                        },
                        Node::Eof => return Err(self.xml_error("unexpected end of document").into()),
                    }
                },
                State::Entries => {
                    let node = self.next_node()?;
                    match node {
                        Node::Open { .. } if node.is_dsml("entry") => {
                            self.entry_index += 1;
                            return match self.read_entry(&node)? {
                                Ok(record) => {
                                    debug!(dn = record.dn(), "read DSML entry");
                                    Ok(Some(record))
                                },
                                Err(e) => Err(e.into()),
                            };
                        },
                        Node::Open { empty: false, .. } => self.skip_element()?,
                        Node::Open { empty: true, .. } | Node::Text(_) => {},
                        Node::Close => self.state = State::Root,
                        Node::Eof => return Err(self.xml_error("unexpected end of document").into()),
                    }
                },
            }
        }
    }

    /// Consumes trailing content after the root element.
    fn finish(&mut self) -> Result<(), ParseError> {
        self.state = State::Ended;
        loop {
            match self.next_node()? {
                Node::Eof => return Ok(()),
                Node::Text(_) => {},
                Node::Open { .. } | Node::Close => return Err(self.xml_error("content after the root element")),
            }
        }
    }
}
impl<R: BufRead> Iterator for DsmlReader<R> {
    type Item = Result<ChangeRecord, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                if !e.may_continue() {
                    self.state = State::Failed;
                }
                Some(Err(e))
            },
        }
    }
}
impl<R: BufRead> FormatReader for DsmlReader<R> {
    fn close(&mut self) -> io::Result<()> {
        self.state = State::Closed;
        Ok(())
    }
}


fn open_node(dsml: bool, start: &quick_xml::events::BytesStart<'_>, empty: bool) -> Result<Node, String> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()
            .map_err(|e| e.to_string())?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Node::Open { dsml, name, attributes, empty })
}
