use std::io::{self, Write};

use quick_xml::escape::escape;

use crate::enc::{encode_base64, is_xml_safe_value, EOL};
use crate::format::FormatWriter;
use crate::record::Entry;


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum State {
    Open,
    Closed,
}


/// Writes entries as a DSMLv1 `directory-entries` document.
///
/// The prolog is written on construction, the closing tags on `close`.
#[derive(Debug)]
pub struct DsmlWriter<W: Write> {
    output: W,
    state: State,
}
impl<W: Write> DsmlWriter<W> {
    pub fn new(mut output: W) -> io::Result<Self> {
        let mut buffer = String::new();
        push_line(&mut buffer, 0, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        push_line(&mut buffer, 0, &format!(r#"<dsml:dsml xmlns:dsml="{}">"#, crate::dsml::DSML_NAMESPACE));
        push_line(&mut buffer, 1, "<dsml:directory-entries>");
        output.write_all(buffer.as_bytes())?;
        Ok(Self {
            output,
            state: State::Open,
        })
    }
}
impl<W: Write> FormatWriter for DsmlWriter<W> {
    fn print_entry(&mut self, entry: &Entry) -> io::Result<()> {
        if self.state == State::Closed {
            return Err(io::Error::new(io::ErrorKind::Other, "DSML writer is closed"));
        }

        let mut buffer = String::new();
        push_line(&mut buffer, 2, &format!(r#"<dsml:entry dn="{}">"#, escape(entry.dn())));

        let object_classes = entry.object_classes();
        if !object_classes.is_empty() {
            push_line(&mut buffer, 3, "<dsml:objectclass>");
            for value in object_classes {
                push_line(&mut buffer, 4, &value_element("dsml:oc-value", value));
            }
            push_line(&mut buffer, 3, "</dsml:objectclass>");
        }

        for attribute in entry.attributes().iter().filter(|a| !a.is_object_class()) {
            push_line(&mut buffer, 3, &format!(r#"<dsml:attr name="{}">"#, escape(attribute.name())));
            for value in attribute.values() {
                push_line(&mut buffer, 4, &value_element("dsml:value", value));
            }
            push_line(&mut buffer, 3, "</dsml:attr>");
        }

        push_line(&mut buffer, 2, "</dsml:entry>");
        self.output.write_all(buffer.as_bytes())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }
        self.state = State::Closed;

        let mut buffer = String::new();
        push_line(&mut buffer, 1, "</dsml:directory-entries>");
        push_line(&mut buffer, 0, "</dsml:dsml>");
        self.output.write_all(buffer.as_bytes())?;
        self.output.flush()
    }
}


fn value_element(tag: &str, value: &[u8]) -> String {
    if is_xml_safe_value(value) {
        // is_xml_safe_value guarantees UTF-8
        let text = String::from_utf8_lossy(value);
        format!("<{tag}>{}</{tag}>", escape(&*text))
    } else {
        format!(r#"<{tag} encoding="base64">{}</{tag}>"#, encode_base64(value))
    }
}


fn push_line(buffer: &mut String, indent: usize, line: &str) {
    for _ in 0..indent {
        buffer.push('\t');
    }
    buffer.push_str(line);
    buffer.push_str(EOL);
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EntryBuilder;

    /// Drops whitespace between tags so documents compare independently of
    /// indentation and line endings.
    fn squash(xml: &str) -> String {
        xml.lines()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("")
    }

    fn render(entries: &[Entry]) -> String {
        let mut out = Vec::new();
        {
            let mut writer = DsmlWriter::new(&mut out).unwrap();
            for entry in entries {
                writer.print_entry(entry).unwrap();
            }
            writer.close().unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(
            squash(&render(&[])),
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<dsml:dsml xmlns:dsml="http://www.dsml.org/DSML">"#,
                "<dsml:directory-entries></dsml:directory-entries></dsml:dsml>",
            ),
        );
    }

    #[test]
    fn test_one_entry() {
        let entry = EntryBuilder::new("ou=People,dc=btmatthews,dc=com")
            .with("ou", "People")
            .with("objectclass", "organizationalUnit")
            .build().unwrap();
        let xml = squash(&render(&[entry]));
        assert!(xml.contains(concat!(
            r#"<dsml:entry dn="ou=People,dc=btmatthews,dc=com">"#,
            "<dsml:objectclass><dsml:oc-value>organizationalUnit</dsml:oc-value></dsml:objectclass>",
            r#"<dsml:attr name="ou"><dsml:value>People</dsml:value></dsml:attr>"#,
            "</dsml:entry>",
        )));
    }

    #[test]
    fn test_each_tag_on_its_own_line() {
        let text = render(&[]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, [
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<dsml:dsml xmlns:dsml="http://www.dsml.org/DSML">"#,
            "\t<dsml:directory-entries>",
            "\t</dsml:directory-entries>",
            "</dsml:dsml>",
        ]);
    }

    #[test]
    fn test_escaping_and_binary_values() {
        let mut builder = EntryBuilder::new(r#"cn=Tom & "Jerry",dc=example,dc=com"#);
        builder.push_value("cn", b"Tom <& Jerry>".to_vec());
        builder.push_value("photo", vec![0x00, 0x01, 0x02, 0xff]);
        let xml = render(&[builder.build().unwrap()]);
        assert!(xml.contains(r#"dn="cn=Tom &amp; &quot;Jerry&quot;,dc=example,dc=com""#));
        assert!(xml.contains("<dsml:value>Tom &lt;&amp; Jerry&gt;</dsml:value>"));
        assert!(xml.contains(r#"<dsml:value encoding="base64">AAEC/w==</dsml:value>"#));
    }

    #[test]
    fn test_binary_object_class_uses_base64() {
        let mut builder = EntryBuilder::new("cn=a");
        builder.push_value("objectclass", vec![0xff, 0x00]);
        builder.push_value("objectclass", b"top".to_vec());
        let xml = render(&[builder.build().unwrap()]);
        assert!(xml.contains(r#"<dsml:oc-value encoding="base64">/wA=</dsml:oc-value>"#));
        assert!(xml.contains("<dsml:oc-value>top</dsml:oc-value>"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut out = Vec::new();
        let mut writer = DsmlWriter::new(&mut out).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(writer.print_entry(&EntryBuilder::new("cn=a").with("cn", "a").build().unwrap()).is_err());
        drop(writer);
        assert_eq!(String::from_utf8(out).unwrap().matches("</dsml:dsml>").count(), 1);
    }
}
