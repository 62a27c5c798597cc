use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use saxpull::{ErrorKind, SyntaxError, XmlElement, XmlEvent, XmlPullParser};

fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn collect_events(parser: XmlPullParser) -> Vec<XmlEvent> {
    parser.map(|event| event.expect("parse error")).collect()
}

#[test]
fn minimal_document() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8" ?><hoge aa="11" bb="22">foo</hoge>"#;
    let events = collect_events(XmlPullParser::from_str(xml));
    assert_eq!(
        events,
        vec![
            XmlEvent::StartDocument,
            XmlEvent::StartElement(XmlElement {
                name: "hoge".to_string(),
                namespace_uri: None,
                qualified_name: None,
                attributes: attrs(&[("aa", "11"), ("bb", "22")]),
            }),
            XmlEvent::Characters("foo".to_string()),
            XmlEvent::end_element("hoge", None),
            XmlEvent::EndDocument,
        ]
    );
}

#[test]
fn adjacent_text_and_cdata_coalesce_into_one_event() {
    let xml = "<foo>This is text in a <![CDATA[<foo>]]> element</foo>";
    let events = collect_events(XmlPullParser::from_str(xml));
    assert_eq!(
        events,
        vec![
            XmlEvent::StartDocument,
            XmlEvent::StartElement(XmlElement {
                name: "foo".to_string(),
                ..Default::default()
            }),
            XmlEvent::Characters("This is text in a <foo> element".to_string()),
            XmlEvent::end_element("foo", None),
            XmlEvent::EndDocument,
        ]
    );
}

#[test]
fn entity_expansion_does_not_split_character_runs() {
    let xml = "<a>one &amp; two &lt;three&gt;</a>";
    let events = collect_events(XmlPullParser::from_str(xml));
    assert_eq!(
        events[2],
        XmlEvent::Characters("one & two <three>".to_string())
    );
}

#[test]
fn namespace_processing_on() {
    let xml = r#"<w:document xmlns:w="NS"><w:rtl w:val="0"/></w:document>"#;
    let mut parser = XmlPullParser::from_str(xml);
    parser.set_process_namespaces(true);
    let events = collect_events(parser);
    assert_eq!(
        events,
        vec![
            XmlEvent::StartDocument,
            XmlEvent::StartElement(XmlElement {
                name: "document".to_string(),
                namespace_uri: Some("NS".to_string()),
                qualified_name: Some("w:document".to_string()),
                attributes: attrs(&[]),
            }),
            XmlEvent::StartElement(XmlElement {
                name: "rtl".to_string(),
                namespace_uri: Some("NS".to_string()),
                qualified_name: Some("w:rtl".to_string()),
                attributes: attrs(&[("w:val", "0")]),
            }),
            XmlEvent::end_element("rtl", Some("NS")),
            XmlEvent::end_element("document", Some("NS")),
            XmlEvent::EndDocument,
        ]
    );
}

#[test]
fn namespace_processing_off() {
    let xml = r#"<w:document xmlns:w="NS"><w:rtl w:val="0"/></w:document>"#;
    let events = collect_events(XmlPullParser::from_str(xml));
    assert_eq!(
        events,
        vec![
            XmlEvent::StartDocument,
            XmlEvent::StartElement(XmlElement {
                name: "w:document".to_string(),
                namespace_uri: None,
                qualified_name: None,
                attributes: attrs(&[("xmlns:w", "NS")]),
            }),
            XmlEvent::StartElement(XmlElement {
                name: "w:rtl".to_string(),
                namespace_uri: None,
                qualified_name: None,
                attributes: attrs(&[("w:val", "0")]),
            }),
            XmlEvent::end_element("w:rtl", None),
            XmlEvent::end_element("w:document", None),
            XmlEvent::EndDocument,
        ]
    );
}

#[test]
fn depth_is_observable_per_event() {
    let mut parser = XmlPullParser::from_str("<foo><bar>text</bar></foo>");
    let mut depths = Vec::new();
    loop {
        let event = parser.next_event().expect("parse error");
        depths.push(parser.depth());
        if event == XmlEvent::EndDocument {
            break;
        }
    }
    // StartDocument, <foo>, <bar>, text, </bar>, </foo>, EndDocument
    assert_eq!(depths, vec![0, 1, 2, 2, 2, 1, 0]);
}

#[test]
fn end_document_is_idempotent() {
    let mut parser = XmlPullParser::from_str("<a/>");
    loop {
        if parser.next_event().expect("parse error") == XmlEvent::EndDocument {
            break;
        }
    }
    for _ in 0..3 {
        assert_eq!(parser.next_event().expect("no error"), XmlEvent::EndDocument);
    }
}

#[test]
fn parse_error_reports_line_and_column() {
    let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<hoge>\nfoo\n<</hoge>";
    let mut parser = XmlPullParser::from_str(xml);
    let error = loop {
        match parser.next_event() {
            Ok(XmlEvent::EndDocument) => panic!("expected a parse error"),
            Ok(_) => continue,
            Err(error) => break error,
        }
    };
    assert_eq!(error.line, 4);
    assert_eq!(error.column, 2);
    match error.kind {
        ErrorKind::Syntax(e) => assert_eq!(e, SyntaxError::InvalidFirstCharacterOfTagName),
        ErrorKind::Io(e) => panic!("unexpected io error: {}", e),
    }
    assert_eq!(parser.line_number(), 4);
    assert_eq!(parser.column_number(), 2);

    // an error is terminal, not retryable
    assert_eq!(parser.next_event().expect("no error"), XmlEvent::EndDocument);
    assert_eq!(parser.next_event().expect("no error"), XmlEvent::EndDocument);
}

#[test]
fn abort_after_start_element_returns_and_terminates() {
    let mut parser = XmlPullParser::from_str("<foo><bar>text</bar></foo>");
    assert_eq!(parser.next_event().expect("no error"), XmlEvent::StartDocument);
    let event = parser.next_event().expect("no error");
    assert!(matches!(event, XmlEvent::StartElement(_)));

    parser.abort_parsing();
    assert_eq!(parser.next_event().expect("no error"), XmlEvent::EndDocument);
    assert_eq!(parser.next_event().expect("no error"), XmlEvent::EndDocument);
}

#[test]
fn abort_is_idempotent() {
    let mut parser = XmlPullParser::from_str("<foo>text</foo>");
    parser.next_event().expect("no error");
    parser.abort_parsing();
    parser.abort_parsing();
    assert_eq!(parser.next_event().expect("no error"), XmlEvent::EndDocument);
}

#[test]
fn dropping_mid_parse_does_not_hang() {
    let mut parser = XmlPullParser::from_str("<foo><bar>text</bar></foo>");
    parser.next_event().expect("no error");
    parser.next_event().expect("no error");
    drop(parser);
}

#[test]
fn iterator_fuses_after_end_document() {
    let parser = XmlPullParser::from_str("<a>x</a>");
    let events: Vec<_> = parser.map(|e| e.expect("parse error")).collect();
    assert_eq!(events.len(), 5);
    assert_eq!(events.last(), Some(&XmlEvent::EndDocument));
}

#[test]
fn iterator_fuses_after_error() {
    let mut parser = XmlPullParser::from_str("<a><b></a>");
    let mut saw_error = false;
    while let Some(event) = parser.next() {
        if event.is_err() {
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[test]
fn reader_input_is_supported() {
    let xml: &[u8] = b"<a><b>nested</b></a>";
    let parser = XmlPullParser::from_reader(std::io::Cursor::new(xml.to_vec()));
    let events = collect_events(parser);
    assert_eq!(events.len(), 7);
    assert_eq!(events[3], XmlEvent::Characters("nested".to_string()));
}

#[test]
fn self_closing_tag_produces_start_and_end() {
    let events = collect_events(XmlPullParser::from_str("<a><b/></a>"));
    assert_eq!(
        events,
        vec![
            XmlEvent::StartDocument,
            XmlEvent::StartElement(XmlElement {
                name: "a".to_string(),
                ..Default::default()
            }),
            XmlEvent::StartElement(XmlElement {
                name: "b".to_string(),
                ..Default::default()
            }),
            XmlEvent::end_element("b", None),
            XmlEvent::end_element("a", None),
            XmlEvent::EndDocument,
        ]
    );
}

#[test]
fn attribute_values_expand_entities() {
    let events = collect_events(XmlPullParser::from_str(r#"<a t="x &lt; y"/>"#));
    assert_eq!(
        events[1],
        XmlEvent::StartElement(XmlElement {
            name: "a".to_string(),
            attributes: attrs(&[("t", "x < y")]),
            ..Default::default()
        })
    );
}

#[test]
fn namespace_flag_is_ignored_once_started() {
    let mut parser =
        XmlPullParser::from_str(r#"<w:document xmlns:w="NS"><w:rtl/></w:document>"#);
    parser.next_event().expect("no error");
    parser.set_process_namespaces(true);
    assert!(!parser.process_namespaces());
    let event = parser.next_event().expect("no error");
    match event {
        XmlEvent::StartElement(element) => {
            assert_eq!(element.name, "w:document");
            assert_eq!(element.namespace_uri, None);
        }
        other => panic!("expected a start element, got {:?}", other),
    }
}
