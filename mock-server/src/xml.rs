//! Reading `xmlData` request documents and writing XML replies.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

/// One request row: `(val, text)` for every field element directly under it.
pub type Row = Vec<(String, String)>;

/// Rows of a `<Module><row no=".."><FL val="..">text</FL></row></Module>`
/// document. Attachment elements nested inside a field are skipped.
pub fn parse_rows(xml: &str) -> Result<Vec<Row>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut rows = Vec::new();
    let mut depth = 0usize;
    let mut field: Option<(String, String)> = None;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(start) => {
                depth += 1;
                match depth {
                    2 => rows.push(Row::new()),
                    3 => field = Some((field_name(&start)?, String::new())),
                    _ => {}
                }
            }
            Event::Empty(start) => {
                if depth == 1 {
                    rows.push(Row::new());
                } else if depth == 2 {
                    let name = field_name(&start)?;
                    if let Some(row) = rows.last_mut() {
                        row.push((name, String::new()));
                    }
                }
            }
            Event::Text(text) if depth == 3 => {
                if let Some((_, value)) = field.as_mut() {
                    value.push_str(&text.unescape().map_err(|e| e.to_string())?);
                }
            }
            Event::End(_) => {
                if depth == 3 {
                    if let (Some(done), Some(row)) = (field.take(), rows.last_mut()) {
                        row.push(done);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unterminated document".to_string());
    }
    Ok(rows)
}

fn field_name(start: &quick_xml::events::BytesStart<'_>) -> Result<String, String> {
    let attribute = start
        .try_get_attribute("val")
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "field element without val".to_string())?;
    attribute
        .unescape_value()
        .map(|value| value.into_owned())
        .map_err(|e| e.to_string())
}

pub fn error_reply(uri: &str, code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" ?>
<response uri="{uri}"><error><code>{code}</code><message>{}</message></error></response>"#,
        escape(message)
    )
}

/// Success reply listing one `<recorddetail>` per affected record id.
pub fn record_detail_reply(uri: &str, message: &str, ids: &[String]) -> String {
    let details: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<recorddetail><FL val="Id">{}</FL></recorddetail>"#,
                escape(id.as_str())
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" ?>
<response uri="{uri}"><result><message>{message}</message>{details}</result></response>"#
    )
}

pub fn message_reply(uri: &str, code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" ?>
<response uri="{uri}"><result><code>{code}</code><message>{}</message></result></response>"#,
        escape(message)
    )
}

/// Lead conversion reply naming the entities that were created.
pub fn converted_reply(entities: &[(&str, String)]) -> String {
    let body: String = entities
        .iter()
        .map(|(name, id)| format!(r#"<{name} param="id">{}</{name}>"#, escape(id.as_str())))
        .collect();
    format!(r#"<?xml version="1.0" encoding="UTF-8" ?><success>{body}</success>"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_and_skips_attachments() {
        let rows = parse_rows(concat!(
            r#"<Potentials><row no="1"><FL val="Potential Name">Deal &amp; Co</FL>"#,
            r#"<FL val="Roles"><Contacts no="1"><FL val="CONTACTID">4</FL></Contacts></FL>"#,
            r#"<FL val="Stage"/></row><row no="2"><FL val="Potential Name">Other</FL></row></Potentials>"#
        ))
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            vec![
                ("Potential Name".to_string(), "Deal & Co".to_string()),
                ("Roles".to_string(), String::new()),
                ("Stage".to_string(), String::new()),
            ]
        );
        assert_eq!(rows[1][0].1, "Other");
    }

    #[test]
    fn rejects_field_without_val() {
        assert!(parse_rows("<Leads><row no=\"1\"><FL>x</FL></row></Leads>").is_err());
    }

    #[test]
    fn error_reply_escapes_message() {
        let reply = error_reply("/x", "4600", "bad <xmlData>");
        assert!(reply.contains("<code>4600</code>"));
        assert!(reply.contains("bad &lt;xmlData&gt;"));
    }
}
