//! Records to the service's row/field XML request format.
//!
//! ```text
//! <Leads>
//!   <row no="1">
//!     <FL val="Last Name">Smith</FL>
//!     <FL val="Contact Roles">
//!       <Contacts no="1"><FL val="CONTACTID">42</FL></Contacts>
//!     </FL>
//!   </row>
//! </Leads>
//! ```

use crate::error::CrmError;
use crate::types::{AttachmentGroup, FieldValue, Record};
use crate::xml::XmlElement;

/// Field tag used by record payloads.
pub const FIELD_TAG: &str = "FL";

/// Field tag used by the lead-conversion option payload.
pub const OPTION_TAG: &str = "option";

/// XML request body for one module: root named after the module, one
/// numbered `row` per record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDocument {
    pub root: XmlElement,
}

impl RequestDocument {
    pub fn module(&self) -> &str {
        &self.root.name
    }

    pub fn rows(&self) -> &[XmlElement] {
        &self.root.children
    }

    pub fn to_xml(&self) -> Result<String, CrmError> {
        self.root.to_xml()
    }
}

/// Encode `records` for `module` using `field_tag` for every field element.
///
/// Rows are numbered from 1 in input order. Attachment rows inside one
/// field are numbered from 1 with a single counter shared by every module in
/// the group.
pub fn encode(
    module: &str,
    records: &[Record],
    field_tag: &str,
) -> Result<RequestDocument, CrmError> {
    let mut root = XmlElement::new(module);
    for (index, record) in records.iter().enumerate() {
        let mut row = XmlElement::new("row").with_attribute("no", (index + 1).to_string());
        for (key, value) in record.iter() {
            let field = XmlElement::new(field_tag).with_attribute("val", key);
            let field = match value {
                FieldValue::Text(text) => field.with_text(text.as_str()),
                FieldValue::Attachment(group) => encode_attachment(field, group, field_tag)?,
            };
            row.children.push(field);
        }
        root.children.push(row);
    }
    Ok(RequestDocument { root })
}

fn encode_attachment(
    mut field: XmlElement,
    group: &AttachmentGroup,
    field_tag: &str,
) -> Result<XmlElement, CrmError> {
    let mut attach_no = 1;
    for (module, rows) in group.iter() {
        for nested in rows {
            let mut item = XmlElement::new(module).with_attribute("no", attach_no.to_string());
            for (key, value) in nested.iter() {
                let text = value.as_text().ok_or_else(|| {
                    CrmError::TypeMismatch(format!(
                        "attached {module} field {key:?} must be scalar text"
                    ))
                })?;
                item.children
                    .push(XmlElement::new(field_tag).with_attribute("val", key).with_text(text));
            }
            field.children.push(item);
            attach_no += 1;
        }
    }
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_record_matches_wire_format() {
        let doc = encode("Leads", &[Record::new().with("Last Name", "Smith")], FIELD_TAG).unwrap();
        assert_eq!(doc.module(), "Leads");
        assert_eq!(
            doc.to_xml().unwrap(),
            r#"<Leads><row no="1"><FL val="Last Name">Smith</FL></row></Leads>"#
        );
    }

    #[test]
    fn rows_are_numbered_in_input_order() {
        let records: Vec<Record> = (0..5)
            .map(|i| Record::new().with("Last Name", format!("n{i}")))
            .collect();
        let doc = encode("Leads", &records, FIELD_TAG).unwrap();
        let numbers: Vec<&str> = doc
            .rows()
            .iter()
            .map(|row| row.attribute("no").unwrap())
            .collect();
        assert_eq!(numbers, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(doc.rows()[3].children[0].text(), "n3");
    }

    #[test]
    fn field_order_follows_record_order() {
        let record = Record::new()
            .with("Company", "Acme")
            .with("Last Name", "Smith")
            .with("Email", "s@acme.test");
        let doc = encode("Leads", &[record], FIELD_TAG).unwrap();
        let keys: Vec<&str> = doc.rows()[0]
            .children
            .iter()
            .map(|f| f.attribute("val").unwrap())
            .collect();
        assert_eq!(keys, vec!["Company", "Last Name", "Email"]);
    }

    #[test]
    fn attachment_counter_spans_modules() {
        let group = AttachmentGroup::new()
            .with_module(
                "Contacts",
                vec![Record::new().with("CONTACTID", "1"), Record::new().with("CONTACTID", "2")],
            )
            .with_module("Accounts", vec![Record::new().with("ACCOUNTID", "3")]);
        let record = Record::new().with("Potential Name", "Deal").with("Related", group);
        let doc = encode("Potentials", &[record], FIELD_TAG).unwrap();

        let related = &doc.rows()[0].children[1];
        assert_eq!(related.attribute("val"), Some("Related"));
        assert!(related.text.is_none());
        let attached: Vec<(&str, &str)> = related
            .children
            .iter()
            .map(|item| (item.name.as_str(), item.attribute("no").unwrap()))
            .collect();
        assert_eq!(attached, vec![("Contacts", "1"), ("Contacts", "2"), ("Accounts", "3")]);
        assert_eq!(related.children[2].children[0].attribute("val"), Some("ACCOUNTID"));
        assert_eq!(related.children[2].children[0].text(), "3");
    }

    #[test]
    fn attachment_counter_restarts_per_field() {
        let first = AttachmentGroup::new()
            .with_module("Contacts", vec![Record::new().with("CONTACTID", "1")]);
        let second = AttachmentGroup::new()
            .with_module("Contacts", vec![Record::new().with("CONTACTID", "2")]);
        let record = Record::new().with("A", first).with("B", second);
        let doc = encode("Potentials", &[record], FIELD_TAG).unwrap();
        assert_eq!(doc.rows()[0].children[1].children[0].attribute("no"), Some("1"));
    }

    #[test]
    fn attachment_serializes_nested_rows() {
        let group = AttachmentGroup::new()
            .with_module("Contacts", vec![Record::new().with("CONTACTID", "42")]);
        let doc = encode("Potentials", &[Record::new().with("Roles", group)], FIELD_TAG).unwrap();
        assert_eq!(
            doc.to_xml().unwrap(),
            r#"<Potentials><row no="1"><FL val="Roles"><Contacts no="1"><FL val="CONTACTID">42</FL></Contacts></FL></row></Potentials>"#
        );
    }

    #[test]
    fn nested_attachment_inside_attachment_is_rejected() {
        let inner = AttachmentGroup::new().with_module("Accounts", vec![Record::new()]);
        let outer = AttachmentGroup::new()
            .with_module("Contacts", vec![Record::new().with("Deep", inner)]);
        let err =
            encode("Potentials", &[Record::new().with("Roles", outer)], FIELD_TAG).unwrap_err();
        assert!(matches!(err, CrmError::TypeMismatch(_)));
    }

    #[test]
    fn custom_field_tag_is_used() {
        let record = Record::new().with("createPotential", false);
        let doc = encode("Potentials", &[record], OPTION_TAG).unwrap();
        assert_eq!(
            doc.to_xml().unwrap(),
            r#"<Potentials><row no="1"><option val="createPotential">false</option></row></Potentials>"#
        );
    }

    #[test]
    fn empty_input_yields_bare_root() {
        let doc = encode("Leads", &[], FIELD_TAG).unwrap();
        assert!(doc.rows().is_empty());
        assert_eq!(doc.to_xml().unwrap(), "<Leads/>");
    }
}
