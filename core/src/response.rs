//! Outcome readers for the service's XML replies to write operations.
//!
//! Error replies carry `<error><code/><message/></error>`; successful
//! inserts and updates list `<recorddetail>` blocks, and lead conversion
//! answers with a `<success>` block naming the created entities.

use serde::{Deserialize, Serialize};

use crate::error::CrmError;
use crate::xml::XmlElement;

/// Ids of the entities created by converting one lead. Each is absent when
/// the service did not create that entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedLead {
    pub contact_id: Option<String>,
    pub account_id: Option<String>,
    pub potential_id: Option<String>,
}

/// Parse `body` and fail with `RemoteError` if it carries an error envelope.
pub fn check_xml_success(body: &[u8]) -> Result<(), CrmError> {
    parse_checked(body).map(|_| ())
}

/// Ids from every `<recorddetail>` of a successful insert, in reply order.
pub fn extract_inserted_ids(body: &[u8]) -> Result<Vec<String>, CrmError> {
    let root = parse_checked(body)?;
    let result = root.find("result").ok_or_else(|| CrmError::malformed("response/result"))?;

    let mut details = Vec::new();
    result.find_all("recorddetail", &mut details);
    Ok(details
        .into_iter()
        .filter_map(|detail| {
            detail
                .children_named("FL")
                .find(|field| field.attribute("val") == Some("Id"))
                .map(|field| field.text().to_string())
        })
        .collect())
}

/// Entity ids from the `<success>` block of a lead conversion.
pub fn extract_converted_lead(body: &[u8]) -> Result<ConvertedLead, CrmError> {
    let root = parse_checked(body)?;
    let success = root.find("success").ok_or_else(|| CrmError::malformed("success"))?;
    let id_of = |name: &str| success.child(name).map(|entity| entity.text().to_string());
    Ok(ConvertedLead {
        contact_id: id_of("Contact"),
        account_id: id_of("Account"),
        potential_id: id_of("Potential"),
    })
}

fn parse_checked(body: &[u8]) -> Result<XmlElement, CrmError> {
    let root = XmlElement::parse(body)?;
    if let Some(error) = root.find("error") {
        return Err(CrmError::RemoteError {
            code: error.child("code").map(XmlElement::text).unwrap_or_default().to_string(),
            message: error.child("message").map(XmlElement::text).unwrap_or_default().to_string(),
        });
    }
    Ok(root)
}
