//! Synchronous client core for the CRM record API.
//!
//! # Overview
//! Maps host records to the service's row/field XML request documents and
//! maps its JSON replies back to flat records. Request building and reply
//! parsing never touch the network; the host plugs in a [`Connection`] that
//! owns the session and performs each round-trip.
//!
//! # Design
//! - `encode` and `decode` are the two inverse transformations; both take
//!   the module name explicitly since it selects the root tag and JSON path.
//! - `CrmClient` is stateless: `build_*` produces a `CrmRequest`, `parse_*`
//!   consumes the reply bytes.
//! - `RecordOperations` composes the two with a `Connection` and is the
//!   surface most hosts use.
//! - "No data" replies decode to an empty list (or `None` for a lookup by
//!   id) and are never errors.

pub mod client;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod http;
pub mod operations;
pub mod response;
pub mod types;
pub mod xml;

pub use client::{default_select_columns, CrmClient, LEADS_MODULE, LEAD_ID_FIELD};
pub use config::ClientConfig;
pub use decode::{decode, decode_json, ResponseEnvelope};
pub use encode::{encode, RequestDocument, FIELD_TAG, OPTION_TAG};
pub use error::CrmError;
pub use http::{ApiMethod, Connection, CrmRequest, FormParams, WireFormat, XML_DATA_PARAM};
pub use operations::RecordOperations;
pub use response::{check_xml_success, extract_converted_lead, extract_inserted_ids, ConvertedLead};
pub use types::{records_from_json, AttachmentGroup, FieldValue, Record};
pub use xml::XmlElement;
