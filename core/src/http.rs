//! Transport-facing types for the host-does-IO pattern.
//!
//! # Design
//! `CrmClient` describes every call as a `CrmRequest` (URL, ordered form
//! parameters, optional XML document) and never touches the network. The
//! host supplies a [`Connection`] that owns the session and performs the
//! round-trip. Authentication, pooling and retries live behind that trait.

use std::fmt;

use crate::encode::RequestDocument;
use crate::error::CrmError;

/// Form parameter carrying the serialized request document.
pub const XML_DATA_PARAM: &str = "xmlData";

/// Which encoding the endpoint answers in; also the URL path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Xml,
    Json,
}

impl WireFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            WireFormat::Xml => "xml",
            WireFormat::Json => "json",
        }
    }
}

/// Remote API methods, named as they appear in the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    InsertRecords,
    UpdateRecords,
    DeleteRecords,
    GetRecords,
    GetRecordById,
    SearchRecords,
    GetSearchRecords,
    GetSearchRecordsByPdc,
    ConvertLead,
}

impl ApiMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiMethod::InsertRecords => "insertRecords",
            ApiMethod::UpdateRecords => "updateRecords",
            ApiMethod::DeleteRecords => "deleteRecords",
            ApiMethod::GetRecords => "getRecords",
            ApiMethod::GetRecordById => "getRecordById",
            ApiMethod::SearchRecords => "searchRecords",
            ApiMethod::GetSearchRecords => "getSearchRecords",
            ApiMethod::GetSearchRecordsByPdc => "getSearchRecordsByPDC",
            ApiMethod::ConvertLead => "convertLead",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered form parameters. Setting an existing key replaces its value in
/// place, so defaults can be overridden by caller-supplied parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormParams {
    pairs: Vec<(String, String)>,
}

impl FormParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.pairs.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.pairs.push((key, value)),
        }
    }

    /// Apply every pair of `overrides` on top of `self`.
    pub fn merge(mut self, overrides: &FormParams) -> Self {
        for (key, value) in &overrides.pairs {
            self.set(key.as_str(), value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for FormParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = FormParams::new();
        for (key, value) in iter {
            params.set(key, value);
        }
        params
    }
}

/// One remote call described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmRequest {
    pub method: ApiMethod,
    pub format: WireFormat,
    pub module: String,
    pub url: String,
    pub params: FormParams,
    /// Present for calls that carry records (insert, update, convert).
    pub xml_data: Option<RequestDocument>,
}

impl CrmRequest {
    /// The complete form body: `params` followed by `xmlData` when a
    /// document is attached.
    pub fn form_body(&self) -> Result<FormParams, CrmError> {
        let mut body = self.params.clone();
        if let Some(document) = &self.xml_data {
            body.set(XML_DATA_PARAM, document.to_xml()?);
        }
        Ok(body)
    }
}

/// Host-supplied transport and session owner.
pub trait Connection {
    /// Open or validate the session. Called before every operation and must
    /// be idempotent. Fails with `CrmError::ConnectionError`.
    fn ensure_open(&mut self) -> Result<(), CrmError>;

    /// Form-encoded POST returning the raw reply body.
    fn call_form(&mut self, url: &str, params: &FormParams) -> Result<Vec<u8>, CrmError>;

    /// Form-encoded POST that also carries `document` (as `xmlData`).
    fn call_xml(
        &mut self,
        url: &str,
        params: &FormParams,
        document: &RequestDocument,
    ) -> Result<Vec<u8>, CrmError>;
}

impl<C: Connection + ?Sized> Connection for &mut C {
    fn ensure_open(&mut self) -> Result<(), CrmError> {
        (**self).ensure_open()
    }

    fn call_form(&mut self, url: &str, params: &FormParams) -> Result<Vec<u8>, CrmError> {
        (**self).call_form(url, params)
    }

    fn call_xml(
        &mut self,
        url: &str,
        params: &FormParams,
        document: &RequestDocument,
    ) -> Result<Vec<u8>, CrmError> {
        (**self).call_xml(url, params, document)
    }
}
