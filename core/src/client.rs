//! Stateless request builder and response parser for the CRM API.
//!
//! # Design
//! `CrmClient` holds only its base URL and service name and carries no
//! mutable state between calls. Each operation is split into a `build_*`
//! method that produces a `CrmRequest` and a `parse_*` method that consumes
//! the raw reply bytes. The module name is an explicit argument everywhere:
//! it selects both the URL and the JSON path the rows live under.

use crate::config::ClientConfig;
use crate::decode::{decode, decode_json};
use crate::encode::{encode, FIELD_TAG, OPTION_TAG};
use crate::error::CrmError;
use crate::http::{ApiMethod, CrmRequest, FormParams, WireFormat};
use crate::response::{
    check_xml_success, extract_converted_lead, extract_inserted_ids, ConvertedLead,
};
use crate::types::Record;

/// Module whose records `convert_lead` consumes.
pub const LEADS_MODULE: &str = "Leads";

/// Identifier field every lead carries.
pub const LEAD_ID_FIELD: &str = "LEADID";

/// Module name used as the root of the conversion option document.
const CONVERT_OPTIONS_MODULE: &str = "Potentials";

/// Column list used when the caller does not choose one.
pub fn default_select_columns(module: &str) -> String {
    format!("{module}(First Name,Last Name,Company)")
}

/// Synchronous, stateless client for the CRM API.
#[derive(Debug, Clone)]
pub struct CrmClient {
    base_url: String,
    service_name: String,
}

impl CrmClient {
    pub fn new(base_url: &str) -> Self {
        Self::from_config(&ClientConfig {
            base_url: base_url.to_string(),
            ..ClientConfig::default()
        })
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_name: config.service_name.clone(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn url(&self, format: WireFormat, module: &str, method: ApiMethod) -> String {
        format!("{}/{}/{module}/{}", self.base_url, format.as_str(), method.as_str())
    }

    fn request(
        &self,
        format: WireFormat,
        module: &str,
        method: ApiMethod,
        params: FormParams,
    ) -> CrmRequest {
        CrmRequest {
            method,
            format,
            module: module.to_string(),
            url: self.url(format, module, method),
            params,
            xml_data: None,
        }
    }

    /// Protocol flags every record-carrying write sends.
    fn write_defaults() -> FormParams {
        FormParams::new().with("newFormat", 1).with("duplicateCheck", 2)
    }

    fn select(module: &str, select_columns: Option<&str>) -> String {
        select_columns.map_or_else(|| default_select_columns(module), str::to_string)
    }

    pub fn build_insert_records(
        &self,
        module: &str,
        records: &[Record],
        extra: &FormParams,
    ) -> Result<CrmRequest, CrmError> {
        let document = encode(module, records, FIELD_TAG)?;
        let params = Self::write_defaults().merge(extra);
        let mut request = self.request(WireFormat::Xml, module, ApiMethod::InsertRecords, params);
        request.xml_data = Some(document);
        Ok(request)
    }

    pub fn build_update_record(
        &self,
        module: &str,
        id: &str,
        record: &Record,
        extra: &FormParams,
    ) -> Result<CrmRequest, CrmError> {
        let document = encode(module, std::slice::from_ref(record), FIELD_TAG)?;
        let params = Self::write_defaults().with("id", id).merge(extra);
        let mut request = self.request(WireFormat::Xml, module, ApiMethod::UpdateRecords, params);
        request.xml_data = Some(document);
        Ok(request)
    }

    pub fn build_delete_record(&self, module: &str, id: &str, extra: &FormParams) -> CrmRequest {
        let params = FormParams::new().with("id", id).merge(extra);
        self.request(WireFormat::Xml, module, ApiMethod::DeleteRecords, params)
    }

    pub fn build_get_record_by_id(&self, module: &str, id: &str) -> CrmRequest {
        let params = FormParams::new().with("id", id).with("newFormat", 2);
        self.request(WireFormat::Json, module, ApiMethod::GetRecordById, params)
    }

    /// `filters` may override `selectColumns` and `newFormat` as well as add
    /// paging and sorting parameters.
    pub fn build_get_records(
        &self,
        module: &str,
        select_columns: Option<&str>,
        filters: &FormParams,
    ) -> CrmRequest {
        let params = FormParams::new()
            .with("selectColumns", Self::select(module, select_columns))
            .with("newFormat", 2)
            .merge(filters);
        self.request(WireFormat::Json, module, ApiMethod::GetRecords, params)
    }

    /// Search with free-form criteria such as `(Last Name:Smith)`.
    pub fn build_search_records(
        &self,
        module: &str,
        criteria: &str,
        select_columns: Option<&str>,
    ) -> CrmRequest {
        let params = FormParams::new()
            .with("criteria", criteria)
            .with("selectColumns", Self::select(module, select_columns))
            .with("newFormat", 2);
        self.request(WireFormat::Json, module, ApiMethod::SearchRecords, params)
    }

    /// Search with a condition such as `(Email|=|a@b.test)`.
    pub fn build_get_search_records(
        &self,
        module: &str,
        search_condition: &str,
        select_columns: Option<&str>,
    ) -> CrmRequest {
        let params = FormParams::new()
            .with("selectColumns", Self::select(module, select_columns))
            .with("searchCondition", search_condition)
            .with("newFormat", 2);
        self.request(WireFormat::Json, module, ApiMethod::GetSearchRecords, params)
    }

    /// Search a predefined column for an exact value.
    pub fn build_search_records_by_pdc(
        &self,
        module: &str,
        search_column: &str,
        search_value: &str,
        select_columns: Option<&str>,
    ) -> CrmRequest {
        let params = FormParams::new()
            .with("selectColumns", Self::select(module, select_columns))
            .with("searchColumn", search_column)
            .with("searchValue", search_value)
            .with("newFormat", 2);
        self.request(WireFormat::Json, module, ApiMethod::GetSearchRecordsByPdc, params)
    }

    /// Conversion request for one lead. The option document's first row holds
    /// the fixed control options; `extra_data`, when given, is sent as a
    /// second row rather than merged into the first.
    pub fn build_convert_lead(
        &self,
        lead: &Record,
        extra_data: Option<&Record>,
        extra: &FormParams,
    ) -> Result<CrmRequest, CrmError> {
        let lead_id = lead.get_text(LEAD_ID_FIELD).ok_or_else(|| CrmError::MissingField {
            field: LEAD_ID_FIELD.to_string(),
        })?;

        let options = Record::new()
            .with("createPotential", false)
            .with("assignTo", self.service_name.as_str())
            .with("notifyLeadOwner", false)
            .with("notifyNewEntityOwner", false);
        let mut rows = vec![options];
        if let Some(data) = extra_data.filter(|data| !data.is_empty()) {
            rows.push(data.clone());
        }
        let document = encode(CONVERT_OPTIONS_MODULE, &rows, OPTION_TAG)?;

        let params = Self::write_defaults().with("leadId", lead_id).merge(extra);
        let mut request =
            self.request(WireFormat::Xml, LEADS_MODULE, ApiMethod::ConvertLead, params);
        request.xml_data = Some(document);
        Ok(request)
    }

    pub fn parse_insert_records(&self, body: &[u8]) -> Result<Vec<String>, CrmError> {
        extract_inserted_ids(body)
    }

    pub fn parse_update_record(&self, body: &[u8]) -> Result<(), CrmError> {
        check_xml_success(body)
    }

    pub fn parse_delete_record(&self, body: &[u8]) -> Result<(), CrmError> {
        check_xml_success(body)
    }

    /// Rows of a getRecords or search reply.
    pub fn parse_records(&self, module: &str, body: &[u8]) -> Result<Vec<Record>, CrmError> {
        decode(&decode_json(body)?, module)
    }

    /// `None` when the service reports no matching record.
    pub fn parse_get_record_by_id(
        &self,
        module: &str,
        body: &[u8],
    ) -> Result<Option<Record>, CrmError> {
        Ok(self.parse_records(module, body)?.into_iter().next())
    }

    pub fn parse_convert_lead(&self, body: &[u8]) -> Result<ConvertedLead, CrmError> {
        extract_converted_lead(body)
    }
}

impl Default for CrmClient {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}
