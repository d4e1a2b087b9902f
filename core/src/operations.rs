//! Public operation surface: builds a request with `CrmClient`, runs it
//! through the host's `Connection`, and parses the reply.
//!
//! Every operation opens the session first and performs its round-trips
//! sequentially. Nothing is retried.

use tracing::{debug, warn};

use crate::client::CrmClient;
use crate::error::CrmError;
use crate::http::{Connection, CrmRequest, FormParams};
use crate::response::ConvertedLead;
use crate::types::Record;

pub struct RecordOperations<C> {
    client: CrmClient,
    connection: C,
}

impl<C: Connection> RecordOperations<C> {
    pub fn new(client: CrmClient, connection: C) -> Self {
        Self { client, connection }
    }

    pub fn client(&self) -> &CrmClient {
        &self.client
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn into_connection(self) -> C {
        self.connection
    }

    fn send(&mut self, request: &CrmRequest) -> Result<Vec<u8>, CrmError> {
        debug!(
            module = %request.module,
            method = %request.method,
            url = %request.url,
            "calling CRM"
        );
        let body = match &request.xml_data {
            Some(document) => self.connection.call_xml(&request.url, &request.params, document)?,
            None => self.connection.call_form(&request.url, &request.params)?,
        };
        debug!(method = %request.method, bytes = body.len(), "CRM replied");
        Ok(body)
    }

    /// Insert `records` and return the ids assigned to them.
    pub fn insert_records(
        &mut self,
        module: &str,
        records: &[Record],
        extra: &FormParams,
    ) -> Result<Vec<String>, CrmError> {
        self.connection.ensure_open()?;
        let request = self.client.build_insert_records(module, records, extra)?;
        let body = self.send(&request)?;
        self.client.parse_insert_records(&body).inspect_err(log_remote)
    }

    pub fn update_record(
        &mut self,
        module: &str,
        id: &str,
        record: &Record,
        extra: &FormParams,
    ) -> Result<(), CrmError> {
        self.connection.ensure_open()?;
        let request = self.client.build_update_record(module, id, record, extra)?;
        let body = self.send(&request)?;
        self.client.parse_update_record(&body).inspect_err(log_remote)
    }

    pub fn delete_record(
        &mut self,
        module: &str,
        id: &str,
        extra: &FormParams,
    ) -> Result<(), CrmError> {
        self.connection.ensure_open()?;
        let request = self.client.build_delete_record(module, id, extra);
        let body = self.send(&request)?;
        self.client.parse_delete_record(&body).inspect_err(log_remote)
    }

    /// `Ok(None)` when no record has `id`.
    pub fn get_record_by_id(&mut self, module: &str, id: &str) -> Result<Option<Record>, CrmError> {
        self.connection.ensure_open()?;
        let request = self.client.build_get_record_by_id(module, id);
        let body = self.send(&request)?;
        self.client.parse_get_record_by_id(module, &body).inspect_err(log_remote)
    }

    pub fn get_records(
        &mut self,
        module: &str,
        select_columns: Option<&str>,
        filters: &FormParams,
    ) -> Result<Vec<Record>, CrmError> {
        self.connection.ensure_open()?;
        let request = self.client.build_get_records(module, select_columns, filters);
        self.fetch(module, &request)
    }

    pub fn search_records(
        &mut self,
        module: &str,
        criteria: &str,
        select_columns: Option<&str>,
    ) -> Result<Vec<Record>, CrmError> {
        self.connection.ensure_open()?;
        let request = self.client.build_search_records(module, criteria, select_columns);
        self.fetch(module, &request)
    }

    pub fn get_search_records(
        &mut self,
        module: &str,
        search_condition: &str,
        select_columns: Option<&str>,
    ) -> Result<Vec<Record>, CrmError> {
        self.connection.ensure_open()?;
        let request =
            self.client
                .build_get_search_records(module, search_condition, select_columns);
        self.fetch(module, &request)
    }

    pub fn search_records_by_pdc(
        &mut self,
        module: &str,
        search_column: &str,
        search_value: &str,
        select_columns: Option<&str>,
    ) -> Result<Vec<Record>, CrmError> {
        self.connection.ensure_open()?;
        let request = self
            .client
            .build_search_records_by_pdc(module, search_column, search_value, select_columns);
        self.fetch(module, &request)
    }

    /// Convert each lead in turn. The result has one entry per input lead,
    /// in input order. Every lead must carry `LEADID`; that is checked for
    /// all leads before the first call.
    pub fn convert_lead(
        &mut self,
        leads: &[Record],
        extra_data: Option<&Record>,
        extra: &FormParams,
    ) -> Result<Vec<ConvertedLead>, CrmError> {
        self.connection.ensure_open()?;
        let requests = leads
            .iter()
            .map(|lead| self.client.build_convert_lead(lead, extra_data, extra))
            .collect::<Result<Vec<_>, _>>()?;

        let mut converted = Vec::with_capacity(requests.len());
        for request in &requests {
            let body = self.send(request)?;
            converted.push(self.client.parse_convert_lead(&body).inspect_err(log_remote)?);
        }
        Ok(converted)
    }

    fn fetch(&mut self, module: &str, request: &CrmRequest) -> Result<Vec<Record>, CrmError> {
        let body = self.send(request)?;
        let records = self.client.parse_records(module, &body).inspect_err(log_remote)?;
        debug!(module, count = records.len(), "decoded records");
        Ok(records)
    }
}

fn log_remote(err: &CrmError) {
    if let CrmError::RemoteError { code, message } = err {
        warn!(%code, %message, "CRM rejected the call");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::RequestDocument;
    use crate::http::XML_DATA_PARAM;

    /// Replays canned replies and records what was sent.
    #[derive(Default)]
    struct ScriptedConnection {
        replies: Vec<Vec<u8>>,
        opened: usize,
        calls: Vec<(String, FormParams)>,
        fail_open: bool,
    }

    impl ScriptedConnection {
        fn replying(replies: &[&str]) -> Self {
            Self {
                replies: replies.iter().rev().map(|r| r.as_bytes().to_vec()).collect(),
                ..Self::default()
            }
        }
    }

    impl Connection for ScriptedConnection {
        fn ensure_open(&mut self) -> Result<(), CrmError> {
            if self.fail_open {
                return Err(CrmError::ConnectionError("invalid auth token".to_string()));
            }
            self.opened += 1;
            Ok(())
        }

        fn call_form(&mut self, url: &str, params: &FormParams) -> Result<Vec<u8>, CrmError> {
            self.calls.push((url.to_string(), params.clone()));
            self.replies
                .pop()
                .ok_or_else(|| CrmError::Transport("no scripted reply".to_string()))
        }

        fn call_xml(
            &mut self,
            url: &str,
            params: &FormParams,
            document: &RequestDocument,
        ) -> Result<Vec<u8>, CrmError> {
            let params = params.clone().with(XML_DATA_PARAM, document.to_xml()?);
            self.call_form(url, &params)
        }
    }

    fn ops(replies: &[&str]) -> RecordOperations<ScriptedConnection> {
        RecordOperations::new(
            CrmClient::new("http://crm.test/crm/private"),
            ScriptedConnection::replying(replies),
        )
    }

    #[test]
    fn insert_returns_ids_and_sends_document() {
        let mut ops = ops(&[
            concat!(
                r#"<response><result><message>Record(s) added successfully</message>"#,
                r#"<recorddetail><FL val="Id">11</FL></recorddetail></result></response>"#
            ),
        ]);
        let records = [Record::new().with("Last Name", "Smith")];
        let ids = ops.insert_records("Leads", &records, &FormParams::new()).unwrap();
        assert_eq!(ids, vec!["11".to_string()]);

        let conn = ops.connection();
        assert_eq!(conn.opened, 1);
        let (url, params) = &conn.calls[0];
        assert_eq!(url, "http://crm.test/crm/private/xml/Leads/insertRecords");
        assert_eq!(
            params.get(XML_DATA_PARAM),
            Some(r#"<Leads><row no="1"><FL val="Last Name">Smith</FL></row></Leads>"#)
        );
    }

    #[test]
    fn get_record_by_id_absent_on_nodata() {
        let mut ops = ops(&[
            r#"{"response":{"nodata":{"code":"4422","message":"There is no data to show"}}}"#,
        ]);
        assert_eq!(ops.get_record_by_id("Leads", "404").unwrap(), None);
    }

    #[test]
    fn update_surfaces_remote_error() {
        let mut ops = ops(&[concat!(
            r#"<response><error><code>4401</code>"#,
            r#"<message>Unable to populate data</message></error></response>"#
        )]);
        let err = ops
            .update_record("Leads", "1", &Record::new().with("Email", "x"), &FormParams::new())
            .unwrap_err();
        assert!(matches!(err, CrmError::RemoteError { ref code, .. } if code == "4401"));
    }

    #[test]
    fn failed_open_makes_no_call() {
        let mut ops = ops(&[]);
        ops.connection.fail_open = true;
        let err = ops.delete_record("Leads", "1", &FormParams::new()).unwrap_err();
        assert!(matches!(err, CrmError::ConnectionError(_)));
        assert!(ops.connection().calls.is_empty());
    }

    #[test]
    fn convert_lead_returns_one_result_per_lead_in_order() {
        let mut ops = ops(&[
            r#"<success><Contact param="id">c1</Contact></success>"#,
            r#"<success><Contact param="id">c2</Contact></success>"#,
            r#"<success><Contact param="id">c3</Contact></success>"#,
        ]);
        let leads: Vec<Record> = ["1", "2", "3"]
            .iter()
            .map(|id| Record::new().with("LEADID", *id))
            .collect();
        let converted = ops.convert_lead(&leads, None, &FormParams::new()).unwrap();
        let contacts: Vec<_> = converted.iter().map(|c| c.contact_id.as_deref().unwrap()).collect();
        assert_eq!(contacts, vec!["c1", "c2", "c3"]);

        let lead_ids: Vec<_> = ops
            .connection()
            .calls
            .iter()
            .map(|(_, p)| p.get("leadId").unwrap())
            .collect();
        assert_eq!(lead_ids, vec!["1", "2", "3"]);
        assert_eq!(ops.connection().opened, 1);
    }

    #[test]
    fn convert_lead_validates_every_lead_before_calling() {
        let mut ops = ops(&[r#"<success><Contact param="id">c1</Contact></success>"#]);
        let leads = vec![
            Record::new().with("LEADID", "1"),
            Record::new().with("Last Name", "No id"),
        ];
        let err = ops.convert_lead(&leads, None, &FormParams::new()).unwrap_err();
        assert!(matches!(err, CrmError::MissingField { .. }));
        assert!(ops.connection().calls.is_empty());
    }

    #[test]
    fn search_by_pdc_decodes_rows() {
        let mut ops = ops(&[
            concat!(
                r#"{"response":{"result":{"Contacts":{"row":["#,
                r#"{"no":"1","FL":[{"val":"CONTACTID","content":"5"}]},"#,
                r#"{"no":"2","FL":[{"val":"CONTACTID","content":"6"}]}]}}}}"#
            ),
        ]);
        let records = ops.search_records_by_pdc("Contacts", "email", "a@b.test", None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get_text("CONTACTID"), Some("6"));
        assert_eq!(
            ops.connection().calls[0].0,
            "http://crm.test/crm/private/json/Contacts/getSearchRecordsByPDC"
        );
    }

    #[test]
    fn transport_failure_propagates() {
        let mut ops = ops(&[]);
        let err = ops.get_records("Leads", None, &FormParams::new()).unwrap_err();
        assert!(matches!(err, CrmError::Transport(_)));
    }
}
