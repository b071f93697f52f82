//! Start cloud exports and locate the finished archives.
//!

use std::sync::LazyLock;

use regex::Regex;
use reqwest::{StatusCode, blocking::RequestBuilder};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{context::Context, service::Service, session::Session};

const CONFLUENCE_PROGRESS: &str = "/wiki/rest/obm/1.0/getprogress";
const JIRA_LAST_TASK_ID: &str = "/rest/backup/1/export/lastTaskId";
const JIRA_PROGRESS: &str = "/rest/backup/1/export/getProgress";

static FILE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""fileName"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("Invalid regex")
});
static RESULT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""result"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("Invalid regex")
});

/// The raw response to a start export request.
#[derive(Debug, Clone)]
pub struct TriggerResponse {
    /// The service the export was started for.
    pub service: Service,
    /// The response status.
    pub status: StatusCode,
    /// The response body.
    pub body: String,
}

/// Start a cloud export, including attachments, for every service.
///
/// The responses are logged and returned as is, job acceptance is not checked.
pub fn trigger_exports(session: &Session) -> Result<Vec<TriggerResponse>, TriggerError> {
    let body = json!({ "cbAttachments": "true", "exportToCloud": "true" });

    let mut responses = Vec::with_capacity(Service::ALL.len());
    for service in Service::ALL {
        let context = Context::new("Start Export").with_service(service);

        let response = session
            .post(service.run_backup_endpoint())
            .json(&body)
            .send()
            .map_err(|e| TriggerError::Request(service, e))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| TriggerError::Request(service, e))?;

        info!("{context}{status}\n{body}");

        responses.push(TriggerResponse {
            service,
            status,
            body,
        });
    }

    Ok(responses)
}

/// The state of an export as reported by a progress endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportProgress {
    /// The export is available at this server relative path.
    Found(String),

    /// The response is well formed but has no path yet.
    NotReady,

    /// The response is not a progress report.
    Malformed,
}

/// Extract the export path from a service's progress response body.
pub fn parse_progress(body: &str, service: Service) -> ExportProgress {
    let pattern = match service {
        Service::Confluence => &*FILE_NAME_PATTERN,
        Service::Jira => &*RESULT_PATTERN,
    };

    if let Some(path) = pattern.captures(body).and_then(|captures| captures.get(1)) {
        return ExportProgress::Found(path.as_str().to_string());
    }

    match serde_json::from_str::<Map<String, Value>>(body) {
        Ok(_) => ExportProgress::NotReady,
        Err(_) => ExportProgress::Malformed,
    }
}

/// The server relative paths of the latest exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupDescriptor {
    /// The Confluence export path.
    pub confluence: String,
    /// The Jira export path.
    pub jira: String,
}

impl BackupDescriptor {
    /// The paths in processing order.
    pub fn paths(&self) -> [&str; 2] {
        [&self.confluence, &self.jira]
    }
}

/// Locate the latest export of every service.
///
/// Fails if any export can't be located, nothing is downloaded in that case.
pub fn locate_exports(session: &Session) -> Result<BackupDescriptor, LocateError> {
    let confluence = locate_export(session, Service::Confluence)?;
    let jira = locate_export(session, Service::Jira)?;

    Ok(BackupDescriptor { confluence, jira })
}

/// Locate the latest export of a service.
pub fn locate_export(session: &Session, service: Service) -> Result<String, LocateError> {
    let context = Context::new("Locate Export").with_service(service);

    let body = match service {
        Service::Confluence => fetch_text(service, session.get(CONFLUENCE_PROGRESS))?,
        Service::Jira => {
            let task_id = fetch_text(service, session.get(JIRA_LAST_TASK_ID))?;
            let task_id = task_id.trim().trim_matches('"').to_string();

            if task_id.is_empty() {
                error!("{context}No export task id returned");
                return Err(LocateError::NoTaskId);
            }

            fetch_text(
                service,
                session
                    .get(JIRA_PROGRESS)
                    .query(&[("taskId", task_id.as_str())]),
            )?
        }
    };

    match parse_progress(&body, service) {
        ExportProgress::Found(path) => {
            info!("{context}{}", service.download_url(session.base_url(), &path));
            Ok(path)
        }
        ExportProgress::NotReady => {
            warn!(
                "{context}Export is not ready, no `{}` yet\n{body}",
                service.progress_field()
            );
            Err(LocateError::NotReady { service, body })
        }
        ExportProgress::Malformed => {
            error!("{context}Unexpected progress response\n{body}");
            Err(LocateError::Malformed { service, body })
        }
    }
}

fn fetch_text(service: Service, request: RequestBuilder) -> Result<String, LocateError> {
    let response = request
        .send()
        .map_err(|e| LocateError::Request(service, e))?;

    let status = response.status();
    let body = response
        .text()
        .map_err(|e| LocateError::Request(service, e))?;

    if !status.is_success() {
        error!(
            "{}{status}\n{body}",
            Context::new("Locate Export").with_service(service)
        );
        return Err(LocateError::Status {
            service,
            status,
            body,
        });
    }

    Ok(body)
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Failed to start the {0} export: {1}")]
    Request(Service, #[source] reqwest::Error),
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("Failed to request the {0} export progress: {1}")]
    Request(Service, #[source] reqwest::Error),

    #[error("The {service} export progress request returned {status}")]
    Status {
        service: Service,
        status: StatusCode,
        body: String,
    },

    #[error("No Jira export task id was returned")]
    NoTaskId,

    #[error("The {service} export has not finished")]
    NotReady { service: Service, body: String },

    #[error("The {service} export progress response was not recognised")]
    Malformed { service: Service, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confluence_file_name() {
        let body = r#"{"size":0,"currentStatus":"Archiving is complete.","alternativePercentage":"100%","concurrentBackupInProgress":false,"time":0,"isOutdated":false,"fileName":"temp/filestore/1e2f3a4b-5c6d.zip"}"#;

        assert_eq!(
            parse_progress(body, Service::Confluence),
            ExportProgress::Found("temp/filestore/1e2f3a4b-5c6d.zip".to_string())
        );
    }

    #[test]
    fn jira_result() {
        let body = r#"{"status":"Success","description":"Cloud Export task","message":"Completed export","result":"export/download/?fileId=a1b2c3","progress":100}"#;

        assert_eq!(
            parse_progress(body, Service::Jira),
            ExportProgress::Found("export/download/?fileId=a1b2c3".to_string())
        );
    }

    #[test]
    fn whitespace_around_colon() {
        let body = "{ \"result\" : \"export/download/?fileId=1\" }";

        assert_eq!(
            parse_progress(body, Service::Jira),
            ExportProgress::Found("export/download/?fileId=1".to_string())
        );
    }

    #[test]
    fn escaped_quote_kept_verbatim() {
        let body = r#"{"fileName":"temp/a\"b.zip"}"#;

        assert_eq!(
            parse_progress(body, Service::Confluence),
            ExportProgress::Found(r#"temp/a\"b.zip"#.to_string())
        );
    }

    #[test]
    fn in_progress_is_not_ready() {
        let body = r#"{"status":"InProgress","description":"Cloud Export task","message":"Preparing","progress":42}"#;
        assert_eq!(parse_progress(body, Service::Jira), ExportProgress::NotReady);

        let body = r#"{"size":0,"currentStatus":"Backing up attachments","isOutdated":false}"#;
        assert_eq!(parse_progress(body, Service::Confluence), ExportProgress::NotReady);

        let body = r#"{"status":"Success","result":null}"#;
        assert_eq!(parse_progress(body, Service::Jira), ExportProgress::NotReady);
    }

    #[test]
    fn non_json_is_malformed() {
        let body = "<html><body>Unauthorized</body></html>";
        assert_eq!(parse_progress(body, Service::Confluence), ExportProgress::Malformed);

        assert_eq!(parse_progress("", Service::Jira), ExportProgress::Malformed);
        assert_eq!(parse_progress("[1, 2]", Service::Jira), ExportProgress::Malformed);
    }

    #[test]
    fn other_services_field_is_not_ready() {
        let body = r#"{"status":"Success","fileName":"temp/a.zip"}"#;
        assert_eq!(parse_progress(body, Service::Jira), ExportProgress::NotReady);

        let body = r#"{"result":"export/download/?fileId=1"}"#;
        assert_eq!(
            parse_progress(body, Service::Confluence),
            ExportProgress::NotReady
        );
    }

    #[test]
    fn descriptor_order() {
        let descriptor = BackupDescriptor {
            confluence: "temp/a.zip".to_string(),
            jira: "export/download/?fileId=b".to_string(),
        };

        assert_eq!(
            descriptor.paths(),
            ["temp/a.zip", "export/download/?fileId=b"]
        );
    }
}
