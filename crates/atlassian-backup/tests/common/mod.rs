//! # common
//!

#![allow(dead_code)]

use atlassian_backup::{
    config::{AtlassianConfig, StorageConfig},
    session::Session,
    storage::S3Store,
};
use chrono::{NaiveDate, NaiveDateTime};
use tokio::runtime::{Builder, Runtime};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

pub const EMAIL: &str = "backup@example.com";
pub const API_TOKEN: &str = "api-token";
pub const CONFLUENCE_PATH: &str = "temp/filestore/5b1c2d3e.zip";
pub const JIRA_FILE_ID: &str = "a1b2c3d4";
pub const JIRA_TASK_ID: &str = "10042";
pub const BUCKET: &str = "backups";

/// The Jira export path for `JIRA_FILE_ID`.
pub fn jira_path() -> String {
    format!("export/download/?fileId={JIRA_FILE_ID}")
}

/// 2024-01-22 07:25:22
pub fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 22)
        .unwrap()
        .and_hms_opt(7, 25, 22)
        .unwrap()
}

/// A mock HTTP server standing in for the Atlassian site or the bucket.
///
/// The code under test is blocking, so mocks are mounted through a runtime owned here and the
/// session is used from the test thread.
pub struct MockSite {
    pub server: MockServer,
    runtime: Runtime,
}

impl MockSite {
    pub fn start() -> Self {
        shared::test::init_test_logger();

        let runtime = Builder::new_current_thread().enable_all().build().unwrap();
        let server = runtime.block_on(MockServer::start());

        Self { server, runtime }
    }

    pub fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    pub fn session(&self) -> Session {
        Session::new(&AtlassianConfig {
            base_url: self.server.uri(),
            email: EMAIL.to_string(),
            api_token: API_TOKEN.to_string(),
            timeout_seconds: Some(10),
        })
        .unwrap()
    }

    /// An S3 store for `BUCKET` addressed by path on this server.
    pub fn s3_store(&self) -> S3Store {
        S3Store::new(&StorageConfig {
            bucket: BUCKET.to_string(),
            access_key: "access-key".to_string(),
            secret_key: "secret-key".to_string(),
            endpoint: Some(self.server.uri()),
            force_path_style: true,
            ..StorageConfig::default()
        })
        .unwrap()
    }

    /// Respond to the Confluence progress request with `body`.
    pub fn confluence_progress(&self, body: &str) {
        self.mount(
            Mock::given(method("GET"))
                .and(path("/wiki/rest/obm/1.0/getprogress"))
                .respond_with(ResponseTemplate::new(200).set_body_string(body)),
        );
    }

    /// Respond to the Jira task id and progress requests with `body`.
    pub fn jira_progress(&self, body: &str) {
        self.mount(
            Mock::given(method("GET"))
                .and(path("/rest/backup/1/export/lastTaskId"))
                .respond_with(ResponseTemplate::new(200).set_body_string(JIRA_TASK_ID)),
        );
        self.mount(
            Mock::given(method("GET"))
                .and(path("/rest/backup/1/export/getProgress"))
                .and(query_param("taskId", JIRA_TASK_ID))
                .respond_with(ResponseTemplate::new(200).set_body_string(body)),
        );
    }

    /// Both exports are finished.
    pub fn finished_exports(&self) {
        self.confluence_progress(&format!(
            r#"{{"size":0,"currentStatus":"Archiving is complete.","alternativePercentage":"100%","isOutdated":false,"fileName":"{CONFLUENCE_PATH}"}}"#
        ));
        self.jira_progress(&format!(
            r#"{{"status":"Success","description":"Cloud Export task","message":"Completed export","result":"{}","progress":100}}"#,
            jira_path()
        ));
    }

    /// Serve the Confluence archive, expecting `calls` requests.
    pub fn confluence_archive(&self, body: Vec<u8>, calls: u64) {
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!("/wiki/download/{CONFLUENCE_PATH}")))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
                .expect(calls),
        );
    }

    /// Serve the Jira archive, expecting `calls` requests.
    pub fn jira_archive(&self, body: Vec<u8>, calls: u64) {
        self.mount(
            Mock::given(method("GET"))
                .and(path("/plugins/servlet/export/download/"))
                .and(query_param("fileId", JIRA_FILE_ID))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
                .expect(calls),
        );
    }
}
