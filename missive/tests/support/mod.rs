//! Shared fixtures for end-to-end tests
#![allow(dead_code)] // Test utility module - not all helpers used in every test

use std::{
    net::{IpAddr, Ipv4Addr},
    path::Path,
    sync::Arc,
};

use async_trait::async_trait;
use missive_delivery::{DnsError, MailServer, Resolver};

/// Resolves every domain to a single confirming mail host, except those
/// ending in `.invalid-mx`.
#[derive(Debug)]
pub struct StaticDns;

#[async_trait]
impl Resolver for StaticDns {
    async fn mail_servers(&self, domain: &str) -> Result<Arc<Vec<MailServer>>, DnsError> {
        if domain.ends_with(".invalid-mx") {
            return Err(DnsError::NoRecords {
                name: domain.to_string(),
                record: "MX",
            });
        }
        Ok(Arc::new(vec![MailServer::new(format!("mx.{domain}"), 10)]))
    }

    async fn lookup_ip(&self, _host: &str) -> Result<Vec<IpAddr>, DnsError> {
        Ok(vec![IpAddr::V4(Ipv4Addr::new(203, 0, 113, 25))])
    }

    async fn reverse_lookup(&self, _ip: IpAddr) -> Result<Vec<String>, DnsError> {
        Ok(vec!["out.mailhost.test".to_string()])
    }
}

/// Write a configuration file rooted at `dir` and return its path.
pub fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("missive.config.ron");
    let content = format!(
        r#"(
    sender: "Acme News <news@acme.io>",
    api_base_url: "https://api.acme.io/v1",
    unsubscribe_email: "unsubscribe@acme.io",
    subscribers: Some("{subscribers}"),
    suppressions: Some("{suppressions}"),
    throttle: (max_bulk_capacity: 1.0),
    quota: (max_send_rate: 50.0, max_24_hour_send: 10, sent_last_24_hours: 0),
    outbox: "{outbox}",
)"#,
        subscribers = dir.join("subscribers.json").display(),
        suppressions = dir.join("suppressions.json").display(),
        outbox = dir.join("outbox").display(),
    );
    std::fs::write(&path, content).unwrap_or_else(|e| panic!("write config: {e}"));
    path
}
