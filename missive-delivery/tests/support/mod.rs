//! Collaborator fakes for pipeline tests
#![allow(dead_code)] // Test utility module - not all helpers used in every test

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
};

use async_trait::async_trait;
use missive_delivery::{DnsError, ExternalServiceError, MailServer, QuotaSource, Resolver, SendQuota, Transport};
use parking_lot::Mutex;

/// A DNS zone built up per test.
///
/// Domains without an MX entry do not exist. Every listed host resolves to
/// one address whose PTR name resolves back to it.
#[derive(Debug, Default)]
pub struct Zone {
    mx: HashMap<String, Vec<MailServer>>,
    hosts: HashMap<String, IpAddr>,
    ptr: HashMap<IpAddr, String>,
}

impl Zone {
    pub fn new() -> Self {
        Self::default()
    }

    /// `domain` accepts mail at `host`, which has working forward and
    /// reverse DNS.
    #[must_use]
    pub fn with_mail_domain(mut self, domain: &str, host: &str) -> Self {
        let last = u8::try_from(self.hosts.len() + 1).unwrap_or(u8::MAX);
        let ip = IpAddr::V4(Ipv4Addr::new(198, 51, 100, last));
        let ptr = format!("ptr{last}.hosting.test");

        self.mx
            .entry(domain.to_string())
            .or_default()
            .push(MailServer::new(host, 10));
        self.hosts.insert(host.to_string(), ip);
        self.hosts.insert(ptr.clone(), ip);
        self.ptr.insert(ip, ptr);
        self
    }

    /// `domain` exists but its only mail host has no address.
    #[must_use]
    pub fn with_broken_domain(mut self, domain: &str) -> Self {
        self.mx.insert(
            domain.to_string(),
            vec![MailServer::new(format!("gone.{domain}"), 10)],
        );
        self
    }
}

#[async_trait]
impl Resolver for Zone {
    async fn mail_servers(&self, domain: &str) -> Result<Arc<Vec<MailServer>>, DnsError> {
        self.mx
            .get(domain)
            .map(|servers| Arc::new(servers.clone()))
            .ok_or_else(|| DnsError::DomainNotFound(domain.to_string()))
    }

    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
        self.hosts
            .get(host)
            .map(|ip| vec![*ip])
            .ok_or_else(|| DnsError::NoRecords {
                name: host.to_string(),
                record: "A/AAAA",
            })
    }

    async fn reverse_lookup(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        self.ptr
            .get(&ip)
            .map(|name| vec![name.clone()])
            .ok_or_else(|| DnsError::NoRecords {
                name: ip.to_string(),
                record: "PTR",
            })
    }
}

/// A message handed to the [`Outbox`].
#[derive(Debug, Clone)]
pub struct Sent {
    pub to: String,
    pub from: String,
    pub raw: Vec<u8>,
}

/// Transport that keeps every message in memory.
#[derive(Debug, Default)]
pub struct Outbox {
    sent: Mutex<Vec<Sent>>,
}

impl Outbox {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().iter().map(|s| s.to.clone()).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Transport for Outbox {
    async fn send(&self, to: &str, from: &str, raw: &[u8]) -> Result<String, ExternalServiceError> {
        let mut sent = self.sent.lock();
        sent.push(Sent {
            to: to.to_string(),
            from: from.to_string(),
            raw: raw.to_vec(),
        });
        Ok(format!("outbox-{}", sent.len()))
    }
}

/// Quota that can be changed between runs.
#[derive(Debug)]
pub struct AdjustableQuota(Mutex<SendQuota>);

impl AdjustableQuota {
    pub fn new(max_send_rate: f64, max_24_hour_send: u64) -> Self {
        Self(Mutex::new(SendQuota {
            max_send_rate,
            max_24_hour_send,
            sent_last_24_hours: 0,
        }))
    }

    pub fn set_sent(&self, sent_last_24_hours: u64) {
        self.0.lock().sent_last_24_hours = sent_last_24_hours;
    }
}

#[async_trait]
impl QuotaSource for AdjustableQuota {
    async fn send_quota(&self) -> Result<SendQuota, ExternalServiceError> {
        Ok(*self.0.lock())
    }
}
