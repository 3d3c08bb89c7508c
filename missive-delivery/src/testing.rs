//! Collaborator fakes shared by unit tests.

use std::{
    collections::HashSet,
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    DnsError, ExternalServiceError, MailServer, QuotaSource, Resolver, SendQuota, Transport,
    roster::{LifecycleError, SubscriberLifecycle},
};

const MAIL_HOST_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

/// Every domain has one MX host whose reverse DNS confirms, except the
/// domains listed as dead, which do not exist.
#[derive(Debug, Default)]
pub struct ConfirmingResolver {
    dead: HashSet<String>,
}

impl ConfirmingResolver {
    pub fn with_dead(domains: &[&str]) -> Self {
        Self {
            dead: domains.iter().map(ToString::to_string).collect(),
        }
    }
}

#[async_trait]
impl Resolver for ConfirmingResolver {
    async fn mail_servers(&self, domain: &str) -> Result<Arc<Vec<MailServer>>, DnsError> {
        if self.dead.contains(domain) {
            return Err(DnsError::DomainNotFound(domain.to_string()));
        }
        Ok(Arc::new(vec![MailServer::new(format!("mx.{domain}"), 10)]))
    }

    async fn lookup_ip(&self, _host: &str) -> Result<Vec<IpAddr>, DnsError> {
        Ok(vec![MAIL_HOST_IP])
    }

    async fn reverse_lookup(&self, _ip: IpAddr) -> Result<Vec<String>, DnsError> {
        Ok(vec!["mail.hosting.test".to_string()])
    }
}

/// A transport that records each message and fails for chosen recipients.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(String, String, Vec<u8>)>>,
    pub failing: HashSet<String>,
}

impl RecordingTransport {
    pub fn failing_for(recipients: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: recipients.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(to, _, _)| to.clone()).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, to: &str, from: &str, raw: &[u8]) -> Result<String, ExternalServiceError> {
        if self.failing.contains(to) {
            return Err(ExternalServiceError::Transport(format!("rejected {to}")));
        }

        let mut sent = self.sent.lock();
        sent.push((to.to_string(), from.to_string(), raw.to_vec()));
        Ok(format!("msg-{}", sent.len()))
    }
}

/// Always reports the same quota.
#[derive(Debug)]
pub struct FixedQuota(pub SendQuota);

impl FixedQuota {
    pub fn new(max_send_rate: f64, max_24_hour_send: u64, sent_last_24_hours: u64) -> Self {
        Self(SendQuota {
            max_send_rate,
            max_24_hour_send,
            sent_last_24_hours,
        })
    }
}

#[async_trait]
impl QuotaSource for FixedQuota {
    async fn send_quota(&self) -> Result<SendQuota, ExternalServiceError> {
        Ok(self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleCall {
    Remove { email: String, reason: String },
    Restore { email: String },
}

/// Records lifecycle calls, failing for chosen addresses.
#[derive(Debug, Default)]
pub struct RecordingLifecycle {
    pub calls: Mutex<Vec<LifecycleCall>>,
    pub failing: HashSet<String>,
}

impl RecordingLifecycle {
    pub fn failing_for(emails: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: emails.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn calls(&self) -> Vec<LifecycleCall> {
        self.calls.lock().clone()
    }

    fn check(&self, email: &str) -> Result<(), LifecycleError> {
        if self.failing.contains(email) {
            return Err(LifecycleError::External(ExternalServiceError::Store(
                missive_store::StoreError::Backend("throttled".to_string()),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriberLifecycle for RecordingLifecycle {
    async fn remove(&self, email: &str, reason: &str) -> Result<(), LifecycleError> {
        self.calls.lock().push(LifecycleCall::Remove {
            email: email.to_string(),
            reason: reason.to_string(),
        });
        self.check(email)
    }

    async fn restore(&self, email: &str) -> Result<(), LifecycleError> {
        self.calls.lock().push(LifecycleCall::Restore {
            email: email.to_string(),
        });
        self.check(email)
    }
}
