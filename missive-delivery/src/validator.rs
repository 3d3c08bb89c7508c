//! Address plausibility checks.
//!
//! An address is accepted when it parses, is not on a static blocklist, and
//! at least one of its domain's MX hosts has forward-confirmed reverse DNS:
//! some IP of the host reverse-resolves to a name that resolves back to the
//! same IP.

use std::{net::IpAddr, sync::Arc};

use missive_common::{Mailbox, internal, parse_mailbox};
use phf::phf_set;

use crate::{
    dns::Resolver,
    error::{BlockReason, HopFailure, ValidationError},
};

/// Role accounts that never subscribe to anything themselves.
static BLOCKED_USERS: phf::Set<&'static str> = phf_set! {
    "abuse",
    "hostmaster",
    "mailer-daemon",
    "no-reply",
    "nobody",
    "noc",
    "noreply",
    "postmaster",
    "root",
    "security",
    "webmaster",
};

/// Reserved and disposable domains.
static BLOCKED_DOMAINS: phf::Set<&'static str> = phf_set! {
    "example.com",
    "example.net",
    "example.org",
    "invalid",
    "localhost",
    "test",
    "10minutemail.com",
    "guerrillamail.com",
    "mailinator.com",
    "sharklasers.com",
    "trashmail.com",
    "yopmail.com",
};

/// Validates addresses before they are admitted to the list.
///
/// Stateless apart from the resolver, so one validator may serve concurrent
/// calls.
#[derive(Debug, Clone)]
pub struct AddressValidator {
    resolver: Arc<dyn Resolver>,
}

impl AddressValidator {
    #[must_use]
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self { resolver }
    }

    /// Validate `address`, returning the parsed mailbox on success.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the address does not parse, is
    /// blocklisted, has no MX records, or if no MX host passes the
    /// forward, reverse, forward check. In the last case every failed hop
    /// is included.
    pub async fn validate(&self, address: &str) -> Result<Mailbox, ValidationError> {
        let mailbox =
            parse_mailbox(address).map_err(|source| ValidationError::InvalidAddress {
                address: address.to_string(),
                source,
            })?;

        if let Some(reason) = blocked(&mailbox) {
            return Err(ValidationError::Blocked {
                address: mailbox.to_string(),
                reason,
            });
        }

        let domain = mailbox.domain.as_str();
        let servers = self.resolver.mail_servers(domain).await.map_err(|source| {
            ValidationError::NoMailServers {
                domain: domain.to_string(),
                source,
            }
        })?;

        let mut failures = Vec::new();
        for server in servers.iter() {
            match self.confirm_host(&server.host).await {
                Ok(ip) => {
                    internal!(
                        address = %mailbox,
                        host = %server.host,
                        %ip,
                        "Address validated"
                    );
                    return Ok(mailbox);
                }
                Err(mut host_failures) => failures.append(&mut host_failures),
            }
        }

        Err(ValidationError::NoVerifiedMailHost {
            domain: domain.to_string(),
            failures,
        })
    }

    /// Returns the first IP of `host` with forward-confirmed reverse DNS.
    async fn confirm_host(&self, host: &str) -> Result<IpAddr, Vec<HopFailure>> {
        let ips = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|source| {
                vec![HopFailure::HostLookup {
                    host: host.to_string(),
                    source,
                }]
            })?;

        let mut failures = Vec::new();
        for ip in ips {
            match self.confirm_ip(host, ip).await {
                Ok(()) => return Ok(ip),
                Err(mut ip_failures) => failures.append(&mut ip_failures),
            }
        }

        if failures.is_empty() {
            failures.push(HopFailure::HostLookup {
                host: host.to_string(),
                source: crate::DnsError::NoRecords {
                    name: host.to_string(),
                    record: "A/AAAA",
                },
            });
        }
        Err(failures)
    }

    async fn confirm_ip(&self, host: &str, ip: IpAddr) -> Result<(), Vec<HopFailure>> {
        let names = self.resolver.reverse_lookup(ip).await.map_err(|source| {
            vec![HopFailure::ReverseLookup {
                host: host.to_string(),
                ip,
                source,
            }]
        })?;

        let mut failures = Vec::new();
        for name in names {
            match self.confirm_name(host, ip, name).await {
                Ok(()) => return Ok(()),
                Err(failure) => failures.push(failure),
            }
        }

        if failures.is_empty() {
            failures.push(HopFailure::ReverseLookup {
                host: host.to_string(),
                ip,
                source: crate::DnsError::NoRecords {
                    name: ip.to_string(),
                    record: "PTR",
                },
            });
        }
        Err(failures)
    }

    async fn confirm_name(&self, host: &str, ip: IpAddr, name: String) -> Result<(), HopFailure> {
        match self.resolver.lookup_ip(&name).await {
            Ok(ips) if ips.contains(&ip) => Ok(()),
            Ok(_) => Err(HopFailure::Mismatch {
                host: host.to_string(),
                ip,
                name,
            }),
            Err(source) => Err(HopFailure::ConfirmLookup {
                host: host.to_string(),
                ip,
                name,
                source,
            }),
        }
    }
}

/// Static checks that need no network access.
fn blocked(mailbox: &Mailbox) -> Option<BlockReason> {
    if BLOCKED_USERS.contains(mailbox.user().to_ascii_lowercase().as_str()) {
        return Some(BlockReason::User);
    }

    let domain = mailbox.domain.as_str();
    if mailbox.is_domain_literal() || domain.parse::<IpAddr>().is_ok() {
        return Some(BlockReason::AddressLiteral);
    }

    if BLOCKED_DOMAINS.contains(domain) || BLOCKED_DOMAINS.contains(registrable_suffix(domain)) {
        return Some(BlockReason::Domain);
    }

    None
}

/// The last two labels of `domain`, or all of it if it has fewer.
fn registrable_suffix(domain: &str) -> &str {
    let domain = domain.trim_end_matches('.');
    domain
        .rmatch_indices('.')
        .nth(1)
        .map_or(domain, |(index, _)| &domain[index + 1..])
}
