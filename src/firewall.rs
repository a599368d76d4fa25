//! Per-host request filtering on client IP and request path
//!
//! A request is rejected when the first matching host entry lists the client
//! IP in `ip_reject` or the request path in `path_reject`. Either membership
//! is sufficient; there is no allow-override. Hosts without a matching entry
//! or without a firewall block default to allow.

use std::net::IpAddr;

use tracing::warn;

use crate::config::HostConfig;

/// Returns `true` when the request may proceed.
pub fn allow(hosts: &[HostConfig], host: &str, client_ip: IpAddr, path: &str) -> bool {
    let Some(entry) = hosts.iter().find(|e| e.host == host) else {
        return true;
    };
    let Some(rules) = &entry.firewall_rules else {
        return true;
    };

    if rules.ip_reject.contains(&client_ip) {
        warn!("Firewall rejected {} for host {}: client IP", client_ip, host);
        return false;
    }
    if rules.path_reject.iter().any(|rejected| rejected == path) {
        warn!("Firewall rejected {} for host {}: path {}", client_ip, host, path);
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FirewallRules;

    fn host_with_firewall(host: &str, rules: Option<FirewallRules>) -> HostConfig {
        HostConfig {
            host: host.to_string(),
            servers: vec!["localhost:8081".to_string()],
            header_rules: Vec::new(),
            param_rules: Vec::new(),
            rewrite_rules: None,
            firewall_rules: rules,
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn rejected_ip_is_denied() {
        let hosts = vec![host_with_firewall(
            "www.mango.com",
            Some(FirewallRules {
                ip_reject: vec![ip("10.192.0.1")],
                path_reject: Vec::new(),
            }),
        )];

        assert!(!allow(&hosts, "www.mango.com", ip("10.192.0.1"), "/"));
        assert!(allow(&hosts, "www.mango.com", ip("10.192.0.2"), "/"));
    }

    #[test]
    fn rejected_path_is_denied() {
        let hosts = vec![host_with_firewall(
            "www.mango.com",
            Some(FirewallRules {
                ip_reject: Vec::new(),
                path_reject: vec!["/admin".to_string()],
            }),
        )];

        assert!(!allow(&hosts, "www.mango.com", ip("127.0.0.1"), "/admin"));
        assert!(allow(&hosts, "www.mango.com", ip("127.0.0.1"), "/messages"));
    }

    #[test]
    fn either_membership_rejects() {
        let hosts = vec![host_with_firewall(
            "www.mango.com",
            Some(FirewallRules {
                ip_reject: vec![ip("10.192.0.1")],
                path_reject: vec!["/admin".to_string()],
            }),
        )];

        // IP alone, path fine
        assert!(!allow(&hosts, "www.mango.com", ip("10.192.0.1"), "/messages"));
        // Path alone, IP fine
        assert!(!allow(&hosts, "www.mango.com", ip("127.0.0.1"), "/admin"));
    }

    #[test]
    fn missing_rules_default_to_allow() {
        let hosts = vec![host_with_firewall("www.mango.com", None)];

        assert!(allow(&hosts, "www.mango.com", ip("10.192.0.1"), "/admin"));
    }

    #[test]
    fn non_matching_host_defaults_to_allow() {
        let hosts = vec![host_with_firewall(
            "www.mango.com",
            Some(FirewallRules {
                ip_reject: vec![ip("10.192.0.1")],
                path_reject: Vec::new(),
            }),
        )];

        assert!(allow(&hosts, "www.apple.com", ip("10.192.0.1"), "/"));
    }
}
