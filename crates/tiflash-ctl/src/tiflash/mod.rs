//! Commands fanned out to every TiFlash instance.
//!
//! - [`TiflashHttp`]: posts one command to one instance
//! - [`TiflashClient`]: implementation over the TiFlash HTTP port
//! - [`dispatch`]: sends a command to each instance in turn

mod client;

pub use client::TiflashClient;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;

/// Default TiFlash HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 8123;

/// Debug command dumping every Region TiFlash holds for a table.
pub fn dump_all_region_command(table_id: i64) -> String {
    format!("DBGInvoke dump_all_region({})", table_id)
}

/// Host part of an instance address from `cluster_info` (`host:port`).
pub fn instance_host(address: &str) -> &str {
    match address.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => address,
    }
}

/// Posts raw commands to a TiFlash instance.
#[async_trait]
pub trait TiflashHttp: Send + Sync {
    /// Send `command` to the instance on `host`, returning the response body.
    async fn post(&self, host: &str, command: &str) -> Result<String>;
}

/// What one instance answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReply {
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchReply {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Send `command` to every host, one after another.
///
/// A failing instance is logged and recorded; the remaining hosts are still
/// contacted.
pub async fn dispatch<H: TiflashHttp + ?Sized>(
    http: &H,
    hosts: &[String],
    command: &str,
) -> Vec<DispatchReply> {
    let mut replies = Vec::with_capacity(hosts.len());
    for host in hosts {
        info!("TiFlash {}: {}", host, command);
        let reply = match http.post(host, command).await {
            Ok(body) => DispatchReply {
                host: host.clone(),
                response: Some(body),
                error: None,
            },
            Err(e) => {
                warn!("TiFlash {} failed: {}", host, e);
                DispatchReply {
                    host: host.clone(),
                    response: None,
                    error: Some(e.to_string()),
                }
            }
        };
        replies.push(reply);
    }
    replies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CtlError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTiflash {
        down: Vec<&'static str>,
        posted: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl TiflashHttp for FakeTiflash {
        async fn post(&self, host: &str, command: &str) -> Result<String> {
            self.posted
                .lock()
                .unwrap()
                .push((host.to_string(), command.to_string()));
            if self.down.contains(&host) {
                return Err(CtlError::TiflashRequest(format!("{} refused", host)));
            }
            Ok(format!("ok from {}", host))
        }
    }

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn test_dump_all_region_command() {
        assert_eq!(dump_all_region_command(55), "DBGInvoke dump_all_region(55)");
    }

    #[test]
    fn test_instance_host() {
        assert_eq!(instance_host("10.0.1.7:3930"), "10.0.1.7");
        assert_eq!(instance_host("tiflash-0.tiflash-peer:3930"), "tiflash-0.tiflash-peer");
        assert_eq!(instance_host("[::1]:3930"), "[::1]");
        assert_eq!(instance_host("10.0.1.7"), "10.0.1.7");
    }

    #[tokio::test]
    async fn test_dispatch_reaches_every_instance() {
        let tiflash = FakeTiflash::default();
        let replies = dispatch(&tiflash, &hosts(&["a", "b"]), "DBGInvoke dump_all_region(7)").await;

        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(DispatchReply::is_ok));
        assert_eq!(replies[1].response.as_deref(), Some("ok from b"));
        let posted = tiflash.posted.lock().unwrap();
        assert_eq!(
            *posted,
            vec![
                ("a".to_string(), "DBGInvoke dump_all_region(7)".to_string()),
                ("b".to_string(), "DBGInvoke dump_all_region(7)".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_instance_does_not_stop_dispatch() {
        let tiflash = FakeTiflash {
            down: vec!["b"],
            ..Default::default()
        };
        let replies = dispatch(&tiflash, &hosts(&["a", "b", "c"]), "select 1").await;

        let ok: Vec<bool> = replies.iter().map(DispatchReply::is_ok).collect();
        assert_eq!(ok, vec![true, false, true]);
        assert!(replies[1].error.as_deref().unwrap().contains("b refused"));
        assert_eq!(tiflash.posted.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_no_instances() {
        let tiflash = FakeTiflash::default();
        assert!(dispatch(&tiflash, &[], "select 1").await.is_empty());
    }
}
