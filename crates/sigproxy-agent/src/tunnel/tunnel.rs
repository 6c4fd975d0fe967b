//! Per-client tunnel lifecycle
//!
//! A tunnel authorises through the proxy, opens a delivery endpoint,
//! registers and enables a webhook pointed at it, then pulls batches until
//! cancelled. Cleanup always runs, even after a failed pull, so the upstream
//! is not left with orphaned webhooks.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::console::{cyan, light_red, Console};

use super::client::{
    service_not_accessible, ApiClient, PullItem, TunnelError, WebhookConfig, WebhookRequest,
    REQUIRED_SCOPES,
};

pub(crate) struct Tunnel {
    client: ApiClient,
    events_filter: HashSet<String>,
    log_headers: bool,
    console: Console,
    pull_delay: Duration,
    cancel: CancellationToken,
}

impl Tunnel {
    pub(crate) fn new(
        client: ApiClient,
        events: &[String],
        log_headers: bool,
        console: Console,
        pull_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let events_filter = events
            .iter()
            .filter(|e| !e.is_empty())
            .cloned()
            .collect();
        Self {
            client,
            events_filter,
            log_headers,
            console,
            pull_delay,
            cancel,
        }
    }

    pub(crate) async fn run(mut self) -> anyhow::Result<()> {
        match self.client.tunnel_is_ready().await {
            Ok(()) => {}
            Err(err @ TunnelError::NotAvailable) => {
                return Err(err).context("Webhook events listening is not available");
            }
            Err(err) => return Err(err).context("Could not create tunnel"),
        }

        if self.client.authorise(REQUIRED_SCOPES).await.is_err() {
            self.console.print(light_red(&format!(
                "Could not open the Webhook events tunnel. Your client must have '{REQUIRED_SCOPES}' scope(s)"
            )));
            return Ok(());
        }
        self.console
            .verbose(format!("client is authorised with '{REQUIRED_SCOPES}' scope(s)"));

        let (endpoint_url, endpoint_id) = self
            .client
            .open_endpoint()
            .await
            .context("Could not create tunnel")?;
        self.console.verbose(format!(
            "backend endpoint ({endpoint_url}) for the client is created"
        ));

        let mut registration = WebhookRequest {
            title: format!("http signature webhook {}", random_suffix(8)),
            url: endpoint_url,
            event_types: vec!["ALL".to_string()],
            enabled: false,
            config: Some(WebhookConfig {
                delay: "1s".to_string(),
                max_package_size: 12400,
            }),
        };
        let webhook_id = self
            .client
            .create_webhook(&registration)
            .await
            .context("Could not create webhook")?;

        registration.enabled = true;
        self.client
            .patch_webhook(&webhook_id, &registration)
            .await
            .context("Could not enable webhook")?;

        let events = if self.events_filter.is_empty() {
            "ALL".to_string()
        } else {
            let mut names: Vec<&str> = self.events_filter.iter().map(String::as_str).collect();
            names.sort_unstable();
            names.join(",")
        };
        self.console.print(cyan(&format!(
            "Listen for the [{events}] events by the webhook {webhook_id}"
        )));

        let pull_result = self.pull_loop(&endpoint_id).await;

        // the loop's context is gone by now; cleanup gets plain calls and a
        // refused connection just means the upstream already went away
        if let Err(err) = self.client.delete_webhook(&webhook_id).await {
            if !err.is_connection_refused() {
                self.console.verbose(format!("Fail to delete webhook: {err}"));
            }
        }
        if let Err(err) = self.client.close_endpoint(&endpoint_id).await {
            if !err.is_connection_refused() {
                self.console.verbose(format!("Fail to close endpoint: {err}"));
            }
        }

        pull_result.with_context(|| format!("pulling events for webhook {webhook_id}"))
    }

    async fn pull_loop(&mut self, endpoint_id: &str) -> anyhow::Result<()> {
        self.console.verbose("start pulling events");
        let cancel = self.cancel.clone();
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let pulled = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                result = self.pull_events(endpoint_id) => result,
            };
            match pulled {
                Ok(()) => {}
                Err(err) if err.is_connection_refused() => return Ok(()),
                Err(err) => return Err(err.into()),
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.pull_delay) => {}
            }
        }
    }

    async fn pull_events(&mut self, endpoint_id: &str) -> Result<(), TunnelError> {
        let (mut items, mut status) = self.client.get_events(endpoint_id).await?;
        if status == StatusCode::UNAUTHORIZED {
            // one re-auth, then retry the pull; a second 401 is fatal
            self.client.authorise(REQUIRED_SCOPES).await?;
            (items, status) = self.client.get_events(endpoint_id).await?;
        }
        if service_not_accessible(status) {
            return Err(TunnelError::NotAvailable);
        }
        if status != StatusCode::OK {
            return Err(TunnelError::UnexpectedStatus(status.as_u16()));
        }

        for item in &items {
            self.report(item);
        }
        Ok(())
    }

    fn report(&self, item: &PullItem) {
        let (formatted, original, kept) = filter_and_format(&self.events_filter, &item.payload);
        if kept == 0 {
            return;
        }
        let filtered = original != kept;

        self.console.print(cyan("== new webhook event received =="));
        if let Some(created_at) = item.created_at {
            self.console.print(cyan(&format!(
                "== received at: {}",
                created_at.format("%Y-%m-%d %H:%M:%S")
            )));
        }
        if self.log_headers {
            self.print_headers(item, filtered);
        }
        if filtered {
            self.console.print(cyan(&format!(
                "== payload was filtered: origin events: {original}, filtered events: {kept}"
            )));
        }
        self.console.print(&formatted);
    }

    fn print_headers(&self, item: &PullItem, filtered: bool) {
        self.console.print(cyan("== headers"));
        let width = item.headers.keys().map(String::len).max().unwrap_or(0);
        let mut names: Vec<&String> = item.headers.keys().collect();
        names.sort();
        for name in names {
            let values = item.headers[name].join(",");
            let padding = " ".repeat(width - name.len());
            let mut remark = String::new();
            if name == "Content-Length" {
                remark.push_str(
                    " # The Content-Length header shows the length of the original payload. \
                     The payload was formatted",
                );
                if filtered {
                    remark.push_str(" and filtered by the events filter");
                }
                remark.push('.');
            }
            self.console.print(format!(
                "{padding}{} : {values}{}",
                cyan(name),
                light_red(&remark)
            ));
        }
    }
}

/// Decode a delivery payload, drop events outside the filter, and pretty-print
/// what remains. Returns `(formatted, original count, kept count)`.
fn filter_and_format(filter: &HashSet<String>, payload: &str) -> (String, usize, usize) {
    if payload.is_empty() {
        return (String::new(), 0, 0);
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        // not JSON: print it as-is
        return (payload.to_string(), 1, 1);
    };
    let Some(events) = value.get("payload").and_then(|v| v.as_array()).cloned() else {
        return (String::new(), 0, 0);
    };

    let original = events.len();
    let kept: Vec<serde_json::Value> = if filter.is_empty() {
        events
    } else {
        events
            .into_iter()
            .filter(|event| {
                event
                    .get("type")
                    .and_then(|t| t.as_str())
                    .map(|t| filter.contains(t))
                    .unwrap_or(false)
            })
            .collect()
    };
    let kept_count = kept.len();
    let out = serde_json::json!({ "payload": kept });
    let formatted = serde_json::to_string_pretty(&out).unwrap_or_default();
    (formatted, original, kept_count)
}

fn random_suffix(length: usize) -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(LETTERS[rng.gen_range(0..LETTERS.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_of(types: &[&str]) -> HashSet<String> {
        types.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_empty_filter_accepts_all() {
        let payload = r#"{"payload":[{"type":"a"},{"type":"b"}]}"#;
        let (formatted, original, kept) = filter_and_format(&HashSet::new(), payload);
        assert_eq!((original, kept), (2, 2));
        assert!(formatted.contains("\"a\""));
        assert!(formatted.contains("\"b\""));
    }

    #[test]
    fn test_filter_drops_other_types() {
        let payload = r#"{"payload":[{"type":"a"},{"type":"b"}]}"#;
        let (formatted, original, kept) = filter_and_format(&filter_of(&["a"]), payload);
        assert_eq!((original, kept), (2, 1));
        assert!(formatted.contains("\"a\""));
        assert!(!formatted.contains("\"b\""));
    }

    #[test]
    fn test_filtered_to_zero_is_skipped() {
        let payload = r#"{"payload":[{"type":"a"}]}"#;
        let (_, _, kept) = filter_and_format(&filter_of(&["other"]), payload);
        assert_eq!(kept, 0);
    }

    #[test]
    fn test_non_json_payload_passes_through() {
        let (formatted, original, kept) = filter_and_format(&HashSet::new(), "not json");
        assert_eq!((original, kept), (1, 1));
        assert_eq!(formatted, "not json");
    }

    #[test]
    fn test_empty_payload() {
        let (formatted, original, kept) = filter_and_format(&HashSet::new(), "");
        assert_eq!((original, kept), (0, 0));
        assert!(formatted.is_empty());
    }

    #[test]
    fn test_random_suffix_shape() {
        let suffix = random_suffix(8);
        assert_eq!(suffix.len(), 8);
        assert!(suffix.bytes().all(|b| b.is_ascii_lowercase()));
    }
}
