use reqwest::Client;
use std::time::Duration;

use crate::models::job::CallbackPayload;

/// Delivers job outcomes to the configured remote listener.
///
/// Each delivery makes up to `max_retries + 1` POST attempts with a fixed
/// per-attempt timeout and no delay between attempts. Delivery never fails
/// from the caller's point of view: exhausted attempts are logged and
/// dropped, and a missing endpoint makes delivery a silent no-op.
pub struct CallbackDispatcher {
    http: Client,
    endpoint: Option<String>,
    attempt_timeout: Duration,
    max_retries: u32,
}

impl CallbackDispatcher {
    pub fn new(endpoint: Option<String>, attempt_timeout: Duration, max_retries: u32) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            attempt_timeout,
            max_retries,
        }
    }

    pub async fn deliver(&self, payload: &CallbackPayload) {
        let Some(endpoint) = &self.endpoint else {
            tracing::debug!(job_id = %payload.job_id, "no callback endpoint configured, skipping delivery");
            return;
        };

        let total_attempts = self.max_retries + 1;
        for attempt in 1..=total_attempts {
            metrics::counter!("callback_attempts_total").increment(1);

            match self
                .http
                .post(endpoint)
                .timeout(self.attempt_timeout)
                .json(payload)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(
                        job_id = %payload.job_id,
                        status = %payload.status,
                        attempt,
                        "callback delivered"
                    );
                    return;
                }
                Ok(response) => {
                    tracing::warn!(
                        job_id = %payload.job_id,
                        attempt,
                        http_status = response.status().as_u16(),
                        "callback attempt rejected"
                    );
                }
                Err(e) => {
                    tracing::warn!(job_id = %payload.job_id, attempt, error = %e, "callback attempt failed");
                }
            }
        }

        tracing::error!(
            job_id = %payload.job_id,
            attempts = total_attempts,
            "callback delivery abandoned after all attempts"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_no_endpoint_is_a_silent_no_op() {
        let dispatcher = CallbackDispatcher::new(None, Duration::from_secs(1), 2);
        let payload = CallbackPayload::failed(Uuid::new_v4(), "whatever");
        // Must return immediately without attempting any network call.
        dispatcher.deliver(&payload).await;
    }
}
