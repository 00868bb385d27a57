//! Dispatcher / Sender: channel-agnostic outbound send.
//!
//! `channel` selects one branch of a tagged-union dispatch, as spec'd —
//! new channels are added by extending `send` and nothing in the Poll
//! Loop needs to change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use schedulerd_core::config::{HttpConfig, MqttConfig};
use schedulerd_core::error::{Error, Result};
use schedulerd_store::Job;
use tokio::sync::Mutex;

/// Result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub ok: bool,
    pub code: Option<i32>,
    pub detail: String,
}

impl SendOutcome {
    fn ok(code: Option<i32>, detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            code,
            detail: detail.into(),
        }
    }

    fn fail(code: Option<i32>, detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            code,
            detail: detail.into(),
        }
    }
}

const DETAIL_MAX_BYTES: usize = 500;

/// Dispatcher over the job's `channel` discriminator.
pub struct Sender {
    http: reqwest::Client,
    http_cfg: HttpConfig,
    mqtt_cfg: MqttConfig,
    mqtt: Mutex<Option<MqttConn>>,
}

struct MqttConn {
    client: AsyncClient,
    ready: Arc<AtomicBool>,
}

impl Sender {
    pub fn new(http_cfg: HttpConfig, mqtt_cfg: MqttConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(http_cfg.user_agent.clone())
            .danger_accept_invalid_certs(!http_cfg.verify_tls)
            .build()
            .map_err(|e| Error::dispatch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            http_cfg,
            mqtt_cfg,
            mqtt: Mutex::new(None),
        })
    }

    pub async fn send(&self, job: &Job) -> SendOutcome {
        match job.channel_upper().as_str() {
            "HTTP" => self.send_http(job).await,
            "MQTT" => self.send_mqtt(job).await,
            _ => SendOutcome::fail(None, "Unsupported channel"),
        }
    }

    async fn send_http(&self, job: &Job) -> SendOutcome {
        let Some(url) = job.http_url.as_deref().filter(|u| !u.is_empty()) else {
            return SendOutcome::fail(None, "http_url empty");
        };

        let method = job.http_method_upper();
        let timeout = Duration::from_secs(job.timeout_sec.max(0) as u64);
        let headers = parse_headers(job.http_headers_json.as_deref());

        let mut builder = if method == "GET" {
            self.http.get(url)
        } else {
            let payload = job.payload.clone().unwrap_or_default();
            if job
                .content_type
                .to_lowercase()
                .starts_with("application/json")
                && !payload.trim().is_empty()
            {
                match serde_json::from_str::<serde_json::Value>(&payload) {
                    Ok(value) => self.http.post(url).json(&value),
                    Err(_) => self.http.post(url).body(payload),
                }
            } else {
                self.http.post(url).body(payload)
            }
        };

        builder = builder.timeout(timeout);
        if let Some(headers) = headers {
            builder = builder.headers(headers);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                let ok = status.as_u16() >= 200 && status.as_u16() < 300;
                let body = response.text().await.unwrap_or_default();
                SendOutcome {
                    ok,
                    code: Some(status.as_u16() as i32),
                    detail: truncate_utf8(&body, DETAIL_MAX_BYTES),
                }
            }
            Err(e) => SendOutcome::fail(None, format!("HTTP request error: {e}")),
        }
    }

    async fn send_mqtt(&self, job: &Job) -> SendOutcome {
        let Some(topic) = job.mqtt_topic.as_deref().filter(|t| !t.is_empty()) else {
            return SendOutcome::fail(None, "mqtt_topic empty");
        };
        let qos = match job.qos {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        };
        let payload = job.payload.clone().unwrap_or_default();

        let mut guard = self.mqtt.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect_mqtt());
        }
        let conn = guard.as_ref().unwrap();

        if !conn.ready.load(Ordering::Acquire) {
            // One reconnect attempt: replace the connection and hope the
            // event loop marks it ready before the publish lands.
            *guard = Some(self.connect_mqtt());
        }
        let conn = guard.as_ref().unwrap();

        match conn
            .client
            .publish(topic, qos, job.retained, payload)
            .await
        {
            Ok(()) => SendOutcome::ok(Some(0), "published"),
            Err(e) => SendOutcome::fail(None, format!("MQTT publish error: {e}")),
        }
    }

    fn connect_mqtt(&self) -> MqttConn {
        let client_id = format!(
            "{}{:06}",
            self.mqtt_cfg.client_id_prefix,
            std::process::id() % 1_000_000
        );
        let mut opts = MqttOptions::new(client_id, self.mqtt_cfg.host.clone(), self.mqtt_cfg.port);
        opts.set_keep_alive(Duration::from_secs(self.mqtt_cfg.keepalive));
        if !self.mqtt_cfg.username.is_empty() {
            opts.set_credentials(self.mqtt_cfg.username.clone(), self.mqtt_cfg.password.clone());
        }
        if self.mqtt_cfg.tls {
            opts.set_transport(rumqttc::Transport::tls_with_default_config());
        }

        let (client, mut event_loop) = AsyncClient::new(opts, 16);
        let ready = Arc::new(AtomicBool::new(false));
        let ready_writer = ready.clone();

        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(ack))) => {
                        let connected = ack.code == rumqttc::ConnectReturnCode::Success;
                        ready_writer.store(connected, Ordering::Release);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        ready_writer.store(false, Ordering::Release);
                        tracing::warn!(error = %e, "MQTT event loop error");
                        break;
                    }
                }
            }
        });

        MqttConn { client, ready }
    }
}

fn parse_headers(raw: Option<&str>) -> Option<HeaderMap> {
    let raw = raw?;
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let mut headers = HeaderMap::new();
    for (key, val) in object {
        let Some(val_str) = val.as_str() else {
            tracing::warn!(header = %key, "skipping non-string header value");
            continue;
        };
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(val_str),
        ) else {
            tracing::warn!(header = %key, "skipping unparseable header");
            continue;
        };
        headers.insert(name, value);
    }
    Some(headers)
}

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use schedulerd_store::testing::job_fixture;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_cfg() -> HttpConfig {
        HttpConfig {
            user_agent: "test-agent".to_string(),
            verify_tls: true,
        }
    }

    fn mqtt_cfg() -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            username: String::new(),
            password: String::new(),
            client_id_prefix: "test-".to_string(),
            keepalive: 5,
            tls: false,
        }
    }

    #[tokio::test]
    async fn http_get_success_is_ok_in_2xx_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let mut job = job_fixture(1);
        job.http_url = Some(format!("{}/webhook", server.uri()));
        job.http_method = "GET".to_string();

        let sender = Sender::new(http_cfg(), mqtt_cfg()).unwrap();
        let outcome = sender.send(&job).await;
        assert!(outcome.ok);
        assert_eq!(outcome.code, Some(200));
    }

    #[tokio::test]
    async fn http_5xx_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let mut job = job_fixture(1);
        job.http_url = Some(format!("{}/webhook", server.uri()));
        job.http_method = "POST".to_string();
        job.max_retries = 2;

        let sender = Sender::new(http_cfg(), mqtt_cfg()).unwrap();
        let outcome = sender.send(&job).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.code, Some(500));
    }

    #[tokio::test]
    async fn json_content_type_sends_parsed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut job = job_fixture(1);
        job.http_url = Some(format!("{}/webhook", server.uri()));
        job.http_method = "POST".to_string();
        job.content_type = "application/json".to_string();
        job.payload = Some(r#"{"hello":"world"}"#.to_string());

        let sender = Sender::new(http_cfg(), mqtt_cfg()).unwrap();
        let outcome = sender.send(&job).await;
        assert!(outcome.ok);
    }

    #[tokio::test]
    async fn unsupported_channel_fails_without_panicking() {
        let mut job = job_fixture(1);
        job.channel = "CARRIER_PIGEON".to_string();
        let sender = Sender::new(http_cfg(), mqtt_cfg()).unwrap();
        let outcome = sender.send(&job).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.detail, "Unsupported channel");
    }

    #[test]
    fn truncate_never_splits_a_utf8_codepoint() {
        let s = "a".repeat(499) + "é"; // é is 2 bytes, crosses the 500 boundary
        let truncated = truncate_utf8(&s, 500);
        assert!(truncated.is_char_boundary(truncated.len()));
    }
}
