use std::sync::Arc;
use std::time::Duration;

use fusion_contracts::artifact::GenerationResult;
use fusion_contracts::errors::GenerationError;
use fusion_contracts::wire::{
    GenerationRequest, RawReply, ERROR_API_KEY_MISSING, ERROR_GENERATION_FAILED_PREFIX,
    ERROR_NO_IMAGE,
};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::backend::GenerationBackend;
use crate::encoder::encode_source;
use crate::error_chain_text;
use crate::source::SourceImage;

const UNKNOWN_SERVER_ERROR: &str = "An unknown error occurred on the server.";

/// Carries one request to a backend and hands back its raw reply.
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;
    fn send(&self, request: &GenerationRequest) -> Result<RawReply, GenerationError>;
}

/// POSTs the request as JSON to a backend URL.
pub struct HttpTransport {
    endpoint: String,
    timeout: Duration,
    http: HttpClient,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            http: HttpClient::new(),
        }
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    fn send(&self, request: &GenerationRequest) -> Result<RawReply, GenerationError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .json(request)
            .send()
            .map_err(|err| self.transport_error(err))?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|err| self.transport_error(err))?;
        Ok(RawReply { status, body })
    }
}

impl HttpTransport {
    fn transport_error(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            return GenerationError::Timeout {
                seconds: self.timeout.as_secs(),
            };
        }
        let err = anyhow::Error::new(err).context(format!("request to {} failed", self.endpoint));
        GenerationError::Unclassified {
            raw: error_chain_text(&err, 512),
        }
    }
}

/// Runs the backend in the same process. The request still goes through
/// its JSON form so both sides see exactly what the HTTP path would carry.
pub struct InProcessTransport {
    backend: Arc<GenerationBackend>,
}

impl InProcessTransport {
    pub fn new(backend: Arc<GenerationBackend>) -> Self {
        Self { backend }
    }
}

impl Transport for InProcessTransport {
    fn name(&self) -> &str {
        "in-process"
    }

    fn send(&self, request: &GenerationRequest) -> Result<RawReply, GenerationError> {
        let body = serde_json::to_string(request).map_err(|err| GenerationError::Encoding {
            detail: err.to_string(),
        })?;
        Ok(self.backend.handle("POST", &body))
    }
}

#[derive(Clone)]
pub struct GenerationClient {
    transport: Arc<dyn Transport>,
}

impl GenerationClient {
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// One round trip: encode, send, classify. Nothing is retried.
    pub fn generate(
        &self,
        prompt: &str,
        image1: &SourceImage,
        image2: Option<&SourceImage>,
    ) -> Result<GenerationResult, GenerationError> {
        let request = build_request(prompt, image1, image2)?;
        let reply = self.transport.send(&request)?;
        classify_reply(&reply)
    }
}

pub fn build_request(
    prompt: &str,
    image1: &SourceImage,
    image2: Option<&SourceImage>,
) -> Result<GenerationRequest, GenerationError> {
    let image1 = encode_source(image1)?;
    let image2 = image2.map(encode_source).transpose()?;
    Ok(GenerationRequest::new(prompt, image1, image2))
}

/// Maps a backend reply onto the error taxonomy. First match wins:
///
/// 1. non-2xx with a body that is not JSON → `Server`
/// 2. `API_KEY_MISSING` → `Configuration`
/// 3. `Image generation failed…` → `ModelRefusal`, detail after the first `:`
/// 4. `No image was generated.` → `EmptyResult`
/// 5. any other error text → `Unclassified`
/// 6. 2xx without `data` → `EmptyResult`
/// 7. 2xx with `data` → the result
pub fn classify_reply(reply: &RawReply) -> Result<GenerationResult, GenerationError> {
    if !reply.is_success() {
        let Ok(parsed) = serde_json::from_str::<Value>(&reply.body) else {
            return Err(GenerationError::Server {
                status: reply.status,
            });
        };
        let message = parsed
            .get("error")
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .unwrap_or(UNKNOWN_SERVER_ERROR);
        return Err(classify_error_message(message));
    }

    let parsed: Value =
        serde_json::from_str(&reply.body).map_err(|err| GenerationError::Unclassified {
            raw: format!("backend returned invalid JSON: {err}"),
        })?;
    match parsed.get("data").and_then(Value::as_str) {
        Some(data) if !data.is_empty() => Ok(GenerationResult::from_data_uri(data)),
        _ => Err(GenerationError::EmptyResult),
    }
}

fn classify_error_message(message: &str) -> GenerationError {
    if message == ERROR_API_KEY_MISSING {
        return GenerationError::Configuration;
    }
    if message.starts_with(ERROR_GENERATION_FAILED_PREFIX) {
        let detail = message.split_once(':').map(|(_, rest)| rest).unwrap_or("");
        return GenerationError::refusal(detail);
    }
    if message == ERROR_NO_IMAGE {
        return GenerationError::EmptyResult;
    }
    GenerationError::Unclassified {
        raw: message.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use fusion_contracts::errors::{ErrorKind, GenerationError};
    use fusion_contracts::wire::{GenerationRequest, RawReply};
    use serde_json::{json, Value};

    use crate::backend::tests::ScriptedModel;
    use crate::backend::{GenerationBackend, ModelOutput};
    use crate::source::SourceImage;

    use super::{classify_reply, GenerationClient, HttpTransport, InProcessTransport, Transport};

    /// Transport double that replays one reply and records every request.
    pub(crate) struct ReplayTransport {
        pub reply: Result<RawReply, GenerationError>,
        pub sent: Arc<Mutex<Vec<GenerationRequest>>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl ReplayTransport {
        pub(crate) fn replying(reply: RawReply) -> Self {
            Self {
                reply: Ok(reply),
                sent: Arc::new(Mutex::new(Vec::new())),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Transport for ReplayTransport {
        fn name(&self) -> &str {
            "replay"
        }

        fn send(&self, request: &GenerationRequest) -> Result<RawReply, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(request.clone());
            }
            self.reply.clone()
        }
    }

    fn reply(status: u16, body: Value) -> RawReply {
        RawReply {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn refusal_detail_is_text_after_first_colon() {
        let err = classify_reply(&reply(
            500,
            json!({"error": "Image generation failed: nudity detected"}),
        ))
        .err();
        assert_eq!(
            err,
            Some(GenerationError::ModelRefusal {
                detail: "nudity detected".to_string()
            })
        );

        let backend_wording = classify_reply(&reply(
            500,
            json!({"error": "Image generation failed. Model response: Sorry: cannot do faces"}),
        ))
        .err();
        assert_eq!(
            backend_wording,
            Some(GenerationError::ModelRefusal {
                detail: "Sorry: cannot do faces".to_string()
            })
        );

        let no_detail =
            classify_reply(&reply(500, json!({"error": "Image generation failed"}))).err();
        assert_eq!(
            no_detail,
            Some(GenerationError::ModelRefusal {
                detail: "Unknown model error".to_string()
            })
        );
    }

    #[test]
    fn configuration_empty_and_unclassified() {
        let kind = |body: Value| {
            classify_reply(&reply(500, body))
                .err()
                .map(|err| err.kind())
        };
        assert_eq!(kind(json!({"error": "API_KEY_MISSING"})), Some(ErrorKind::Configuration));
        assert_eq!(kind(json!({"error": "No image was generated."})), Some(ErrorKind::EmptyResult));
        assert_eq!(
            classify_reply(&reply(
                400,
                json!({"error": "Missing required fields: prompt and image1."})
            ))
            .err(),
            Some(GenerationError::Unclassified {
                raw: "Missing required fields: prompt and image1.".to_string()
            })
        );
        assert_eq!(
            classify_reply(&reply(500, json!({"detail": "nope"}))).err(),
            Some(GenerationError::Unclassified {
                raw: "An unknown error occurred on the server.".to_string()
            })
        );
    }

    #[test]
    fn unparseable_error_body_is_a_server_error_with_status() {
        let err = classify_reply(&RawReply {
            status: 502,
            body: "<html>Bad Gateway</html>".to_string(),
        })
        .err();
        assert_eq!(err, Some(GenerationError::Server { status: 502 }));
    }

    #[test]
    fn success_without_data_is_empty_result() {
        for body in [json!({"data": null}), json!({}), json!({"data": ""})] {
            assert_eq!(
                classify_reply(&reply(200, body)).err(),
                Some(GenerationError::EmptyResult)
            );
        }
    }

    #[test]
    fn success_with_non_json_body_is_unclassified() {
        let err = classify_reply(&RawReply {
            status: 200,
            body: "<html>ok</html>".to_string(),
        })
        .err();
        match err {
            Some(GenerationError::Unclassified { raw }) => {
                assert!(raw.starts_with("backend returned invalid JSON"));
            }
            other => panic!("expected unclassified error, got {other:?}"),
        }
    }

    #[test]
    fn success_with_data_returns_result() -> anyhow::Result<()> {
        let result = classify_reply(&reply(200, json!({"data": "data:image/png;base64,AAAA"})))?;
        assert_eq!(result.as_uri(), "data:image/png;base64,AAAA");
        Ok(())
    }

    #[test]
    fn client_sends_one_request_with_both_images() -> anyhow::Result<()> {
        let transport =
            ReplayTransport::replying(reply(200, json!({"data": "data:image/png;base64,AA=="})));
        let sent = Arc::clone(&transport.sent);
        let client = GenerationClient::new(transport);

        let first = SourceImage::from_bytes("a.png", Some("image/png"), vec![1]);
        let second = SourceImage::from_bytes("b.jpg", Some("image/jpeg"), vec![2]);
        client.generate("merge", &first, Some(&second))?;

        let sent = sent.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].prompt, "merge");
        assert_eq!(sent[0].image1.data, "AQ==");
        assert_eq!(
            sent[0].image2.as_ref().map(|image| image.mime_type.as_str()),
            Some("image/jpeg")
        );
        Ok(())
    }

    #[test]
    fn encoding_failure_stops_before_transport() {
        let transport = ReplayTransport::replying(reply(200, json!({"data": "x"})));
        let calls = Arc::clone(&transport.calls);
        let client = GenerationClient::new(transport);
        let err = client
            .generate("p", &SourceImage::from_path("/missing/one.png"), None)
            .err()
            .map(|err| err.kind());
        assert_eq!(err, Some(ErrorKind::Encoding));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn in_process_transport_round_trips_through_backend() -> anyhow::Result<()> {
        let backend = GenerationBackend::new(ScriptedModel::returning(ModelOutput {
            image: None,
            text: Some("too risky".to_string()),
        }));
        let client = GenerationClient::new(InProcessTransport::new(Arc::new(backend)));
        let err = client
            .generate("p", &SourceImage::from_bytes("a", Some("image/png"), vec![0]), None)
            .err();
        assert_eq!(
            err,
            Some(GenerationError::ModelRefusal {
                detail: "too risky".to_string()
            })
        );
        Ok(())
    }

    fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> anyhow::Result<(String, thread::JoinHandle<String>)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let handle = thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return String::new();
            };
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut content_length = 0usize;
            let mut request_line = String::new();
            let _ = reader.read_line(&mut request_line);
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
            let mut body_buf = vec![0u8; content_length];
            let _ = reader.read_exact(&mut body_buf);
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
            format!("{}{}", request_line, String::from_utf8_lossy(&body_buf))
        });
        Ok((format!("http://{addr}/api/generate"), handle))
    }

    #[test]
    fn http_transport_posts_json_and_reads_status() -> anyhow::Result<()> {
        let (endpoint, server) = serve_once(
            "HTTP/1.1 500 Internal Server Error",
            r#"{"error":"API_KEY_MISSING"}"#,
        )?;
        let client = GenerationClient::new(HttpTransport::new(endpoint, Duration::from_secs(10)));
        let err = client
            .generate("p", &SourceImage::from_bytes("a", Some("image/png"), vec![9]), None)
            .err();
        assert_eq!(err, Some(GenerationError::Configuration));

        let seen = server.join().map_err(|_| anyhow::anyhow!("server thread panicked"))?;
        assert!(seen.starts_with("POST /api/generate"));
        let body_start = seen.find('{').unwrap_or(0);
        let body: Value = serde_json::from_str(&seen[body_start..])?;
        assert_eq!(body["image1"]["mimeType"], json!("image/png"));
        assert_eq!(body["image2"], Value::Null);
        Ok(())
    }

    #[test]
    fn http_transport_times_out_on_silent_backend() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let endpoint = format!("http://{}/api/generate", listener.local_addr()?);
        let server = thread::spawn(move || {
            // Hold the connection open without replying until the client gives up.
            if let Ok((mut stream, _)) = listener.accept() {
                let mut sink = Vec::new();
                let _ = stream.read_to_end(&mut sink);
            }
        });

        let client = GenerationClient::new(HttpTransport::new(endpoint, Duration::from_secs(1)));
        let err = client
            .generate("p", &SourceImage::from_bytes("a", Some("image/png"), vec![9]), None)
            .err();
        assert_eq!(err, Some(GenerationError::Timeout { seconds: 1 }));
        drop(client);
        let _ = server.join();
        Ok(())
    }

    #[test]
    fn http_transport_connection_refused_is_unclassified_with_chain() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let endpoint = format!("http://{}/api/generate", listener.local_addr()?);
        drop(listener);

        let client = GenerationClient::new(HttpTransport::new(&endpoint, Duration::from_secs(5)));
        let err = client
            .generate("p", &SourceImage::from_bytes("a", Some("image/png"), vec![9]), None)
            .err();
        match err {
            Some(GenerationError::Unclassified { raw }) => {
                assert!(raw.starts_with(&format!("request to {endpoint} failed")));
                assert!(raw.contains(" | caused by: "));
            }
            other => panic!("expected unclassified error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn http_transport_maps_gateway_pages_to_server_error() -> anyhow::Result<()> {
        let (endpoint, server) = serve_once("HTTP/1.1 504 Gateway Timeout", "upstream timed out")?;
        let client = GenerationClient::new(HttpTransport::new(endpoint, Duration::from_secs(10)));
        let err = client
            .generate("p", &SourceImage::from_bytes("a", Some("image/png"), vec![9]), None)
            .err();
        assert_eq!(err, Some(GenerationError::Server { status: 504 }));
        let _ = server.join();
        Ok(())
    }
}
