//! Shared test infrastructure for interceptor and refresh integration tests.

#![allow(dead_code)]

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use caddy_dns::config::CaddyConfig;
use caddy_dns::handler::ProxyInterceptor;
use caddy_dns::state::BindingTable;

// --- Constants ---

pub const ADMIN_PATH: &str = "/config/";
pub const TTL: u32 = 300;

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// The response is serialized via `MessageResponse::destructive_emit()` and
/// stored as raw wire-format bytes, parsed back with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
    writes: Arc<Mutex<usize>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
            writes: Arc::new(Mutex::new(0)),
        }
    }

    /// Number of responses written through this handler.
    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        *self.writes.lock().unwrap() += 1;
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- RecordingHandler ---

/// What the downstream handler saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegated {
    pub id: u16,
    pub name: Option<String>,
    pub query_type: Option<RecordType>,
}

/// Downstream handler that records every request and writes nothing.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    seen: Arc<Mutex<Vec<Delegated>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<Delegated> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestHandler for RecordingHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        _response_handle: R,
    ) -> ResponseInfo {
        let query = request.queries().first().map(|q| q.original().clone());
        self.seen.lock().unwrap().push(Delegated {
            id: request.header().id(),
            name: query.as_ref().map(|q| q.name().to_string()),
            query_type: query.as_ref().map(|q| q.query_type()),
        });
        ResponseInfo::from(*request.header())
    }
}

// --- Interceptor builders ---

pub fn table(pairs: &[(&str, &str)]) -> BindingTable {
    let store = BindingTable::new();
    store.replace(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    store
}

pub fn interceptor(pairs: &[(&str, &str)]) -> (ProxyInterceptor<RecordingHandler>, RecordingHandler) {
    let next = RecordingHandler::new();
    let handler = ProxyInterceptor::new(table(pairs), TTL, Some(next.clone()));
    (handler, next)
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query. `name: None` builds a query
/// without a question section.
pub fn build_query_bytes(name: Option<&str>, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    if let Some(name) = name {
        let mut query = Query::new();
        query.set_name(Name::from_ascii(name).unwrap());
        query.set_query_type(record_type);
        query.set_query_class(DNSClass::IN);
        msg.add_query(query);
    }
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

pub fn client_src() -> SocketAddr {
    "127.0.0.1:53535".parse().unwrap()
}

/// Build a full `Request` for `name`.
pub fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    let bytes = build_query_bytes(Some(name), record_type, id);
    Request::new(parse_message_request(&bytes), client_src(), Protocol::Udp)
}

/// Build a `Request` with an empty question section.
pub fn build_empty_request(id: u16) -> Request {
    let bytes = build_query_bytes(None, RecordType::A, id);
    Request::new(parse_message_request(&bytes), client_src(), Protocol::Udp)
}

/// Run `request` through `handler`, returning the capturing response handler.
pub async fn execute<H: RequestHandler>(handler: &H, request: &Request) -> TestResponseHandler {
    let response = TestResponseHandler::new();
    handler.handle_request(request, response.clone()).await;
    response
}

// --- Response helpers ---

/// Extract answer addresses from a response.
pub fn extract_ips(msg: &Message) -> Vec<IpAddr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(IpAddr::V4(a.0)),
            RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert the response carries exactly one address answer for `name`.
pub fn assert_single_answer(msg: &Message, name: &str, expected: IpAddr) {
    assert_response_code(msg, ResponseCode::NoError);
    assert_eq!(msg.answers().len(), 1, "expected exactly one answer");
    let record = &msg.answers()[0];
    assert_eq!(record.name().to_string(), name);
    assert_eq!(record.ttl(), TTL);
    assert_eq!(extract_ips(msg), vec![expected]);
}

// --- Admin API fixtures ---

/// A reverse proxy route for `host` dialing `dial`.
pub fn proxy_route(host: &str, dial: &str) -> Value {
    json!({
        "match": [{ "host": [host] }],
        "handle": [{
            "handler": "reverse_proxy",
            "upstreams": [{ "dial": dial }]
        }],
        "terminal": true
    })
}

/// A full admin config document with one server holding `routes`.
pub fn admin_document(routes: Vec<Value>) -> Value {
    json!({
        "admin": { "listen": "0.0.0.0:2019" },
        "apps": {
            "http": {
                "servers": {
                    "srv0": {
                        "listen": [":443"],
                        "routes": routes
                    }
                }
            }
        }
    })
}

/// Mount `body` as the admin config response.
pub async fn mount_document(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(ADMIN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount `body` for the next `times` requests only.
pub async fn mount_document_times(server: &MockServer, body: Value, times: u64) {
    Mock::given(method("GET"))
        .and(path(ADMIN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Caddy config pointing at the mock server.
pub fn caddy_config(server: &MockServer) -> CaddyConfig {
    CaddyConfig {
        admin_url: format!("{}{}", server.uri(), ADMIN_PATH),
        refresh_interval_secs: 1,
        request_timeout_secs: 1,
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}
