//! Session pipeline tests against a scripted transport.
//!
//! These check what the session hands to the transport and how it rebuilds
//! the response, without any network I/O.

mod helpers;

use helpers::stub_transport::StubTransport;
use serde_json::json;
use veneer::transport::TransportOption;
use veneer::{
    BrowserType, Data, Error, RequestOptions, Session, SessionBuilder, TransportError,
    TransportErrorKind,
};

fn has(options: &[TransportOption], wanted: &TransportOption) -> bool {
    options.iter().any(|o| o == wanted)
}

fn body_of(options: &[TransportOption]) -> Option<Vec<u8>> {
    options.iter().find_map(|o| match o {
        TransportOption::Body(b) => Some(b.to_vec()),
        _ => None,
    })
}

#[test]
fn test_impersonated_get_end_to_end() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = SessionBuilder::new().impersonate("chrome101").build_with(stub);

    let response = session
        .get("https://example.test/", RequestOptions::new().param("q", "a b"))
        .unwrap();

    let options = handle.last_options();
    assert_eq!(options[0], TransportOption::Method("GET".into()));
    assert_eq!(options[1], TransportOption::Url("https://example.test/?q=a+b".into()));
    assert!(has(&options, &TransportOption::Impersonate(BrowserType::Chrome101)));
    assert!(has(&options, &TransportOption::FollowLocation(true)));
    assert!(has(&options, &TransportOption::MaxRedirects(-1)));
    assert!(has(&options, &TransportOption::TimeoutMs(30_000)));
    assert!(body_of(&options).is_none());

    assert_eq!(response.status_code, 200);
    assert!(response.ok);
    assert_eq!(response.reason, "OK");
    assert_eq!(response.content.as_ref(), b"ok");
    assert_eq!(response.text(), "ok");
    assert_eq!(response.charset, "utf-8");
    assert_eq!(response.url, "https://example.test/?q=a+b");
    assert_eq!(response.request.method, "GET");
}

#[test]
fn test_sinks_are_the_last_options() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = Session::with_transport(stub);
    session.get("http://example.test/", RequestOptions::new()).unwrap();

    let options = handle.last_options();
    let n = options.len();
    assert!(matches!(options[n - 2], TransportOption::WriteSink(_)));
    assert!(matches!(options[n - 1], TransportOption::HeaderSink(_)));
}

#[test]
fn test_json_wins_over_data() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = Session::with_transport(stub);

    session
        .post(
            "https://example.test/submit",
            RequestOptions::new()
                .form([("a", "1")])
                .json(json!({"k": "v"}))
                .header("Content-Type", "text/plain"),
        )
        .unwrap();

    let options = handle.last_options();
    assert_eq!(body_of(&options), Some(br#"{"k":"v"}"#.to_vec()));
    assert!(has(&options, &TransportOption::BodyLength(9)));
    let lines = handle.last_header_lines();
    assert_eq!(lines, vec!["Content-Type: application/json".to_string()]);
}

#[test]
fn test_form_body_and_content_type() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = Session::with_transport(stub);

    session
        .post(
            "https://example.test/",
            RequestOptions::new().data(Data::form([("name", "a b"), ("x", "&")])),
        )
        .unwrap();

    assert_eq!(body_of(&handle.last_options()), Some(b"name=a+b&x=%26".to_vec()));
    assert!(handle
        .last_header_lines()
        .contains(&"Content-Type: application/x-www-form-urlencoded".to_string()));
}

#[test]
fn test_invalid_data_value_fails_before_transport() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = Session::with_transport(stub);

    let err = session
        .post("https://example.test/", RequestOptions::new().data(json!([1, 2])))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidBodyType(_)));
    assert_eq!(handle.transfers(), 0);
}

#[test]
fn test_redirect_keeps_final_hop_headers_only() {
    let raw = b"HTTP/1.1 302 Found\r\nLocation: /b\r\nSet-Cookie: hop=1\r\nX-Hop: first\r\n\r\n\
HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=ISO-8859-1\r\nX-Final: yes\r\n\r\n";
    let stub = StubTransport::new()
        .with_raw_headers(raw)
        .with_body(b"caf\xe9")
        .with_effective_url("https://example.test/b")
        .with_redirects(1, "");
    let mut session = Session::with_transport(stub);

    let response = session.get("https://example.test/a", RequestOptions::new()).unwrap();

    assert_eq!(response.url, "https://example.test/b");
    assert_eq!(response.redirect_count, 1);
    assert_eq!(response.reason, "OK");
    assert_eq!(response.headers.get("X-Final"), Some("yes"));
    assert!(response.headers.get("X-Hop").is_none());
    assert!(response.headers.get("Location").is_none());
    assert_eq!(response.charset, "ISO-8859-1");
    assert_eq!(response.text(), "café");
    // Set-Cookie of the intermediate hop is not stored.
    assert!(session.cookies().is_empty());
}

#[test]
fn test_https_proxy_with_https_prefix_is_rejected() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = SessionBuilder::new()
        .proxy("https", "https://proxy.test:8443")
        .build_with(stub);

    let err = session.get("https://example.test/", RequestOptions::new()).unwrap_err();
    assert!(matches!(err, Error::ProxyBadScheme(_)));
    assert_eq!(handle.transfers(), 0);
    assert_eq!(handle.performs(), 0);
}

#[test]
fn test_https_target_tunnels_through_http_proxy() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = SessionBuilder::new()
        .proxy("http", "http://proxy.test:3128")
        .proxy("https", "http://proxy.test:3128")
        .build_with(stub);

    session.get("https://example.test/", RequestOptions::new()).unwrap();
    let options = handle.last_options();
    assert!(has(&options, &TransportOption::Proxy("http://proxy.test:3128".into())));
    assert!(has(&options, &TransportOption::HttpProxyTunnel(true)));

    session.get("http://example.test/", RequestOptions::new()).unwrap();
    let options = handle.last_options();
    assert!(has(&options, &TransportOption::Proxy("http://proxy.test:3128".into())));
    assert!(!options.iter().any(|o| matches!(o, TransportOption::HttpProxyTunnel(_))));
}

#[test]
fn test_unsupported_impersonation_touches_nothing() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = Session::with_transport(stub);

    let err = session
        .get("https://example.test/", RequestOptions::new().impersonate("netscape4"))
        .unwrap_err();
    match err {
        Error::UnsupportedImpersonation(tag) => assert_eq!(tag, "netscape4"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(handle.transfers(), 0);
}

#[test]
fn test_split_timeout_translation() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = Session::with_transport(stub);

    session
        .get("https://example.test/", RequestOptions::new().timeout((2.0, 5.0)))
        .unwrap();

    let options = handle.last_options();
    assert!(has(&options, &TransportOption::ConnectTimeoutMs(2000)));
    assert!(has(&options, &TransportOption::TimeoutMs(7000)));
}

#[test]
fn test_file_uploads_not_implemented() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = Session::with_transport(stub);

    let err = session
        .post("https://example.test/", RequestOptions::new().file("upload", &b"data"[..]))
        .unwrap_err();
    assert!(matches!(err, Error::NotImplemented(_)));
    assert_eq!(handle.transfers(), 0);
}

#[test]
fn test_cookies_persist_across_requests() {
    let raw = b"HTTP/1.1 200 OK\r\nSet-Cookie: sid=abc; Path=/\r\n\r\n";
    let stub = StubTransport::new().with_raw_headers(raw);
    let handle = stub.handle();
    let mut session = Session::with_transport(stub);

    let response = session.get("https://example.test/login", RequestOptions::new()).unwrap();
    assert_eq!(response.cookies().get_value("sid"), Some("abc"));
    assert_eq!(session.cookies().get_value("sid"), Some("abc"));

    session.get("https://example.test/next", RequestOptions::new()).unwrap();
    assert!(handle.last_header_lines().contains(&"Cookie: sid=abc".to_string()));

    // Host-only cookie stays with its host.
    session.get("https://other.test/", RequestOptions::new()).unwrap();
    assert!(!handle.last_header_lines().iter().any(|l| l.starts_with("Cookie:")));
}

#[test]
fn test_explicit_cookie_header_is_kept() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = SessionBuilder::new().cookie("jar", "1").build_with(stub);

    session
        .get("https://example.test/", RequestOptions::new().header("Cookie", "mine=2"))
        .unwrap();
    assert_eq!(handle.last_header_lines(), vec!["Cookie: mine=2".to_string()]);
}

#[test]
fn test_call_cookies_merge_with_session_cookies() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = SessionBuilder::new().cookie("a", "1").build_with(stub);

    session
        .get("https://example.test/", RequestOptions::new().cookie("b", "2"))
        .unwrap();
    let lines = handle.last_header_lines();
    let cookie = lines.iter().find(|l| l.starts_with("Cookie: ")).unwrap();
    assert!(cookie.contains("a=1"));
    assert!(cookie.contains("b=2"));
    assert!(session.cookies().get_value("b").is_none());
}

#[test]
fn test_transport_failure_is_wrapped() {
    let stub = StubTransport::new().failing(TransportError::timeout("connect timed out"));
    let mut session = Session::with_transport(stub);

    let err = session.get("https://example.test/", RequestOptions::new()).unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.transport_kind(), Some(TransportErrorKind::Timeout));
    assert!(err.to_string().contains("connect timed out"));
}

#[test]
fn test_close_is_idempotent_and_final() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = Session::with_transport(stub);

    session.close();
    session.close();
    assert!(session.is_closed());
    assert_eq!(handle.closes(), 1);

    let err = session.get("https://example.test/", RequestOptions::new()).unwrap_err();
    assert_eq!(err.transport_kind(), Some(TransportErrorKind::Closed));
    assert_eq!(handle.transfers(), 0);

    drop(session);
    assert_eq!(handle.closes(), 1);
}

#[test]
fn test_drop_releases_transport() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    {
        let mut session = Session::with_transport(stub);
        session.get("https://example.test/", RequestOptions::new()).unwrap();
    }
    assert_eq!(handle.closes(), 1);
}

#[test]
fn test_session_headers_not_mutated_by_request() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = SessionBuilder::new()
        .header("X-Session", "1")
        .header("Accept", "text/html")
        .build_with(stub);

    session
        .post(
            "https://example.test/",
            RequestOptions::new()
                .header("accept", "application/json")
                .json(json!({"a": 1})),
        )
        .unwrap();

    assert_eq!(
        handle.last_header_lines(),
        vec![
            "X-Session: 1".to_string(),
            "accept: application/json".to_string(),
            "Content-Type: application/json".to_string(),
        ]
    );
    assert_eq!(session.config().headers.get("Accept"), Some("text/html"));
    assert!(!session.config().headers.contains("Content-Type"));
}

#[test]
fn test_options_do_not_leak_between_requests() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = Session::with_transport(stub);

    session
        .post(
            "https://example.test/",
            RequestOptions::new()
                .data(&b"payload"[..])
                .auth(("user", "pass"))
                .verify(false)
                .referer("https://ref.test/"),
        )
        .unwrap();
    session.get("https://example.test/", RequestOptions::new()).unwrap();

    assert_eq!(handle.transfers(), 2);
    let first = handle.options_of(0);
    assert_eq!(body_of(&first), Some(b"payload".to_vec()));
    assert!(has(&first, &TransportOption::SslVerifyPeer(false)));
    assert!(has(&first, &TransportOption::SslVerifyHost(false)));
    assert!(has(&first, &TransportOption::Referer("https://ref.test/".into())));

    let second = handle.options_of(1);
    assert!(body_of(&second).is_none());
    assert!(!second.iter().any(|o| matches!(
        o,
        TransportOption::BasicAuth { .. }
            | TransportOption::SslVerifyPeer(_)
            | TransportOption::Referer(_)
    )));
}

#[test]
fn test_session_auth_and_call_override() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = SessionBuilder::new().auth(("alice", "one")).build_with(stub);

    session.get("https://example.test/", RequestOptions::new()).unwrap();
    assert!(has(
        &handle.last_options(),
        &TransportOption::BasicAuth {
            username: "alice".into(),
            password: "one".into()
        }
    ));

    session
        .get("https://example.test/", RequestOptions::new().auth(("bob", "two")))
        .unwrap();
    assert!(has(
        &handle.last_options(),
        &TransportOption::BasicAuth {
            username: "bob".into(),
            password: "two".into()
        }
    ));
}

#[test]
fn test_accept_encoding_forms() {
    let stub = StubTransport::new();
    let handle = stub.handle();
    let mut session = Session::with_transport(stub);

    session.get("https://example.test/", RequestOptions::new()).unwrap();
    assert!(has(
        &handle.last_options(),
        &TransportOption::AcceptEncoding("gzip, deflate, br".into())
    ));

    session
        .get("https://example.test/", RequestOptions::new().no_accept_encoding())
        .unwrap();
    assert!(!handle
        .last_options()
        .iter()
        .any(|o| matches!(o, TransportOption::AcceptEncoding(_))));
}

#[test]
fn test_raise_for_status() {
    let stub = StubTransport::new()
        .with_status(404)
        .with_raw_headers(b"HTTP/1.1 404 Not Found\r\n\r\n");
    let mut session = Session::with_transport(stub);

    let response = session.get("https://example.test/missing", RequestOptions::new()).unwrap();
    assert!(!response.ok);
    match response.raise_for_status() {
        Err(Error::HttpStatus { status, reason }) => {
            assert_eq!(status, 404);
            assert_eq!(reason, "Not Found");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn test_unfollowed_redirect_reports_target() {
    let stub = StubTransport::new()
        .with_status(301)
        .with_raw_headers(b"HTTP/1.1 301 Moved Permanently\r\nLocation: https://example.test/new\r\n\r\n")
        .with_redirects(0, "https://example.test/new");
    let handle = stub.handle();
    let mut session = Session::with_transport(stub);

    let response = session
        .get("https://example.test/old", RequestOptions::new().allow_redirects(false))
        .unwrap();
    assert!(has(&handle.last_options(), &TransportOption::FollowLocation(false)));
    assert!(response.ok);
    assert_eq!(response.redirect_url, "https://example.test/new");
    assert_eq!(response.headers.get("Location"), Some("https://example.test/new"));
}

#[test]
fn test_json_response() {
    let stub = StubTransport::new()
        .with_raw_headers(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n")
        .with_body(br#"{"n": 3}"#);
    let mut session = Session::with_transport(stub);

    let response = session.get("https://example.test/api", RequestOptions::new()).unwrap();
    let value: serde_json::Value = response.json().unwrap();
    assert_eq!(value["n"], 3);
}
