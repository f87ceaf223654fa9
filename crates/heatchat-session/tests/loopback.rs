//! Integration tests for `LoopbackBroker` over real localhost sockets.
//!
//! The "browser" is an opener that parses the authorization URL and
//! fires raw HTTP GETs at the redirect URI, the way a browser follows
//! GitHub's redirect.

#![cfg(feature = "loopback")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use heatchat_protocol::{ACCESS_DENIED, AuthorizationRequest, AuthorizationResult};
use heatchat_session::{AuthorizationBroker, LoopbackBroker};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

/// Sends `GET <path_and_query>` to `addr` and returns the status line.
async fn get(addr: String, path_and_query: String) -> String {
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    let request = format!("GET {path_and_query} HTTP/1.1\r\nHost: {addr}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response.lines().next().unwrap_or_default().to_string()
}

/// Returns the value of query parameter `name` in `url`.
fn query(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Maps (redirect path, state) to the path-and-query the browser requests.
type Visit = fn(&str, &str) -> String;

fn approve(path: &str, state: &str) -> String {
    format!("{path}?code=abc123&state={state}")
}

fn deny(path: &str, state: &str) -> String {
    format!("{path}?error=access_denied&error_description=The+user+has+denied&state={state}")
}

fn forged(path: &str, _state: &str) -> String {
    format!("{path}?code=abc123&state=forged")
}

fn favicon(_path: &str, _state: &str) -> String {
    "/favicon.ico".to_string()
}

/// Builds a broker whose "browser" makes each of `visits` in order and
/// collects the response status lines.
async fn broker_visiting(visits: Vec<Visit>) -> (LoopbackBroker, Arc<Mutex<Vec<String>>>) {
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&statuses);

    let broker = LoopbackBroker::bind("127.0.0.1:0").await.unwrap();
    let broker = broker.with_opener(move |url: &Url| {
        let redirect: Url = query(url, "redirect_uri").unwrap().parse().unwrap();
        let state = query(url, "state").unwrap_or_default();
        let addr = format!(
            "{}:{}",
            redirect.host_str().unwrap(),
            redirect.port().unwrap()
        );
        let targets: Vec<String> = visits
            .iter()
            .map(|visit| visit(redirect.path(), &state))
            .collect();
        let seen = Arc::clone(&seen);
        tokio::spawn(async move {
            for target in targets {
                let status = get(addr.clone(), target).await;
                seen.lock().unwrap().push(status);
            }
        });
        Ok(())
    });
    (broker, statuses)
}

/// The browser task may still be recording the last status line when
/// `authorize` returns.
async fn wait_for_statuses(statuses: &Mutex<Vec<String>>, count: usize) {
    for _ in 0..50 {
        if statuses.lock().unwrap().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn request(broker: &LoopbackBroker) -> AuthorizationRequest {
    AuthorizationRequest::new(
        "https://github.com/login/oauth/authorize".parse().unwrap(),
        "bd913073d9142854c79c",
        "read:user",
    )
    .with_redirect_uri(broker.redirect_uri().unwrap())
    .with_state("s1")
}

#[tokio::test]
async fn test_authorize_code_redirect_returns_success() {
    let (broker, _) = broker_visiting(vec![approve as Visit]).await;

    let result = broker.authorize(&request(&broker)).await.unwrap();

    assert!(result.is_success());
    assert_eq!(result.authorized_code(), Some("abc123"));
}

#[tokio::test]
async fn test_authorize_denied_redirect_returns_error() {
    let (broker, _) = broker_visiting(vec![deny as Visit]).await;

    let result = broker.authorize(&request(&broker)).await.unwrap();

    assert!(matches!(result, AuthorizationResult::Error(_)));
    assert_eq!(result.error(), Some(ACCESS_DENIED));
}

#[tokio::test]
async fn test_authorize_wrong_state_keeps_waiting() {
    let (broker, statuses) = broker_visiting(vec![forged as Visit, approve]).await;

    let result = broker.authorize(&request(&broker)).await.unwrap();

    assert_eq!(result.authorized_code(), Some("abc123"));
    wait_for_statuses(&statuses, 2).await;
    let statuses = statuses.lock().unwrap();
    assert_eq!(statuses[0], "HTTP/1.1 400 Bad Request");
    assert_eq!(statuses[1], "HTTP/1.1 200 OK");
}

#[tokio::test]
async fn test_authorize_idle_connection_does_not_block_redirect() {
    let broker = LoopbackBroker::bind("127.0.0.1:0").await.unwrap();
    let broker = broker.with_opener(|url: &Url| {
        let redirect: Url = query(url, "redirect_uri").unwrap().parse().unwrap();
        let state = query(url, "state").unwrap_or_default();
        let addr = format!(
            "{}:{}",
            redirect.host_str().unwrap(),
            redirect.port().unwrap()
        );
        let target = approve(redirect.path(), &state);
        tokio::spawn(async move {
            // Connects like a speculative preconnect and never sends a byte.
            let idle = TcpStream::connect(&addr).await.unwrap();
            get(addr, target).await;
            drop(idle);
        });
        Ok(())
    });

    let result = tokio::time::timeout(Duration::from_secs(5), broker.authorize(&request(&broker)))
        .await
        .expect("redirect should not wait behind the idle connection")
        .unwrap();

    assert_eq!(result.authorized_code(), Some("abc123"));
}

#[tokio::test]
async fn test_authorize_ignores_unrelated_paths() {
    let (broker, statuses) = broker_visiting(vec![favicon as Visit, approve]).await;

    let result = broker.authorize(&request(&broker)).await.unwrap();

    assert_eq!(result.authorized_code(), Some("abc123"));

    wait_for_statuses(&statuses, 2).await;
    let statuses = statuses.lock().unwrap();
    assert_eq!(statuses[0], "HTTP/1.1 404 Not Found");
    assert_eq!(statuses[1], "HTTP/1.1 200 OK");
}
