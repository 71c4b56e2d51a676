//! Local HTTP fake of the GitHub contents API and the funding-rate page.
//!
//! Serves on an ephemeral port with `Connection: close` on every
//! response. Implements just enough of the contents API to check the
//! optimistic-write protocol: a PUT must carry the current `sha` when
//! the file exists, and must not carry one when it does not.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use funding_signal_bot::config::{ExtractorConfig, GitHubConfig, ScraperConfig, SchedulerConfig};
use funding_signal_bot::engine::Scheduler;
use funding_signal_bot::scraper::coinglass::CoinglassSource;
use funding_signal_bot::scraper::text_scan::TextScanExtractor;
use funding_signal_bot::scraper::PageSource;
use funding_signal_bot::storage::github::GitHubStore;
use funding_signal_bot::storage::{decode_content, encode_content, PutContentsRequest, SignalStore};
use funding_signal_bot::types::{RevisionToken, Signal, TradingPair};

pub const REPO: &str = "owner/signals-repo";
pub const CONTENTS_PATH: &str = "/repos/owner/signals-repo/contents/signals.json";
pub const PAGE_PATH: &str = "/FundingRate";

/// A request as seen by the fake server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Default)]
struct FakeState {
    /// (sha, base64 content) of the stored file.
    file: Option<(String, String)>,
    next_sha: u32,
    page_body: String,
    page_status: u16,
    get_status: Option<u16>,
    put_status: Option<u16>,
    requests: Vec<RecordedRequest>,
}

#[derive(Clone)]
pub struct FakeGitHub {
    pub base_url: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeGitHub {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(FakeState {
            page_status: 200,
            ..FakeState::default()
        }));

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let st = server_state.clone();
                tokio::spawn(async move {
                    let _ = handle(stream, st).await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn set_page(&self, status: u16, body: &str) {
        let mut st = self.state.lock().unwrap();
        st.page_status = status;
        st.page_body = body.to_string();
    }

    /// Force every contents GET to answer with `status`.
    pub fn fail_gets(&self, status: u16) {
        self.state.lock().unwrap().get_status = Some(status);
    }

    /// Force every contents PUT to answer with `status`.
    pub fn fail_puts(&self, status: u16) {
        self.state.lock().unwrap().put_status = Some(status);
    }

    pub fn seed_file(&self, sha: &str, signals: &[Signal]) {
        let content = encode_content(signals).unwrap();
        self.state.lock().unwrap().file = Some((sha.to_string(), content));
    }

    pub fn current_sha(&self) -> Option<String> {
        self.state.lock().unwrap().file.as_ref().map(|(s, _)| s.clone())
    }

    pub fn stored_signals(&self) -> Option<Vec<Signal>> {
        let st = self.state.lock().unwrap();
        st.file.as_ref().map(|(_, c)| decode_content(c).unwrap())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn puts(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "PUT")
            .collect()
    }

    pub fn github_config(&self) -> GitHubConfig {
        GitHubConfig {
            api_base: self.base_url.clone(),
            repo: REPO.to_string(),
            timeout_secs: 5,
            token: secrecy::SecretString::new("ghp_test_token".to_string()),
            ..GitHubConfig::default()
        }
    }

    pub fn scraper_config(&self, pairs: &[&str]) -> ScraperConfig {
        ScraperConfig {
            url: format!("{}{}", self.base_url, PAGE_PATH),
            timeout_secs: 5,
            pairs: pairs.iter().map(|p| p.parse().unwrap()).collect(),
            ..ScraperConfig::default()
        }
    }
}

async fn handle(mut stream: TcpStream, state: Arc<Mutex<FakeState>>) -> std::io::Result<()> {
    let request = read_request(&mut stream).await?;
    let (status, body) = respond(&state, &request);
    state.lock().unwrap().requests.push(request);

    let reason = match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = head_end + 4;
    while buf.len() < body_start + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[body_start..]).to_string();

    Ok(RecordedRequest {
        method,
        path,
        headers,
        body,
    })
}

fn respond(state: &Arc<Mutex<FakeState>>, req: &RecordedRequest) -> (u16, String) {
    let mut st = state.lock().unwrap();

    match (req.method.as_str(), req.path.as_str()) {
        ("GET", PAGE_PATH) => (st.page_status, st.page_body.clone()),
        ("GET", CONTENTS_PATH) => {
            if let Some(status) = st.get_status {
                return (status, json!({"message": "Server Error"}).to_string());
            }
            match &st.file {
                Some((sha, content)) => {
                    // The real API wraps base64 at 60 columns.
                    let wrapped: String = content
                        .as_bytes()
                        .chunks(60)
                        .map(|c| format!("{}\n", String::from_utf8_lossy(c)))
                        .collect();
                    let body = json!({
                        "name": "signals.json",
                        "path": "signals.json",
                        "sha": sha,
                        "encoding": "base64",
                        "content": wrapped,
                    });
                    (200, body.to_string())
                }
                None => (404, json!({"message": "Not Found"}).to_string()),
            }
        }
        ("PUT", CONTENTS_PATH) => {
            if let Some(status) = st.put_status {
                return (status, json!({"message": "Server Error"}).to_string());
            }
            let Ok(put) = serde_json::from_str::<PutContentsRequest>(&req.body) else {
                return (422, json!({"message": "Invalid request"}).to_string());
            };
            let current = st.file.as_ref().map(|(s, _)| s.clone());
            match (&current, &put.sha) {
                (Some(cur), Some(given)) if cur == given => {}
                (None, None) => {}
                (Some(_), _) => {
                    return (409, json!({"message": "sha does not match"}).to_string());
                }
                (None, Some(_)) => {
                    return (422, json!({"message": "sha given for new file"}).to_string());
                }
            }
            st.next_sha += 1;
            let sha = format!("sha-{}", st.next_sha);
            st.file = Some((sha.clone(), put.content));
            let status = if current.is_some() { 200 } else { 201 };
            (status, json!({"content": {"sha": sha}}).to_string())
        }
        _ => (404, json!({"message": "Not Found"}).to_string()),
    }
}

fn signal(base: &str, rate: f64) -> Signal {
    Signal::from_rate(&TradingPair::new(base, "USDT"), rate, 0.05, "17.10.2026 14:30 CET".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_write_creates_file_without_sha() {
        let gh = FakeGitHub::start().await;
        let store = GitHubStore::new(&gh.github_config()).unwrap();

        assert!(store.get_revision().await.is_none());
        assert!(store.write(&[signal("BTC", 0.12)]).await);

        let puts = gh.puts();
        assert_eq!(puts.len(), 1);
        assert!(puts[0].json().get("sha").is_none());
        assert_eq!(gh.stored_signals().unwrap(), vec![signal("BTC", 0.12)]);
        assert_eq!(gh.current_sha().as_deref(), Some("sha-1"));
    }

    #[tokio::test]
    async fn test_update_passes_current_sha_unchanged() {
        let gh = FakeGitHub::start().await;
        gh.seed_file("3d21ec53a331a6f0", &[signal("ETH", 0.01)]);
        let store = GitHubStore::new(&gh.github_config()).unwrap();

        assert_eq!(
            store.get_revision().await,
            Some(RevisionToken("3d21ec53a331a6f0".into()))
        );
        assert!(store.write(&[signal("BTC", 0.2), signal("SOL", -0.01)]).await);

        let put = &gh.puts()[0];
        assert_eq!(put.json()["sha"], "3d21ec53a331a6f0");
        assert!(put.json()["message"].as_str().unwrap().starts_with("Update: "));
        assert!(put.json()["message"].as_str().unwrap().ends_with(" CET"));

        let stored = gh.stored_signals().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].funding, "-0.010%");
    }

    #[tokio::test]
    async fn test_requests_are_authenticated() {
        let gh = FakeGitHub::start().await;
        let store = GitHubStore::new(&gh.github_config()).unwrap();
        store.write(&[signal("BTC", 0.1)]).await;

        let requests = gh.requests();
        assert_eq!(requests.len(), 2);
        for req in &requests {
            assert_eq!(req.path, CONTENTS_PATH);
            assert_eq!(req.header("authorization"), Some("Bearer ghp_test_token"));
            assert_eq!(req.header("accept"), Some("application/vnd.github+json"));
            assert!(req.header("user-agent").unwrap().starts_with("funding-signal-bot/"));
        }
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[1].method, "PUT");
    }

    #[tokio::test]
    async fn test_put_failure_reports_false() {
        let gh = FakeGitHub::start().await;
        gh.fail_puts(500);
        let store = GitHubStore::new(&gh.github_config()).unwrap();

        assert!(!store.write(&[signal("BTC", 0.1)]).await);
        assert!(gh.stored_signals().is_none());
    }

    #[tokio::test]
    async fn test_revision_read_failure_means_no_sha() {
        let gh = FakeGitHub::start().await;
        gh.fail_gets(502);
        let store = GitHubStore::new(&gh.github_config()).unwrap();

        assert!(store.get_revision().await.is_none());
        assert!(store.write(&[signal("BTC", 0.1)]).await);
        assert!(gh.puts()[0].json().get("sha").is_none());
    }

    #[tokio::test]
    async fn test_stale_sha_conflict_reports_false() {
        let gh = FakeGitHub::start().await;
        gh.seed_file("old", &[signal("BTC", 0.1)]);
        gh.fail_gets(500);
        let store = GitHubStore::new(&gh.github_config()).unwrap();

        assert!(!store.write(&[signal("BTC", 0.3)]).await);
        assert_eq!(gh.stored_signals().unwrap()[0].funding, "0.100%");
    }

    #[tokio::test]
    async fn test_read_document_roundtrip() {
        let gh = FakeGitHub::start().await;
        let store = GitHubStore::new(&gh.github_config()).unwrap();
        assert!(store.read_document().await.unwrap().is_none());

        let signals = vec![signal("BTC", 0.12), signal("ETH", -0.02), signal("XRP", 0.05)];
        assert!(store.write(&signals).await);

        let doc = store.read_document().await.unwrap().unwrap();
        assert_eq!(doc.signals, signals);
        assert_eq!(doc.revision, Some(RevisionToken("sha-1".into())));
    }

    #[tokio::test]
    async fn test_consecutive_writes_follow_sha() {
        let gh = FakeGitHub::start().await;
        let store = GitHubStore::new(&gh.github_config()).unwrap();

        assert!(store.write(&[signal("BTC", 0.1)]).await);
        assert!(store.write(&[signal("ETH", 0.2)]).await);
        assert!(store.write(&[signal("SOL", 0.3)]).await);

        let puts = gh.puts();
        assert!(puts[0].json().get("sha").is_none());
        assert_eq!(puts[1].json()["sha"], "sha-1");
        assert_eq!(puts[2].json()["sha"], "sha-2");
        assert_eq!(gh.stored_signals().unwrap(), vec![signal("SOL", 0.3)]);
    }

    #[tokio::test]
    async fn test_page_source_fetch_and_status() {
        let gh = FakeGitHub::start().await;
        gh.set_page(200, "<td>BTC</td><td>Binance</td><td>0.01%</td>");
        let source = CoinglassSource::new(&gh.scraper_config(&["BTC/USDT"])).unwrap();

        let body = source.fetch_page().await.unwrap();
        assert!(body.contains("Binance"));
        let ua = gh.requests()[0].header("user-agent").unwrap().to_string();
        assert!(ua.starts_with("Mozilla/5.0"));

        gh.set_page(503, "unavailable");
        assert!(source.fetch_page().await.is_err());
    }

    #[tokio::test]
    async fn test_full_cycle_over_http() {
        let gh = FakeGitHub::start().await;
        let page = format!(
            "<html>...btcusdt chart binance rate +0.12% today...{}\
             <tr><td>ETH</td><td>OKX</td><td>-0.02 %</td></tr></html>",
            "<br>".repeat(100)
        );
        gh.set_page(200, &page);

        let scraper = gh.scraper_config(&["BTC/USDT", "ETH/USDT", "DOGE/USDT"]);
        let mut sched = Scheduler::new(
            Box::new(CoinglassSource::new(&scraper).unwrap()),
            Box::new(TextScanExtractor::new(ExtractorConfig::default()).unwrap()),
            Box::new(GitHubStore::new(&gh.github_config()).unwrap()),
            scraper.pairs.clone(),
            SchedulerConfig::default(),
        );

        let report = sched.run_cycle().await.unwrap();
        assert!(report.write_succeeded);

        let stored = gh.stored_signals().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].pair, "BTC/USDT");
        assert_eq!(stored[0].funding, "0.120%");
        assert!(stored[0].profitable);
        assert_eq!(stored[1].pair, "ETH/USDT");
        assert_eq!(stored[1].funding, "-0.020%");
        assert_eq!(stored[1].exchange, "Binance");
    }

    #[tokio::test]
    async fn test_page_error_cycle_makes_no_github_calls() {
        let gh = FakeGitHub::start().await;
        gh.set_page(500, "boom");

        let scraper = gh.scraper_config(&["BTC/USDT"]);
        let mut sched = Scheduler::new(
            Box::new(CoinglassSource::new(&scraper).unwrap()),
            Box::new(TextScanExtractor::new(ExtractorConfig::default()).unwrap()),
            Box::new(GitHubStore::new(&gh.github_config()).unwrap()),
            scraper.pairs.clone(),
            SchedulerConfig::default(),
        );

        let report = sched.run_cycle().await.unwrap();
        assert!(report.fetch_failed);
        assert!(!report.write_attempted);
        assert!(gh.requests().iter().all(|r| r.path == PAGE_PATH));
    }
}
