use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use http::{
    Method, Request, Response, StatusCode,
    header::{COOKIE, LOCATION},
};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace};
use url::Url;

use super::{HttpClient, new_http_client};
use crate::{
    common::timed_future::TimedFuture,
    config::{OutboundOpts, internal::DEFAULT_REQUEST_TIMEOUT},
    probe::{
        BatchExecutor, Outbound, ProbeReply, ProbeRequest, ProbeResponse,
        TransportError, whole_millis,
    },
};

/// Runs probe batches over plain HTTP(S), one client per outbound.
pub struct HttpBatchExecutor {
    clients: HashMap<Outbound, HttpClient>,
    default_timeout: Duration,
}

impl Default for HttpBatchExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl HttpBatchExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            default_timeout,
        }
    }

    pub fn from_outbounds(
        outbounds: &[OutboundOpts],
        default_timeout: Duration,
    ) -> std::io::Result<Self> {
        let mut executor = Self::new(default_timeout);
        for o in outbounds {
            executor.add_outbound(o)?;
        }
        Ok(executor)
    }

    pub fn add_outbound(&mut self, opts: &OutboundOpts) -> std::io::Result<()> {
        let client = new_http_client(opts.local_address)?;
        self.clients.insert(opts.name.clone(), client);
        Ok(())
    }

    async fn execute(&self, req: ProbeRequest) -> ProbeResponse {
        let reply = match self.clients.get(&req.outbound) {
            Some(client) => {
                send(client, &req, req.timeout.unwrap_or(self.default_timeout))
                    .await
            }
            None => Err(format!("outbound not found: {}", req.outbound)),
        };
        if let Err(e) = &reply {
            debug!("probe {} via {} failed: {}", req.url, req.outbound, e);
        }
        ProbeResponse {
            outbound: req.outbound,
            probe: req.probe,
            reply,
        }
    }
}

/// Redirect hops followed before a probe gives up.
const MAX_REDIRECTS: usize = 10;

fn validate(requests: &[ProbeRequest]) -> Result<(), TransportError> {
    if requests.is_empty() {
        return Err(TransportError::new("requests must not be empty"));
    }
    for r in requests {
        if r.url.is_empty() {
            return Err(TransportError::new("url must not be empty"));
        }
        Url::parse(&r.url).map_err(|e| {
            TransportError::new(format!("invalid url {}: {}", r.url, e))
        })?;
    }
    Ok(())
}

fn build_request(
    req: &ProbeRequest,
    method: &Method,
    url: &Url,
    body: Option<&str>,
    with_cookies: bool,
) -> Result<Request<Full<Bytes>>, String> {
    let mut builder = Request::builder().method(method.clone()).uri(url.as_str());
    for (k, v) in &req.headers {
        if !with_cookies && k.eq_ignore_ascii_case(COOKIE.as_str()) {
            continue;
        }
        builder = builder.header(k.as_str(), v.as_str());
    }
    if with_cookies && !req.cookies.is_empty() {
        let mut cookies: Vec<_> =
            req.cookies.iter().map(|(k, v)| format!("{k}={v}")).collect();
        cookies.sort_unstable();
        builder = builder.header(COOKIE, cookies.join("; "));
    }
    let body = body.map(|b| Bytes::from(b.to_owned())).unwrap_or_default();
    builder
        .body(Full::new(body))
        .map_err(|e| format!("failed to create http request: {e}"))
}

/// Cookies only follow a redirect to the same host or one of its subdomains.
fn keeps_cookies(origin: &Url, target: &Url) -> bool {
    match (origin.host_str(), target.host_str()) {
        (Some(origin), Some(target)) => {
            target == origin
                || target
                    .strip_suffix(origin)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        _ => false,
    }
}

/// Sends `req` and follows 301, 302, 303, 307 and 308 responses unless
/// redirects are disabled. After 301 to 303 the body is dropped and any
/// method but HEAD becomes GET.
async fn follow_redirects(
    client: &HttpClient,
    req: &ProbeRequest,
) -> Result<Response<Incoming>, String> {
    let origin = Url::parse(&req.url)
        .map_err(|e| format!("failed to create http request: {e}"))?;
    let mut url = origin.clone();
    let mut method = req.method.clone();
    let mut body = req.body.as_deref();

    for _ in 0..=MAX_REDIRECTS {
        let request = build_request(
            req,
            &method,
            &url,
            body,
            keeps_cookies(&origin, &url),
        )?;
        let res = client
            .request(request)
            .await
            .map_err(|e| format!("failed to do http request: {e}"))?;
        if req.disable_redirect {
            return Ok(res);
        }

        match res.status() {
            StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER => {
                if method != Method::HEAD {
                    method = Method::GET;
                }
                body = None;
            }
            StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => {}
            _ => return Ok(res),
        }
        let Some(location) = res.headers().get(LOCATION) else {
            return Ok(res);
        };
        let location = location
            .to_str()
            .map_err(|e| format!("invalid redirect location: {e}"))?;
        let next = url
            .join(location)
            .map_err(|e| format!("invalid redirect location {location}: {e}"))?;
        trace!("probe {} via {} redirected to {}", url, req.outbound, next);
        url = next;
    }

    Err(format!("stopped after {MAX_REDIRECTS} redirects"))
}

async fn send(
    client: &HttpClient,
    req: &ProbeRequest,
    timeout: Duration,
) -> Result<ProbeReply, String> {
    let started_at = Instant::now();
    let deadline = started_at + timeout;

    let resp = TimedFuture::new(
        Box::pin(follow_redirects(client, req)),
        Some(started_at),
    );
    let (res, cost) = timeout_at(deadline, resp)
        .await
        .map_err(|_| format!("timeout for {}", req.url))?;
    let res = res?;

    let status = res.status();
    let mut headers = HashMap::with_capacity(res.headers().keys_len());
    for name in res.headers().keys() {
        let joined = res
            .headers()
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        headers.insert(name.as_str().to_owned(), joined);
    }

    let body = timeout_at(deadline, res.into_body().collect())
        .await
        .map_err(|_| format!("timeout for {}", req.url))?
        .map_err(|e: hyper::Error| {
            format!("failed to read http response body: {e}")
        })?
        .to_bytes();

    trace!(
        "probe {} via {} returned {} in {}ms",
        req.url,
        req.outbound,
        status,
        cost.as_millis()
    );

    Ok(ProbeReply {
        status,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
        cost: whole_millis(cost),
    })
}

#[async_trait]
impl BatchExecutor for HttpBatchExecutor {
    async fn run_batch(
        &self,
        requests: Vec<ProbeRequest>,
    ) -> Result<Vec<ProbeResponse>, TransportError> {
        validate(&requests)?;
        Ok(join_all(requests.into_iter().map(|r| self.execute(r))).await)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, net::Ipv4Addr, time::Duration};

    use http::{Method, StatusCode};
    use httpmock::prelude::*;

    use super::{HttpBatchExecutor, keeps_cookies};
    use crate::{
        config::OutboundOpts,
        probe::{BatchExecutor, Outbound, ProbeRequest},
        tests::initialize,
    };

    fn executor(names: &[&str]) -> HttpBatchExecutor {
        let outbounds: Vec<_> = names
            .iter()
            .map(|n| OutboundOpts {
                name: Outbound::from(*n),
                local_address: Some(Ipv4Addr::LOCALHOST.into()),
            })
            .collect();
        HttpBatchExecutor::from_outbounds(&outbounds, Duration::from_secs(5))
            .unwrap()
    }

    fn request(url: String, outbound: &str, probe: usize) -> ProbeRequest {
        ProbeRequest {
            method: Method::GET,
            url,
            headers: HashMap::new(),
            cookies: HashMap::new(),
            body: None,
            disable_redirect: false,
            outbound: Outbound::from(outbound),
            probe,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn test_headers_cookies_and_reply() {
        initialize();
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/title/80018499")
                    .header("user-agent", "probe-test")
                    .header("cookie", "GPS=1; PREF=tz=Asia.Shanghai");
                then.status(200)
                    .header("X-Originating-Url", "https://n/US-x/81280792")
                    .body("catalog");
            })
            .await;

        let mut req = request(server.url("/title/80018499"), "wan1", 2);
        req.headers.insert("User-Agent".into(), "probe-test".into());
        req.cookies.insert("GPS".into(), "1".into());
        req.cookies.insert("PREF".into(), "tz=Asia.Shanghai".into());

        let responses = executor(&["wan1"]).run_batch(vec![req]).await.unwrap();
        mock.assert_async().await;

        assert_eq!(responses.len(), 1);
        let response = &responses[0];
        assert_eq!(response.outbound.as_str(), "wan1");
        assert_eq!(response.probe, 2);
        let reply = response.ok().expect("probe should succeed");
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, "catalog");
        assert_eq!(
            reply.header("x-originating-url"),
            Some("https://n/US-x/81280792")
        );
    }

    #[tokio::test]
    async fn test_responses_keep_request_order() {
        initialize();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/slow");
                then.status(200)
                    .delay(Duration::from_millis(300))
                    .body("slow");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.path("/fast");
                then.status(403).body("fast");
            })
            .await;

        let responses = executor(&["a", "b"])
            .run_batch(vec![
                request(server.url("/slow"), "a", 0),
                request(server.url("/fast"), "b", 0),
                request(server.url("/fast"), "missing", 0),
            ])
            .await
            .unwrap();

        assert_eq!(responses[0].outbound.as_str(), "a");
        assert_eq!(responses[0].ok().unwrap().body, "slow");
        assert!(responses[0].ok().unwrap().cost >= Duration::from_millis(300));
        assert_eq!(responses[1].outbound.as_str(), "b");
        assert_eq!(responses[1].ok().unwrap().status, StatusCode::FORBIDDEN);
        assert_eq!(
            responses[2].error(),
            Some("outbound not found: missing")
        );
    }

    #[tokio::test]
    async fn test_timeout_is_per_request() {
        initialize();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/hang");
                then.status(200).delay(Duration::from_secs(3));
            })
            .await;

        let mut req = request(server.url("/hang"), "a", 0);
        req.timeout = Some(Duration::from_millis(200));
        let responses = executor(&["a"]).run_batch(vec![req]).await.unwrap();
        let err = responses[0].error().expect("probe should time out");
        assert!(err.contains("timeout"), "{err}");
    }

    #[tokio::test]
    async fn test_invalid_batch() {
        let executor = executor(&["a"]);
        assert_eq!(
            executor.run_batch(vec![]).await.unwrap_err().to_string(),
            "requests must not be empty"
        );
        assert_eq!(
            executor
                .run_batch(vec![request(String::new(), "a", 0)])
                .await
                .unwrap_err()
                .to_string(),
            "url must not be empty"
        );
    }

    #[tokio::test]
    async fn test_follows_redirects() {
        initialize();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/old");
                then.status(301).header("Location", "/new");
            })
            .await;
        let target = server
            .mock_async(|when, then| {
                when.method(GET).path("/new").header("cookie", "GPS=1");
                then.status(200)
                    .header("X-Originating-Url", "https://n/JP-ja/81280792")
                    .body("welcome");
            })
            .await;

        let mut req = request(server.url("/old"), "a", 0);
        req.cookies.insert("GPS".into(), "1".into());
        let responses = executor(&["a"]).run_batch(vec![req]).await.unwrap();
        target.assert_async().await;

        let reply = responses[0].ok().expect("redirect should be followed");
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, "welcome");
        assert_eq!(
            reply.header("x-originating-url"),
            Some("https://n/JP-ja/81280792")
        );
    }

    #[tokio::test]
    async fn test_disabled_redirect_returns_first_response() {
        initialize();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/old");
                then.status(301).header("Location", "/new");
            })
            .await;
        let target = server
            .mock_async(|when, then| {
                when.path("/new");
                then.status(200).body("welcome");
            })
            .await;

        let mut req = request(server.url("/old"), "a", 0);
        req.disable_redirect = true;
        let responses = executor(&["a"]).run_batch(vec![req]).await.unwrap();

        let reply = responses[0].ok().unwrap();
        assert_eq!(reply.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(reply.header("location"), Some("/new"));
        assert!(reply.body.is_empty());
        assert_eq!(target.hits_async().await, 0);
    }

    #[tokio::test]
    async fn test_see_other_switches_to_get() {
        initialize();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/form").body("region=check");
                then.status(303).header("Location", "/done");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/done");
                then.status(200).body("done");
            })
            .await;

        let mut req = request(server.url("/form"), "a", 0);
        req.method = Method::POST;
        req.body = Some("region=check".to_owned());
        let responses = executor(&["a"]).run_batch(vec![req]).await.unwrap();

        let reply = responses[0].ok().unwrap();
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, "done");
    }

    #[tokio::test]
    async fn test_redirect_loop_gives_up() {
        initialize();
        let server = MockServer::start_async().await;
        let looped = server
            .mock_async(|when, then| {
                when.path("/loop");
                then.status(302).header("Location", "/loop");
            })
            .await;

        let responses = executor(&["a"])
            .run_batch(vec![request(server.url("/loop"), "a", 0)])
            .await
            .unwrap();
        assert_eq!(responses[0].error(), Some("stopped after 10 redirects"));
        assert_eq!(looped.hits_async().await, 11);
    }

    #[test]
    fn test_cookies_stay_on_origin_host() {
        let origin = url::Url::parse("https://youtube.com/premium").unwrap();
        for (target, keep) in [
            ("https://youtube.com/other", true),
            ("https://www.youtube.com/premium", true),
            ("https://notyoutube.com/", false),
            ("https://google.com/", false),
        ] {
            let target = url::Url::parse(target).unwrap();
            assert_eq!(keeps_cookies(&origin, &target), keep, "{target}");
        }
    }

    #[tokio::test]
    async fn test_cost_is_whole_millis() {
        initialize();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/ping");
                then.status(204).delay(Duration::from_millis(20));
            })
            .await;

        let responses = executor(&["a"])
            .run_batch(vec![request(server.url("/ping"), "a", 0)])
            .await
            .unwrap();
        let cost = responses[0].ok().unwrap().cost;
        assert_eq!(cost.subsec_nanos() % 1_000_000, 0);
        assert!(cost >= Duration::from_millis(20));
    }
}
