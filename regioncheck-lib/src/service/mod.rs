use std::{collections::HashMap, fmt::Debug, sync::Arc, time::Duration};

use http::Method;

use crate::{
    Error,
    probe::{Classification, ProbeReply, ProbeResponse},
};

pub mod chatgpt;
pub mod custom;
pub mod google_cn;
pub mod netflix;

pub use chatgpt::ChatGpt;
pub use custom::CustomService;
pub use google_cn::GoogleCn;
pub use netflix::Netflix;

/// Browser identity sent by the built-in probes. Some targets serve a
/// different page to unknown clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/117.0.0.0 Safari/537.36 \
                                      Edg/117.0.2045.60";

/// How to build one probe per outbound.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTemplate {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub body: Option<String>,
    pub disable_redirect: bool,
    pub timeout: Option<Duration>,
}

impl RequestTemplate {
    pub fn get<T: Into<String>>(url: T) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            body: None,
            disable_redirect: false,
            timeout: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, k: K, v: V) -> Self {
        self.headers.insert(k.into(), v.into());
        self
    }

    pub fn cookie<K: Into<String>, V: Into<String>>(mut self, k: K, v: V) -> Self {
        self.cookies.insert(k.into(), v.into());
        self
    }

    pub fn body<T: Into<String>>(mut self, body: T) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn disable_redirect(mut self) -> Self {
        self.disable_redirect = true;
        self
    }
}

/// Per-service decision logic.
pub trait ServiceProbe: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Requests sent through every outbound, in probe order.
    fn templates(&self) -> &[RequestTemplate];

    /// Classify one outbound. `responses[i]` answers `templates()[i]`.
    ///
    /// Returns `Err` with a description when the outbound must be excluded
    /// because a probe it depends on failed at the transport level.
    fn classify(
        &self,
        responses: &[&ProbeResponse],
    ) -> Result<Classification, String>;
}

pub type AnyServiceProbe = Arc<dyn ServiceProbe>;

pub(crate) fn reply(response: &ProbeResponse) -> Result<&ProbeReply, String> {
    response.reply.as_ref().map_err(Clone::clone)
}

pub(crate) fn arity_error(name: &str, expected: usize, got: usize) -> String {
    format!("{name}: expected {expected} responses, got {got}")
}

/// Services looked up by name.
pub struct ServiceRegistry {
    services: HashMap<String, AnyServiceProbe>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    /// A registry holding the built-in services.
    pub fn new() -> Self {
        let builtin: [AnyServiceProbe; 3] = [
            Arc::new(ChatGpt::new()),
            Arc::new(Netflix::new()),
            Arc::new(GoogleCn::new()),
        ];
        Self {
            services: builtin
                .into_iter()
                .map(|s| (s.name().to_owned(), s))
                .collect(),
        }
    }

    pub fn register(&mut self, service: AnyServiceProbe) -> Result<(), Error> {
        let name = service.name().to_owned();
        if self.services.contains_key(&name) {
            return Err(Error::InvalidConfig(format!(
                "service {name} is already registered"
            )));
        }
        self.services.insert(name, service);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<AnyServiceProbe, Error> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownService(name.to_owned()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> =
            self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
