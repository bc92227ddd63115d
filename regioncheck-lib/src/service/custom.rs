use std::{collections::HashMap, time::Duration};

use http::{Method, StatusCode};

use super::{RequestTemplate, ServiceProbe, arity_error, reply};
use crate::probe::{Category, Classification, ProbeResponse};

/// A simple-block service described by configuration.
///
/// Every url is probed through every outbound. The outbound is allowed when
/// no probe hits a blocked status, an empty body (if `require_body`) or one of
/// the block page markers. Latency is the mean over all probes.
#[derive(Debug, Clone)]
pub struct CustomService {
    name: String,
    templates: Vec<RequestTemplate>,
    blocked_status: Vec<StatusCode>,
    blocked_markers: Vec<String>,
    require_body: bool,
}

pub struct CustomServiceBuilder {
    name: String,
    urls: Vec<String>,
    method: Method,
    body: Option<String>,
    disable_redirect: bool,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    timeout: Option<Duration>,
    blocked_status: Vec<StatusCode>,
    blocked_markers: Vec<String>,
    require_body: bool,
}

impl CustomService {
    pub fn builder<T: Into<String>>(name: T) -> CustomServiceBuilder {
        CustomServiceBuilder {
            name: name.into(),
            urls: vec![],
            method: Method::GET,
            body: None,
            disable_redirect: false,
            headers: HashMap::new(),
            cookies: HashMap::new(),
            timeout: None,
            blocked_status: vec![StatusCode::FORBIDDEN],
            blocked_markers: vec![],
            require_body: true,
        }
    }
}

impl CustomServiceBuilder {
    pub fn url<T: Into<String>>(mut self, url: T) -> Self {
        self.urls.push(url.into());
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn body<T: Into<String>>(mut self, body: T) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn disable_redirect(mut self, disable_redirect: bool) -> Self {
        self.disable_redirect = disable_redirect;
        self
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn cookies(mut self, cookies: HashMap<String, String>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn blocked_status(mut self, status: Vec<StatusCode>) -> Self {
        self.blocked_status = status;
        self
    }

    pub fn blocked_markers(mut self, markers: Vec<String>) -> Self {
        self.blocked_markers = markers;
        self
    }

    pub fn require_body(mut self, require_body: bool) -> Self {
        self.require_body = require_body;
        self
    }

    pub fn build(self) -> CustomService {
        let templates = self
            .urls
            .into_iter()
            .map(|url| RequestTemplate {
                method: self.method.clone(),
                body: self.body.clone(),
                disable_redirect: self.disable_redirect,
                headers: self.headers.clone(),
                cookies: self.cookies.clone(),
                timeout: self.timeout,
                ..RequestTemplate::get(url)
            })
            .collect();
        CustomService {
            name: self.name,
            templates,
            blocked_status: self.blocked_status,
            blocked_markers: self.blocked_markers,
            require_body: self.require_body,
        }
    }
}

impl ServiceProbe for CustomService {
    fn name(&self) -> &str {
        &self.name
    }

    fn templates(&self) -> &[RequestTemplate] {
        &self.templates
    }

    fn classify(
        &self,
        responses: &[&ProbeResponse],
    ) -> Result<Classification, String> {
        if responses.len() != self.templates.len() || responses.is_empty() {
            return Err(arity_error(
                self.name(),
                self.templates.len(),
                responses.len(),
            ));
        }

        let replies = responses
            .iter()
            .map(|r| reply(r))
            .collect::<Result<Vec<_>, _>>()?;

        let allowed = replies.iter().all(|r| {
            !self.blocked_status.contains(&r.status)
                && !(self.require_body && r.body.is_empty())
                && !self.blocked_markers.iter().any(|m| r.body.contains(m))
        });
        let cost = replies.iter().map(|r| r.cost).sum::<Duration>()
            / replies.len() as u32;

        Ok(Classification {
            category: if allowed {
                Category::Yes
            } else {
                Category::Blocked
            },
            allowed,
            cost,
            statuses: replies.iter().map(|r| r.status).collect(),
        })
    }
}
