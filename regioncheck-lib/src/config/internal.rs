use std::{collections::HashSet, net::IpAddr, sync::Arc, time::Duration};

use http::{Method, StatusCode};

use super::def::{self, LogLevel};
use crate::{
    Error,
    probe::Outbound,
    service::{CustomService, ServiceRegistry},
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct InternalConfig {
    pub general: General,
    pub service: String,
    pub selected: Option<Outbound>,
    pub outbounds: Vec<OutboundOpts>,
    pub custom_services: Vec<CustomService>,
}

pub struct General {
    pub log_level: LogLevel,
    pub request_timeout: Duration,
    pub batch_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct OutboundOpts {
    pub name: Outbound,
    pub local_address: Option<IpAddr>,
}

impl InternalConfig {
    /// The built-in services plus the configured ones.
    pub fn registry(&self) -> Result<ServiceRegistry, Error> {
        let mut registry = ServiceRegistry::new();
        for s in &self.custom_services {
            registry.register(Arc::new(s.clone()))?;
        }
        Ok(registry)
    }

    pub fn outbound_names(&self) -> Vec<Outbound> {
        self.outbounds.iter().map(|o| o.name.clone()).collect()
    }
}

impl TryFrom<def::Config> for InternalConfig {
    type Error = Error;

    fn try_from(c: def::Config) -> Result<Self, Self::Error> {
        if c.outbounds.is_empty() {
            return Err(Error::InvalidConfig("missing outbounds".to_owned()));
        }

        let mut seen = HashSet::new();
        for (i, o) in c.outbounds.iter().enumerate() {
            if o.name.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "outbound {i} has an empty name"
                )));
            }
            if !seen.insert(o.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate outbound: {}",
                    o.name
                )));
            }
        }
        if let Some(selected) = &c.selected
            && !seen.contains(selected.as_str())
        {
            return Err(Error::InvalidConfig(format!(
                "selected outbound not found: {selected}"
            )));
        }

        let custom_services = c
            .custom_services
            .into_iter()
            .map(convert_custom_service)
            .collect::<Result<Vec<_>, _>>()?;

        let config = InternalConfig {
            general: General {
                log_level: c.log_level,
                request_timeout: seconds("timeout", c.timeout)
                    .map_err(Error::InvalidConfig)?
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
                batch_timeout: seconds("batch-timeout", c.batch_timeout)
                    .map_err(Error::InvalidConfig)?,
            },
            service: c.service,
            selected: c.selected.map(Outbound::from),
            outbounds: c
                .outbounds
                .into_iter()
                .map(|o| OutboundOpts {
                    name: Outbound::from(o.name),
                    local_address: o.local_address,
                })
                .collect(),
            custom_services,
        };

        // reject shadowed names and unknown services up front
        let registry = config.registry()?;
        if !config.service.is_empty() {
            registry.get(&config.service)?;
        }

        Ok(config)
    }
}

fn seconds(key: &str, value: Option<u64>) -> Result<Option<Duration>, String> {
    match value {
        Some(0) => Err(format!("{key} must be positive")),
        v => Ok(v.map(Duration::from_secs)),
    }
}

fn convert_custom_service(
    s: def::CustomServiceDef,
) -> Result<CustomService, Error> {
    if s.name.is_empty() {
        return Err(Error::InvalidConfig(
            "custom service has an empty name".to_owned(),
        ));
    }
    if s.urls.is_empty() {
        return Err(Error::InvalidConfig(format!(
            "custom service {} has no urls",
            s.name
        )));
    }
    let mut builder = CustomService::builder(s.name.as_str());
    for u in s.urls {
        url::Url::parse(&u).map_err(|e| {
            Error::InvalidConfig(format!("custom service {}: {u}: {e}", s.name))
        })?;
        builder = builder.url(u);
    }
    let blocked_status = s
        .blocked_status
        .iter()
        .map(|code| {
            StatusCode::from_u16(*code).map_err(|e| {
                Error::InvalidConfig(format!(
                    "custom service {}: status {code}: {e}",
                    s.name
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let timeout = seconds("timeout", s.timeout).map_err(|e| {
        Error::InvalidConfig(format!("custom service {}: {e}", s.name))
    })?;
    if let Some(method) = &s.method {
        let method = Method::from_bytes(method.as_bytes()).map_err(|e| {
            Error::InvalidConfig(format!(
                "custom service {}: method {method}: {e}",
                s.name
            ))
        })?;
        builder = builder.method(method);
    }
    if let Some(body) = s.body {
        builder = builder.body(body);
    }

    Ok(builder
        .headers(s.headers)
        .cookies(s.cookies)
        .disable_redirect(s.disable_redirect)
        .timeout(timeout)
        .blocked_status(blocked_status)
        .blocked_markers(s.blocked_markers)
        .require_body(s.require_body)
        .build())
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_REQUEST_TIMEOUT, InternalConfig};
    use crate::{Error, config::def};
    use http::Method;
    use std::time::Duration;

    fn convert(s: &str) -> Result<InternalConfig, Error> {
        s.parse::<def::Config>()?.try_into()
    }

    #[test]
    fn test_convert() {
        let c = convert(
            r#"
            service: claude
            batch-timeout: 30
            selected: b
            outbounds:
              - {name: a, local-address: 127.0.0.1}
              - {name: b}
            custom-services:
              - name: claude
                urls: [https://claude.ai/login, https://api.anthropic.com]
                timeout: 2
              - name: form
                urls: [https://example.com/check]
                method: POST
                body: region=1
                disable-redirect: true
            "#,
        )
        .unwrap();

        assert_eq!(c.general.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(c.general.batch_timeout, Some(Duration::from_secs(30)));
        assert_eq!(c.selected.as_ref().map(|s| s.as_str()), Some("b"));
        let names: Vec<_> =
            c.outbound_names().iter().map(|o| o.to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let registry = c.registry().unwrap();
        let claude = registry.get("claude").unwrap();
        assert_eq!(claude.templates().len(), 2);
        assert_eq!(claude.templates()[0].timeout, Some(Duration::from_secs(2)));
        assert!(!claude.templates()[0].disable_redirect);

        let binding = registry.get("form").unwrap();
        let form = &binding.templates()[0];
        assert_eq!(form.method, Method::POST);
        assert_eq!(form.body.as_deref(), Some("region=1"));
        assert!(form.disable_redirect);
    }

    #[test]
    fn test_rejects_invalid() {
        for (yaml, needle) in [
            ("service: netflix", "missing outbounds"),
            (
                "outbounds: [{name: a}, {name: a}]",
                "duplicate outbound: a",
            ),
            ("outbounds: [{name: ''}]", "empty name"),
            (
                "selected: z\noutbounds: [{name: a}]",
                "selected outbound not found: z",
            ),
            (
                "outbounds: [{name: a}]\ncustom-services: [{name: x, urls: []}]",
                "has no urls",
            ),
            (
                concat!(
                    "outbounds: [{name: a}]\n",
                    "custom-services: [{name: x, urls: ['not a url']}]",
                ),
                "custom service x",
            ),
            (
                concat!(
                    "outbounds: [{name: a}]\n",
                    "custom-services: [{name: netflix, ",
                    "urls: ['https://netflix.com']}]",
                ),
                "already registered",
            ),
            ("timeout: 0\noutbounds: [{name: a}]", "timeout must be positive"),
            (
                "batch-timeout: 0\noutbounds: [{name: a}]",
                "batch-timeout must be positive",
            ),
            (
                concat!(
                    "outbounds: [{name: a}]\n",
                    "custom-services: [{name: x, ",
                    "urls: ['https://x.io'], timeout: 0}]",
                ),
                "custom service x: timeout must be positive",
            ),
            (
                concat!(
                    "outbounds: [{name: a}]\n",
                    "custom-services: [{name: x, ",
                    "urls: ['https://x.io'], method: 'G T'}]",
                ),
                "custom service x: method",
            ),
        ] {
            match convert(yaml) {
                Err(Error::InvalidConfig(msg)) => {
                    assert!(msg.contains(needle), "{msg} does not contain {needle}")
                }
                Err(e) => panic!("unexpected error for {yaml}: {e}"),
                Ok(_) => panic!("config should be rejected: {yaml}"),
            }
        }
    }

    #[test]
    fn test_unknown_service() {
        assert!(matches!(
            convert("service: hulu\noutbounds: [{name: a}]"),
            Err(Error::UnknownService(s)) if s == "hulu"
        ));
    }
}
