use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info, instrument, warn};

use super::{
    AnyBatchExecutor, Outbound, OutboundReport, Outcome, ProbeRequest, ProbeResponse,
    Selection, selector::Selector, whole_millis,
};
use crate::{
    Error, Result,
    service::{AnyServiceProbe, RequestTemplate},
};

/// Builds one request per (template, outbound) pair, template-major.
pub fn build_requests(
    templates: &[RequestTemplate],
    outbounds: &[Outbound],
) -> Vec<ProbeRequest> {
    templates
        .iter()
        .enumerate()
        .flat_map(|(probe, t)| {
            outbounds.iter().map(move |outbound| ProbeRequest {
                method: t.method.clone(),
                url: t.url.clone(),
                headers: t.headers.clone(),
                cookies: t.cookies.clone(),
                body: t.body.clone(),
                disable_redirect: t.disable_redirect,
                outbound: outbound.clone(),
                probe,
                timeout: t.timeout,
            })
        })
        .collect()
}

/// Probes a service through a set of outbounds and selects the fastest one
/// that is allowed.
pub struct Evaluator {
    service: AnyServiceProbe,
    executor: AnyBatchExecutor,
}

impl Evaluator {
    pub fn new(service: AnyServiceProbe, executor: AnyBatchExecutor) -> Self {
        Self { service, executor }
    }

    pub fn service(&self) -> &AnyServiceProbe {
        &self.service
    }

    pub fn build_requests(&self, outbounds: &[Outbound]) -> Vec<ProbeRequest> {
        build_requests(self.service.templates(), outbounds)
    }

    /// `now_selected` is accepted for context only and never biases the
    /// result.
    #[instrument(skip_all, fields(service = %self.service.name()))]
    pub async fn evaluate(
        &self,
        outbounds: &[Outbound],
        now_selected: Option<&Outbound>,
    ) -> Result<Selection> {
        let outbounds = dedup(outbounds);
        if let Some(now) = now_selected {
            debug!("currently selected: {}", now);
        }
        if outbounds.is_empty() {
            return Err(Error::NoOutboundAvailable);
        }

        let requests = self.build_requests(&outbounds);
        let expected = requests.len();
        let responses = self.executor.run_batch(requests).await?;
        debug!("http requests success");

        self.reduce(&outbounds, expected, responses)
    }

    fn reduce(
        &self,
        outbounds: &[Outbound],
        expected: usize,
        responses: Vec<ProbeResponse>,
    ) -> Result<Selection> {
        if responses.len() != expected {
            return Err(Error::BatchMismatch(format!(
                "expected {} responses, got {}",
                expected,
                responses.len()
            )));
        }

        let probes = self.service.templates().len();
        let known: HashSet<&Outbound> = outbounds.iter().collect();
        let mut by_key: HashMap<(Outbound, usize), ProbeResponse> =
            HashMap::with_capacity(responses.len());
        for mut response in responses {
            if !known.contains(&response.outbound) || response.probe >= probes {
                return Err(Error::BatchMismatch(format!(
                    "unexpected response for outbound {} probe {}",
                    response.outbound, response.probe
                )));
            }
            if let Ok(reply) = &mut response.reply {
                reply.cost = whole_millis(reply.cost);
            }
            let key = (response.outbound.clone(), response.probe);
            if by_key.insert(key, response).is_some() {
                return Err(Error::BatchMismatch(
                    "duplicate response in batch".to_owned(),
                ));
            }
        }

        let mut selector = Selector::new();
        let mut reports = Vec::with_capacity(outbounds.len());
        for (index, outbound) in outbounds.iter().enumerate() {
            let group = (0..probes)
                .map(|probe| {
                    by_key.get(&(outbound.clone(), probe)).ok_or_else(|| {
                        Error::BatchMismatch(format!(
                            "missing response for outbound {outbound} probe {probe}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let outcome = match self.service.classify(&group) {
                Err(e) => {
                    error!("detour: [{}], error: [{}]", outbound, e);
                    Outcome::Excluded(e)
                }
                Ok(c) => {
                    debug!(
                        "detour: [{}], status: {:?}, category: [{}], allowed: \
                         [{}], cost: [{}ms]",
                        outbound,
                        c.statuses.iter().map(|s| s.as_u16()).collect::<Vec<_>>(),
                        c.category,
                        c.allowed,
                        c.cost.as_millis()
                    );
                    if c.allowed {
                        selector.offer(index, c.cost);
                    }
                    Outcome::Classified(c)
                }
            };
            reports.push(OutboundReport {
                outbound: outbound.clone(),
                outcome,
            });
        }

        let Some(best) = selector.best() else {
            return Err(Error::NoOutboundAvailable);
        };
        let report = &reports[best];
        let Some(classification) = report.classification().cloned() else {
            return Err(Error::NoOutboundAvailable);
        };
        info!(
            "select [{}] for {}, category: [{}], cost: [{}ms]",
            report.outbound,
            self.service.name(),
            classification.category,
            classification.cost.as_millis()
        );

        Ok(Selection {
            service: self.service.name().to_owned(),
            selected: report.outbound.clone(),
            classification,
            reports,
        })
    }
}

fn dedup(outbounds: &[Outbound]) -> Vec<Outbound> {
    let mut seen = HashSet::with_capacity(outbounds.len());
    outbounds
        .iter()
        .filter(|o| {
            let first = seen.insert(*o);
            if !first {
                warn!("duplicate outbound {} ignored", o);
            }
            first
        })
        .cloned()
        .collect()
}
