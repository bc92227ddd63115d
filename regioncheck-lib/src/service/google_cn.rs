use http::StatusCode;

use super::{BROWSER_USER_AGENT, RequestTemplate, ServiceProbe, arity_error, reply};
use crate::probe::{Category, Classification, ProbeResponse};

const URL: &str = "https://www.youtube.com/premium";
/// Only present on pages served by the mainland mirror.
const MIRROR_MARKER: &str = "www.google.cn";

/// Detects whether an outbound lands on the Google CN mirror. An outbound is
/// allowed when it escapes the mirror.
#[derive(Debug)]
pub struct GoogleCn {
    templates: Vec<RequestTemplate>,
}

impl Default for GoogleCn {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleCn {
    pub fn new() -> Self {
        Self {
            templates: vec![
                RequestTemplate::get(URL)
                    .header("Host", "www.youtube.com")
                    .header("User-Agent", BROWSER_USER_AGENT)
                    .header("Accept-Language", "en")
                    .cookie("YSC", "BiCUU3-5Gdk")
                    .cookie("CONSENT", "YES+cb.20220301-11-p0.en+FX+700")
                    .cookie("GPS", "1")
                    .cookie("VISITOR_INFO1_LIVE", "4VwPMkB7W5A")
                    .cookie("PREF", "tz=Asia.Shanghai")
                    .cookie("_gcl_au", "1.1.1809531354.1646633279"),
            ],
        }
    }
}

impl ServiceProbe for GoogleCn {
    fn name(&self) -> &str {
        "google-cn"
    }

    fn templates(&self) -> &[RequestTemplate] {
        &self.templates
    }

    fn classify(
        &self,
        responses: &[&ProbeResponse],
    ) -> Result<Classification, String> {
        let [response] = responses else {
            return Err(arity_error(self.name(), 1, responses.len()));
        };
        let r = reply(response)?;

        let mirror = !(r.status == StatusCode::OK
            && !r.body.is_empty()
            && !r.body.contains(MIRROR_MARKER));

        Ok(Classification {
            category: if mirror {
                Category::Mirror
            } else {
                Category::Global
            },
            allowed: !mirror,
            cost: r.cost,
            statuses: vec![r.status],
        })
    }
}
