use http::StatusCode;

use super::{BROWSER_USER_AGENT, RequestTemplate, ServiceProbe, arity_error, reply};
use crate::probe::{Category, Classification, ProbeResponse};

const URL: &str = "https://chat.openai.com";
const BLOCK_PAGE_MARKER: &str = "Sorry, you have been blocked";

/// Allowed unless the edge returns 403, an empty page or its block page.
#[derive(Debug)]
pub struct ChatGpt {
    templates: Vec<RequestTemplate>,
}

impl Default for ChatGpt {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatGpt {
    pub fn new() -> Self {
        Self {
            templates: vec![
                RequestTemplate::get(URL)
                    .header("Host", "chat.openai.com")
                    .header("User-Agent", BROWSER_USER_AGENT)
                    .header("Accept-Language", "en"),
            ],
        }
    }
}

impl ServiceProbe for ChatGpt {
    fn name(&self) -> &str {
        "chatgpt"
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

        let allowed = r.status != StatusCode::FORBIDDEN
            && !r.body.is_empty()
            && !r.body.contains(BLOCK_PAGE_MARKER);

        Ok(Classification {
            category: if allowed {
                Category::Yes
            } else {
                Category::Blocked
            },
            allowed,
            cost: r.cost,
            statuses: vec![r.status],
        })
    }
}
