use http::StatusCode;

use super::{BROWSER_USER_AGENT, RequestTemplate, ServiceProbe, arity_error, reply};
use crate::probe::{Category, Classification, ProbeResponse};

/// Titles only listed in the full catalog; originals-only regions answer 404.
const CATALOG_TITLES: [&str; 2] = [
    "https://www.netflix.com/title/81280792",
    "https://www.netflix.com/title/70143836",
];
/// Title whose response carries the region in `X-Originating-Url`.
const REGION_TITLE: &str = "https://www.netflix.com/title/80018499";
const ORIGINATING_URL_HEADER: &str = "X-Originating-Url";

#[derive(Debug)]
pub struct Netflix {
    templates: Vec<RequestTemplate>,
}

impl Default for Netflix {
    fn default() -> Self {
        Self::new()
    }
}

impl Netflix {
    pub fn new() -> Self {
        let template = |url: &str| {
            RequestTemplate::get(url)
                .header("Host", "www.netflix.com")
                .header("User-Agent", BROWSER_USER_AGENT)
        };
        Self {
            templates: vec![
                template(CATALOG_TITLES[0]),
                template(CATALOG_TITLES[1]),
                template(REGION_TITLE),
            ],
        }
    }
}

/// Extracts the region code from an originating URL such as
/// `https://www.netflix.com/us-en/title/80018499`.
///
/// Returns `None` when the path carries no locale segment.
pub fn region_from_originating_url(url: &str) -> Option<String> {
    let segment = url.split('/').nth(3)?;
    if segment.is_empty() || segment == "title" {
        return None;
    }
    segment.split('-').next().map(str::to_uppercase)
}

impl ServiceProbe for Netflix {
    fn name(&self) -> &str {
        "netflix"
    }

    fn templates(&self) -> &[RequestTemplate] {
        &self.templates
    }

    fn classify(
        &self,
        responses: &[&ProbeResponse],
    ) -> Result<Classification, String> {
        let [first, second, region] = responses else {
            return Err(arity_error(self.name(), 3, responses.len()));
        };
        let (r1, r2) = match (reply(first), reply(second)) {
            (Ok(r1), Ok(r2)) => (r1, r2),
            (e1, e2) => {
                return Err(format!(
                    "[{}] [{}]",
                    e1.err().unwrap_or_default(),
                    e2.err().unwrap_or_default()
                ));
            }
        };

        let statuses = [r1.status, r2.status];
        let mut allowed = false;
        let mut category = Category::Failed;
        if statuses == [StatusCode::NOT_FOUND; 2] {
            category = Category::OriginalsOnly;
        }
        if statuses == [StatusCode::FORBIDDEN; 2] {
            category = Category::Blocked;
        }
        if statuses.contains(&StatusCode::OK) {
            allowed = true;
            category = region
                .ok()
                .and_then(|r| r.header(ORIGINATING_URL_HEADER))
                .and_then(region_from_originating_url)
                .map(Category::Region)
                .unwrap_or(Category::Yes);
        }

        Ok(Classification {
            category,
            allowed,
            cost: (r1.cost + r2.cost) / 2,
            statuses: statuses.to_vec(),
        })
    }
}
