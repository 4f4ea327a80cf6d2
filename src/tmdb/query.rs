use crate::models::FilterCriteria;

pub const DEFAULT_BASE: &str = "https://api.themoviedb.org/3";

pub const PARAM_COUNTRY: &str = "certification_country";
pub const PARAM_CERTIFICATION: &str = "certification";
pub const PARAM_CERTIFICATION_CEILING: &str = "certification.lte";
pub const PARAM_RELEASE_YEAR: &str = "primary_release_year";
pub const PARAM_GENRE: &str = "with_genres";
pub const PARAM_VOTE_FLOOR: &str = "vote_count.gte";
pub const PARAM_SORT: &str = "sort_by";
pub const PARAM_API_KEY: &str = "api_key";

const MARKET: &str = "US";
const CERTIFICATION_CEILING: &str = "R";
const NC17: &str = "NC-17";
const NC17_VOTE_FLOOR: u32 = 15;
const DEFAULT_VOTE_FLOOR: u32 = 20;

/// Endpoint plus ordered query parameters for a single GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub endpoint: String,
    pub params: Vec<(String, String)>,
}

impl RequestDescriptor {
    fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            params: Vec::new(),
        }
    }

    fn push(&mut self, name: &str, value: impl Into<String>) {
        self.params.push((name.to_string(), value.into()));
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    pub fn to_url(&self) -> String {
        self.render(false)
    }

    /// URL with the credential masked, for logs and debug output.
    pub fn redacted_url(&self) -> String {
        self.render(true)
    }

    fn render(&self, redact: bool) -> String {
        if self.params.is_empty() {
            return self.endpoint.clone();
        }
        let query = self
            .params
            .iter()
            .map(|(k, v)| {
                let value = if redact && k == PARAM_API_KEY {
                    "***".to_string()
                } else {
                    urlencoding::encode(v).into_owned()
                };
                format!("{}={}", urlencoding::encode(k), value)
            })
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.endpoint, query)
    }
}

/// Turns filter criteria into discover requests; also owns the two fixed list requests.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    base_url: String,
    api_key: String,
}

impl QueryBuilder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn build(&self, criteria: &FilterCriteria) -> RequestDescriptor {
        let mut req = RequestDescriptor::new(format!("{}/discover/movie", self.base_url));
        req.push(PARAM_COUNTRY, MARKET);

        if criteria.is_any_certification() {
            req.push(PARAM_CERTIFICATION_CEILING, CERTIFICATION_CEILING);
        } else {
            req.push(PARAM_CERTIFICATION, criteria.certification_name.as_str());
        }

        if criteria.restrict_to_year {
            req.push(PARAM_RELEASE_YEAR, criteria.release_year.as_str());
        }

        if !criteria.is_any_genre() {
            req.push(PARAM_GENRE, criteria.genre_id.to_string());
        }

        req.push(
            PARAM_VOTE_FLOOR,
            vote_floor(&criteria.certification_name).to_string(),
        );
        req.push(PARAM_SORT, criteria.sort_key.as_str());
        req.push(PARAM_API_KEY, self.api_key.as_str());
        req
    }

    pub fn genre_list(&self) -> RequestDescriptor {
        let mut req = RequestDescriptor::new(format!("{}/genre/movie/list", self.base_url));
        req.push(PARAM_API_KEY, self.api_key.as_str());
        req
    }

    pub fn certification_list(&self) -> RequestDescriptor {
        let mut req =
            RequestDescriptor::new(format!("{}/certification/movie/list", self.base_url));
        req.push(PARAM_API_KEY, self.api_key.as_str());
        req
    }
}

// Few NC-17 titles exist, so their floor is lower.
fn vote_floor(certification: &str) -> u32 {
    if certification == NC17 {
        NC17_VOTE_FLOOR
    } else {
        DEFAULT_VOTE_FLOOR
    }
}
