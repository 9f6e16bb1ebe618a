//! Low-level access to the SiriusXM endpoints
//!
//! Two hosts are involved: the REST module API (JSON, cookie authenticated)
//! and the HLS stream host (query-parameter authenticated). This layer only
//! moves bytes and reports statuses; retry policy lives in the callers.

use crate::error::{Result, SiriusXmError};
use crate::options::RelayOptions;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde_json::Value;
use tracing::{debug, warn};

/// Consumer tag sent with every stream request
pub const CONSUMER: &str = "k2";

/// Parsed REST answer with the cookies it set
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub body: Value,
    pub cookies: Vec<(String, String)>,
}

/// Raw stream host answer
#[derive(Debug, Clone)]
pub struct StreamReply {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Query parameters authenticating stream host requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthParams {
    pub token: String,
    pub gup_id: String,
}

impl AuthParams {
    pub fn query(&self) -> [(&'static str, &str); 3] {
        [
            ("token", self.token.as_str()),
            ("consumer", CONSUMER),
            ("gupId", self.gup_id.as_str()),
        ]
    }
}

pub struct UpstreamApi {
    client: Client,
    rest_base: String,
    hls_host: String,
}

impl UpstreamApi {
    pub fn new(options: &RelayOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .user_agent(&options.user_agent)
            .build()?;

        Ok(Self {
            client,
            rest_base: options.rest_base.trim_end_matches('/').to_string(),
            hls_host: options.hls_host.trim_end_matches('/').to_string(),
        })
    }

    pub fn hls_host(&self) -> &str {
        &self.hls_host
    }

    /// Absolute stream URL for a host-relative path, with exactly one `/`
    /// between host and path.
    pub fn stream_url(&self, path: &str) -> String {
        format!("{}/{}", self.hls_host, path.trim_start_matches('/'))
    }

    fn rest_url(&self, method: &str) -> String {
        format!("{}/{}", self.rest_base, method)
    }

    fn with_cookies(request: RequestBuilder, cookies: Option<&str>) -> RequestBuilder {
        match cookies {
            Some(c) => request.header(header::COOKIE, c),
            None => request,
        }
    }

    /// POSTs a JSON module request.
    pub async fn post_module(
        &self,
        method: &str,
        body: &Value,
        cookies: Option<&str>,
    ) -> Result<UpstreamReply> {
        let url = self.rest_url(method);
        debug!("POST {}", url);
        let request = Self::with_cookies(self.client.post(&url).json(body), cookies);
        self.handle_reply(method, request.send().await?).await
    }

    /// GETs a module endpoint with query parameters.
    pub async fn get_module(
        &self,
        method: &str,
        params: &[(&str, String)],
        cookies: Option<&str>,
    ) -> Result<UpstreamReply> {
        let url = self.rest_url(method);
        debug!("GET {} with {} params", url, params.len());
        let request = Self::with_cookies(self.client.get(&url).query(params), cookies);
        self.handle_reply(method, request.send().await?).await
    }

    async fn handle_reply(&self, method: &str, response: Response) -> Result<UpstreamReply> {
        let status = response.status();
        if status != StatusCode::OK {
            warn!(method, status = status.as_u16(), "Unexpected REST status");
            return Err(SiriusXmError::UpstreamStatus {
                code: status.as_u16(),
            });
        }

        let cookies = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect::<Vec<_>>();

        let text = response.text().await?;
        let body = serde_json::from_str(&text).map_err(|e| {
            warn!(method, error = %e, "REST answer is not JSON");
            SiriusXmError::decode(format!("{method}: {e}"))
        })?;

        Ok(UpstreamReply { body, cookies })
    }

    /// GETs a stream host resource. Non-2xx statuses are returned, not raised.
    pub async fn fetch_stream(&self, url: &str, auth: &AuthParams) -> Result<StreamReply> {
        debug!("GET {}", url);
        let response = self.client.get(url).query(&auth.query()).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok(StreamReply { status, body })
    }

    /// HEAD probe on the stream host; any 2xx counts as present.
    pub async fn probe(&self, url: &str, auth: &AuthParams) -> bool {
        match self.client.head(url).query(&auth.query()).send().await {
            Ok(response) => {
                debug!(status = response.status().as_u16(), "HEAD {}", url);
                response.status().is_success()
            }
            Err(e) => {
                debug!(error = %e, "HEAD {} failed", url);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url_single_slash() {
        let options = RelayOptions {
            hls_host: "https://host.example/".into(),
            ..Default::default()
        };
        let api = UpstreamApi::new(&options).unwrap();
        assert_eq!(api.stream_url("/AAC_Data/1/x.aac"), "https://host.example/AAC_Data/1/x.aac");
        assert_eq!(api.stream_url("AAC_Data/1/x.aac"), "https://host.example/AAC_Data/1/x.aac");
    }

    #[test]
    fn test_auth_query() {
        let auth = AuthParams {
            token: "t".into(),
            gup_id: "g".into(),
        };
        assert_eq!(
            auth.query(),
            [("token", "t"), ("consumer", "k2"), ("gupId", "g")]
        );
    }
}
