use std::{future::Future, time::Duration};

use log::debug;

use crate::{
    proto::{parse_response, Request, Response},
    Result,
};

/// Carries batched wwr commands to the host and hands back its response.
///
/// Futures must be `Send` so requests can run on their own tasks while the
/// poll loop keeps ticking.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response>> + Send;
}

/// REAPER's built in web interface, e.g. `http://127.0.0.1:8080`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<HttpTransport> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, request: &Request) -> String {
        format!("{}/{}", self.base_url, request.path())
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response>> + Send {
        let url = self.url(&request);
        let client = self.client.clone();
        async move {
            debug!("request {}: {}", request.seq, url);
            let body = client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            Ok(Response {
                seq: request.seq,
                tokens: parse_response(&body)?,
            })
        }
    }
}
