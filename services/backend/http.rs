/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::future::Future;

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use url::Url;

use super::{BackendError, Device, DeviceId, Template, TemplateBackend, TemplateId};

/// REST client for the template/device backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base: Url, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
            token,
        }
    }

    fn resource_url(&self, resource: &str, id: u64) -> Result<Url, BackendError> {
        let base = self.base.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{resource}/{id}"))?)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, resource: &'static str, id: u64) -> Result<T, BackendError> {
        let url = self.resource_url(resource, id)?;
        log::debug!("backend: GET {url}");
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound { resource, id });
        }
        let body = response
            .error_for_status()
            .map_err(|e| BackendError::Request(e.to_string()))?
            .text()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl TemplateBackend for HttpBackend {
    fn fetch_template(&self, id: TemplateId) -> impl Future<Output = Result<Template, BackendError>> + Send {
        self.get_json("templates", id)
    }

    fn update_template(&self, template: &Template) -> impl Future<Output = Result<(), BackendError>> + Send {
        let prepared = self
            .resource_url("templates", template.id)
            .and_then(|url| Ok((url, serde_json::to_string(template)?)));
        let id = template.id;
        async move {
            let (url, body) = prepared?;
            log::debug!("backend: PATCH {url}");
            let response = self
                .authorize(self.client.patch(url))
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .map_err(|e| BackendError::Request(e.to_string()))?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(BackendError::NotFound {
                    resource: "templates",
                    id,
                });
            }
            response
                .error_for_status()
                .map_err(|e| BackendError::Request(e.to_string()))?;
            Ok(())
        }
    }

    fn fetch_device(&self, id: DeviceId) -> impl Future<Output = Result<Device, BackendError>> + Send {
        self.get_json("devices", id)
    }
}
