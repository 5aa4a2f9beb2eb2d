//! Console directory backed by the vSphere Automation REST API.
//!
//! Sessions are created with `POST /api/session` and carried in the
//! `vmware-api-session-id` header. Console tickets come from
//! `POST /api/vcenter/vm/{vm}/console/tickets` as a `wss://host:port/ticket/<id>`
//! URL, which is split into the ticket id and the ESXi backend address.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use url::{Host, Url};
use vmrc_core::{
    Authenticator, BackendAddr, ConsoleDirectory, Credentials, DirectoryError, IssuedTicket,
    SessionError, SessionToken,
};

use crate::config::DirectoryConfig;

const SESSION_HEADER: &str = "vmware-api-session-id";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct VmSummary {
    vm: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ConsoleTicket {
    ticket: String,
}

pub struct VsphereClient {
    http: reqwest::Client,
    base: Url,
    datacenter: Option<String>,
}

impl VsphereClient {
    pub fn new(url: &str, config: &DirectoryConfig) -> anyhow::Result<Self> {
        let mut base = Url::parse(url)?;
        // Accept SOAP-style URLs such as https://vc/sdk
        base.set_path("/");
        base.set_query(None);

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base,
            datacenter: config.datacenter.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url
    }

    fn vm_query(&self) -> Url {
        let mut url = self.endpoint("/api/vcenter/vm");
        if let Some(dc) = &self.datacenter {
            url.query_pairs_mut().append_pair("datacenters", dc);
        }
        url
    }

    async fn get_vms(
        &self,
        session: &SessionToken,
        url: Url,
    ) -> Result<Vec<VmSummary>, DirectoryError> {
        let response = self
            .http
            .get(url)
            .header(SESSION_HEADER, session.expose())
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        read_json(response).await
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, DirectoryError> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(DirectoryError::SessionRejected),
        s if s.is_success() => response
            .json::<T>()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string())),
        s => Err(DirectoryError::Request(format!("directory returned {s}"))),
    }
}

/// Splits a WebMKS ticket URL into the ticket id and the backend it targets.
fn parse_webmks_ticket(raw: &str) -> Result<IssuedTicket, DirectoryError> {
    let url = Url::parse(raw)
        .map_err(|e| DirectoryError::InvalidResponse(format!("ticket URL: {e}")))?;

    let host = match url.host() {
        Some(Host::Domain(d)) => d.to_string(),
        Some(Host::Ipv4(a)) => a.to_string(),
        Some(Host::Ipv6(a)) => a.to_string(),
        None => {
            return Err(DirectoryError::InvalidResponse(
                "ticket URL has no host".to_string(),
            ))
        }
    };
    let port = url.port_or_known_default().unwrap_or(443);

    let id = url
        .path()
        .strip_prefix("/ticket/")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            DirectoryError::InvalidResponse(format!("unexpected ticket path {}", url.path()))
        })?;

    Ok(IssuedTicket {
        id: id.to_string(),
        backend: BackendAddr::new(host, port),
    })
}

#[async_trait]
impl Authenticator for VsphereClient {
    async fn session_is_valid(&self, token: &SessionToken) -> Result<bool, SessionError> {
        let response = self
            .http
            .get(self.endpoint("/api/session"))
            .header(SESSION_HEADER, token.expose())
            .send()
            .await
            .map_err(|e| SessionError::Unavailable(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED => Ok(false),
            s => Err(SessionError::Unavailable(format!("session check returned {s}"))),
        }
    }

    async fn login(&self, credentials: &Credentials) -> Result<SessionToken, SessionError> {
        let response = self
            .http
            .post(self.endpoint("/api/session"))
            .basic_auth(credentials.username(), Some(credentials.password()))
            .send()
            .await
            .map_err(|e| SessionError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SessionError::Rejected(
                format!("directory refused credentials for {}", credentials.username()),
            )),
            s if s.is_success() => {
                let token: String = response
                    .json()
                    .await
                    .map_err(|e| SessionError::Unavailable(format!("login response: {e}")))?;
                Ok(SessionToken::new(token))
            }
            s => Err(SessionError::Unavailable(format!("login returned {s}"))),
        }
    }
}

#[async_trait]
impl ConsoleDirectory for VsphereClient {
    async fn list_active_consoles(
        &self,
        session: &SessionToken,
    ) -> Result<Vec<String>, DirectoryError> {
        let mut url = self.vm_query();
        url.query_pairs_mut().append_pair("power_states", "POWERED_ON");

        let mut names: Vec<String> = self
            .get_vms(session, url)
            .await?
            .into_iter()
            .map(|vm| vm.name)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn issue_ticket(
        &self,
        session: &SessionToken,
        resource: &str,
    ) -> Result<IssuedTicket, DirectoryError> {
        let mut url = self.vm_query();
        url.query_pairs_mut().append_pair("names", resource);

        let vm = self
            .get_vms(session, url)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryError::ResourceNotFound(resource.to_string()))?;

        tracing::debug!("Requesting WebMKS ticket for {} ({})", vm.name, vm.vm);
        let response = self
            .http
            .post(self.endpoint(&format!("/api/vcenter/vm/{}/console/tickets", vm.vm)))
            .header(SESSION_HEADER, session.expose())
            .json(&serde_json::json!({ "type": "WEBMKS" }))
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        let ticket: ConsoleTicket = read_json(response).await?;
        parse_webmks_ticket(&ticket.ticket)
    }
}
