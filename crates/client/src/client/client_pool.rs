//! A map of clients keyed by upstream target.
//!
//! Useful for crawler-style workloads that talk to many hosts: one shared
//! configuration, one lazily created [`HttpClient`] (and thus one connection
//! pool) per `(host, port, scheme)`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use http::Uri;

use super::{ClientConfig, HttpClient};
use crate::protocol::ClientError;

type TargetKey = (String, u16, bool);

/// A lazily populated map of [`HttpClient`]s sharing one configuration.
#[derive(Debug)]
pub struct ClientPool {
    config: ClientConfig,
    clients: Mutex<HashMap<TargetKey, Arc<HttpClient>>>,
}

impl ClientPool {
    pub fn new(config: ClientConfig) -> Self {
        Self { config, clients: Mutex::new(HashMap::new()) }
    }

    /// The client for `host:port`, created on first use.
    pub fn client(&self, host: &str, port: u16, use_tls: bool) -> Result<Arc<HttpClient>, ClientError> {
        let key = (host.to_string(), port, use_tls);
        let mut clients = self.clients.lock().unwrap();
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut config = self.config.clone();
        config.use_tls = use_tls;
        let client = Arc::new(HttpClient::new(host, port, config)?);
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// The client for the target of an absolute `http` or `https` URI.
    pub fn client_for_uri(&self, uri: &Uri) -> Result<Arc<HttpClient>, ClientError> {
        let use_tls = match uri.scheme_str() {
            Some("http") | None => false,
            Some("https") => true,
            Some(_) => return Err(ClientError::invalid_target(uri)),
        };
        let host = uri.host().ok_or_else(|| ClientError::invalid_target(uri))?;
        let port = uri.port_u16().unwrap_or(if use_tls { 443 } else { 80 });
        self.client(host, port, use_tls)
    }

    /// Closes every client created so far and forgets them.
    pub fn close(&self) {
        let mut clients = self.clients.lock().unwrap();
        for client in clients.values() {
            client.close();
        }
        clients.clear();
    }
}
