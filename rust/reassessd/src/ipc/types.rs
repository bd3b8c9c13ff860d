use serde::Deserialize;

use crate::backend::{PaymentGateway, QueryBackend, SampleBackend, SimulatedGateway};
use crate::config::Config;
use crate::pages::{PageSession, PAGES};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub backend: Box<dyn QueryBackend>,
    pub gateway: Box<dyn PaymentGateway>,
    pub pages: Vec<PageSession>,
}

impl AppState {
    /// One fresh session per page, backed by the in-memory sample services.
    pub fn new(config: Config) -> Self {
        let gateway = SimulatedGateway {
            dismiss_after_ms: config.payment_dismiss_ms,
        };
        Self {
            config,
            backend: Box::new(SampleBackend::new()),
            gateway: Box::new(gateway),
            pages: PAGES.iter().map(|def| PageSession::new(*def)).collect(),
        }
    }

    pub fn page_mut(&mut self, name: &str) -> Option<&mut PageSession> {
        self.pages.iter_mut().find(|p| p.def.name == name)
    }
}
