use crate::api::http::HttpClubApi;
use crate::api::workspace::WorkspaceClubApi;
use crate::api::ClubApi;
use crate::attendance::BulkReconciler;
use crate::cache::QueryCache;
use crate::config::Config;
use crate::session::EvaluationSessionController;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub enum Backend {
    Workspace(WorkspaceClubApi),
    Http(HttpClubApi),
}

impl Backend {
    pub fn api(&self) -> &dyn ClubApi {
        match self {
            Backend::Workspace(w) => w,
            Backend::Http(h) => h,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Workspace(_) => "workspace",
            Backend::Http(_) => "server",
        }
    }
}

pub struct AppState {
    pub config: Config,
    pub backend: Option<Backend>,
    pub capture: EvaluationSessionController,
    pub attendance: BulkReconciler,
    pub cache: QueryCache,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            backend: None,
            capture: EvaluationSessionController::default(),
            attendance: BulkReconciler::default(),
            cache: QueryCache::default(),
        }
    }

    /// Swaps the backend. Drafts, capture state and cached reads belong to
    /// the previous backend and are dropped with it.
    pub fn set_backend(&mut self, backend: Backend) {
        log::info!("backend set to {}", backend.api().describe());
        self.backend = Some(backend);
        self.capture = EvaluationSessionController::default();
        self.attendance = BulkReconciler::default();
        self.cache.clear();
    }

    pub fn connect_from_config(&mut self) -> anyhow::Result<()> {
        if let Some(path) = self.config.workspace.clone() {
            let ws = WorkspaceClubApi::open(&path)?;
            self.set_backend(Backend::Workspace(ws));
        } else if let Some(url) = self.config.base_url.clone() {
            let http = HttpClubApi::new(&url, self.config.token.clone(), self.config.timeout_secs)?;
            self.set_backend(Backend::Http(http));
        }
        Ok(())
    }
}
