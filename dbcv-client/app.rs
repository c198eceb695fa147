use std::sync::Arc;

use crate::api::{ApiClient, ResourceKind};
use crate::assistant::{AssistantStore, RestAssistant};
use crate::auth::guard::{self, Navigation, Route};
use crate::auth::{AuthStore, Credentials};
use crate::config::Config;
use crate::events::{self, ClientNotice, notice_channel};
use crate::execution::ExecutionLogManager;
use crate::generation::GenerationManager;
use crate::prefs::camera::CameraPositions;
use crate::prefs::recent::{RecentItems, RecentKind};
use crate::socket::{Connector, WsConnector};
use crate::storage::{FileStorage, LocalStorage};
use crate::store::bots::BotsStore;
use crate::store::credentials::CredentialsStore;
use crate::store::templates::{TemplateGroupsStore, TemplateInstancesStore};
use crate::store::users::UsersStore;
use crate::store::{Record, ResourceBackend, ResourceStore, RestBackend};
use crate::tracking::{RestTracking, TrackingStore};

/// Everything a front-end needs, wired once at startup. Session registries
/// and caches live here rather than in globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub storage: Arc<dyn LocalStorage>,
    pub credentials: Arc<Credentials>,
    pub api: ApiClient,
    pub auth: AuthStore,
    pub users: Arc<UsersStore>,
    pub bots: Arc<BotsStore>,
    pub steps: Arc<ResourceStore<Record>>,
    pub channels: Arc<ResourceStore<Record>>,
    pub requests: Arc<ResourceStore<Record>>,
    pub widgets: Arc<ResourceStore<Record>>,
    pub templates: Arc<ResourceStore<Record>>,
    pub template_groups: Arc<TemplateGroupsStore>,
    pub template_instances: Arc<TemplateInstancesStore>,
    pub crons: Arc<ResourceStore<Record>>,
    pub execution: Arc<ExecutionLogManager>,
    pub generation: Arc<GenerationManager>,
    pub tracking: Arc<TrackingStore>,
    pub assistant: Arc<AssistantStore>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let storage: Arc<dyn LocalStorage> = Arc::new(FileStorage::new(&config.data_dir));
        Self::with_parts(config, storage, Arc::new(WsConnector))
    }

    pub fn with_parts(
        config: Config,
        storage: Arc<dyn LocalStorage>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let credentials = Credentials::load(storage.clone());
        let api = ApiClient::new(
            reqwest::Client::new(),
            config.api_url.clone(),
            credentials.clone(),
            notice_channel(),
        );

        let record_store = |kind: ResourceKind| -> Arc<ResourceStore<Record>> {
            let backend: Arc<dyn ResourceBackend<Record>> =
                Arc::new(RestBackend::<Record>::new(api.clone(), kind));
            Arc::new(ResourceStore::new(backend))
        };

        Self {
            steps: record_store(ResourceKind::Steps),
            channels: record_store(ResourceKind::Channels),
            requests: record_store(ResourceKind::Requests),
            widgets: record_store(ResourceKind::Widgets),
            templates: record_store(ResourceKind::Templates),
            crons: record_store(ResourceKind::Crons),
            template_groups: Arc::new(TemplateGroupsStore::new(api.clone())),
            template_instances: Arc::new(TemplateInstancesStore::new(api.clone())),
            auth: AuthStore::new(api.clone(), credentials.clone()),
            users: Arc::new(UsersStore::new(api.clone())),
            bots: Arc::new(BotsStore::new(api.clone())),
            execution: Arc::new(ExecutionLogManager::new(
                connector.clone(),
                config.bot_ws_url.clone(),
            )),
            generation: Arc::new(GenerationManager::new(
                connector,
                config.mcp_ws_url.clone(),
                credentials.clone(),
            )),
            tracking: Arc::new(TrackingStore::new(Arc::new(RestTracking::new(api.clone())))),
            assistant: Arc::new(AssistantStore::new(
                Arc::new(RestAssistant::new(api.clone())),
                credentials.clone(),
            )),
            config,
            storage,
            credentials,
            api,
        }
    }

    /// A standalone cache for any named resource kind.
    pub fn resource_store(&self, kind: ResourceKind) -> ResourceStore<Record> {
        ResourceStore::new(Arc::new(RestBackend::<Record>::new(self.api.clone(), kind)))
    }

    pub fn bot_credentials(&self, bot_id: &str) -> CredentialsStore {
        CredentialsStore::for_bot(self.api.clone(), bot_id)
    }

    pub fn recent(&self, kind: RecentKind) -> RecentItems {
        RecentItems::load(kind, self.storage.clone())
    }

    pub fn camera_positions(&self) -> CameraPositions {
        CameraPositions::new(self.storage.clone())
    }

    /// Run the route guard for the signed-in user; a denial is also
    /// published as a notice.
    pub async fn navigate(&self, to: &Route, from_path: &str) -> Navigation {
        let user = self.users.current_user().await;
        let decision = guard::check(
            to,
            from_path,
            self.credentials.is_authenticated(),
            user.as_ref(),
        );
        if let Navigation::Deny { notice, .. } = &decision {
            events::publish(self.api.notices(), ClientNotice::error(notice));
        }
        decision
    }
}
