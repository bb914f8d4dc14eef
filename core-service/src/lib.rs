//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP client,
//! authorization presenter, UI surface) into the identity client and the
//! Graph client, and exposes the [`SessionController`] that drives the
//! screen. Desktop apps typically enable the `desktop-shims` feature, which
//! supplies `ReqwestHttpClient` and `LoopbackPresenter` from `bridge-desktop`
//! when the host does not inject its own.
//!
//! ```no_run
//! # async fn example(json: &str) -> core_service::Result<()> {
//! use core_runtime::config::AppConfig;
//! use core_service::{CoreService, UserAction};
//!
//! let config = AppConfig::builder().auth_json(json)?.build()?;
//! let core = CoreService::bootstrap(config).await?;
//! let (controller, mut ui) = core.session();
//!
//! controller.on_start().await;
//! controller.handle(UserAction::SignIn);
//! // On the UI thread: ui.apply_pending(&screen);
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod ui;

pub use controller::{render_profile, SessionController, UserAction, SIGNED_OUT_NOTICE};
pub use error::{CoreError, Result};
pub use ui::{ui_channel, UiDispatcher, UiReceiver, UiUpdate};

use std::sync::Arc;

use bridge_traits::http::HttpClient;
use core_auth::{IdentityBroker, IdentityClient, OAuthBroker};
use core_runtime::config::AppConfig;
use core_runtime::events::EventBus;
use provider_onedrive::GraphClient;
use tracing::info;

/// Aggregated handle to the bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub broker: Arc<dyn IdentityBroker>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit handles.
    pub fn new(http_client: Arc<dyn HttpClient>, broker: Arc<dyn IdentityBroker>) -> Self {
        Self {
            http_client,
            broker,
        }
    }

    /// Use the bundled [`OAuthBroker`] with the configured presenter.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let presenter = config
            .presenter
            .clone()
            .ok_or_else(|| CoreError::CapabilityMissing {
                capability: "AuthorizationPresenter".to_string(),
                message: "The bundled OAuth broker needs a presenter to show the sign-in page. \
                         Desktop: enable the 'desktop-shims' feature. \
                         Mobile: inject a presenter or a platform IdentityBroker."
                    .to_string(),
            })?;

        let broker = OAuthBroker::new(&config.auth, config.http_client.clone(), presenter);
        Ok(Self::new(config.http_client.clone(), Arc::new(broker)))
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    identity: Arc<IdentityClient>,
    graph: Arc<GraphClient>,
    event_bus: EventBus,
}

impl CoreService {
    /// Bootstrap with the bundled OAuth broker.
    pub async fn bootstrap(config: AppConfig) -> Result<Self> {
        let deps = CoreDependencies::from_config(&config)?;
        Self::with_dependencies(config, deps).await
    }

    /// Bootstrap with explicitly provided dependencies, e.g. a broker backed
    /// by a platform authentication SDK.
    pub async fn with_dependencies(config: AppConfig, deps: CoreDependencies) -> Result<Self> {
        let event_bus = EventBus::new(config.event_buffer_size);

        let identity =
            IdentityClient::initialize(config.auth, deps.broker, event_bus.clone()).await?;

        let graph = GraphClient::new(deps.http_client, config.api).with_event_bus(event_bus.clone());

        info!("Core service ready");

        Ok(Self {
            identity: Arc::new(identity),
            graph: Arc::new(graph),
            event_bus,
        })
    }

    pub fn identity(&self) -> Arc<IdentityClient> {
        Arc::clone(&self.identity)
    }

    pub fn graph(&self) -> Arc<GraphClient> {
        Arc::clone(&self.graph)
    }

    /// The bus carrying auth and API events.
    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    /// A controller for one screen, plus the receiver its updates arrive on.
    pub fn session(&self) -> (SessionController, UiReceiver) {
        let (dispatcher, receiver) = ui_channel();
        let controller = SessionController::new(self.identity(), self.graph(), dispatcher);
        (controller, receiver)
    }
}
