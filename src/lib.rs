use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use auth::{AuthService, LoginThrottle, Mailer};
use clock::Clock;
use config::Config;
use models::ReportEvent;
use store::{AttemptStore, ReportStore, SessionStore, TrophyStore, UserStore};
use trophy::{ReportEvents, TrophyEngine};

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod store;
pub mod trophy;
pub mod utils;

/// Storage and delivery handles the services are built on.
pub struct Backends {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub attempts: Arc<dyn AttemptStore>,
    pub reports: Arc<dyn ReportStore>,
    pub trophies: Arc<dyn TrophyStore>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: AuthService,
    pub trophies: TrophyEngine,
    pub events: ReportEvents,
    pub attempts: Arc<dyn AttemptStore>,
}

impl AppState {
    /// Wire the services together. The returned receiver feeds the trophy
    /// event worker; drop it and report events are only logged.
    pub fn new(config: Config, backends: Backends) -> (Self, UnboundedReceiver<ReportEvent>) {
        let config = Arc::new(config);
        let throttle = LoginThrottle::new(
            backends.attempts.clone(),
            config.login_max_attempts,
            config.login_window(),
        );
        let auth = AuthService::new(
            backends.users,
            backends.sessions,
            throttle,
            backends.mailer,
            backends.clock.clone(),
            config.clone(),
        );
        let trophies = TrophyEngine::new(
            backends.reports,
            backends.trophies,
            backends.clock,
            config.trophy_top_n,
        );
        let (events, rx) = ReportEvents::channel();

        let state = AppState {
            config,
            auth,
            trophies,
            events,
            attempts: backends.attempts,
        };
        (state, rx)
    }
}
