use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::DatabaseManager;
use crate::notifications::NotificationHub;
use crate::observer::implementations::{AuditLogObserver, NotificationObserver, TrophyObserver};
use crate::observer::ObserverPipeline;
use crate::services::{
    AdminService, AuthService, CategoryService, CommentService, MessageService, ModerationService, NotificationService,
    PostService, SearchService, TrophyService,
};

/// Shared handles passed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseManager,
    pub hub: NotificationHub,
    pub events: Arc<ObserverPipeline>,
}

impl AppState {
    /// Wire the hub and the built-in observers around a connection pool
    pub fn new(db: DatabaseManager, config: &AppConfig) -> Self {
        let hub = NotificationHub::new(config.notifications.broadcast_capacity);
        let events = Arc::new(Self::pipeline(ObserverPipeline::new(), db.pool(), &hub));
        Self { db, hub, events }
    }

    /// Same wiring, but observers finish before each write returns
    pub fn inline(db: DatabaseManager, config: &AppConfig) -> Self {
        let hub = NotificationHub::new(config.notifications.broadcast_capacity);
        let events = Arc::new(Self::pipeline(ObserverPipeline::new().inline(), db.pool(), &hub));
        Self { db, hub, events }
    }

    fn pipeline(mut pipeline: ObserverPipeline, pool: &PgPool, hub: &NotificationHub) -> ObserverPipeline {
        pipeline.register_observer(Box::new(AuditLogObserver));
        pipeline.register_observer(Box::new(TrophyObserver::new(pool.clone())));
        pipeline.register_observer(Box::new(NotificationObserver::new(pool.clone(), hub.clone())));
        pipeline
    }

    pub fn pool(&self) -> &PgPool {
        self.db.pool()
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(self.pool().clone())
    }

    pub fn categories(&self) -> CategoryService {
        CategoryService::new(self.pool().clone())
    }

    pub fn posts(&self) -> PostService {
        PostService::new(self.pool().clone(), self.events.clone())
    }

    pub fn comments(&self) -> CommentService {
        CommentService::new(self.pool().clone(), self.events.clone())
    }

    pub fn messages(&self) -> MessageService {
        MessageService::new(self.pool().clone(), self.events.clone())
    }

    pub fn moderation(&self) -> ModerationService {
        ModerationService::new(self.pool().clone(), self.events.clone())
    }

    pub fn trophies(&self) -> TrophyService {
        TrophyService::new(self.pool().clone(), self.events.clone())
    }

    pub fn notifications(&self) -> NotificationService {
        NotificationService::new(self.pool().clone(), self.hub.clone())
    }

    pub fn search(&self) -> SearchService {
        SearchService::new(self.pool().clone())
    }

    pub fn admin(&self) -> AdminService {
        AdminService::new(self.pool().clone(), self.events.clone())
    }
}
