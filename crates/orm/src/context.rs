//! The context object: configuration, connections, schemas, models,
//! observers and cache, shared by every record through `Arc<Context>`
//!
//! ```rust,ignore
//! let ctx = Context::builder(ThingConfig::from_file("thing.yaml")?)
//!     .model::<Member>()
//!     .build()
//!     .await?;
//!
//! let mut member = ctx.record::<Member>().await?;
//! member.find_by("email", "someone@example.com").await?;
//! ```

use crate::backends::{
    DatabaseBackend, DatabaseBackendRegistry, DatabaseBackendType, MemoryBackend, PostgresBackend,
};
use crate::config::ThingConfig;
use crate::connection::ConnectionRouter;
use crate::error::{OrmError, OrmResult};
use crate::events::ModelObserver;
use crate::model::{Model, ModelDefinition};
use crate::observers::ObserverManager;
use crate::persistence::{CachedStore, DatabaseStore, Persistence};
use crate::record::Record;
use crate::schema::SchemaCache;
use dashmap::DashMap;
use std::sync::Arc;
use thing_cache::CacheBackend;
use tracing::{debug, info, warn};

pub struct Context {
    config: Arc<ThingConfig>,
    router: Arc<ConnectionRouter>,
    schemas: SchemaCache,
    models: DashMap<String, Arc<ModelDefinition>>,
    observers: ObserverManager,
    cache: Option<Arc<dyn CacheBackend>>,
    database_store: Arc<DatabaseStore>,
    cached_store: Option<Arc<CachedStore>>,
}

impl Context {
    pub fn builder(config: ThingConfig) -> ContextBuilder {
        ContextBuilder::new(config)
    }

    pub fn config(&self) -> &ThingConfig {
        &self.config
    }

    pub fn router(&self) -> &ConnectionRouter {
        &self.router
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    pub fn observers(&self) -> &ObserverManager {
        &self.observers
    }

    pub fn cache(&self) -> Option<&Arc<dyn CacheBackend>> {
        self.cache.as_ref()
    }

    pub fn register<M: Model>(&self) -> Arc<ModelDefinition> {
        self.register_definition(M::definition())
    }

    /// Register (or replace) a model under its name
    pub fn register_definition(&self, definition: ModelDefinition) -> Arc<ModelDefinition> {
        debug!("Registering model {} on table '{}'", definition.name, definition.table);
        let definition = Arc::new(definition);
        self.models.insert(definition.name.clone(), definition.clone());
        definition
    }

    pub fn definition(&self, name: &str) -> Option<Arc<ModelDefinition>> {
        self.models.get(name).map(|entry| entry.value().clone())
    }

    /// A fresh record of `M`, registering the model on first use
    pub async fn record<M: Model>(self: &Arc<Self>) -> OrmResult<Record> {
        let definition = match self.definition(M::model_name()) {
            Some(definition) => definition,
            None => self.register::<M>(),
        };
        Record::open(self.clone(), definition).await
    }

    /// A fresh record of a model registered under `name`
    pub async fn record_named(self: &Arc<Self>, name: &str) -> OrmResult<Record> {
        let definition = self.definition(name).ok_or_else(|| {
            OrmError::Configuration(format!("Model '{}' is not registered", name))
        })?;
        Record::open(self.clone(), definition).await
    }

    pub fn observe(&self, table: &str, observer: Arc<dyn ModelObserver>) {
        self.observers.register_for_table(table, observer);
    }

    pub fn observe_all(&self, observer: Arc<dyn ModelObserver>) {
        self.observers.register_global(observer);
    }

    pub(crate) fn store_for(&self, definition: &ModelDefinition) -> Arc<dyn Persistence> {
        if definition.cached {
            if let Some(cached) = &self.cached_store {
                return cached.clone();
            }
        }
        self.database_store.clone()
    }

    /// Close every connection and forget reflected schemas
    pub async fn shutdown(&self) -> OrmResult<()> {
        self.router.close_all().await?;
        self.schemas.reset();
        info!("Context shut down");
        Ok(())
    }
}

pub struct ContextBuilder {
    config: ThingConfig,
    backends: Vec<Arc<dyn DatabaseBackend>>,
    cache: Option<Arc<dyn CacheBackend>>,
    definitions: Vec<ModelDefinition>,
    table_observers: Vec<(String, Arc<dyn ModelObserver>)>,
    global_observers: Vec<Arc<dyn ModelObserver>>,
}

impl ContextBuilder {
    pub fn new(config: ThingConfig) -> Self {
        Self {
            config,
            backends: Vec::new(),
            cache: None,
            definitions: Vec::new(),
            table_observers: Vec::new(),
            global_observers: Vec::new(),
        }
    }

    /// Use this backend for its URL scheme instead of the built-in one
    pub fn backend(mut self, backend: Arc<dyn DatabaseBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Cache used by models that opt in; takes precedence over a `redis`
    /// section in the configuration
    pub fn cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn model<M: Model>(mut self) -> Self {
        self.definitions.push(M::definition());
        self
    }

    pub fn definition(mut self, definition: ModelDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn observer(mut self, table: &str, observer: Arc<dyn ModelObserver>) -> Self {
        self.table_observers.push((table.to_string(), observer));
        self
    }

    pub fn global_observer(mut self, observer: Arc<dyn ModelObserver>) -> Self {
        self.global_observers.push(observer);
        self
    }

    pub async fn build(self) -> OrmResult<Arc<Context>> {
        self.config.validate()?;

        let mut registry = DatabaseBackendRegistry::new();
        registry.register(Arc::new(PostgresBackend::new()));
        for backend in self.backends {
            registry.register(backend);
        }
        if registry.get(&DatabaseBackendType::Memory).is_none() {
            registry.register(Arc::new(MemoryBackend::new()));
        }

        let cache = match self.cache {
            Some(cache) => Some(cache),
            None => connect_configured_cache(&self.config).await,
        };
        let ttl = self.config.redis.as_ref().and_then(|redis| redis.ttl());

        let debug = self.config.is_debug();
        let config = Arc::new(self.config);
        let router = Arc::new(ConnectionRouter::new(config.clone(), Arc::new(registry)));
        let database_store = Arc::new(DatabaseStore::new(router.clone(), debug));
        let cached_store = cache.as_ref().map(|cache| {
            Arc::new(CachedStore::new(database_store.clone(), cache.clone()).with_ttl(ttl))
        });

        let context = Context {
            config,
            router,
            schemas: SchemaCache::new(),
            models: DashMap::new(),
            observers: ObserverManager::new(),
            cache,
            database_store,
            cached_store,
        };

        for definition in self.definitions {
            context.register_definition(definition);
        }
        for (table, observer) in self.table_observers {
            context.observe(&table, observer);
        }
        for observer in self.global_observers {
            context.observe_all(observer);
        }

        Ok(Arc::new(context))
    }
}

#[cfg(feature = "redis")]
async fn connect_configured_cache(config: &ThingConfig) -> Option<Arc<dyn CacheBackend>> {
    use thing_cache::{RedisBackend, RedisConfig};

    let section = config.redis.as_ref()?;
    let mut redis_config = RedisConfig::from_parts(&section.host, section.port, section.db);
    if let Some(ttl) = section.ttl() {
        redis_config = redis_config.with_default_ttl(ttl);
    }

    match RedisBackend::new(redis_config).await {
        Ok(backend) => {
            info!("Cache enabled on redis://{}:{}/{}", section.host, section.port, section.db);
            Some(Arc::new(backend) as Arc<dyn CacheBackend>)
        }
        Err(e) => {
            warn!("Redis unreachable, caching disabled: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_configured_cache(config: &ThingConfig) -> Option<Arc<dyn CacheBackend>> {
    if config.redis.is_some() {
        warn!("A redis section is configured but thing-orm was built without the `redis` feature");
    }
    None
}
