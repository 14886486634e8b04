#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use thing_cache::CacheBackend;
use thing_orm::backends::MemoryDatabase;
use thing_orm::{
    Association, Context, DatabaseSection, MemoryBackend, Model, Record, Row, Rules, TableSchema,
    ThingConfig,
};
use thing_validation::EmailValidator;

pub struct Member;

impl Model for Member {
    fn model_name() -> &'static str {
        "Member"
    }

    fn associations() -> Vec<Association> {
        vec![
            Association::has_many("votes", "Vote", "member_id"),
            Association::belongs_to("team", "Team", "team_id"),
        ]
    }

    fn rules() -> Rules {
        Rules::new().field("email", EmailValidator::new().message("invalid email"))
    }

    fn cached() -> bool {
        true
    }
}

pub struct Vote;

impl Model for Vote {
    fn model_name() -> &'static str {
        "Vote"
    }

    fn associations() -> Vec<Association> {
        vec![Association::belongs_to("member", "Member", "member_id")]
    }
}

pub struct Team;

impl Model for Team {
    fn model_name() -> &'static str {
        "Team"
    }

    fn associations() -> Vec<Association> {
        vec![Association::has_many("members", "Member", "team_id")]
    }
}

pub struct Fixture {
    pub db: Arc<MemoryDatabase>,
    pub ctx: Arc<Context>,
}

fn seeded_backend(name: &str) -> (Arc<MemoryBackend>, Arc<MemoryDatabase>) {
    let memory = Arc::new(MemoryBackend::new());
    let db = memory.database(name);
    db.create_table(
        TableSchema::new("member")
            .with_primary_key("id", "integer")
            .with_column("email", "text")
            .with_column("password", "text")
            .with_column("age", "integer")
            .with_column("status", "text")
            .with_column("team_id", "integer"),
    );
    db.create_table(
        TableSchema::new("vote")
            .with_primary_key("id", "integer")
            .with_column("member_id", "integer")
            .with_column("score", "integer"),
    );
    db.create_table(
        TableSchema::new("team")
            .with_primary_key("id", "integer")
            .with_column("name", "text"),
    );
    (memory, db)
}

fn config(name: &str) -> ThingConfig {
    let url = format!("memory://{}", name);
    ThingConfig::new()
        .with_section("master", DatabaseSection::new(url.clone()))
        .with_section("slave", DatabaseSection::new(url))
}

pub async fn fixture(name: &str) -> Fixture {
    let (memory, db) = seeded_backend(name);
    let ctx = Context::builder(config(name))
        .backend(memory)
        .model::<Member>()
        .model::<Vote>()
        .model::<Team>()
        .build()
        .await
        .expect("context builds");
    Fixture { db, ctx }
}

pub async fn cached_fixture(name: &str, cache: Arc<dyn CacheBackend>) -> Fixture {
    let (memory, db) = seeded_backend(name);
    let ctx = Context::builder(config(name))
        .backend(memory)
        .cache(cache)
        .model::<Member>()
        .model::<Vote>()
        .model::<Team>()
        .build()
        .await
        .expect("context builds");
    Fixture { db, ctx }
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

/// Insert a member through the lifecycle and return its primary key
pub async fn create_member(ctx: &Arc<Context>, email: &str, age: i64, status: &str) -> Value {
    let mut member = ctx.record::<Member>().await.expect("member record");
    member
        .set("email", email)
        .set("password", "secret")
        .set("age", age)
        .set("status", status);
    member
        .save()
        .await
        .expect("save succeeds")
        .primary_key()
        .cloned()
        .expect("member saved")
}

/// Members used by the query tests, ids 1..=4
pub async fn seed_members(ctx: &Arc<Context>) {
    create_member(ctx, "teen@x.com", 16, "active").await;
    create_member(ctx, "alice@x.com", 25, "active").await;
    create_member(ctx, "bob@x.com", 40, "inactive").await;
    create_member(ctx, "carol@x.com", 33, "active").await;
}

pub async fn member(ctx: &Arc<Context>) -> Record {
    ctx.record::<Member>().await.expect("member record")
}

pub fn email_of(row: &Row) -> Value {
    row.get("email").cloned().unwrap_or(json!(null))
}
