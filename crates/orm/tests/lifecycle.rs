mod common;

use async_trait::async_trait;
use common::*;
use serde_json::json;
use std::sync::Arc;
use thing_orm::{FieldErrors, ModelObserver, Record, Row, SaveOutcome};

#[tokio::test]
async fn save_then_find_round_trips_fields() {
    let fx = fixture("lifecycle_round_trip").await;
    let mut member = member(&fx.ctx).await;
    member
        .set("email", "alice@x.com")
        .set("password", "secret")
        .set("age", 25)
        .set("status", "active");

    let pk = match member.save().await.unwrap() {
        SaveOutcome::Saved(pk) => pk,
        SaveOutcome::Rejected(errors) => panic!("save rejected: {:?}", errors),
    };

    let mut found = common::member(&fx.ctx).await;
    found.find_by_primary_key(pk.clone()).await.unwrap();
    assert_eq!(found.get("id").unwrap(), pk);
    assert_eq!(found.get("email").unwrap(), json!("alice@x.com"));
    assert_eq!(found.get("password").unwrap(), json!("secret"));
    assert_eq!(found.get("age").unwrap(), json!(25));
    assert_eq!(found.get("status").unwrap(), json!("active"));
}

#[tokio::test]
async fn updating_one_field_keeps_the_others() {
    let fx = fixture("lifecycle_partial_update").await;
    let pk = create_member(&fx.ctx, "alice@x.com", 25, "active").await;

    let mut member = member(&fx.ctx).await;
    member.find_by_primary_key(pk.clone()).await.unwrap();
    member.set("password", "changed");
    assert_eq!(member.save().await.unwrap(), SaveOutcome::Saved(pk.clone()));

    let mut reread = common::member(&fx.ctx).await;
    reread.find_by_primary_key(pk).await.unwrap();
    assert_eq!(reread.get("password").unwrap(), json!("changed"));
    assert_eq!(reread.get("email").unwrap(), json!("alice@x.com"));
    assert_eq!(reread.get("age").unwrap(), json!(25));
}

#[tokio::test]
async fn invalid_email_writes_nothing() {
    let fx = fixture("lifecycle_validation").await;
    create_member(&fx.ctx, "alice@x.com", 25, "active").await;
    let rows_before = fx.db.rows("member").len();

    let mut member = member(&fx.ctx).await;
    member.set("email", "not-an-email").set("age", 30);
    let outcome = member.save().await.unwrap();

    assert!(!outcome.is_saved());
    assert_eq!(
        member.errors().get("email").map(String::as_str),
        Some("invalid email")
    );
    assert_eq!(fx.db.rows("member").len(), rows_before);
    assert!(!member.is_saved());
}

#[tokio::test]
async fn unknown_fields_are_not_written() {
    let fx = fixture("lifecycle_unknown_fields").await;
    let mut member = member(&fx.ctx).await;
    member.set("email", "alice@x.com").set("nickname", "al");

    assert!(member.save().await.unwrap().is_saved());
    let rows = fx.db.rows("member");
    assert!(!rows[0].contains_key("nickname"));
}

struct BannedDomain;

#[async_trait]
impl ModelObserver for BannedDomain {
    async fn before_insert(&self, _record: &Record, data: &Row) -> Result<(), FieldErrors> {
        let banned = data
            .get("email")
            .and_then(|email| email.as_str())
            .map_or(false, |email| email.ends_with("@spam.com"));
        if banned {
            let mut errors = FieldErrors::new();
            errors.insert("email".into(), "domain is banned".into());
            return Err(errors);
        }
        Ok(())
    }
}

#[tokio::test]
async fn observer_errors_abort_the_insert() {
    let fx = fixture("lifecycle_observer").await;
    fx.ctx.observe("member", Arc::new(BannedDomain));

    let mut member = member(&fx.ctx).await;
    member.set("email", "someone@spam.com");
    let outcome = member.save().await.unwrap();

    match outcome {
        SaveOutcome::Rejected(errors) => {
            assert_eq!(errors.get("email").map(String::as_str), Some("domain is banned"))
        }
        SaveOutcome::Saved(pk) => panic!("unexpected save of {}", pk),
    }
    assert!(fx.db.rows("member").is_empty());

    let mut allowed = common::member(&fx.ctx).await;
    allowed.set("email", "someone@x.com");
    assert!(allowed.save().await.unwrap().is_saved());
}

#[tokio::test]
async fn delete_removes_the_loaded_row() {
    let fx = fixture("lifecycle_delete").await;
    let pk = create_member(&fx.ctx, "alice@x.com", 25, "active").await;
    create_member(&fx.ctx, "bob@x.com", 40, "active").await;

    let mut member = member(&fx.ctx).await;
    member.find_by_primary_key(pk.clone()).await.unwrap();
    assert_eq!(member.delete().await.unwrap(), 1);
    assert!(member.is_empty());

    let mut gone = common::member(&fx.ctx).await;
    gone.find_by_primary_key(pk).await.unwrap();
    assert!(gone.is_empty());
    assert_eq!(fx.db.rows("member").len(), 1);
}
