mod common;

use common::*;
use serde_json::{json, Value};
use std::sync::Arc;
use thing_orm::{Context, OrmError};

async fn create_vote(ctx: &Arc<Context>, member_id: &Value, score: i64) {
    let mut vote = ctx.record::<Vote>().await.unwrap();
    vote.set("member_id", member_id.clone()).set("score", score);
    assert!(vote.save().await.unwrap().is_saved());
}

#[tokio::test]
async fn has_many_returns_only_the_parents_rows() {
    let fx = fixture("assoc_has_many").await;
    let alice = create_member(&fx.ctx, "alice@x.com", 25, "active").await;
    let bob = create_member(&fx.ctx, "bob@x.com", 40, "active").await;
    create_vote(&fx.ctx, &alice, 5).await;
    create_vote(&fx.ctx, &bob, 1).await;
    create_vote(&fx.ctx, &alice, 3).await;

    let mut member = member(&fx.ctx).await;
    member.find_by_primary_key(alice.clone()).await.unwrap();

    let mut votes = member.association("votes").await.unwrap();
    assert_eq!(votes.model_name(), "Vote");
    votes.findall(-1, 0).await.unwrap();

    assert_eq!(votes.len(), 2);
    assert!(votes.rows().all(|vote| vote["member_id"] == alice));
    assert_eq!(votes.get_field("score"), vec![json!(3), json!(5)]);
}

#[tokio::test]
async fn belongs_to_loads_exactly_the_parent() {
    let fx = fixture("assoc_belongs_to").await;
    create_member(&fx.ctx, "alice@x.com", 25, "active").await;
    let bob = create_member(&fx.ctx, "bob@x.com", 40, "active").await;
    create_vote(&fx.ctx, &bob, 4).await;

    let mut vote = fx.ctx.record::<Vote>().await.unwrap();
    vote.find_by("member_id", bob.clone()).await.unwrap();

    let parent = vote.association("member").await.unwrap();
    assert_eq!(parent.len(), 1);
    assert_eq!(parent.get("id").unwrap(), bob);
    assert_eq!(parent.get("email").unwrap(), json!("bob@x.com"));
}

#[tokio::test]
async fn team_members_through_has_many() {
    let fx = fixture("assoc_team").await;
    let mut team = fx.ctx.record::<Team>().await.unwrap();
    team.set("name", "core");
    let team_id = team.save().await.unwrap().primary_key().cloned().unwrap();

    let alice = create_member(&fx.ctx, "alice@x.com", 25, "active").await;
    create_member(&fx.ctx, "bob@x.com", 40, "active").await;

    let mut member = member(&fx.ctx).await;
    member.find_by_primary_key(alice).await.unwrap();
    member.set("team_id", team_id.clone());
    member.save().await.unwrap();

    let mut members = team.association("members").await.unwrap();
    assert_eq!(members.count().await.unwrap(), 1);
    members.findall(-1, 0).await.unwrap();
    assert_eq!(members.get_field("email"), vec![json!("alice@x.com")]);

    let back = member.association("team").await.unwrap();
    assert_eq!(back.get("name").unwrap(), json!("core"));
}

#[tokio::test]
async fn has_many_needs_a_primary_key() {
    let fx = fixture("assoc_no_pk").await;
    let member = member(&fx.ctx).await;

    assert!(matches!(
        member.association("votes").await,
        Err(OrmError::Query(_))
    ));
    assert!(matches!(
        member.association("comments").await,
        Err(OrmError::AttributeNotFound { .. })
    ));
}

#[tokio::test]
async fn null_foreign_key_yields_empty_parent_without_a_query() {
    let fx = fixture("assoc_null_fk").await;
    let alice = create_member(&fx.ctx, "alice@x.com", 25, "active").await;
    fx.ctx.record::<Team>().await.unwrap();

    let mut member = member(&fx.ctx).await;
    member.find_by_primary_key(alice).await.unwrap();
    member.set("team_id", Value::Null);

    let before = fx.db.statement_count();
    let team = member.association("team").await.unwrap();
    assert_eq!(fx.db.statement_count(), before);
    assert_eq!(team.model_name(), "Team");
    assert!(team.is_empty());
}
