mod common;

use common::*;
use serde_json::json;
use thing_orm::record::{Attribute, DynamicCall};
use thing_orm::{DynamicArgs, DynamicResult, OrmError};

#[tokio::test]
async fn find_by_matches_explicit_filter() {
    let fx = fixture("dyn_find_by").await;
    seed_members(&fx.ctx).await;

    let mut dynamic = member(&fx.ctx).await;
    let result = dynamic
        .call("find_by_email", vec![json!("bob@x.com")])
        .await
        .unwrap();
    assert_eq!(result, DynamicResult::Loaded);

    let mut explicit = member(&fx.ctx).await;
    explicit.filter("email", "=", "bob@x.com").unwrap();
    explicit.find().await.unwrap();

    assert_eq!(dynamic.current_row(), explicit.current_row());
    assert_eq!(dynamic.get("id").unwrap(), json!(3));
}

#[tokio::test]
async fn multi_field_finders_take_values_in_field_order() {
    let fx = fixture("dyn_multi_field").await;
    seed_members(&fx.ctx).await;

    let mut member = member(&fx.ctx).await;
    member
        .call(
            "findall_by_status_and_age",
            vec![json!("active"), json!(25)],
        )
        .await
        .unwrap();
    assert_eq!(member.get_field("email"), vec![json!("alice@x.com")]);

    let count = member
        .call("count_by_status", vec![json!("active")])
        .await
        .unwrap();
    assert_eq!(count, DynamicResult::Count(3));
}

#[tokio::test]
async fn findall_by_honours_paging() {
    let fx = fixture("dyn_paging").await;
    seed_members(&fx.ctx).await;

    let mut member = member(&fx.ctx).await;
    member
        .call(
            "findall_by_status",
            DynamicArgs::new(vec![json!("active")]).page(1, 1),
        )
        .await
        .unwrap();
    assert_eq!(member.get_field("id"), vec![json!(2)]);
}

#[tokio::test]
async fn findall_in_takes_a_list() {
    let fx = fixture("dyn_findall_in").await;
    seed_members(&fx.ctx).await;

    let mut member = member(&fx.ctx).await;
    member
        .call("findall_in_id", vec![json!([1, 2])])
        .await
        .unwrap();
    assert_eq!(member.get_field("id"), vec![json!(2), json!(1)]);

    let mut typed = common::member(&fx.ctx).await;
    typed.findall_in("id", vec![json!(1), json!(2)]).await.unwrap();
    assert_eq!(typed.to_list(), member.to_list());

    assert!(matches!(
        member.call("findall_in_id", vec![json!(1)]).await,
        Err(OrmError::Query(_))
    ));
}

#[tokio::test]
async fn typed_helpers_agree_with_dynamic_names() {
    let fx = fixture("dyn_typed").await;
    seed_members(&fx.ctx).await;

    let mut typed = member(&fx.ctx).await;
    typed.find_by("email", "carol@x.com").await.unwrap();

    let mut dynamic = member(&fx.ctx).await;
    dynamic
        .call("find_by_email", vec![json!("carol@x.com")])
        .await
        .unwrap();

    assert_eq!(typed.current_row(), dynamic.current_row());
    assert_eq!(typed.count_by("status", "inactive").await.unwrap(), 1);
}

#[tokio::test]
async fn wrong_arity_is_a_query_error() {
    let fx = fixture("dyn_arity").await;
    let mut member = member(&fx.ctx).await;

    assert!(matches!(
        member.call("find_by_email_and_status", vec![json!("a@x.com")]).await,
        Err(OrmError::Query(_))
    ));
}

#[tokio::test]
async fn unknown_names_are_attribute_errors() {
    let fx = fixture("dyn_unknown").await;
    let mut member = member(&fx.ctx).await;

    assert!(matches!(
        member.call("nickname", DynamicArgs::new(vec![])).await,
        Err(OrmError::AttributeNotFound { .. })
    ));
    assert!(matches!(
        member.resolve("nickname").await,
        Err(OrmError::AttributeNotFound { .. })
    ));
}

#[tokio::test]
async fn resolve_prefers_fields_then_associations_then_finders() {
    let fx = fixture("dyn_resolve").await;
    let mut member = member(&fx.ctx).await;
    member.set("email", "alice@x.com").set("id", 7);

    assert!(matches!(
        member.resolve("email").await.unwrap(),
        Attribute::Value(value) if value == json!("alice@x.com")
    ));
    assert!(matches!(
        member.resolve("votes").await.unwrap(),
        Attribute::Association(_)
    ));
    assert!(matches!(
        member.resolve("find_by_email").await.unwrap(),
        Attribute::Dynamic(DynamicCall::FindBy(_))
    ));
}

#[tokio::test]
async fn rejected_finder_leaves_no_filters_behind() {
    let fx = fixture("dyn_rejected_field").await;
    seed_members(&fx.ctx).await;

    let mut member = member(&fx.ctx).await;
    let err = member
        .call(
            "findall_by_status_and_nickname",
            vec![json!("active"), json!("x")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Query(_)));
    assert!(member.filters().is_empty());

    member.findall(-1, 0).await.unwrap();
    assert_eq!(member.len(), 4);
}
