mod common;

use common::*;
use sub_sync::services::pipeline::{self, Outcome};

// ── 1. created_links_user_and_inserts ──────────────────────────────────────

#[tokio::test]
async fn created_links_user_and_inserts() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    let user = seed_user(&pool, "owner@example.com", Some("cus_cr1")).await;

    let env = envelope(
        "evt_sub_cr1",
        "customer.subscription.created",
        subscription_object("sub_cr1", "cus_cr1", "active"),
    );
    let outcome = pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Processed { .. }));

    let row = get_subscription(&pool, "sub_cr1").await.unwrap();
    assert_eq!(row.user_id, Some(user));
    assert_eq!(row.status, "active");
    assert_eq!(row.plan, "individual");
    assert_eq!(row.tier, "standard");
    assert_eq!(row.last_update_source, "webhook");

    let ledger = get_ledger(&pool, "evt_sub_cr1").await.unwrap();
    assert_eq!(ledger.status, "processed");
}

// ── 2. created_resolves_user_from_metadata ─────────────────────────────────

#[tokio::test]
async fn created_resolves_user_from_metadata() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    // User exists but has no customer linkage yet.
    let user = seed_user(&pool, "meta@example.com", None).await;

    let mut obj = subscription_object("sub_cr2", "cus_cr2", "trialing");
    obj["metadata"]["userId"] = serde_json::json!(user.to_string());
    obj["metadata"]["plan"] = serde_json::json!("family");

    let env = envelope("evt_sub_cr2", "customer.subscription.created", obj);
    let outcome = pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Processed { .. }));

    let row = get_subscription(&pool, "sub_cr2").await.unwrap();
    assert_eq!(row.user_id, Some(user));
    assert_eq!(row.plan, "family");
    assert_eq!(row.status, "trialing");
}

// ── 3. created_without_user_is_skipped ─────────────────────────────────────

#[tokio::test]
async fn created_without_user_is_skipped() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();

    let env = envelope(
        "evt_sub_cr3",
        "customer.subscription.created",
        subscription_object("sub_cr3", "cus_nobody", "active"),
    );
    let outcome = pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Skipped { .. }));

    assert!(get_subscription(&pool, "sub_cr3").await.is_none());
    // Skipped still settles the ledger — the provider must not redeliver.
    let ledger = get_ledger(&pool, "evt_sub_cr3").await.unwrap();
    assert_eq!(ledger.status, "processed");
}

// ── 4. replayed_creation_is_noop ───────────────────────────────────────────

#[tokio::test]
async fn replayed_creation_is_noop() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    seed_user(&pool, "noop@example.com", Some("cus_cr4")).await;

    let env1 = envelope(
        "evt_sub_cr4a",
        "customer.subscription.created",
        subscription_object("sub_cr4", "cus_cr4", "trialing"),
    );
    pipeline::process_event(&pool, &provider, &env1, 120)
        .await
        .unwrap();

    // Redelivered creation under a fresh event id, now claiming "active".
    let env2 = envelope(
        "evt_sub_cr4b",
        "customer.subscription.created",
        subscription_object("sub_cr4", "cus_cr4", "active"),
    );
    let outcome = pipeline::process_event(&pool, &provider, &env2, 120)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Skipped { .. }));

    // Existing row untouched.
    let row = get_subscription(&pool, "sub_cr4").await.unwrap();
    assert_eq!(row.status, "trialing");
}

// ── 5. updated_adopts_provider_state_not_payload ───────────────────────────

#[tokio::test]
async fn updated_adopts_provider_state_not_payload() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    let user = seed_user(&pool, "stale@example.com", Some("cus_up1")).await;

    let env = envelope(
        "evt_sub_up1a",
        "customer.subscription.created",
        subscription_object("sub_up1", "cus_up1", "active"),
    );
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    // Provider has moved to past_due; the delivered payload is stale and
    // still says active. The re-fetch must win.
    provider.stage_subscription(provider_subscription("sub_up1", "cus_up1", "past_due"));
    let env = envelope(
        "evt_sub_up1b",
        "customer.subscription.updated",
        subscription_object("sub_up1", "cus_up1", "active"),
    );
    let outcome = pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Processed { .. }));

    let row = get_subscription(&pool, "sub_up1").await.unwrap();
    assert_eq!(row.status, "past_due");
    assert_eq!(row.user_id, Some(user));
    assert_eq!(row.last_update_source, "reconcile");
}

// ── 6. updated_unknown_subscription_creates_row ────────────────────────────

#[tokio::test]
async fn updated_unknown_subscription_creates_row() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    let user = seed_user(&pool, "missed@example.com", Some("cus_up2")).await;

    // We never saw the creation event. The update reconciles it into
    // existence from the provider's view.
    provider.stage_subscription(provider_subscription("sub_up2", "cus_up2", "active"));
    let env = envelope(
        "evt_sub_up2",
        "customer.subscription.updated",
        subscription_object("sub_up2", "cus_up2", "active"),
    );
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    let row = get_subscription(&pool, "sub_up2").await.unwrap();
    assert_eq!(row.status, "active");
    assert_eq!(row.user_id, Some(user));
}

// ── 7. cancellation_scheduled_notifies ─────────────────────────────────────

#[tokio::test]
async fn cancellation_scheduled_notifies() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    let user = seed_user(&pool, "cancel@example.com", Some("cus_cs1")).await;

    let env = envelope(
        "evt_sub_cs1a",
        "customer.subscription.created",
        subscription_object("sub_cs1", "cus_cs1", "active"),
    );
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    let mut fresh = provider_subscription("sub_cs1", "cus_cs1", "active");
    fresh.cancel_at_period_end = true;
    provider.stage_subscription(fresh);

    let mut obj = subscription_object("sub_cs1", "cus_cs1", "active");
    obj["cancel_at_period_end"] = serde_json::json!(true);
    let body = event_body_with_previous(
        "evt_sub_cs1b",
        "customer.subscription.updated",
        obj,
        serde_json::json!({"cancel_at_period_end": false}),
    );
    pipeline::process_event(&pool, &provider, &envelope_of(&body), 120)
        .await
        .unwrap();

    let row = get_subscription(&pool, "sub_cs1").await.unwrap();
    assert!(row.cancel_at_period_end);
    assert_eq!(
        count_notifications(&pool, user, "subscription_cancellation_scheduled").await,
        1
    );
}

// ── 8. cancellation_reversed_notifies ──────────────────────────────────────

#[tokio::test]
async fn cancellation_reversed_notifies() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    let user = seed_user(&pool, "reversed@example.com", Some("cus_cs2")).await;

    let env = envelope(
        "evt_sub_cs2a",
        "customer.subscription.created",
        subscription_object("sub_cs2", "cus_cs2", "active"),
    );
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    provider.stage_subscription(provider_subscription("sub_cs2", "cus_cs2", "active"));
    let body = event_body_with_previous(
        "evt_sub_cs2b",
        "customer.subscription.updated",
        subscription_object("sub_cs2", "cus_cs2", "active"),
        serde_json::json!({"cancel_at_period_end": true}),
    );
    pipeline::process_event(&pool, &provider, &envelope_of(&body), 120)
        .await
        .unwrap();

    assert_eq!(
        count_notifications(&pool, user, "subscription_cancellation_reversed").await,
        1
    );
}

// ── 9. status_change_notifies ──────────────────────────────────────────────

#[tokio::test]
async fn status_change_notifies() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    let user = seed_user(&pool, "status@example.com", Some("cus_st1")).await;

    let env = envelope(
        "evt_sub_st1a",
        "customer.subscription.created",
        subscription_object("sub_st1", "cus_st1", "trialing"),
    );
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    provider.stage_subscription(provider_subscription("sub_st1", "cus_st1", "active"));
    let body = event_body_with_previous(
        "evt_sub_st1b",
        "customer.subscription.updated",
        subscription_object("sub_st1", "cus_st1", "active"),
        serde_json::json!({"status": "trialing"}),
    );
    pipeline::process_event(&pool, &provider, &envelope_of(&body), 120)
        .await
        .unwrap();

    let row = get_subscription(&pool, "sub_st1").await.unwrap();
    assert_eq!(row.status, "active");
    assert_eq!(
        count_notifications(&pool, user, "subscription_status_changed").await,
        1
    );
}

// ── 10. deleted_forces_canceled_and_cascades_family ────────────────────────

#[tokio::test]
async fn deleted_forces_canceled_and_cascades_family() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    let owner = seed_user(&pool, "family-owner@example.com", Some("cus_del1")).await;
    let member_a = seed_user(&pool, "member-a@example.com", None).await;
    let member_b = seed_user(&pool, "member-b@example.com", None).await;

    let mut obj = subscription_object("sub_del1", "cus_del1", "active");
    obj["metadata"]["plan"] = serde_json::json!("family");
    let env = envelope("evt_sub_del1a", "customer.subscription.created", obj);
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    activate_family_member(&pool, "sub_del1", member_a).await;
    activate_family_member(&pool, "sub_del1", member_b).await;
    let invited = seed_user(&pool, "invited@example.com", None).await;
    sub_sync::infra::postgres::subscription_repo::stage_family_invite(&pool, "sub_del1", invited)
        .await
        .unwrap();

    provider.stage_subscription(provider_subscription("sub_del1", "cus_del1", "canceled"));
    let mut obj = subscription_object("sub_del1", "cus_del1", "canceled");
    obj["canceled_at"] = serde_json::json!(1_702_000_000);
    let env = envelope("evt_sub_del1b", "customer.subscription.deleted", obj);
    let outcome = pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Processed { .. }));

    let row = get_subscription(&pool, "sub_del1").await.unwrap();
    assert_eq!(row.status, "canceled");
    assert!(row.canceled_at.is_some());

    let family = get_family(&pool, "sub_del1").await;
    let removed: Vec<_> = family.iter().filter(|m| m.status == "removed").collect();
    assert_eq!(removed.len(), 2);
    assert!(
        removed
            .iter()
            .all(|m| m.removed_reason.as_deref() == Some("subscription_canceled"))
    );
    // Invites that never activated are left as history, not "removed".
    assert!(
        family
            .iter()
            .any(|m| m.user_id == invited && m.status == "invited")
    );

    assert_eq!(count_notifications(&pool, owner, "subscription_canceled").await, 1);
}

// ── 11. deleted_is_authoritative_over_provider_race ────────────────────────

#[tokio::test]
async fn deleted_is_authoritative_over_provider_race() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    seed_user(&pool, "race@example.com", Some("cus_del2")).await;

    let env = envelope(
        "evt_sub_del2a",
        "customer.subscription.created",
        subscription_object("sub_del2", "cus_del2", "active"),
    );
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    // Provider read races and still reports active. Deletion events are
    // terminal facts, so the local row must land on canceled regardless.
    provider.stage_subscription(provider_subscription("sub_del2", "cus_del2", "active"));
    let env = envelope(
        "evt_sub_del2b",
        "customer.subscription.deleted",
        subscription_object("sub_del2", "cus_del2", "canceled"),
    );
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    let row = get_subscription(&pool, "sub_del2").await.unwrap();
    assert_eq!(row.status, "canceled");
}

// ── 12. trial_will_end_notifies ────────────────────────────────────────────

#[tokio::test]
async fn trial_will_end_notifies() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    let user = seed_user(&pool, "trial@example.com", Some("cus_tr1")).await;

    let in_three_days = chrono::Utc::now().timestamp() + 3 * 86_400;
    let mut obj = subscription_object("sub_tr1", "cus_tr1", "trialing");
    obj["trial_end"] = serde_json::json!(in_three_days);
    let env = envelope("evt_sub_tr1a", "customer.subscription.created", obj);
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    let mut obj = subscription_object("sub_tr1", "cus_tr1", "trialing");
    obj["trial_end"] = serde_json::json!(in_three_days);
    let env = envelope("evt_sub_tr1b", "customer.subscription.trial_will_end", obj);
    let outcome = pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Processed { .. }));

    assert_eq!(count_notifications(&pool, user, "trial_ending").await, 1);
}

// ── 13. trial_notice_for_unknown_subscription_skipped ──────────────────────

#[tokio::test]
async fn trial_notice_for_unknown_subscription_skipped() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();

    let env = envelope(
        "evt_sub_tr2",
        "customer.subscription.trial_will_end",
        subscription_object("sub_tr2_never_seen", "cus_tr2", "trialing"),
    );
    let outcome = pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Skipped { .. }));
}

// ── 14. paused_lands_on_paused ─────────────────────────────────────────────

#[tokio::test]
async fn paused_lands_on_paused() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    seed_user(&pool, "paused@example.com", Some("cus_pa1")).await;

    let env = envelope(
        "evt_sub_pa1a",
        "customer.subscription.created",
        subscription_object("sub_pa1", "cus_pa1", "active"),
    );
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    // Even a racing re-fetch that still says active cannot override the
    // pause event itself.
    provider.stage_subscription(provider_subscription("sub_pa1", "cus_pa1", "active"));
    let env = envelope(
        "evt_sub_pa1b",
        "customer.subscription.paused",
        subscription_object("sub_pa1", "cus_pa1", "paused"),
    );
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    let row = get_subscription(&pool, "sub_pa1").await.unwrap();
    assert_eq!(row.status, "paused");
}

// ── 15. resumed_adopts_provider_status ─────────────────────────────────────

#[tokio::test]
async fn resumed_adopts_provider_status() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    seed_user(&pool, "resumed@example.com", Some("cus_re1")).await;

    let env = envelope(
        "evt_sub_re1a",
        "customer.subscription.created",
        subscription_object("sub_re1", "cus_re1", "active"),
    );
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();
    provider.stage_subscription(provider_subscription("sub_re1", "cus_re1", "paused"));
    let env = envelope(
        "evt_sub_re1b",
        "customer.subscription.paused",
        subscription_object("sub_re1", "cus_re1", "paused"),
    );
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    provider.stage_subscription(provider_subscription("sub_re1", "cus_re1", "active"));
    let env = envelope(
        "evt_sub_re1c",
        "customer.subscription.resumed",
        subscription_object("sub_re1", "cus_re1", "active"),
    );
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    let row = get_subscription(&pool, "sub_re1").await.unwrap();
    assert_eq!(row.status, "active");
}

// ── 16. checkout_completed_stages_family_invites ───────────────────────────

#[tokio::test]
async fn checkout_completed_stages_family_invites() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    let member_a = seed_user(&pool, "inv-a@example.com", None).await;
    let member_b = seed_user(&pool, "inv-b@example.com", None).await;

    let session = serde_json::json!({
        "id": "cs_test_1",
        "object": "checkout.session",
        "mode": "subscription",
        "customer": "cus_ck1",
        "subscription": "sub_ck1",
        "metadata": {
            "family_invites": format!("{member_a}, {member_b}, not-a-uuid")
        },
        "amount_total": 1999
    });
    let env = envelope("evt_ck1", "checkout.session.completed", session);
    let outcome = pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Processed { .. }));

    let family = get_family(&pool, "sub_ck1").await;
    assert_eq!(family.len(), 2);
    assert!(family.iter().all(|m| m.status == "invited"));
}

// ── 17. one_time_checkout_only_logged ──────────────────────────────────────

#[tokio::test]
async fn one_time_checkout_only_logged() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();

    let session = serde_json::json!({
        "id": "cs_test_2",
        "object": "checkout.session",
        "mode": "payment",
        "customer": "cus_ck2",
        "subscription": null,
        "metadata": {},
        "amount_total": 4999
    });
    let env = envelope("evt_ck2", "checkout.session.completed", session);
    let outcome = pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Processed { .. }));
    assert!(get_family(&pool, "cs_test_2").await.is_empty());
}

// ── 18. unknown_event_type_acknowledged ────────────────────────────────────

#[tokio::test]
async fn unknown_event_type_acknowledged() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();

    let env = envelope(
        "evt_unknown_1",
        "entitlements.active_entitlement.created",
        serde_json::json!({"id": "ent_1"}),
    );
    let outcome = pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Ignored));

    let ledger = get_ledger(&pool, "evt_unknown_1").await.unwrap();
    assert_eq!(ledger.status, "processed");
}

// ── 19. unrecognized_status_maps_to_incomplete ─────────────────────────────

#[tokio::test]
async fn unrecognized_status_maps_to_incomplete() {
    let pool = setup_pool("sub_sync_test_subscription").await;
    let provider = StubProvider::new();
    seed_user(&pool, "weird@example.com", Some("cus_wd1")).await;

    let env = envelope(
        "evt_sub_wd1",
        "customer.subscription.created",
        subscription_object("sub_wd1", "cus_wd1", "brand_new_provider_status"),
    );
    pipeline::process_event(&pool, &provider, &env, 120)
        .await
        .unwrap();

    // An unmapped provider status must never grant access.
    let row = get_subscription(&pool, "sub_wd1").await.unwrap();
    assert_eq!(row.status, "incomplete");
}
