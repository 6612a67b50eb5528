//! End-to-end invitation lifecycle: issue, accept, supersede, revoke,
//! resend, and the failure paths between them.

mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::{
    TestApp, authed_empty, authed_get, authed_request, public_get, public_request, response_json,
};
use serde_json::json;
use team_service::models::{IssueInvitationRequest, RequestOrigin, TeamRole};
use team_service::services::ServiceError;
use tower::util::ServiceExt;
use uuid::Uuid;

#[tokio::test]
async fn issuing_sends_email_and_returns_no_token() {
    let app = TestApp::spawn().await;
    let team = app.seed_team().await;

    let response = app
        .router
        .clone()
        .oneshot(authed_request(
            "POST",
            &format!("/providers/{}/invitations", team.provider.provider_id),
            team.admin.user_id,
            json!({ "email": "Pat@Example.com", "role": "staff" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    assert_eq!(body["email"], "pat@example.com");
    assert_eq!(body["role_code"], "staff");
    assert_eq!(body["state_code"], "pending");
    assert!(body.get("token").is_none());
    assert!(body.get("token_hash").is_none());

    let sent = app.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_email, "pat@example.com");
    assert_eq!(sent[0].provider_name, "Seasonal Table Catering");
    assert_eq!(sent[0].invite_token.len(), 43);

    // The audit row carries context but never the token.
    let events = app.audit_sink.events().await;
    let sent_event = events
        .iter()
        .find(|e| e.action_code == "invitation_sent")
        .expect("No invitation_sent audit event");
    assert_eq!(sent_event.actor_user_id, Some(team.admin.user_id));
    let detail = sent_event.detail.as_ref().unwrap().to_string();
    assert!(!detail.contains(&sent[0].invite_token));
}

#[tokio::test]
async fn issuing_requires_manager_authority() {
    let app = TestApp::spawn().await;
    let team = app.seed_team().await;
    let (staff, _) = app
        .store
        .seed_member(team.provider.provider_id, "staff@example.com", TeamRole::Staff)
        .await;

    let request = |actor: Uuid| {
        authed_request(
            "POST",
            &format!("/providers/{}/invitations", team.provider.provider_id),
            actor,
            json!({ "email": "pat@example.com", "role": "staff" }),
        )
    };

    // Staff sits below the manager floor.
    let response = app.router.clone().oneshot(request(staff.user_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Non-members are rejected the same way.
    let response = app.router.clone().oneshot(request(Uuid::new_v4())).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert!(app.notifier.sent().await.is_empty());
}

#[tokio::test]
async fn issuing_rejects_owner_grants_and_self_invites() {
    let app = TestApp::spawn().await;
    let team = app.seed_team().await;
    let uri = format!("/providers/{}/invitations", team.provider.provider_id);

    // The owner role can only come from provisioning.
    let response = app
        .router
        .clone()
        .oneshot(authed_request(
            "POST",
            &uri,
            team.admin.user_id,
            json!({ "email": "pat@example.com", "role": "owner" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Self-invites are caught case-insensitively.
    let response = app
        .router
        .clone()
        .oneshot(authed_request(
            "POST",
            &uri,
            team.admin.user_id,
            json!({ "email": "ADMIN@example.com", "role": "staff" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(app.notifier.sent().await.is_empty());
}

#[tokio::test]
async fn duplicate_pending_invitation_conflicts() {
    let app = TestApp::spawn().await;
    let team = app.seed_team().await;
    app.issue_invitation(
        team.provider.provider_id,
        team.admin.user_id,
        "pat@example.com",
        "staff",
    )
    .await;

    // Same email in a different case, different role: still a conflict.
    let response = app
        .router
        .clone()
        .oneshot(authed_request(
            "POST",
            &format!("/providers/{}/invitations", team.provider.provider_id),
            team.admin.user_id,
            json!({ "email": "PAT@example.com", "role": "viewer" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(app.notifier.sent().await.len(), 1);
}

#[tokio::test]
async fn expired_pending_invitation_is_superseded() {
    let app = TestApp::spawn().await;
    let team = app.seed_team().await;
    let (_, first_token) = app
        .issue_invitation(
            team.provider.provider_id,
            team.admin.user_id,
            "pat@example.com",
            "staff",
        )
        .await;

    // Step past the 48h expiry; the stale row gives way to a fresh one.
    app.clock.advance(Duration::hours(49));
    let (_, second_token) = app
        .issue_invitation(
            team.provider.provider_id,
            team.admin.user_id,
            "pat@example.com",
            "manager",
        )
        .await;
    assert_ne!(first_token, second_token);

    // Only one row remains.
    let list = app
        .router
        .clone()
        .oneshot(authed_get(
            &format!("/providers/{}/invitations", team.provider.provider_id),
            team.admin.user_id,
        ))
        .await
        .unwrap();
    let body = response_json(list).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["role_code"], "manager");

    // The superseded row is gone, so its token no longer resolves.
    let response = app
        .router
        .clone()
        .oneshot(public_request(
            "POST",
            "/invitations/accept",
            json!({ "token": first_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn accept_creates_membership_and_rejects_reuse() {
    let app = TestApp::spawn().await;
    let team = app.seed_team().await;
    let (_, token) = app
        .issue_invitation(
            team.provider.provider_id,
            team.admin.user_id,
            "pat@example.com",
            "manager",
        )
        .await;

    let response = app
        .router
        .clone()
        .oneshot(public_request(
            "POST",
            "/invitations/accept",
            json!({ "token": token, "display_name": "Pat Doe" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    assert_eq!(body["provider_id"], team.provider.provider_id.to_string());
    assert_eq!(body["role_code"], "manager");
    assert_eq!(body["status_code"], "active");

    // The seat is live: the new manager can read the roster.
    let member_user_id: Uuid = body["user_id"].as_str().unwrap().parse().unwrap();
    let roster = app
        .router
        .clone()
        .oneshot(authed_get(
            &format!("/providers/{}/members", team.provider.provider_id),
            member_user_id,
        ))
        .await
        .unwrap();
    assert_eq!(roster.status(), StatusCode::OK);

    // Both halves of the lifecycle are on the audit trail.
    let events = app.audit_sink.events().await;
    assert!(events.iter().any(|e| e.action_code == "invitation_sent"));
    let accepted_event = events
        .iter()
        .find(|e| e.action_code == "invitation_accepted")
        .expect("No invitation_accepted audit event");
    assert_eq!(accepted_event.actor_user_id, Some(member_user_id));

    // A used token cannot be replayed.
    let replay = app
        .router
        .clone()
        .oneshot(public_request(
            "POST",
            "/invitations/accept",
            json!({ "token": token }),
        ))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn accept_returns_gone_for_expired_and_not_found_for_unknown() {
    let app = TestApp::spawn().await;
    let team = app.seed_team().await;
    let (_, token) = app
        .issue_invitation(
            team.provider.provider_id,
            team.admin.user_id,
            "late@example.com",
            "staff",
        )
        .await;

    // Step past the 48h expiry before the invitee follows the link.
    app.clock.advance(Duration::hours(49));
    let expired = app
        .router
        .clone()
        .oneshot(public_request(
            "POST",
            "/invitations/accept",
            json!({ "token": token }),
        ))
        .await
        .unwrap();
    assert_eq!(expired.status(), StatusCode::GONE);

    let unknown = app
        .router
        .clone()
        .oneshot(public_request(
            "POST",
            "/invitations/accept",
            json!({ "token": "not-a-real-token" }),
        ))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn notification_failure_keeps_the_row_for_resend() {
    let app = TestApp::spawn().await;
    let team = app.seed_team().await;
    app.notifier.fail_sends(true);

    let response = app
        .router
        .clone()
        .oneshot(authed_request(
            "POST",
            &format!("/providers/{}/invitations", team.provider.provider_id),
            team.admin.user_id,
            json!({ "email": "pat@example.com", "role": "staff" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The row survived the failed send.
    let list = app
        .router
        .clone()
        .oneshot(authed_get(
            &format!("/providers/{}/invitations", team.provider.provider_id),
            team.admin.user_id,
        ))
        .await
        .unwrap();
    let body = response_json(list).await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["state_code"], "pending");
    let invitation_id = rows[0]["invitation_id"].as_str().unwrap();

    // Resend succeeds once the mailer recovers.
    app.notifier.fail_sends(false);
    let resend = app
        .router
        .clone()
        .oneshot(authed_empty(
            "POST",
            &format!(
                "/providers/{}/invitations/{}/resend",
                team.provider.provider_id, invitation_id
            ),
            team.admin.user_id,
        ))
        .await
        .unwrap();
    assert_eq!(resend.status(), StatusCode::OK);
    assert_eq!(app.notifier.sent().await.len(), 1);
}

#[tokio::test]
async fn resend_rotates_the_token() {
    let app = TestApp::spawn().await;
    let team = app.seed_team().await;
    let (invitation_id, old_token) = app
        .issue_invitation(
            team.provider.provider_id,
            team.admin.user_id,
            "pat@example.com",
            "staff",
        )
        .await;

    let resend = app
        .router
        .clone()
        .oneshot(authed_empty(
            "POST",
            &format!(
                "/providers/{}/invitations/{}/resend",
                team.provider.provider_id, invitation_id
            ),
            team.admin.user_id,
        ))
        .await
        .unwrap();
    assert_eq!(resend.status(), StatusCode::OK);

    let sent = app.notifier.sent().await;
    assert_eq!(sent.len(), 2);
    let new_token = sent[1].invite_token.clone();
    assert_ne!(old_token, new_token);

    // The old link is dead, the new one works.
    let stale = app
        .router
        .clone()
        .oneshot(public_request(
            "POST",
            "/invitations/accept",
            json!({ "token": old_token }),
        ))
        .await
        .unwrap();
    assert_eq!(stale.status(), StatusCode::NOT_FOUND);

    let fresh = app
        .router
        .clone()
        .oneshot(public_request(
            "POST",
            "/invitations/accept",
            json!({ "token": new_token, "display_name": "Pat Doe" }),
        ))
        .await
        .unwrap();
    assert_eq!(fresh.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn revoke_hides_the_invitation_from_accept() {
    let app = TestApp::spawn().await;
    let team = app.seed_team().await;
    let (invitation_id, token) = app
        .issue_invitation(
            team.provider.provider_id,
            team.admin.user_id,
            "pat@example.com",
            "staff",
        )
        .await;
    let uri = format!(
        "/providers/{}/invitations/{}",
        team.provider.provider_id, invitation_id
    );

    let revoke = app
        .router
        .clone()
        .oneshot(authed_empty("DELETE", &uri, team.admin.user_id))
        .await
        .unwrap();
    assert_eq!(revoke.status(), StatusCode::OK);
    let body = response_json(revoke).await;
    assert_eq!(body["state_code"], "revoked");

    let accept = app
        .router
        .clone()
        .oneshot(public_request(
            "POST",
            "/invitations/accept",
            json!({ "token": token }),
        ))
        .await
        .unwrap();
    assert_eq!(accept.status(), StatusCode::NOT_FOUND);

    // Revoking twice is a conflict, as is resending a revoked invitation.
    let again = app
        .router
        .clone()
        .oneshot(authed_empty("DELETE", &uri, team.admin.user_id))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let resend = app
        .router
        .clone()
        .oneshot(authed_empty(
            "POST",
            &format!("{}/resend", uri),
            team.admin.user_id,
        ))
        .await
        .unwrap();
    assert_eq!(resend.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn preview_shows_details_and_tracks_validity() {
    let app = TestApp::spawn().await;
    let team = app.seed_team().await;
    let (_, token) = app
        .issue_invitation(
            team.provider.provider_id,
            team.admin.user_id,
            "pat@example.com",
            "staff",
        )
        .await;

    let preview = app
        .router
        .clone()
        .oneshot(public_get(&format!("/invitations/{}", token)))
        .await
        .unwrap();
    assert_eq!(preview.status(), StatusCode::OK);
    let body = response_json(preview).await;
    assert_eq!(body["provider_name"], "Seasonal Table Catering");
    assert_eq!(body["email"], "pat@example.com");
    assert_eq!(body["role_code"], "staff");
    assert_eq!(body["is_valid"], true);

    let accept = app
        .router
        .clone()
        .oneshot(public_request(
            "POST",
            "/invitations/accept",
            json!({ "token": token }),
        ))
        .await
        .unwrap();
    assert_eq!(accept.status(), StatusCode::CREATED);

    // The page can still render after acceptance, but flags the
    // invitation as no longer usable.
    let after = app
        .router
        .clone()
        .oneshot(public_get(&format!("/invitations/{}", token)))
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::OK);
    assert_eq!(response_json(after).await["is_valid"], false);
}

#[tokio::test]
async fn concurrent_issues_for_one_email_collapse_to_one_row() {
    let app = TestApp::spawn().await;
    let team = app.seed_team().await;

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let service = app.team.clone();
        let provider_id = team.provider.provider_id;
        let actor_id = team.admin.user_id;
        tasks.push(tokio::spawn(async move {
            service
                .issue_invitation(
                    provider_id,
                    actor_id,
                    IssueInvitationRequest {
                        email: "race@example.com".to_string(),
                        role: TeamRole::Staff,
                        expires_in_hours: None,
                    },
                    &RequestOrigin::default(),
                )
                .await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for joined in futures::future::join_all(tasks).await {
        match joined.unwrap() {
            Ok(_) => created += 1,
            Err(ServiceError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("Unexpected error: {other:?}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(conflicts, 4);
    assert_eq!(app.notifier.sent().await.len(), 1);
}
