//! End-to-end webhook tests exercising the Axum router against an in-memory SQLite
//! database, driven over real HTTP request/response plumbing via `tower::ServiceExt::oneshot`
//! rather than calling handlers directly.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{NaiveDate, NaiveTime};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use shift_coordinator::arbiter;
use shift_coordinator::domain::{
    Employee, OnCallWindow, OutboundCallingConfig, Patient, Provider, ShiftOccurrence,
    ShiftTemplate, WaveDelayConfig,
};
use shift_coordinator::queue::SqlxJobQueue;
use shift_coordinator::repository::{Repository, SqlxRepository};
use shift_coordinator::server::{build_router, AppState};
use shift_coordinator::session_store::SessionStore;
use shift_coordinator::sms::NullSmsAdapter;

async fn seeded_app() -> (axum::Router, SqlxRepository) {
    let repo = SqlxRepository::new_in_memory().await.expect("in-memory db");
    let queue = SqlxJobQueue::new(repo.pool().clone());
    let sms = Arc::new(NullSmsAdapter::default());
    let arbiter = arbiter::spawn(Arc::new(repo.clone()), Arc::new(queue), sms.clone());
    let state = AppState::new(Arc::new(repo.clone()), SessionStore::new(), arbiter, sms);

    repo.create_provider(&Provider {
        id: "prov-1".into(),
        name: "Riverside Home Care".into(),
        phone_number: "+61291230000".into(),
        timezone: "Australia/Sydney".into(),
        transfer_number: Some("+61491570000".into()),
        ivr_greeting_text: "Thanks for calling Riverside after hours.".into(),
        on_call_window: OnCallWindow {
            start_local: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            end_local: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            timezone: "Australia/Sydney".into(),
        },
        outbound_calling: OutboundCallingConfig {
            enabled: true,
            wait_minutes: 15,
            max_rounds: 3,
            message_template: "Shift available for {patientName}".into(),
        },
        wave_delays: WaveDelayConfig::default(),
    })
    .await
    .unwrap();

    repo.create_employee(&Employee {
        id: "emp-1".into(),
        provider_id: "prov-1".into(),
        display_name: "Alice".into(),
        phone: "+61491570006".into(),
        pin: "1234".into(),
        active: true,
        outbound_call_opt_in: true,
    })
    .await
    .unwrap();

    repo.create_patient(&Patient {
        id: "pat-1".into(),
        provider_id: "prov-1".into(),
        display_name: "Jane D.".into(),
        phone: "+61491570099".into(),
        dob: NaiveDate::from_ymd_opt(1980, 1, 1).unwrap(),
        staff_pool: vec!["emp-1".into()],
    })
    .await
    .unwrap();

    repo.create_shift_template(&ShiftTemplate {
        id: "tmpl-1".into(),
        provider_id: "prov-1".into(),
        patient_id: "pat-1".into(),
        default_employee_id: Some("emp-1".into()),
        job_code: "AB12".into(),
        start_of_day: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        end_of_day: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
    })
    .await
    .unwrap();

    repo.create_shift_occurrence(&ShiftOccurrence {
        id: "occ-1".into(),
        template_id: Some("tmpl-1".into()),
        patient_id: "pat-1".into(),
        provider_id: "prov-1".into(),
        assigned_employee_id: Some("emp-1".into()),
        scheduled_date: chrono::Utc::now().date_naive() + chrono::Duration::days(1),
        start_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        status: shift_coordinator::domain::OccurrenceStatus::Assigned,
        wave1_sent_at: None,
    })
    .await
    .unwrap();

    (build_router(state), repo)
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn call_start_for_a_known_employee_goes_straight_to_job_code() {
    let (app, _repo) = seeded_app().await;

    let response = app
        .oneshot(json_request(
            "/webhooks/telephony/call-start",
            json!({"call_id": "call-1", "from": "+61491570006", "to": "+61291230000"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["action"], "gather_speech");
}

#[tokio::test]
async fn full_reschedule_flow_over_http_ends_in_a_finalised_call_log() {
    let (app, repo) = seeded_app().await;

    let resp = app
        .clone()
        .oneshot(json_request(
            "/webhooks/telephony/call-start",
            json!({"call_id": "call-2", "from": "+61491570006", "to": "+61291230000"}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["action"], "gather_speech");

    let resp = app
        .clone()
        .oneshot(json_request(
            "/webhooks/telephony/speech-result",
            json!({"call_id": "call-2", "transcript": "AB12", "confidence": 1.0}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["action"], "gather_speech");

    let resp = app
        .clone()
        .oneshot(json_request(
            "/webhooks/telephony/speech-result",
            json!({"call_id": "call-2", "transcript": "yes", "confidence": 1.0}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["action"], "gather_speech");

    let resp = app
        .clone()
        .oneshot(json_request(
            "/webhooks/telephony/speech-result",
            json!({"call_id": "call-2", "transcript": "reschedule", "confidence": 1.0}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["action"], "gather_dtmf");

    let resp = app
        .clone()
        .oneshot(json_request(
            "/webhooks/telephony/dtmf",
            json!({"call_id": "call-2", "digit": "1"}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["action"], "gather_speech");

    let resp = app
        .clone()
        .oneshot(json_request(
            "/webhooks/telephony/speech-result",
            json!({"call_id": "call-2", "transcript": "next tuesday at 10 am", "confidence": 1.0}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["action"], "gather_speech");

    let resp = app
        .clone()
        .oneshot(json_request(
            "/webhooks/telephony/speech-result",
            json!({"call_id": "call-2", "transcript": "yes", "confidence": 1.0}),
        ))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["action"], "play_then_hang_up");

    let updated = repo.get_occurrence("occ-1").await.unwrap().unwrap();
    assert_eq!(updated.status, shift_coordinator::domain::OccurrenceStatus::Rescheduled);

    let log = repo.get_call_log("log:call-2").await.unwrap().unwrap();
    assert_eq!(log.outcome.as_deref(), Some("Rescheduled"));
    assert!(log.ended_at.is_some());
}

#[tokio::test]
async fn admin_can_list_occurrences_by_status() {
    let (app, _repo) = seeded_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/admin/providers/prov-1/occurrences?status=ASSIGNED")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let occurrences = body.as_array().unwrap();
    assert_eq!(occurrences.len(), 1);
    assert_eq!(occurrences[0]["id"], "occ-1");
}
