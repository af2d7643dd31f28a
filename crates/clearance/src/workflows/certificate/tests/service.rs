use super::common::*;
use std::sync::Arc;

use crate::workflows::certificate::domain::{
    ApplicationId, Office, OfficeDecision, OverallStatus, PaymentStatus,
};
use crate::workflows::certificate::engine::ClearanceError;
use crate::workflows::certificate::repository::{ApplicationStore, QueueFilter, StoreError};
use crate::workflows::certificate::service::{
    CertificateClearanceService, CertificateServiceError,
};

#[test]
fn submit_requires_the_owning_student() {
    let (service, _, _) = build_service();

    match service.submit(&student_actor("someone-else"), submission()) {
        Err(CertificateServiceError::Forbidden { .. }) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }

    match service.submit(&office_actor(Office::Faculty), submission()) {
        Err(CertificateServiceError::Forbidden { .. }) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }
}

#[test]
fn second_active_application_is_refused() {
    let (service, _, _) = build_service();
    let student = student_actor(STUDENT);

    let first = service.submit(&student, submission()).expect("first submit");
    match service.submit(&student, submission()) {
        Err(CertificateServiceError::ActiveApplicationExists { id }) => {
            assert_eq!(id, first.id);
        }
        other => panic!("expected active-application conflict, got {other:?}"),
    }
}

#[test]
fn rejected_application_frees_the_slot() {
    let (service, _, _) = build_service();
    let student = student_actor(STUDENT);

    let first = service.submit(&student, submission()).expect("first submit");
    service
        .record_decision(
            &office_actor(Office::Faculty),
            &first.id,
            Office::Faculty,
            OfficeDecision::Rejected,
            Some("wrong batch listed"),
        )
        .expect("faculty rejects");

    let second = service
        .submit(&student, submission())
        .expect("rejected application no longer blocks a new one");
    assert_ne!(second.id, first.id);
}

#[test]
fn cross_office_decisions_are_forbidden() {
    let (service, store, _) = build_service();
    let application = service
        .submit(&student_actor(STUDENT), submission())
        .expect("submit");

    match service.record_decision(
        &office_actor(Office::Library),
        &application.id,
        Office::Faculty,
        OfficeDecision::Approved,
        None,
    ) {
        Err(CertificateServiceError::Forbidden { .. }) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }

    // Nothing was persisted.
    let stored = store
        .load(&application.id)
        .expect("load succeeds")
        .expect("record present");
    assert_eq!(stored.overall_status, OverallStatus::Pending);
}

#[test]
fn decisions_bump_the_stored_version() {
    let (service, store, _) = build_service();
    let application = service
        .submit(&student_actor(STUDENT), submission())
        .expect("submit");
    assert_eq!(application.version, 1);

    let updated = service
        .record_decision(
            &office_actor(Office::Faculty),
            &application.id,
            Office::Faculty,
            OfficeDecision::Approved,
            None,
        )
        .expect("faculty approves");
    assert_eq!(updated.version, 2);

    let stored = store
        .load(&application.id)
        .expect("load succeeds")
        .expect("record present");
    assert_eq!(stored, updated);
}

#[test]
fn losing_writer_surfaces_store_conflict() {
    let store = Arc::new(ConflictOnSaveStore {
        inner: MemoryStore::default(),
    });
    let sink = Arc::new(MemorySink::default());
    let service =
        CertificateClearanceService::new(store, sink, Arc::new(FakeGateway));

    let application = service
        .submit(&student_actor(STUDENT), submission())
        .expect("insert still works");

    match service.record_decision(
        &office_actor(Office::Faculty),
        &application.id,
        Office::Faculty,
        OfficeDecision::Approved,
        None,
    ) {
        Err(CertificateServiceError::Store(StoreError::Conflict)) => {}
        other => panic!("expected store conflict, got {other:?}"),
    }
}

#[test]
fn unavailable_store_propagates() {
    let service = CertificateClearanceService::new(
        Arc::new(UnavailableStore),
        Arc::new(MemorySink::default()),
        Arc::new(FakeGateway),
    );

    match service.submit(&student_actor(STUDENT), submission()) {
        Err(CertificateServiceError::Store(StoreError::Unavailable(_))) => {}
        other => panic!("expected unavailable error, got {other:?}"),
    }
}

#[test]
fn persisted_decision_survives_a_failing_notification_sink() {
    let store = Arc::new(MemoryStore::default());
    let service = CertificateClearanceService::new(
        store.clone(),
        Arc::new(FailingSink),
        Arc::new(FakeGateway),
    );
    let application = service
        .submit(&student_actor(STUDENT), submission())
        .expect("submit");

    let updated = service
        .record_decision(
            &office_actor(Office::Faculty),
            &application.id,
            Office::Faculty,
            OfficeDecision::Rejected,
            Some("missing transcript"),
        )
        .expect("a dead notification transport must not fail the decision");
    assert_eq!(updated.overall_status, OverallStatus::Rejected);

    let stored = store
        .load(&application.id)
        .expect("load succeeds")
        .expect("record present");
    assert_eq!(stored, updated);
}

#[test]
fn rejection_notifies_the_student_with_the_reason() {
    let (service, _, sink) = build_service();
    let application = service
        .submit(&student_actor(STUDENT), submission())
        .expect("submit");

    service
        .record_decision(
            &office_actor(Office::Faculty),
            &application.id,
            Office::Faculty,
            OfficeDecision::Rejected,
            Some("missing transcript"),
        )
        .expect("faculty rejects");

    let notices = sink.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].template, "application_rejected");
    assert_eq!(notices[0].application_id, application.id);
    assert_eq!(
        notices[0].details.get("message").map(String::as_str),
        Some("missing transcript")
    );
}

#[test]
fn full_clearance_emits_a_completion_notice() {
    let (service, _, sink) = build_service();
    let application = service
        .submit(&student_actor(STUDENT), submission())
        .expect("submit");

    approve_through(&service, &application.id, Office::Registrar);

    let notices = sink.notices();
    assert_eq!(notices.len(), 1, "intermediate approvals are silent");
    assert_eq!(notices[0].template, "clearance_complete");
}

#[test]
fn payment_result_is_the_only_writer_of_payment_status() {
    let (service, _, _) = build_service();
    let application = service
        .submit(&student_actor(STUDENT), submission())
        .expect("submit");

    let paid = service
        .payment_result(&application.id, true)
        .expect("callback applies");
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.overall_status, OverallStatus::Pending);

    let unpaid = service
        .payment_result(&application.id, false)
        .expect("failure callback applies");
    assert_eq!(unpaid.payment_status, PaymentStatus::Unpaid);
}

#[test]
fn initiate_payment_returns_the_gateway_redirect() {
    let (service, _, _) = build_service();
    let application = service
        .submit(&student_actor(STUDENT), submission())
        .expect("submit");

    let redirect = service
        .initiate_payment(&student_actor(STUDENT), &application.id)
        .expect("gateway session opens");
    assert!(redirect.contains(&application.id.0));
    assert!(redirect.contains("amount=2500"));

    match service.initiate_payment(&student_actor("someone-else"), &application.id) {
        Err(CertificateServiceError::Forbidden { .. }) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }
}

#[test]
fn students_only_see_their_own_application() {
    let (service, _, _) = build_service();
    let application = service
        .submit(&student_actor(STUDENT), submission())
        .expect("submit");

    assert!(service.status(&student_actor(STUDENT), &application.id).is_ok());
    assert!(service
        .status(&office_actor(Office::Accounts), &application.id)
        .is_ok());
    assert!(service.status(&admin_actor(), &application.id).is_ok());

    match service.status(&student_actor("someone-else"), &application.id) {
        Err(CertificateServiceError::Forbidden { .. }) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }
}

#[test]
fn status_for_missing_application_is_not_found() {
    let (service, _, _) = build_service();
    match service.status(&admin_actor(), &ApplicationId("cert-missing".to_string())) {
        Err(CertificateServiceError::Store(StoreError::NotFound)) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn queue_is_scoped_to_the_office_and_admins() {
    let (service, _, _) = build_service();
    let application = service
        .submit(&student_actor(STUDENT), submission())
        .expect("submit");

    let faculty_queue = service
        .queue(
            &office_actor(Office::Faculty),
            Office::Faculty,
            QueueFilter::AwaitingDecision,
        )
        .expect("faculty lists its queue");
    assert_eq!(faculty_queue.len(), 1);
    assert_eq!(faculty_queue[0].id, application.id);

    let library_queue = service
        .queue(
            &office_actor(Office::Library),
            Office::Library,
            QueueFilter::AwaitingDecision,
        )
        .expect("library lists its queue");
    assert!(library_queue.is_empty(), "library is not the pending step yet");

    assert!(service
        .queue(&admin_actor(), Office::Faculty, QueueFilter::All)
        .is_ok());

    match service.queue(
        &office_actor(Office::Library),
        Office::Faculty,
        QueueFilter::All,
    ) {
        Err(CertificateServiceError::Forbidden { .. }) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }

    match service.queue(&student_actor(STUDENT), Office::Faculty, QueueFilter::All) {
        Err(CertificateServiceError::Forbidden { .. }) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }
}

#[test]
fn decided_filter_lists_past_decisions() {
    let (service, _, _) = build_service();
    let application = service
        .submit(&student_actor(STUDENT), submission())
        .expect("submit");
    approve_through(&service, &application.id, Office::Faculty);

    let decided = service
        .queue(
            &office_actor(Office::Faculty),
            Office::Faculty,
            QueueFilter::Decided,
        )
        .expect("faculty lists decided applications");
    assert_eq!(decided.len(), 1);

    let awaiting = service
        .queue(
            &office_actor(Office::Faculty),
            Office::Faculty,
            QueueFilter::AwaitingDecision,
        )
        .expect("faculty lists awaiting applications");
    assert!(awaiting.is_empty());
}

#[test]
fn resubmit_is_limited_to_the_owner_and_rejected_state() {
    let (service, _, _) = build_service();
    let application = service
        .submit(&student_actor(STUDENT), submission())
        .expect("submit");

    match service.resubmit(&student_actor(STUDENT), &application.id, payload()) {
        Err(CertificateServiceError::Clearance(ClearanceError::NotRejected { .. })) => {}
        other => panic!("expected not-rejected error, got {other:?}"),
    }

    service
        .record_decision(
            &office_actor(Office::Faculty),
            &application.id,
            Office::Faculty,
            OfficeDecision::Rejected,
            Some("photo unreadable"),
        )
        .expect("faculty rejects");

    match service.resubmit(&student_actor("someone-else"), &application.id, payload()) {
        Err(CertificateServiceError::Forbidden { .. }) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }

    let resubmitted = service
        .resubmit(&student_actor(STUDENT), &application.id, payload())
        .expect("owner resubmits");
    assert_eq!(resubmitted.overall_status, OverallStatus::Pending);
    assert_eq!(resubmitted.payment_status, PaymentStatus::Unpaid);
}
