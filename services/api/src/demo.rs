use crate::infra::{
    InMemoryApplicationStore, InMemoryBlobStore, InMemoryNotificationSink, LoggingPaymentGateway,
};
use chrono::NaiveDate;
use clap::Args;
use std::sync::Arc;

use clearance::error::AppError;
use clearance::workflows::certificate::{
    Actor, ApplicationPayload, ApplicationSubmission, BlobStore, CertificateClearanceService,
    Office, OfficeDecision, Role, StudentId,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Student identifier to submit the demo application under.
    #[arg(long, default_value = "s-2021-0042")]
    pub(crate) student_id: String,
    /// Reject the application at this office before the final approval pass.
    #[arg(long)]
    pub(crate) reject_at: Option<Office>,
    /// Rejection reason used together with --reject-at.
    #[arg(long, default_value = "submitted records do not match the registry")]
    pub(crate) reason: String,
    /// Skip the payment initiation and callback portion of the demo.
    #[arg(long)]
    pub(crate) skip_payment: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        student_id,
        reject_at,
        reason,
        skip_payment,
    } = args;

    println!("Certificate clearance demo");

    let store = Arc::new(InMemoryApplicationStore::default());
    let notices = Arc::new(InMemoryNotificationSink::default());
    let payments = Arc::new(LoggingPaymentGateway);
    let blobs = InMemoryBlobStore::default();
    let service = CertificateClearanceService::new(store, notices.clone(), payments);

    let student = Actor {
        subject: student_id.clone(),
        role: Role::Student,
    };

    let ssc = match blobs.store(b"<ssc certificate scan>", "application/pdf") {
        Ok(reference) => reference,
        Err(err) => {
            println!("  Blob upload failed: {err}");
            return Ok(());
        }
    };
    let hsc = match blobs.store(b"<hsc certificate scan>", "application/pdf") {
        Ok(reference) => reference,
        Err(err) => {
            println!("  Blob upload failed: {err}");
            return Ok(());
        }
    };
    println!("Uploaded certificate scans: {ssc}, {hsc}");

    let submission = ApplicationSubmission {
        student_id: StudentId(student_id.clone()),
        payload: demo_payload(&student_id, Some(ssc), Some(hsc)),
    };
    let application = match service.submit(&student, submission) {
        Ok(application) => application,
        Err(err) => {
            println!("  Submission refused: {err}");
            return Ok(());
        }
    };
    println!(
        "Submitted application {} for {} -> status {}",
        application.id, application.student_id, application.overall_status
    );

    let chain: Vec<Office> = service.engine().chain().offices().to_vec();

    if let Some(target) = reject_at {
        for office in &chain {
            let decision = if *office == target {
                OfficeDecision::Rejected
            } else {
                OfficeDecision::Approved
            };
            let message = (decision == OfficeDecision::Rejected).then_some(reason.as_str());
            match service.record_decision(&desk(*office), &application.id, *office, decision, message)
            {
                Ok(updated) => println!(
                    "  {} -> {} (overall {})",
                    office,
                    match decision {
                        OfficeDecision::Approved => "approved",
                        OfficeDecision::Rejected => "rejected",
                    },
                    updated.overall_status
                ),
                Err(err) => {
                    println!("  {office} decision failed: {err}");
                    return Ok(());
                }
            }
            if *office == target {
                break;
            }
        }

        let mut revised = demo_payload(&student_id, None, None);
        revised.remarks = Some("corrected after rejection".to_string());
        match service.resubmit(&student, &application.id, revised) {
            Ok(updated) => println!(
                "Resubmitted application {} -> status {}",
                updated.id, updated.overall_status
            ),
            Err(err) => {
                println!("  Resubmission failed: {err}");
                return Ok(());
            }
        }
    }

    for office in &chain {
        match service.record_decision(
            &desk(*office),
            &application.id,
            *office,
            OfficeDecision::Approved,
            None,
        ) {
            Ok(updated) => println!("  {} approved (overall {})", office, updated.overall_status),
            Err(err) => {
                println!("  {office} approval failed: {err}");
                return Ok(());
            }
        }
    }

    if !skip_payment {
        match service.initiate_payment(&student, &application.id) {
            Ok(redirect) => println!("Payment session: {redirect}"),
            Err(err) => println!("  Payment initiation failed: {err}"),
        }
        match service.payment_result(&application.id, true) {
            Ok(updated) => println!("Payment confirmed -> {}", updated.payment_status.label()),
            Err(err) => println!("  Payment callback failed: {err}"),
        }
    }

    match service.status(&student, &application.id) {
        Ok(application) => match serde_json::to_string_pretty(&application.status_view()) {
            Ok(json) => println!("Final status payload:\n{json}"),
            Err(err) => println!("  Status payload unavailable: {err}"),
        },
        Err(err) => println!("  Status lookup failed: {err}"),
    }

    let events = notices.notices();
    if events.is_empty() {
        println!("Notices: none dispatched");
    } else {
        println!("Notices:");
        for notice in events {
            println!("  - template={} -> {}", notice.template, notice.application_id);
        }
    }

    Ok(())
}

fn desk(office: Office) -> Actor {
    Actor {
        subject: format!("{office}-desk"),
        role: Role::Office(office),
    }
}

fn demo_payload(
    student_id: &str,
    ssc: Option<String>,
    hsc: Option<String>,
) -> ApplicationPayload {
    ApplicationPayload {
        student_name: format!("Demo Student ({student_id})"),
        program: "BSc in CSE".to_string(),
        batch: "49".to_string(),
        campus: "Permanent Campus".to_string(),
        mobile: "+8801700000000".to_string(),
        email: format!("{student_id}@example.edu"),
        date_of_birth: NaiveDate::from_ymd_opt(1999, 4, 12).unwrap_or_default(),
        last_semester: "Fall 2024".to_string(),
        passing_year: 2025,
        credit_completed: 148,
        credit_waived: 0,
        application_type: 1,
        ssc_certificate: ssc,
        hsc_certificate: hsc,
        payment_amount: 2500,
        remarks: None,
    }
}
