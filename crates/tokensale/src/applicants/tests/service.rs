use super::common::*;
use crate::applicants::domain::{
    ApplicantPhase, ApplyRequest, ParticipationRequest, RegistrationRequest, SessionRequest,
};
use crate::applicants::{ApplicantService, ApplicantServiceError};
use crate::mail::EmailTemplate;
use crate::sale::SaleConfig;
use crate::tokens::TokenError;
use std::sync::Arc;

fn full_registration() -> RegistrationRequest {
    RegistrationRequest {
        first_name: Some("John".to_string()),
        last_name: Some("Galt".to_string()),
        eth_amount: Some(3.0),
    }
}

#[test]
fn apply_creates_applicant_with_mnemonic_and_sends_link() {
    let (service, repository, mailer) = build_service();

    let applicant = service
        .apply(&open_sale(), apply_request(" John@Galt.com "))
        .expect("apply succeeds");

    assert_eq!(applicant.email, EMAIL);
    assert!(applicant.mnemonic_phrase.is_some());
    assert_eq!(applicant.phase(), ApplicantPhase::Applied);
    assert_eq!(repository.stored(&applicant.id), applicant);

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template, EmailTemplate::MagicLink);
    assert_eq!(sent[0].to, EMAIL);
    let link = sent[0].details.get("link").expect("link detail");
    assert!(link.starts_with("https://sale.example/login?token="));
}

#[test]
fn apply_twice_with_same_email_fails() {
    let (service, _, _) = build_service();
    service
        .apply(&open_sale(), apply_request(EMAIL))
        .expect("first apply succeeds");

    let err = service
        .apply(&open_sale(), apply_request("JOHN@galt.com"))
        .unwrap_err();
    assert!(matches!(err, ApplicantServiceError::AlreadyApplied));
}

#[test]
fn apply_maps_insert_conflict_to_duplicate() {
    let service = ApplicantService::new(
        Arc::new(RacingRepository),
        Arc::new(MemoryMailer::default()),
        codec(),
        "https://sale.example",
    );

    let err = service
        .apply(&open_sale(), apply_request(EMAIL))
        .unwrap_err();
    assert!(matches!(err, ApplicantServiceError::AlreadyApplied));
}

#[test]
fn apply_rejects_outside_sale_window() {
    let (service, repository, mailer) = build_service();

    let err = service
        .apply(&closed_sale(), apply_request(EMAIL))
        .unwrap_err();

    assert!(matches!(err, ApplicantServiceError::SaleClosed));
    assert!(repository.records.lock().unwrap().is_empty());
    assert!(mailer.sent().is_empty());
}

#[test]
fn apply_rejects_when_acceptance_disabled() {
    let (service, _, _) = build_service();
    let sale = SaleConfig {
        accept_applicants: false,
        ..open_sale()
    };

    let err = service.apply(&sale, apply_request(EMAIL)).unwrap_err();
    assert_eq!(err.to_string(), "Token sale is not accepting applicants");
}

#[test]
fn apply_requires_an_email() {
    let (service, _, _) = build_service();

    for request in [ApplyRequest::default(), apply_request("not-an-email")] {
        let err = service.apply(&open_sale(), request).unwrap_err();
        assert_eq!(err.to_string(), "Need a valid email");
    }
}

#[test]
fn apply_succeeds_when_mail_transport_is_down() {
    let service = ApplicantService::new(
        Arc::new(MemoryRepository::default()),
        Arc::new(OfflineMailer),
        codec(),
        "https://sale.example",
    );

    service
        .apply(&open_sale(), apply_request(EMAIL))
        .expect("mail failures do not fail apply");
}

#[test]
fn issue_session_stores_magic_token_for_the_signed_applicant() {
    let (service, repository, _) = build_service();
    let john = service
        .apply(&open_sale(), apply_request(EMAIL))
        .expect("apply succeeds");
    let dagny = service
        .apply(&open_sale(), apply_request("dagny@taggart.com"))
        .expect("apply succeeds");

    let temporary = service.temporary_token(&john).expect("token signs");
    let grant = service
        .issue_session(SessionRequest {
            token: Some(temporary),
        })
        .expect("session issues");

    let resolved = service
        .resolve_session(&grant.token)
        .expect("session decodes")
        .expect("applicant resolved");
    assert_eq!(resolved.id, john.id);
    assert_eq!(resolved.phase(), ApplicantPhase::Authenticated);
    assert!(repository.stored(&dagny.id).magic_token.is_none());
}

#[test]
fn reissuing_a_session_revokes_the_previous_one() {
    let (service, _, _) = build_service();
    let john = service
        .apply(&open_sale(), apply_request(EMAIL))
        .expect("apply succeeds");

    let first = service
        .issue_session(SessionRequest {
            token: Some(service.temporary_token(&john).expect("token signs")),
        })
        .expect("first session");
    let second = service
        .issue_session(SessionRequest {
            token: Some(service.temporary_token(&john).expect("token signs")),
        })
        .expect("second session");

    assert!(service
        .resolve_session(&first.token)
        .expect("old token still verifies")
        .is_none());
    assert!(service
        .resolve_session(&second.token)
        .expect("new token verifies")
        .is_some());
}

#[test]
fn issue_session_rejects_malformed_and_missing_tokens() {
    let (service, _, _) = build_service();

    let err = service
        .issue_session(SessionRequest {
            token: Some("wrong".to_string()),
        })
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicantServiceError::Token(TokenError::Malformed)
    ));

    let err = service
        .issue_session(SessionRequest::default())
        .unwrap_err();
    assert_eq!(err.to_string(), "Need a valid token");
}

#[test]
fn issue_session_rejects_tokens_for_unknown_applicants() {
    let (service, _, _) = build_service();
    let (other, _, _) = build_service();
    let stranger = other
        .apply(&open_sale(), apply_request(EMAIL))
        .expect("apply succeeds");

    let err = service
        .issue_session(SessionRequest {
            token: Some(other.temporary_token(&stranger).expect("token signs")),
        })
        .unwrap_err();
    assert!(matches!(err, ApplicantServiceError::UnknownApplicant));
}

#[test]
fn register_rejects_missing_fields_without_mutating() {
    let (service, repository, _) = build_service();
    let applicant = service
        .apply(&open_sale(), apply_request(EMAIL))
        .expect("apply succeeds");
    let before = repository.stored(&applicant.id);

    let cases = [
        (RegistrationRequest::default(), "Need a valid firstName"),
        (
            RegistrationRequest {
                last_name: None,
                ..full_registration()
            },
            "Need a valid lastName",
        ),
        (
            RegistrationRequest {
                eth_amount: Some(-1.0),
                ..full_registration()
            },
            "Need a valid ethAmount",
        ),
        (
            RegistrationRequest {
                first_name: Some("   ".to_string()),
                ..full_registration()
            },
            "Need a valid firstName",
        ),
    ];

    for (request, message) in cases {
        let err = service
            .register(&open_sale(), &applicant, request)
            .unwrap_err();
        assert_eq!(err.to_string(), message);
        assert_eq!(repository.stored(&applicant.id), before);
    }
}

#[test]
fn register_completes_registration_and_clears_mnemonic() {
    let (service, repository, mailer) = build_service();
    let applicant = service
        .apply(&open_sale(), apply_request(EMAIL))
        .expect("apply succeeds");

    let registered = service
        .register(&open_sale(), &applicant, full_registration())
        .expect("registration succeeds");

    assert!(registered.completed_registration);
    assert!(registered.mnemonic_phrase.is_none());
    assert_eq!(registered.first_name.as_deref(), Some("John"));
    assert_eq!(registered.eth_amount, Some(3.0));
    assert!(registered.registered_at.is_some());
    assert_eq!(repository.stored(&applicant.id), registered);
    assert_eq!(
        mailer.sent().last().map(|message| message.template),
        Some(EmailTemplate::RegistrationComplete)
    );
}

#[test]
fn register_rejects_second_registration_and_closed_sale() {
    let (service, repository, _) = build_service();
    let applicant = service
        .apply(&open_sale(), apply_request(EMAIL))
        .expect("apply succeeds");

    let err = service
        .register(&closed_sale(), &applicant, full_registration())
        .unwrap_err();
    assert!(matches!(err, ApplicantServiceError::SaleClosed));
    assert!(!repository.stored(&applicant.id).completed_registration);

    service
        .register(&open_sale(), &applicant, full_registration())
        .expect("registration succeeds");
    let err = service
        .register(&open_sale(), &applicant, full_registration())
        .unwrap_err();
    assert!(matches!(err, ApplicantServiceError::AlreadyRegistered));
}

#[test]
fn participate_requires_completed_registration() {
    let (service, repository, _) = build_service();
    let applicant = service
        .apply(&open_sale(), apply_request(EMAIL))
        .expect("apply succeeds");

    let err = service
        .participate(
            &applicant,
            ParticipationRequest {
                eth_address: Some("0x00".to_string()),
            },
        )
        .unwrap_err();

    assert!(matches!(err, ApplicantServiceError::RegistrationIncomplete));
    assert!(repository.stored(&applicant.id).eth_address.is_none());
}

#[test]
fn participate_requires_an_address() {
    let (service, _, _) = build_service();
    let applicant = service
        .apply(&open_sale(), apply_request(EMAIL))
        .expect("apply succeeds");
    service
        .register(&open_sale(), &applicant, full_registration())
        .expect("registration succeeds");

    let err = service
        .participate(&applicant, ParticipationRequest::default())
        .unwrap_err();
    assert_eq!(err.to_string(), "Need a valid ethAddress");
}

#[test]
fn participate_records_address_against_stored_state() {
    let (service, repository, _) = build_service();
    let applicant = service
        .apply(&open_sale(), apply_request(EMAIL))
        .expect("apply succeeds");
    service
        .register(&open_sale(), &applicant, full_registration())
        .expect("registration succeeds");

    // `applicant` is the pre-registration snapshot; the service must read the stored record.
    let participated = service
        .participate(
            &applicant,
            ParticipationRequest {
                eth_address: Some("0x00".to_string()),
            },
        )
        .expect("participation succeeds");

    assert_eq!(participated.eth_address.as_deref(), Some("0x00"));
    assert_eq!(participated.phase(), ApplicantPhase::Participated);
    assert_eq!(participated.last_name.as_deref(), Some("Galt"));
    assert_eq!(repository.stored(&applicant.id), participated);
}

fn interleaving_service() -> (
    ApplicantService<InterleavingRepository, MemoryMailer>,
    Arc<InterleavingRepository>,
) {
    let repository = Arc::new(InterleavingRepository::default());
    let service = ApplicantService::new(
        repository.clone(),
        Arc::new(MemoryMailer::default()),
        codec(),
        "https://sale.example",
    );
    (service, repository)
}

#[test]
fn issue_session_keeps_a_registration_that_lands_mid_request() {
    let (service, repository) = interleaving_service();
    let applicant = service
        .apply(&open_sale(), apply_request(EMAIL))
        .expect("apply succeeds");
    let temporary = service.temporary_token(&applicant).expect("token signs");

    let id = applicant.id.clone();
    repository.before_next_modify(move |store| complete_registration(store, &id));
    service
        .issue_session(SessionRequest {
            token: Some(temporary),
        })
        .expect("session issues");

    let stored = repository.inner.stored(&applicant.id);
    assert!(stored.completed_registration);
    assert!(stored.mnemonic_phrase.is_none());
    assert_eq!(stored.first_name.as_deref(), Some("Dagny"));
    assert!(stored.magic_token.is_some());
    assert_eq!(stored.phase(), ApplicantPhase::Registered);
}

#[test]
fn register_sees_a_registration_that_lands_mid_request() {
    let (service, repository) = interleaving_service();
    let applicant = service
        .apply(&open_sale(), apply_request(EMAIL))
        .expect("apply succeeds");

    let id = applicant.id.clone();
    repository.before_next_modify(move |store| complete_registration(store, &id));
    let err = service
        .register(&open_sale(), &applicant, full_registration())
        .unwrap_err();

    assert!(matches!(err, ApplicantServiceError::AlreadyRegistered));
    let stored = repository.inner.stored(&applicant.id);
    assert_eq!(stored.first_name.as_deref(), Some("Dagny"));
    assert_eq!(stored.eth_amount, Some(7.0));
}
