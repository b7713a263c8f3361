use std::sync::Arc;

use dicom_dictionary_std::uids;
use dicom_net::capability::{DigitalSignatureSupport, ElementCoercion, LevelOfSupport, ANY};
use dicom_net::pdu::{
    AssociationRJ, AssociationRJResult, AssociationRJServiceProviderPresentationReason,
    AssociationRJServiceUserReason, AssociationRJSource, AssociationRQ,
    CommonExtendedNegotiation, PresentationContextProposed, PresentationContextResultReason,
    RoleSelection, UserIdentity, UserIdentityType, UserVariableItem,
};
use dicom_net::{
    ApplicationEntity, Connection, Device, ErrorKind, Installed, QueryOptions, Role,
    StorageOptions, TransferCapability, IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME,
};
use rstest::rstest;
use tracing_subscriber::EnvFilter;

static SCU_AE_TITLE: &str = "STORE-SCU";
static SCP_AE_TITLE: &str = "STORE-SCP";
static STORAGE_SERVICE_CLASS: &str = "1.2.840.10008.4.2";

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn acceptor() -> (ApplicationEntity, Arc<Connection>, Arc<Device>) {
    init_logging();
    let device = Arc::new(Device::new("archive"));
    let conn = Arc::new(Connection::new("127.0.0.1").with_port(11112));
    let mut ae = ApplicationEntity::new(SCP_AE_TITLE).unwrap();
    ae.set_device(Some(device.clone())).unwrap();
    ae.add_connection(conn.clone());
    ae.add_transfer_capability(TransferCapability::new(
        uids::VERIFICATION,
        Role::Scp,
        [uids::IMPLICIT_VR_LITTLE_ENDIAN],
    ));
    (ae, conn, device)
}

fn pc(id: u8, abstract_syntax: &str, transfer_syntaxes: &[&str]) -> PresentationContextProposed {
    PresentationContextProposed {
        id,
        abstract_syntax: abstract_syntax.to_string(),
        transfer_syntaxes: transfer_syntaxes.iter().map(|ts| ts.to_string()).collect(),
    }
}

fn request(presentation_contexts: Vec<PresentationContextProposed>) -> AssociationRQ {
    AssociationRQ {
        calling_ae_title: SCU_AE_TITLE.to_string(),
        called_ae_title: SCP_AE_TITLE.to_string(),
        presentation_contexts,
        ..Default::default()
    }
}

fn rejection(ae: &ApplicationEntity, conn: &Arc<Connection>, rq: &AssociationRQ) -> AssociationRJ {
    let err = ae.negotiate(conn, rq).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Reject);
    err.association_rj().cloned().expect("rejection descriptor")
}

#[test]
fn accepts_verification() {
    let (ae, conn, _device) = acceptor();
    let rq = request(vec![pc(1, uids::VERIFICATION, &[uids::IMPLICIT_VR_LITTLE_ENDIAN])]);

    let ac = ae.negotiate(&conn, &rq).unwrap();
    assert_eq!(ac.calling_ae_title, SCU_AE_TITLE);
    assert_eq!(ac.called_ae_title, SCP_AE_TITLE);
    assert_eq!(ac.presentation_contexts.len(), 1);
    assert!(ac.presentation_contexts[0].is_accepted());
    assert_eq!(
        ac.user_variables,
        vec![
            UserVariableItem::MaxLength(16_384),
            UserVariableItem::ImplementationClassUID(IMPLEMENTATION_CLASS_UID.to_string()),
            UserVariableItem::ImplementationVersionName(IMPLEMENTATION_VERSION_NAME.to_string()),
        ],
    );
}

#[test]
fn non_acceptor_is_rejected() {
    let (mut ae, conn, _device) = acceptor();
    ae.set_acceptor(false);
    ae.set_check_calling_ae_title(true);
    let rq = request(vec![pc(1, uids::VERIFICATION, &[uids::IMPLICIT_VR_LITTLE_ENDIAN])]);

    assert_eq!(
        rejection(&ae, &conn, &rq),
        AssociationRJ {
            result: AssociationRJResult::Permanent,
            source: AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CalledAETitleNotRecognized
            ),
        }
    );
}

#[test]
fn unknown_connection_is_rejected() {
    let (ae, _conn, _device) = acceptor();
    let other = Arc::new(Connection::new("127.0.0.1").with_port(11112));
    let rq = request(vec![pc(1, uids::VERIFICATION, &[uids::IMPLICIT_VR_LITTLE_ENDIAN])]);

    assert_eq!(
        rejection(&ae, &other, &rq).source,
        AssociationRJSource::ServiceUser(AssociationRJServiceUserReason::CalledAETitleNotRecognized)
    );
}

#[test]
fn uninstalled_entity_is_rejected() {
    let (mut ae, conn, _device) = acceptor();
    ae.set_installed(false).unwrap();
    let rq = request(vec![pc(1, uids::VERIFICATION, &[uids::IMPLICIT_VR_LITTLE_ENDIAN])]);

    assert_eq!(
        rejection(&ae, &conn, &rq).source,
        AssociationRJSource::ServiceUser(AssociationRJServiceUserReason::CalledAETitleNotRecognized)
    );
}

#[rstest]
#[case("A", true)]
#[case("B  ", true)]
#[case("C", false)]
fn calling_ae_title_check(#[case] calling_ae_title: &str, #[case] accepted: bool) {
    let (mut ae, conn, _device) = acceptor();
    ae.set_check_calling_ae_title(true);
    ae.set_preferred_calling_ae_titles(vec!["A".to_string(), "B".to_string()]);
    let mut rq = request(vec![pc(1, uids::VERIFICATION, &[uids::IMPLICIT_VR_LITTLE_ENDIAN])]);
    rq.calling_ae_title = calling_ae_title.to_string();

    match ae.negotiate(&conn, &rq) {
        Ok(_) => assert!(accepted),
        Err(e) => {
            assert!(!accepted);
            assert_eq!(
                e.association_rj(),
                Some(&AssociationRJ::permanent(
                    AssociationRJServiceUserReason::CallingAETitleNotRecognized
                ))
            );
        }
    }
}

#[test]
fn open_association_limit() {
    let (ae, conn, device) = acceptor();
    device.set_limit_open_associations(1);
    let rq = request(vec![pc(1, uids::VERIFICATION, &[uids::IMPLICIT_VR_LITTLE_ENDIAN])]);

    let _first = device.open_association();
    assert!(ae.negotiate(&conn, &rq).is_ok());

    let _second = device.open_association();
    assert_eq!(
        rejection(&ae, &conn, &rq),
        AssociationRJ {
            result: AssociationRJResult::Transient,
            source: AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::LocalLimitExceeded
            ),
        }
    );
}

#[test]
fn first_offered_transfer_syntax_wins() {
    let (ae, conn, _device) = acceptor();
    ae.add_transfer_capability(TransferCapability::new(
        uids::CT_IMAGE_STORAGE,
        Role::Scp,
        ["TS1", "TS2"],
    ));
    let rq = request(vec![
        pc(1, uids::CT_IMAGE_STORAGE, &["TS3", "TS2", "TS1"]),
        pc(3, uids::MR_IMAGE_STORAGE, &["TS1", "TS2"]),
        pc(5, uids::CT_IMAGE_STORAGE, &["TS4", "TS5"]),
    ]);

    let ac = ae.negotiate(&conn, &rq).unwrap();
    let outcome: Vec<_> = ac
        .presentation_contexts
        .iter()
        .map(|pc| (pc.id, pc.reason.clone(), pc.transfer_syntax.as_str()))
        .collect();
    assert_eq!(
        outcome,
        vec![
            (1, PresentationContextResultReason::Acceptance, "TS2"),
            (
                3,
                PresentationContextResultReason::AbstractSyntaxNotSupported,
                "TS1"
            ),
            (
                5,
                PresentationContextResultReason::TransferSyntaxesNotSupported,
                "TS4"
            ),
        ]
    );
}

#[test]
fn service_class_fallback() {
    let (ae, conn, _device) = acceptor();
    ae.add_transfer_capability(TransferCapability::new(
        STORAGE_SERVICE_CLASS,
        Role::Scp,
        [uids::EXPLICIT_VR_LITTLE_ENDIAN],
    ));
    let mut rq = request(vec![
        pc(1, uids::MR_IMAGE_STORAGE, &[uids::EXPLICIT_VR_LITTLE_ENDIAN]),
        pc(3, uids::CT_IMAGE_STORAGE, &[uids::EXPLICIT_VR_LITTLE_ENDIAN]),
    ]);
    rq.user_variables
        .push(UserVariableItem::SopClassCommonExtendedNegotiationSubItem(
            CommonExtendedNegotiation::new(uids::MR_IMAGE_STORAGE, STORAGE_SERVICE_CLASS, vec![]),
        ));

    let ac = ae.negotiate(&conn, &rq).unwrap();
    assert!(ac.presentation_contexts[0].is_accepted());
    assert_eq!(
        ac.presentation_contexts[1].reason,
        PresentationContextResultReason::AbstractSyntaxNotSupported
    );
}

#[test]
fn wildcard_capability_accepts_any_storage() {
    let (ae, conn, _device) = acceptor();
    ae.add_transfer_capability(TransferCapability::new(ANY, Role::Scp, [ANY]));
    let rq = request(vec![
        pc(1, uids::MR_IMAGE_STORAGE, &[uids::JPEG_BASELINE8_BIT]),
        pc(3, "1.2.3.4.5", &["1.1.1.1.1"]),
    ]);

    let ac = ae.negotiate(&conn, &rq).unwrap();
    assert!(ac.presentation_contexts[0].is_accepted());
    assert_eq!(
        ac.presentation_contexts[0].transfer_syntax,
        uids::JPEG_BASELINE8_BIT
    );
    assert_eq!(
        ac.presentation_contexts[1].reason,
        PresentationContextResultReason::TransferSyntaxesNotSupported
    );
}

#[test]
fn role_selection_answered_once_per_abstract_syntax() {
    let (ae, conn, _device) = acceptor();
    ae.add_transfer_capability(TransferCapability::new(
        uids::CT_IMAGE_STORAGE,
        Role::Scu,
        [uids::IMPLICIT_VR_LITTLE_ENDIAN],
    ));
    let mut rq = request(vec![
        pc(1, uids::CT_IMAGE_STORAGE, &[uids::IMPLICIT_VR_LITTLE_ENDIAN]),
        pc(3, uids::VERIFICATION, &[uids::IMPLICIT_VR_LITTLE_ENDIAN]),
        pc(5, uids::CT_IMAGE_STORAGE, &[uids::IMPLICIT_VR_LITTLE_ENDIAN]),
    ]);
    rq.user_variables.extend([
        UserVariableItem::RoleSelection(RoleSelection::new(uids::VERIFICATION, true, false)),
        UserVariableItem::RoleSelection(RoleSelection::new(uids::CT_IMAGE_STORAGE, true, true)),
    ]);

    let ac = ae.negotiate(&conn, &rq).unwrap();
    assert!(ac.presentation_contexts.iter().all(|pc| pc.is_accepted()));
    let answers: Vec<_> = ac.role_selections().cloned().collect();
    assert_eq!(
        answers,
        vec![
            RoleSelection::new(uids::CT_IMAGE_STORAGE, false, true),
            RoleSelection::new(uids::VERIFICATION, true, false),
        ]
    );
}

#[test]
fn query_options_are_intersected() {
    let (ae, conn, _device) = acceptor();
    ae.add_transfer_capability(
        TransferCapability::new(
            uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND,
            Role::Scp,
            [uids::IMPLICIT_VR_LITTLE_ENDIAN],
        )
        .with_query_options(QueryOptions::RELATIONAL | QueryOptions::FUZZY),
    );
    let mut rq = request(vec![pc(
        1,
        uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND,
        &[uids::IMPLICIT_VR_LITTLE_ENDIAN],
    )]);
    rq.user_variables
        .push(UserVariableItem::SopClassExtendedNegotiationSubItem(
            uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND.to_string(),
            (QueryOptions::RELATIONAL | QueryOptions::DATETIME)
                .to_extended_negotiation_information(),
        ));

    let ac = ae.negotiate(&conn, &rq).unwrap();
    let answer = ac
        .extended_negotiation_for(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND)
        .expect("extended negotiation answer");
    assert_eq!(
        QueryOptions::from_extended_negotiation_information(answer),
        QueryOptions::RELATIONAL
    );
}

#[test]
fn storage_options_are_returned_as_configured() {
    let (ae, conn, _device) = acceptor();
    let options = StorageOptions::new(
        LevelOfSupport::Level2,
        DigitalSignatureSupport::Level1,
        ElementCoercion::Yes,
    );
    ae.add_transfer_capability(
        TransferCapability::new(
            uids::CT_IMAGE_STORAGE,
            Role::Scp,
            [uids::IMPLICIT_VR_LITTLE_ENDIAN],
        )
        .with_storage_options(options),
    );
    let mut rq = request(vec![pc(1, uids::CT_IMAGE_STORAGE, &[uids::IMPLICIT_VR_LITTLE_ENDIAN])]);

    // nothing proposed, nothing answered
    let ac = ae.negotiate(&conn, &rq).unwrap();
    assert_eq!(ac.extended_negotiation_for(uids::CT_IMAGE_STORAGE), None);

    rq.user_variables
        .push(UserVariableItem::SopClassExtendedNegotiationSubItem(
            uids::CT_IMAGE_STORAGE.to_string(),
            vec![0, 0, 0, 0, 0, 0],
        ));
    let ac = ae.negotiate(&conn, &rq).unwrap();
    assert_eq!(
        ac.extended_negotiation_for(uids::CT_IMAGE_STORAGE),
        Some(&[2, 0, 1, 0, 1, 0][..])
    );
}

#[test]
fn operations_window_and_pdu_length() {
    let device = Arc::new(Device::new("archive"));
    let conn = Arc::new(
        Connection::new("127.0.0.1")
            .with_port(11112)
            .with_max_ops_invoked(3)
            .with_max_ops_performed(0)
            .with_receive_pdu_length(65_536),
    );
    let mut ae = ApplicationEntity::new(SCP_AE_TITLE).unwrap();
    ae.set_device(Some(device)).unwrap();
    ae.add_connection(conn.clone());

    let mut rq = request(vec![]);
    rq.set_async_operations_window(5, 0);
    let ac = ae.negotiate(&conn, &rq).unwrap();
    assert_eq!(ac.max_pdu_length(), Some(65_536));
    assert_eq!(ac.max_ops_invoked(), 5);
    assert_eq!(ac.max_ops_performed(), 3);
}

#[test]
fn user_identity_negotiation() {
    let (mut ae, conn, _device) = acceptor();
    ae.set_user_identity_negotiator(Some(Arc::new(
        |_: &AssociationRQ,
         identity: Option<&UserIdentity>|
         -> Result<Option<Vec<u8>>, AssociationRJ> {
            match identity {
                Some(identity) if identity.primary_field() == b"radiology" => {
                    Ok(Some(b"welcome".to_vec()))
                }
                _ => Err(AssociationRJ::permanent(
                    AssociationRJServiceUserReason::NoReasonGiven,
                )),
            }
        },
    )));

    let mut rq = request(vec![pc(1, uids::VERIFICATION, &[uids::IMPLICIT_VR_LITTLE_ENDIAN])]);
    assert_eq!(
        rejection(&ae, &conn, &rq),
        AssociationRJ::permanent(AssociationRJServiceUserReason::NoReasonGiven)
    );

    rq.user_variables
        .push(UserVariableItem::UserIdentityItem(UserIdentity::new(
            true,
            UserIdentityType::Username,
            b"radiology".to_vec(),
            vec![],
        )));
    let ac = ae.negotiate(&conn, &rq).unwrap();
    assert_eq!(ac.user_identity_response(), Some(&b"welcome"[..]));
    assert_eq!(
        ac.user_variables.last(),
        Some(&UserVariableItem::UserIdentityResponse(b"welcome".to_vec()))
    );
}

#[rstest]
#[case(Installed::Inherit, true, true)]
#[case(Installed::Inherit, false, false)]
#[case(Installed::Yes, true, true)]
#[case(Installed::No, true, false)]
#[case(Installed::No, false, false)]
fn installed_inheritance(
    #[case] installed: Installed,
    #[case] device_installed: bool,
    #[case] expected: bool,
) {
    let device = Arc::new(Device::new("archive"));
    let mut ae = ApplicationEntity::new(SCP_AE_TITLE).unwrap();
    ae.set_device(Some(device.clone())).unwrap();
    ae.set_installed(installed).unwrap();
    device.set_installed(device_installed);
    assert_eq!(ae.is_installed(), expected);
}

#[test]
fn detached_entity_is_never_installed() {
    let mut ae = ApplicationEntity::new(SCP_AE_TITLE).unwrap();
    ae.set_installed(true).unwrap();
    assert!(!ae.is_installed());
}

#[test]
fn concurrent_negotiation() {
    let (ae, conn, _device) = acceptor();
    let ae = Arc::new(ae);
    let rq = request(vec![pc(1, uids::VERIFICATION, &[uids::IMPLICIT_VR_LITTLE_ENDIAN])]);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..100 {
                    let ac = ae.negotiate(&conn, &rq).unwrap();
                    assert!(ac.presentation_contexts[0].is_accepted());
                }
            });
        }
        s.spawn(|| {
            for i in 0..100 {
                ae.add_transfer_capability(TransferCapability::new(
                    format!("1.2.3.{}", i),
                    Role::Scp,
                    [uids::IMPLICIT_VR_LITTLE_ENDIAN],
                ));
            }
        });
    });
    assert_eq!(ae.transfer_capabilities().len(), 101);
}
